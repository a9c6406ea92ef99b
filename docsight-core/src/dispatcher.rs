//! One backend call per image: offer every schema, force a selection,
//! decode and validate the filled fields.

use crate::codec::EncodedImage;
use crate::error::{BackendError, ExtractionError};
use crate::record::ExtractionRecord;
use crate::retry::RetryPolicy;
use crate::schema::{ExtractionSchema, SchemaRegistry};
use config::{BackendSettings, EnrichmentSettings};
use llm::{ChatMessage, ChatModel, ChatPayload, ChatRequest, ChatResponse, ToolChoice};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

const CONTEXT_PLACEHOLDER: &str = "{context}";

pub const DEFAULT_INSTRUCTION: &str = "Below is the markdown of the document page this image was taken from.

<page_context>
{context}
</page_context>

Describe the image using the page context where it helps. Call the tool that matches the kind of image and fill in every field.";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub retry: RetryPolicy,
    /// Prompt template; `{context}` is replaced by the page markdown
    pub instruction: String,
}

impl DispatcherConfig {
    pub fn from_settings(backend: &BackendSettings, enrichment: &EnrichmentSettings) -> Self {
        Self {
            max_tokens: backend.max_tokens,
            retry: RetryPolicy::from_settings(enrichment),
            ..Self::default()
        }
    }

    fn render_instruction(&self, context: &str) -> String {
        self.instruction.replace(CONTEXT_PLACEHOLDER, context)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: Some(0.0),
            retry: RetryPolicy::default(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }
}

pub struct ExtractionDispatcher {
    model: Arc<dyn ChatModel + Send + Sync>,
    registry: Arc<SchemaRegistry>,
    config: DispatcherConfig,
}

impl ExtractionDispatcher {
    pub fn new(
        model: Arc<dyn ChatModel + Send + Sync>,
        registry: Arc<SchemaRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            model,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn build_request(&self, context: &str, image: &EncodedImage) -> ChatRequest {
        let message = ChatMessage::user(ChatPayload::image_with_text(
            image.data.clone(),
            image.mime_type.clone(),
            self.config.render_instruction(context),
        ));

        let request = ChatRequest::with_tools([&message], self.registry.tool_definitions())
            .tool_choice(ToolChoice::Any)
            .max_tokens(self.config.max_tokens);
        match self.config.temperature {
            Some(t) => request.temperature(t),
            None => request,
        }
    }

    /// Extract a record for `image`. Transient backend errors are retried;
    /// malformed selections are returned as-is.
    #[instrument(level = "debug", skip(self, context, image), fields(image = %image.path.display()))]
    pub async fn extract(
        &self,
        context: &str,
        image: &EncodedImage,
    ) -> Result<ExtractionRecord, ExtractionError> {
        let request = self.build_request(context, image);

        let response = self
            .config
            .retry
            .execute(|| async {
                self.model
                    .chat(&request)
                    .await
                    .map_err(BackendError::from)
            })
            .await?;

        self.decode(&response, &image.path)
    }

    fn decode(
        &self,
        response: &ChatResponse,
        image_path: &Path,
    ) -> Result<ExtractionRecord, ExtractionError> {
        let calls = response.get_tool_calls();
        let call = match calls.as_slice() {
            [] => {
                return Err(ExtractionError::NoSchemaSelected {
                    stop_reason: response.stop_reason.as_ref().map(|r| r.to_string()),
                });
            }
            [call] => *call,
            many => {
                return Err(ExtractionError::AmbiguousSelection {
                    names: many.iter().map(|c| c.name.clone()).collect(),
                });
            }
        };

        let schema = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ExtractionError::UnknownSchema {
                name: call.name.clone(),
            })?;

        let fields = decode_fields(schema, &call.arguments)?;
        debug!(schema = %schema.name, fields = fields.len(), "schema selected");

        Ok(ExtractionRecord {
            schema: schema.name.clone(),
            modality: schema.modality,
            fields,
            image_path: image_path.to_path_buf(),
        })
    }
}

/// Keep the declared fields of `input` as strings; fail if a required one is
/// absent or blank.
fn decode_fields(
    schema: &ExtractionSchema,
    input: &Value,
) -> Result<BTreeMap<String, String>, ExtractionError> {
    let object = input
        .as_object()
        .ok_or_else(|| ExtractionError::InvalidField {
            schema: schema.name.clone(),
            field: "input".to_string(),
            reason: format!("expected an object, got {}", value_kind(input)),
        })?;

    let mut fields = BTreeMap::new();
    let mut missing = Vec::new();
    for spec in &schema.fields {
        let value = match object.get(&spec.name) {
            Some(value) => {
                field_text(value).map_err(|reason| ExtractionError::InvalidField {
                    schema: schema.name.clone(),
                    field: spec.name.clone(),
                    reason,
                })?
            }
            None => None,
        };

        match value {
            Some(text) if !text.trim().is_empty() => {
                fields.insert(spec.name.clone(), text);
            }
            _ if spec.required => missing.push(spec.name.clone()),
            _ => {}
        }
    }

    for extra in object.keys().filter(|k| schema.field(k).is_none()) {
        debug!(schema = %schema.name, field = %extra, "ignoring undeclared field");
    }

    if !missing.is_empty() {
        return Err(ExtractionError::ValidationFailed {
            schema: schema.name.clone(),
            modality: schema.modality,
            missing,
        });
    }

    Ok(fields)
}

fn field_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| match item {
                    Value::Array(_) | Value::Object(_) => {
                        Err(format!("nested {} in list", value_kind(item)))
                    }
                    other => field_text(other),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(parts.into_iter().flatten().collect::<Vec<_>>().join(", ")))
        }
        Value::Object(_) => Err("expected text, got an object".to_string()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
