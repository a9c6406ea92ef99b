use super::chat::model::ClaudeChatModel;
use crate::client::Client;
use crate::{ChatModel, LlmError};
use reqwest::header;
use std::sync::Arc;
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";

/// Connection to the Anthropic Messages API.
///
/// Holds no global state; every model created from it shares the same
/// HTTP client and credentials.
pub struct ClaudeProvider {
    client: Client,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, LlmError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-api-key",
            header::HeaderValue::from_str(api_key)
                .map_err(|e| LlmError::InvalidRequest(format!("invalid api key header: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(API_VERSION),
        );
        Ok(ClaudeProvider {
            client: Client::with_headers(headers, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a chat model, returned as Arc for sharing across tasks
    pub fn create_chat_model(
        &self,
        model_name: &str,
        max_tokens: u32,
    ) -> Arc<dyn ChatModel + Send + Sync> {
        Arc::new(ClaudeChatModel::new(
            self.client.clone(),
            self.base_url.clone(),
            model_name.to_string(),
            max_tokens,
        ))
    }
}
