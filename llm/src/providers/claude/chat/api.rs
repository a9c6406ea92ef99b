use crate::LlmError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl TryFrom<crate::api::Role> for Role {
    type Error = LlmError;

    fn try_from(value: crate::api::Role) -> Result<Self, Self::Error> {
        match value {
            crate::api::Role::User => Ok(Role::User),
            crate::api::Role::Assistant => Ok(Role::Assistant),
            crate::api::Role::System => Err(LlmError::InvalidRequest(
                "Claude does not support system messages directly in role field.".to_string(),
            )),
        }
    }
}

impl From<Role> for crate::api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::User => crate::api::Role::User,
            Role::Assistant => crate::api::Role::Assistant,
        }
    }
}

/// Claude image source - base64 or URL
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Content {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Block types this client does not consume (thinking, citations, ...)
    #[serde(other)]
    Unsupported,
}

impl Content {
    fn into_block(self) -> Option<crate::api::ContentBlock> {
        match self {
            Content::Text { text } => Some(crate::api::ContentBlock::Text { text }),
            Content::Image { source } => match source {
                ImageSource::Base64 { media_type, data } => Some(crate::api::ContentBlock::Image {
                    data,
                    mime_type: media_type,
                }),
                ImageSource::Url { url } => Some(crate::api::ContentBlock::Text {
                    text: format!("[Image URL: {}]", url),
                }),
            },
            Content::ToolUse { id, name, input } => {
                Some(crate::api::ContentBlock::ToolCall(crate::api::ToolCall {
                    id,
                    name,
                    arguments: input,
                }))
            }
            Content::Unsupported => None,
        }
    }
}

impl From<&crate::api::ContentBlock> for Content {
    fn from(block: &crate::api::ContentBlock) -> Self {
        match block {
            crate::api::ContentBlock::Text { text } => Content::Text { text: text.clone() },
            crate::api::ContentBlock::Image { data, mime_type } => Content::Image {
                source: ImageSource::Base64 {
                    media_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
            crate::api::ContentBlock::ToolCall(call) => Content::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct InputMessage {
    pub(crate) content: Vec<Content>,

    pub(crate) role: Role,
}

impl TryFrom<&crate::ChatMessage> for InputMessage {
    type Error = LlmError;

    fn try_from(msg: &crate::ChatMessage) -> Result<Self, Self::Error> {
        Ok(InputMessage {
            role: msg.role.try_into()?,
            content: msg.payload.content.iter().map(|b| b.into()).collect(),
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Tool {
    pub(crate) name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,

    pub(crate) input_schema: serde_json::Value,
}

impl TryFrom<&crate::api::ToolDefinition> for Tool {
    type Error = LlmError;

    fn try_from(def: &crate::api::ToolDefinition) -> Result<Self, Self::Error> {
        Ok(Tool {
            name: def.name.clone(),
            description: def.description.clone(),
            input_schema: serde_json::to_value(&def.input_schema)?,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

impl From<&crate::api::ToolChoice> for ToolChoice {
    fn from(choice: &crate::api::ToolChoice) -> Self {
        match choice {
            crate::api::ToolChoice::Auto => ToolChoice::Auto,
            crate::api::ToolChoice::Any => ToolChoice::Any,
            crate::api::ToolChoice::Tool { name } => ToolChoice::Tool { name: name.clone() },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct MessagesRequest {
    pub(crate) model: String,

    pub(crate) messages: Vec<InputMessage>,

    pub(crate) max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tools: Option<Vec<Tool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tool_choice: Option<ToolChoice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f32>,
}

impl MessagesRequest {
    pub(crate) fn from_chat_request(
        model_name: &str,
        request: &crate::ChatRequest,
        default_max_tokens: u32,
    ) -> Result<Self, LlmError> {
        // System messages go into the top-level system field.
        let system_instruction = request
            .messages
            .iter()
            .filter(|m| m.role == crate::api::Role::System)
            .map(|m| m.get_text())
            .collect::<Vec<String>>()
            .join("\n");

        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != crate::api::Role::System)
            .map(InputMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        if messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "request has no user or assistant messages".to_string(),
            ));
        }

        let tools = request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(Tool::try_from).collect::<Result<Vec<_>, _>>())
            .transpose()?;

        // tool_choice is rejected by the API when no tools are offered
        let tool_choice = match &tools {
            Some(t) if !t.is_empty() => request.tool_choice.as_ref().map(ToolChoice::from),
            _ => None,
        };

        Ok(MessagesRequest {
            model: model_name.to_string(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(default_max_tokens),
            system: if system_instruction.is_empty() {
                None
            } else {
                Some(system_instruction)
            },
            tools,
            tool_choice,
            temperature: request.temperature,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct MessagesResponse {
    pub(crate) id: String,

    pub(crate) role: Role,

    pub(crate) content: Vec<Content>,

    pub(crate) model: String,

    pub(crate) stop_reason: Option<String>,

    pub(crate) stop_sequence: Option<String>,

    pub(crate) usage: Option<Usage>,
}

impl From<MessagesResponse> for crate::ChatResponse {
    fn from(response: MessagesResponse) -> Self {
        let payload = crate::api::ChatPayload::new(
            response
                .content
                .into_iter()
                .filter_map(Content::into_block)
                .collect(),
        );

        crate::ChatResponse::new(
            crate::ChatMessage::new(response.role.into(), payload),
            response.stop_reason.as_deref().map(crate::StopReason::parse),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatMessage, ChatPayload, ChatRequest, StopReason, ToolDefinition};

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "get_info".to_string(),
            description: Some("Describe".to_string()),
            input_schema: schemars::schema::RootSchema::default(),
        }
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![
            ChatMessage::system(ChatPayload::text("Be terse")),
            ChatMessage::user(ChatPayload::image_with_text("AAAA", "image/png", "What is it?")),
        ];
        let request = ChatRequest::with_tools(&messages, vec![tool()])
            .tool_choice(crate::ToolChoice::Any)
            .max_tokens(512);

        let api = MessagesRequest::from_chat_request("claude-test", &request, 4096).unwrap();
        let json = serde_json::to_value(&api).unwrap();

        assert_eq!(json["model"], "claude-test");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["system"], "Be terse");
        assert_eq!(json["tool_choice"], serde_json::json!({"type": "any"}));
        assert_eq!(json["tools"][0]["name"], "get_info");

        let content = &json["messages"][0]["content"];
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "AAAA");
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn test_default_max_tokens_and_no_tool_choice_without_tools() {
        let messages = vec![ChatMessage::user(ChatPayload::text("hi"))];
        let request = ChatRequest::new(&messages).tool_choice(crate::ToolChoice::Any);

        let api = MessagesRequest::from_chat_request("m", &request, 4096).unwrap();
        assert_eq!(api.max_tokens, 4096);
        assert!(api.tool_choice.is_none());
        assert!(api.system.is_none());
    }

    #[test]
    fn test_system_only_request_rejected() {
        let messages = vec![ChatMessage::system(ChatPayload::text("only system"))];
        let request = ChatRequest::new(&messages);
        assert!(MessagesRequest::from_chat_request("m", &request, 10).is_err());
    }

    #[test]
    fn test_tool_use_response() {
        let json = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-test",
            "content": [
                {"type": "text", "text": "Looking at the figure"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_info", "input": {"title": "T"}}
            ],
            "stop_reason": "tool_use",
            "stop_sequence": null,
            "usage": {"input_tokens": 10, "output_tokens": 20}
        });

        let response: MessagesResponse = serde_json::from_value(json).unwrap();
        let response: crate::ChatResponse = response.into();

        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        let calls = response.get_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_info");
        assert_eq!(calls[0].arguments["title"], "T");
        assert_eq!(response.get_text(), "Looking at the figure");
    }

    #[test]
    fn test_end_turn_response_with_unknown_block() {
        let json = serde_json::json!({
            "id": "msg_2",
            "role": "assistant",
            "model": "claude-test",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "It is a photo."}
            ],
            "stop_reason": "end_turn",
            "stop_sequence": null
        });

        let response: MessagesResponse = serde_json::from_value(json).unwrap();
        let response: crate::ChatResponse = response.into();

        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert!(response.get_tool_calls().is_empty());
        assert_eq!(response.get_text(), "It is a photo.");
    }
}
