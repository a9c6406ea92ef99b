use super::api::{MessagesRequest, MessagesResponse};
use crate::client::Client;
use crate::traffic_log;
use crate::{ChatModel, ChatRequest, ChatResponse, LlmError};
use async_trait::async_trait;
use tracing::debug;

pub struct ClaudeChatModel {
    client: Client,
    base_url: String,
    model_name: String,
    max_tokens: u32,
}

impl ClaudeChatModel {
    pub fn new(client: Client, base_url: String, model_name: String, max_tokens: u32) -> Self {
        ClaudeChatModel {
            client,
            base_url,
            model_name,
            max_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for ClaudeChatModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/messages", self.base_url);

        let api_request =
            MessagesRequest::from_chat_request(&self.model_name, request, self.max_tokens)?;
        traffic_log::log_request(&self.model_name, &api_request);

        match self.client.post::<_, _, MessagesResponse>(url, &api_request).await {
            Ok(response) => {
                traffic_log::log_response(&self.model_name, &response);
                debug!(
                    model = %self.model_name,
                    stop_reason = ?response.stop_reason,
                    output_tokens = ?response.usage.as_ref().and_then(|u| u.output_tokens),
                    "messages call completed"
                );
                Ok(response.into())
            }
            Err(e) => {
                traffic_log::log_error(&self.model_name, &e.to_string());
                Err(e)
            }
        }
    }
}
