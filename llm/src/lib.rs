use async_trait::async_trait;
use std::sync::Arc;

pub mod api;
mod client;
pub mod error;
pub mod providers;
pub mod traffic_log;

pub use api::*;
pub use error::LlmError;
pub use providers::{ClaudeChatModel, ClaudeProvider};

#[async_trait]
pub trait ChatModel {
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

// Blanket implementation for Arc<dyn ChatModel> to make it easier to work with
#[async_trait]
impl ChatModel for Arc<dyn ChatModel + Send + Sync> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        (**self).chat(request).await
    }
}
