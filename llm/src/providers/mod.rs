pub(crate) mod claude;

pub use claude::{ClaudeChatModel, ClaudeProvider};
