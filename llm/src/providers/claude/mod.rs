pub(crate) mod chat {
    pub(crate) mod api;
    pub(crate) mod model;
}
mod provider;

pub use chat::model::ClaudeChatModel;
pub use provider::ClaudeProvider;
