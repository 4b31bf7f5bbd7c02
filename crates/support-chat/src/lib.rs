//! Conversational support backend.
//!
//! Users chat with a bot inside role-gated workspaces. Each human message is
//! stored, the conversation history is replayed to an OpenAI-compatible
//! completion provider and the reply is relayed back as server-sent events
//! while it is generated, then stored as the bot's message.

pub mod api;
pub mod caller;
pub mod chat_db;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shared_state;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use caller::Caller;
pub use chat_db::ChatDatabase;
pub use config::Config;
pub use error::ServerError;
pub use llm::{CompletionProvider, OpenAiCompatibleClient};
pub use relay::RelayEvent;
pub use server::{build_router, run_server};
pub use shared_state::AppState;
