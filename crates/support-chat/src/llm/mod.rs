//! Chat-completion provider access: wire format, streaming client and reply classification
pub mod chat_format;
pub mod client;
pub mod ticket;

pub use chat_format::{history_to_chat, ChatContent, ChatMessage, ChatRole, ContentPart, ImageUrl, FILE_PLACEHOLDER_TEXT};
pub use client::{CompletionProvider, FragmentStream, OpenAiCompatibleClient, ProviderSettings};
pub use ticket::{TicketClassifier, DEFAULT_TICKET_PATTERN};
