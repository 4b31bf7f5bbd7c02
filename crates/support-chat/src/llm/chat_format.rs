//! Provider chat-message wire format and history translation
use serde::{Deserialize, Serialize};

use crate::chat_db::{MessageKind, Sender, StoredMessage};

/// Text part sent with a file message whose own content is empty
pub const FILE_PLACEHOLDER_TEXT: &str = "Files received";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: ChatContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: ChatContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: ChatContent::Text(text.into()) }
    }

    /// One text part followed by one image part per URL
    pub fn user_with_files(text: &str, file_urls: &[String]) -> Self {
        let text = if text.is_empty() { FILE_PLACEHOLDER_TEXT } else { text };
        let mut parts = Vec::with_capacity(file_urls.len() + 1);
        parts.push(ContentPart::Text { text: text.to_string() });
        parts.extend(file_urls.iter().map(|url| ContentPart::ImageUrl { image_url: ImageUrl { url: url.clone() } }));
        Self { role: ChatRole::User, content: ChatContent::Parts(parts) }
    }
}

fn stored_to_chat(message: &StoredMessage) -> ChatMessage {
    match message.sender {
        Sender::Bot => ChatMessage::assistant(message.content.clone()),
        Sender::Human if message.kind == MessageKind::File && !message.file_urls.is_empty() => {
            ChatMessage::user_with_files(&message.content, &message.file_urls)
        }
        Sender::Human => ChatMessage::user(message.content.clone()),
    }
}

/// System prompt first, then the history in stored order
pub fn history_to_chat(system_prompt: &str, history: &[StoredMessage]) -> Vec<ChatMessage> {
    std::iter::once(ChatMessage::system(system_prompt))
        .chain(history.iter().map(stored_to_chat))
        .collect()
}
