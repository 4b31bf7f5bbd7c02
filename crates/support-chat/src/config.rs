use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm::{ProviderSettings, TicketClassifier, DEFAULT_TICKET_PATTERN};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful customer support assistant. Answer briefly and suggest opening a ticket when you cannot solve the problem.";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_base: String,
    pub openai_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub type_cps: u32,
    pub type_tick: u32,
    pub prompt_app_id: String,
    pub default_system_prompt: String,
    pub ticket_pattern: String,
    pub request_timeout_seconds: u64,
    pub sse_keep_alive_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let trimmed = |key: &str, default: &str| get(key, default).trim().to_string();

        let api_port = match lookup("API_PORT").or_else(|| lookup("PORT")) {
            Some(port) => port.trim().parse().with_context(|| format!("Invalid API_PORT '{}'", port))?,
            None => 3000,
        };

        let openai_api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());

        let config = Self {
            api_host: get("API_HOST", "127.0.0.1"),
            api_port,
            database_path: PathBuf::from(get("DATABASE_PATH", "./data/support_chat.db")),
            openai_api_key,
            openai_base: get("OPENAI_BASE", "https://api.openai.com/v1"),
            openai_model: get("OPENAI_MODEL", "gpt-4o-mini"),
            max_tokens: trimmed("CHATBOT_MAX_TOKENS", "200")
                .parse()
                .context("Invalid CHATBOT_MAX_TOKENS")?,
            temperature: trimmed("CHATBOT_TEMPERATURE", "0.7")
                .parse()
                .context("Invalid CHATBOT_TEMPERATURE")?,
            type_cps: trimmed("CHATBOT_TYPE_CPS", "90")
                .parse()
                .context("Invalid CHATBOT_TYPE_CPS")?,
            type_tick: trimmed("CHATBOT_TYPE_TICK", "16")
                .parse()
                .context("Invalid CHATBOT_TYPE_TICK")?,
            prompt_app_id: get("PROMPT_APP_ID", "support-app"),
            default_system_prompt: get("DEFAULT_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            ticket_pattern: get("TICKET_PATTERN", DEFAULT_TICKET_PATTERN),
            request_timeout_seconds: trimmed("REQUEST_TIMEOUT_SECONDS", "600")
                .parse()
                .context("Invalid REQUEST_TIMEOUT_SECONDS")?,
            sse_keep_alive_seconds: trimmed("SSE_KEEP_ALIVE_SECONDS", "15")
                .parse()
                .context("Invalid SSE_KEEP_ALIVE_SECONDS")?,
        };

        // Fail start-up on a bad pattern rather than on the first reply
        config.ticket_classifier()?;

        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.api_host, self.api_port))
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            base_url: self.openai_base.clone(),
            api_key: self.openai_api_key.clone(),
            model: self.openai_model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.request_timeout(),
        }
    }

    pub fn ticket_classifier(&self) -> Result<TicketClassifier> {
        TicketClassifier::new(&self.ticket_pattern)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_seconds)
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  Listen: {}:{}", self.api_host, self.api_port);
        info!("  Database: {}", self.database_path.display());
        info!("  Provider: {} (model {})", self.openai_base, self.openai_model);
        info!("  API key: {}", if self.openai_api_key.is_some() { "set" } else { "not set" });
        info!("  Prompt app id: {}", self.prompt_app_id);
        info!("  Typing: {} cps, {} ms tick", self.type_cps, self.type_tick);
        info!("  Request timeout: {}s, SSE keep-alive: {}s", self.request_timeout_seconds, self.sse_keep_alive_seconds);
    }
}

#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        api_host: "127.0.0.1".to_string(),
        api_port: 3000,
        database_path: PathBuf::from(":memory:"),
        openai_api_key: None,
        openai_base: "http://127.0.0.1:9".to_string(),
        openai_model: "test-model".to_string(),
        max_tokens: 200,
        temperature: 0.7,
        type_cps: 90,
        type_tick: 16,
        prompt_app_id: "support-app".to_string(),
        default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        ticket_pattern: DEFAULT_TICKET_PATTERN.to_string(),
        request_timeout_seconds: 600,
        sse_keep_alive_seconds: 15,
    }
}
