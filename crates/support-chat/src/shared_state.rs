//! Application state shared by every handler.
//!
//! Everything here is `Arc`-wrapped and read-only after start-up.

use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
use tracing::info;

use crate::{
    chat_db::ChatDatabase,
    config::Config,
    llm::{CompletionProvider, OpenAiCompatibleClient, TicketClassifier},
};

/// Per-process request counter, logged by the request middleware
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicUsize::new(0),
        }
    }

    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<ChatDatabase>,
    pub completion: Arc<dyn CompletionProvider>,
    pub ticket_classifier: Arc<TicketClassifier>,
    pub counters: Arc<AtomicCounters>,
}

impl AppState {
    /// Wire the production completion client from configuration
    pub fn new(config: Config, database: Arc<ChatDatabase>) -> anyhow::Result<Self> {
        let completion = Arc::new(OpenAiCompatibleClient::new(config.provider_settings())?);
        Self::with_provider(config, database, completion)
    }

    pub fn with_provider(
        config: Config,
        database: Arc<ChatDatabase>,
        completion: Arc<dyn CompletionProvider>,
    ) -> anyhow::Result<Self> {
        info!("Initializing application state");
        let ticket_classifier = Arc::new(config.ticket_classifier()?);
        Ok(Self {
            config: Arc::new(config),
            database,
            completion,
            ticket_classifier,
            counters: Arc::new(AtomicCounters::new()),
        })
    }
}
