use prometheus::{Encoder, TextEncoder, Registry, IntCounter, IntCounterVec, IntGauge};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use tracing::error;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static ACTIVE_STREAMS: OnceLock<IntGauge> = OnceLock::new();
static STREAM_FRAGMENTS: OnceLock<IntCounter> = OnceLock::new();
static TICKET_SUGGESTIONS: OnceLock<IntCounter> = OnceLock::new();
static BOT_TURNS: OnceLock<IntCounter> = OnceLock::new();
static FAILED_TURNS: OnceLock<IntCounter> = OnceLock::new();

/// Register the collectors. Safe to call more than once.
pub fn init_metrics() {
    let collectors: [Option<Box<dyn prometheus::core::Collector>>; 6] = [
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .ok()
        .map(|c| Box::new(REQ_COUNTER.get_or_init(|| c).clone()) as _),
        IntGauge::new("active_streams", "Bot replies currently streaming")
            .ok()
            .map(|g| Box::new(ACTIVE_STREAMS.get_or_init(|| g).clone()) as _),
        IntCounter::new("stream_fragments_total", "Completion fragments relayed to clients")
            .ok()
            .map(|c| Box::new(STREAM_FRAGMENTS.get_or_init(|| c).clone()) as _),
        IntCounter::new("ticket_suggestions_total", "Bot replies flagged as suggesting a ticket")
            .ok()
            .map(|c| Box::new(TICKET_SUGGESTIONS.get_or_init(|| c).clone()) as _),
        IntCounter::new("bot_turns_total", "Bot replies stored")
            .ok()
            .map(|c| Box::new(BOT_TURNS.get_or_init(|| c).clone()) as _),
        IntCounter::new("failed_turns_total", "Bot turns that ended without a stored reply")
            .ok()
            .map(|c| Box::new(FAILED_TURNS.get_or_init(|| c).clone()) as _),
    ];
    for collector in collectors.into_iter().flatten() {
        REGISTRY.register(collector).ok();
    }
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_streams() {
    if let Some(gauge) = ACTIVE_STREAMS.get() {
        gauge.inc();
    }
}

pub fn dec_streams() {
    if let Some(gauge) = ACTIVE_STREAMS.get() {
        gauge.dec();
    }
}

pub fn inc_fragments() {
    if let Some(counter) = STREAM_FRAGMENTS.get() {
        counter.inc();
    }
}

pub fn inc_ticket_suggestions() {
    if let Some(counter) = TICKET_SUGGESTIONS.get() {
        counter.inc();
    }
}

pub fn inc_bot_turns() {
    if let Some(counter) = BOT_TURNS.get() {
        counter.inc();
    }
}

pub fn inc_failed_turns() {
    if let Some(counter) = FAILED_TURNS.get() {
        counter.inc();
    }
}

/// Keeps `active_streams` accurate however the stream ends, client disconnect included
pub struct ActiveStreamGuard;

impl ActiveStreamGuard {
    pub fn new() -> Self {
        inc_streams();
        Self
    }
}

impl Default for ActiveStreamGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        dec_streams();
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/plain; version=0.0.4")], Vec::new());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exposition_includes_request_counter() {
        init_metrics();
        init_metrics();
        inc_request("/healthz", "200");

        let response = get_metrics().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("requests_total{route=\"/healthz\",status=\"200\"}"));
    }

    #[tokio::test]
    async fn test_turn_counters_are_exported() {
        init_metrics();
        inc_bot_turns();
        inc_failed_turns();

        let response = get_metrics().await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("bot_turns_total"));
        assert!(text.contains("failed_turns_total"));
    }
}
