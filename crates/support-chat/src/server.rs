//! HTTP server startup and routing
//!
//! Handlers share one `AppState`: the SQLite pool behind `ChatDatabase` and the
//! completion provider. The only outbound network call is to the provider.

use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::{api, chat_db::ChatDatabase, config::Config, metrics, shared_state::AppState};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Open the database, wire the provider and serve until ctrl-c
pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    metrics::init_metrics();
    cfg.log_summary();

    let database = Arc::new(ChatDatabase::new(&cfg.database_path)?);
    info!("Chat database initialized at: {}", cfg.database_path.display());

    let addr = cfg.socket_addr()?;
    let state = AppState::new(cfg, database)?;
    let app = build_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let total = state.counters.inc_total_requests();

    let response = next.run(request).await;
    metrics::inc_request(&route, response.status().as_str());
    debug!("Request #{} {} -> {}", total, route, response.status());
    response
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT])
        .allow_headers(Any);
    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/users/register", post(api::user_api::register))
        .route("/users/login", post(api::user_api::login))
        .route("/users", get(api::user_api::list_users))
        .route("/users/:id", get(api::user_api::get_user))
        .route(
            "/workspaces",
            post(api::workspace_api::create_workspace).get(api::workspace_api::list_workspaces),
        )
        .route("/workspaces/:slug", get(api::workspace_api::get_workspace))
        .route(
            "/conversations",
            post(api::conversation_api::create_conversation).get(api::conversation_api::list_conversations),
        )
        .route(
            "/conversations/workspace/:slug",
            get(api::conversation_api::list_workspace_conversations),
        )
        .route("/conversations/:id", get(api::conversation_api::get_conversation))
        .route("/messages", post(api::message_api::send_message))
        .route("/messages/:conversation_id", get(api::message_api::list_messages))
        .route("/messages/:conversation_id/bot", get(api::message_api::regenerate_bot_message))
        .route(
            "/prompts",
            post(api::prompt_api::upsert_prompt).put(api::prompt_api::update_prompt),
        )
        .route("/prompts/:app_id", get(api::prompt_api::get_prompt))
        .route(
            "/settings",
            post(api::settings_api::upsert_settings).get(api::settings_api::get_settings),
        )
        .route("/openai/test", get(api::completion_api::test_connection))
        .route("/openai/generate", post(api::completion_api::generate))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(metrics::get_metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{call, request, test_state, ProviderScript};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_healthz() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let (status, body) = call(&state, request("GET", "/healthz", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_requests_are_counted() {
        crate::metrics::init_metrics();
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        call(&state, request("GET", "/healthz", None, None)).await;

        let (status, body) = call(&state, request("GET", "/metrics", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_str().unwrap().contains("requests_total"));
        assert!(state.counters.total_requests.load(std::sync::atomic::Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let (status, _) = call(&state, request("GET", "/nope", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
