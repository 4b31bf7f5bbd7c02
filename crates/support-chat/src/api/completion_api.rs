//! Direct access to the completion provider: connection test and one-shot generation

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use validator::Validate;

use crate::api::ApiJson;
use crate::caller::Caller;
use crate::error::ServerError;
use crate::llm::ChatMessage;
use crate::relay::{system_prompt, EMPTY_REPLY_MESSAGE};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TypingConfig {
    pub cps: u32,
    pub tick: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub response: String,
    pub typing_config: TypingConfig,
}

/// GET /openai/test
pub async fn test_connection(State(state): State<AppState>, _caller: Caller) -> Result<String, ServerError> {
    match state.completion.list_models().await {
        Ok(models) => Ok(format!(
            "Connected to the completion provider. Available models: {}",
            models.join(", ")
        )),
        Err(e) => {
            error!("Completion provider connection test failed: {}", e);
            Err(ServerError::Internal(format!("connection test failed: {}", e)))
        }
    }
}

/// POST /openai/generate
pub async fn generate(
    State(state): State<AppState>,
    _caller: Caller,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServerError> {
    req.validate()?;
    let messages = vec![ChatMessage::system(system_prompt(&state)), ChatMessage::user(req.message)];

    let answer = state.completion.complete(messages).await.map_err(|e| {
        error!("One-shot completion failed: {}", e);
        ServerError::Internal(format!("completion failed: {}", e))
    })?;
    let response = if answer.trim().is_empty() { EMPTY_REPLY_MESSAGE.to_string() } else { answer };

    Ok(Json(GenerateResponse {
        response,
        typing_config: TypingConfig { cps: state.config.type_cps, tick: state.config.type_tick },
    }))
}
