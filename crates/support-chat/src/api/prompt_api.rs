//! System prompt management

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::ApiJson;
use crate::caller::Caller;
use crate::chat_db::Prompt;
use crate::error::ServerError;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    #[validate(length(min = 1))]
    pub app_id: String,
    #[validate(length(min = 1))]
    pub prompt: String,
}

/// POST /prompts
pub async fn upsert_prompt(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<PromptRequest>,
) -> Result<Json<Prompt>, ServerError> {
    req.validate()?;
    let prompt = state.database.prompts.upsert(&req.app_id, &req.prompt)?;
    info!("Prompt for '{}' saved by {}", prompt.app_id, caller.user_id);
    Ok(Json(prompt))
}

/// PUT /prompts
pub async fn update_prompt(
    State(state): State<AppState>,
    _caller: Caller,
    ApiJson(req): ApiJson<PromptRequest>,
) -> Result<Json<Prompt>, ServerError> {
    req.validate()?;
    state
        .database
        .prompts
        .update(&req.app_id, &req.prompt)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("no prompt for app '{}'", req.app_id)))
}

/// GET /prompts/:app_id
pub async fn get_prompt(
    State(state): State<AppState>,
    _caller: Caller,
    Path(app_id): Path<String>,
) -> Result<Json<Prompt>, ServerError> {
    state
        .database
        .prompts
        .get(&app_id)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("no prompt for app '{}'", app_id)))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{call, request, test_state, ProviderScript};
    use axum::http::StatusCode;
    use serde_json::json;

    const ADMIN: &[&str] = &["admin"];

    #[tokio::test]
    async fn test_prompt_lifecycle() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let caller = Some(("root", ADMIN));

        let update = json!({"appId": "support-app", "prompt": "v0"});
        let (status, _) = call(&state, request("PUT", "/prompts", caller, Some(update))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let create = json!({"appId": "support-app", "prompt": "v1"});
        let (status, created) = call(&state, request("POST", "/prompts", caller, Some(create))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["prompt"], "v1");

        let update = json!({"appId": "support-app", "prompt": "v2"});
        let (status, _) = call(&state, request("PUT", "/prompts", caller, Some(update))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, fetched) = call(&state, request("GET", "/prompts/support-app", caller, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["prompt"], "v2");
        assert_eq!(fetched["createdAt"], created["createdAt"]);

        let (status, _) = call(&state, request("GET", "/prompts/other", caller, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_fields_rejected() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let body = json!({"appId": "", "prompt": "text"});
        let (status, _) = call(&state, request("POST", "/prompts", Some(("root", ADMIN)), Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
