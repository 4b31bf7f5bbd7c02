//! Per-user settings

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::api::ApiJson;
use crate::caller::Caller;
use crate::chat_db::{Notifications, Settings, SettingsPatch, Theme};
use crate::error::ServerError;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SettingsRequest {
    pub theme: Option<String>,
    pub notifications: Option<Notifications>,
    #[validate(length(min = 2, max = 16))]
    pub language: Option<String>,
}

impl SettingsRequest {
    fn into_patch(self) -> Result<SettingsPatch, ServerError> {
        self.validate()?;
        let theme = match self.theme.as_deref() {
            None => None,
            Some(value) => Some(
                Theme::parse(value)
                    .ok_or_else(|| ServerError::BadRequest(format!("theme must be 'dark' or 'light', got '{}'", value)))?,
            ),
        };
        Ok(SettingsPatch { theme, notifications: self.notifications, language: self.language })
    }
}

/// POST /settings
pub async fn upsert_settings(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<SettingsRequest>,
) -> Result<Json<Settings>, ServerError> {
    let patch = req.into_patch()?;
    Ok(Json(state.database.settings.upsert(&caller.user_id, patch)?))
}

/// GET /settings
pub async fn get_settings(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Settings>, ServerError> {
    state
        .database
        .settings
        .get(&caller.user_id)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("no settings saved yet".into()))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{call, request, test_state, ProviderScript};
    use axum::http::StatusCode;
    use serde_json::json;

    const NO_ROLES: &[&str] = &[];

    #[tokio::test]
    async fn test_settings_patch_semantics() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let me = Some(("u1", NO_ROLES));

        let (status, _) = call(&state, request("GET", "/settings", me, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, saved) = call(&state, request("POST", "/settings", me, Some(json!({"theme": "dark"})))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["notifications"], json!({"email": true, "push": false}));
        assert_eq!(saved["language"], "es");

        let (_, saved) = call(&state, request("POST", "/settings", me, Some(json!({"language": "en"})))).await;
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["language"], "en");

        let (status, fetched) = call(&state, request("GET", "/settings", me, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_invalid_theme_rejected() {
        let (state, _) = test_state(ProviderScript::Fragments(Vec::new()));
        let (status, _) =
            call(&state, request("POST", "/settings", Some(("u1", NO_ROLES)), Some(json!({"theme": "neon"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
