//! API endpoints for conversation management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::{ApiJson, ApiQuery, ListQuery, Page, SortField, CREATED_AT, UPDATED_AT};
use crate::caller::Caller;
use crate::chat_db::{Conversation, NewConversation};
use crate::error::ServerError;
use crate::relay::authorize_workspace;
use crate::shared_state::AppState;

const CONVERSATION_SORT_FIELDS: [SortField; 3] = [CREATED_AT, ("name", "name"), UPDATED_AT];

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub roles: Option<Vec<String>>,
    #[validate(length(min = 1))]
    pub workspace_slug: String,
}

/// POST /conversations
pub async fn create_conversation(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ServerError> {
    req.validate()?;
    let workspace = authorize_workspace(&state, &caller, &req.workspace_slug)?;
    let roles = req.roles.unwrap_or(workspace.roles);

    let conversation = state.database.conversations.create(NewConversation {
        name: &req.name,
        roles: &roles,
        workspace_slug: &workspace.slug,
        created_by: &caller.user_id,
    })?;
    info!("Conversation {} created by {}", conversation.id, caller.user_id);
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Page<Conversation>>, ServerError> {
    let resolved = query.resolve(&CONVERSATION_SORT_FIELDS)?;
    let page = state.database.conversations.list_for_user(&caller.user_id, resolved.request)?;
    Ok(Json(Page::new(resolved, page)))
}

/// GET /conversations/workspace/:slug
pub async fn list_workspace_conversations(
    State(state): State<AppState>,
    caller: Caller,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Conversation>>, ServerError> {
    let workspace = authorize_workspace(&state, &caller, &slug)?;
    let conversations = state
        .database
        .conversations
        .list_for_user_in_workspace(&caller.user_id, &workspace.slug)?;
    Ok(Json(conversations))
}

/// GET /conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ServerError> {
    state
        .database
        .conversations
        .get(&conversation_id)?
        .filter(|c| c.created_by == caller.user_id)
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("conversation {} not found", conversation_id)))
}
