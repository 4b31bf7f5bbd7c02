//! Message history and the streamed bot-reply endpoints

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::ApiJson;
use crate::caller::Caller;
use crate::chat_db::{MessageKind, StoredMessage};
use crate::error::ServerError;
use crate::relay::{self, HumanTurn, RelayEvent};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "conversationId is required"))]
    pub conversation_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub file_urls: Vec<String>,
    pub workspace_slug: Option<String>,
}

impl SendMessageRequest {
    fn into_turn(self) -> Result<HumanTurn, ServerError> {
        self.validate()?;
        let has_files = self.kind == MessageKind::File && !self.file_urls.is_empty();
        if self.content.trim().is_empty() && !has_files {
            return Err(ServerError::BadRequest("message content is required".into()));
        }
        Ok(HumanTurn {
            conversation_id: self.conversation_id,
            content: self.content,
            kind: self.kind,
            file_urls: self.file_urls,
            workspace_slug: self.workspace_slug.filter(|s| !s.is_empty()),
        })
    }
}

fn sse_response(
    state: &AppState,
    events: impl Stream<Item = RelayEvent> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_sse_data())));
    Sse::new(events).keep_alive(KeepAlive::new().interval(state.config.sse_keep_alive()))
}

/// POST /messages
pub async fn send_message(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let turn = req.into_turn()?;
    info!("Message from {} for conversation {}", caller.user_id, turn.conversation_id);

    let events = relay::start_human_turn(&state, &caller, turn).await?;
    Ok(sse_response(&state, events))
}

/// GET /messages/:conversation_id/bot
pub async fn regenerate_bot_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(conversation_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    info!("Regenerating bot reply for conversation {}", conversation_id);

    let events = relay::start_regeneration(&state, &caller, &conversation_id).await?;
    Ok(sse_response(&state, events))
}

/// GET /messages/:conversation_id
pub async fn list_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, ServerError> {
    let conversation = state
        .database
        .conversations
        .get(&conversation_id)?
        .ok_or_else(|| ServerError::NotFound(format!("conversation {} not found", conversation_id)))?;

    if !conversation.workspace_slug.is_empty() && !caller.shares_role_with(&conversation.roles) {
        return Err(ServerError::Forbidden("no access to this conversation".into()));
    }

    Ok(Json(state.database.messages.history(&conversation.id)?))
}
