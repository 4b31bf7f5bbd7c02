//! Human message → bot reply pipeline.
//!
//! Persists the human turn, replays the conversation history to the completion
//! provider, relays each fragment as it arrives and stores the finished reply.
//! All checks that can reject the request run before the first event is produced.

use futures::Stream;
use futures_util::StreamExt;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::caller::Caller;
use crate::chat_db::{Conversation, MessageKind, NewMessage, Sender, Workspace};
use crate::config::DEFAULT_SYSTEM_PROMPT;
use crate::error::ServerError;
use crate::llm::{history_to_chat, FragmentStream};
use crate::metrics::{self, ActiveStreamGuard};
use crate::shared_state::AppState;

pub const EMPTY_REPLY_MESSAGE: &str = "No valid response received.";
pub const DONE_SENTINEL: &str = "[DONE]";

/// One server-sent event of a bot turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    HumanSaved { message_id: String },
    Fragment(String),
    Completed { message_id: String, suggest_ticket: bool },
    Failed(String),
    Done,
}

impl RelayEvent {
    /// Payload of the event's `data:` line
    pub fn to_sse_data(&self) -> String {
        match self {
            RelayEvent::HumanSaved { message_id } => json!({ "humanMessageId": message_id }).to_string(),
            RelayEvent::Fragment(content) => json!({ "content": content, "suggestTicket": false }).to_string(),
            RelayEvent::Completed { message_id, suggest_ticket } => {
                json!({ "botMessageId": message_id, "suggestTicket": suggest_ticket }).to_string()
            }
            RelayEvent::Failed(message) => json!({ "error": message }).to_string(),
            RelayEvent::Done => DONE_SENTINEL.to_string(),
        }
    }
}

/// Where the finished bot reply is stored and to whom it is attributed
#[derive(Debug, Clone)]
pub struct BotTurn {
    pub conversation_id: String,
    pub user_id: String,
    pub workspace_slug: String,
}

#[derive(Debug, Clone)]
pub struct HumanTurn {
    pub conversation_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub file_urls: Vec<String>,
    pub workspace_slug: Option<String>,
}

/// Prompt for the configured app, else any stored prompt, else the configured default
pub fn system_prompt(state: &AppState) -> String {
    let stored = state
        .database
        .prompts
        .get(&state.config.prompt_app_id)
        .and_then(|prompt| match prompt {
            Some(prompt) => Ok(Some(prompt)),
            None => state.database.prompts.first(),
        });
    match stored {
        Ok(Some(prompt)) => return prompt.prompt,
        Ok(None) => debug!("No stored prompt, using configured default"),
        Err(e) => warn!("Failed to load system prompt, using configured default: {}", e),
    }
    if state.config.default_system_prompt.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        state.config.default_system_prompt.clone()
    }
}

fn load_conversation(state: &AppState, conversation_id: &str) -> Result<Conversation, ServerError> {
    state
        .database
        .conversations
        .get(conversation_id)?
        .ok_or_else(|| ServerError::NotFound(format!("conversation {} not found", conversation_id)))
}

/// Existing workspace the caller may use; unknown slugs are a client error
pub(crate) fn authorize_workspace(state: &AppState, caller: &Caller, slug: &str) -> Result<Workspace, ServerError> {
    let workspace = state
        .database
        .workspaces
        .find_by_slug(slug)?
        .ok_or_else(|| ServerError::BadRequest(format!("workspace '{}' does not exist", slug)))?;
    if !caller.shares_role_with(&workspace.roles) {
        return Err(ServerError::Forbidden(format!("no access to workspace '{}'", slug)));
    }
    Ok(workspace)
}

async fn open_bot_stream(state: &AppState, conversation_id: &str) -> Result<FragmentStream, ServerError> {
    let history = state.database.messages.history(conversation_id)?;
    let messages = history_to_chat(&system_prompt(state), &history);
    debug!("Replaying {} messages of conversation {}", history.len(), conversation_id);

    state.completion.stream_chat(messages).await.map_err(|e| {
        error!("Failed to open completion stream for {}: {}", conversation_id, e);
        metrics::inc_failed_turns();
        ServerError::Upstream(format!("completion provider unavailable: {}", e))
    })
}

/// Persist the caller's message and open the bot reply stream
pub async fn start_human_turn(
    state: &AppState,
    caller: &Caller,
    turn: HumanTurn,
) -> Result<impl Stream<Item = RelayEvent> + Send + 'static, ServerError> {
    let conversation = load_conversation(state, &turn.conversation_id)?;
    if let Some(requested) = turn.workspace_slug.as_deref() {
        if requested != conversation.workspace_slug {
            return Err(ServerError::BadRequest(format!(
                "conversation {} belongs to workspace '{}', not '{}'",
                conversation.id, conversation.workspace_slug, requested
            )));
        }
    }
    let slug = authorize_workspace(state, caller, &conversation.workspace_slug)?.slug;

    let human = state.database.messages.append(NewMessage {
        conversation_id: &conversation.id,
        user_id: &caller.user_id,
        workspace_slug: &slug,
        sender: Sender::Human,
        kind: turn.kind,
        content: &turn.content,
        file_urls: &turn.file_urls,
        suggest_ticket: false,
    })?;
    info!("Stored human message {} in conversation {}", human.id, conversation.id);

    let fragments = open_bot_stream(state, &conversation.id).await?;
    let bot_turn = BotTurn { conversation_id: conversation.id, user_id: caller.user_id.clone(), workspace_slug: slug };

    let head = futures::stream::once(async move { RelayEvent::HumanSaved { message_id: human.id } });
    Ok(head.chain(relay_fragments(state.clone(), bot_turn, fragments)))
}

/// Produce a fresh bot reply for the existing history, attributed to the conversation's creator
pub async fn start_regeneration(
    state: &AppState,
    caller: &Caller,
    conversation_id: &str,
) -> Result<impl Stream<Item = RelayEvent> + Send + 'static, ServerError> {
    let conversation = load_conversation(state, conversation_id)?;
    authorize_workspace(state, caller, &conversation.workspace_slug)?;

    let fragments = open_bot_stream(state, &conversation.id).await?;
    let bot_turn = BotTurn {
        conversation_id: conversation.id,
        user_id: conversation.created_by,
        workspace_slug: conversation.workspace_slug,
    };
    Ok(relay_fragments(state.clone(), bot_turn, fragments))
}

/// Forward fragments as they arrive, then classify and store the full reply.
///
/// Nothing is stored when the provider fails mid-stream or when the consumer
/// drops the stream before it ends. An empty reply is still stored.
pub fn relay_fragments(
    state: AppState,
    turn: BotTurn,
    mut fragments: FragmentStream,
) -> impl Stream<Item = RelayEvent> + Send + 'static {
    async_stream::stream! {
        let _active = ActiveStreamGuard::new();
        let mut reply = String::new();
        let mut upstream_error = None;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) if fragment.is_empty() => {}
                Ok(fragment) => {
                    metrics::inc_fragments();
                    reply.push_str(&fragment);
                    yield RelayEvent::Fragment(fragment);
                }
                Err(e) => {
                    upstream_error = Some(e);
                    break;
                }
            }
        }

        match upstream_error {
            Some(e) => {
                error!("Completion stream for {} failed after {} chars: {}", turn.conversation_id, reply.len(), e);
                metrics::inc_failed_turns();
                yield RelayEvent::Failed(format!("completion stream failed: {}", e));
            }
            None => {
                if reply.is_empty() {
                    warn!("Empty completion for conversation {}, storing empty bot message", turn.conversation_id);
                }
                let suggest_ticket = state.ticket_classifier.suggests_ticket(&reply);
                let stored = state.database.messages.append(NewMessage {
                    conversation_id: &turn.conversation_id,
                    user_id: &turn.user_id,
                    workspace_slug: &turn.workspace_slug,
                    sender: Sender::Bot,
                    kind: MessageKind::Text,
                    content: &reply,
                    file_urls: &[],
                    suggest_ticket,
                });
                match stored {
                    Ok(message) => {
                        metrics::inc_bot_turns();
                        if suggest_ticket {
                            metrics::inc_ticket_suggestions();
                        }
                        info!("Stored bot message {} ({} chars, ticket: {})", message.id, reply.len(), suggest_ticket);
                        yield RelayEvent::Completed { message_id: message.id, suggest_ticket };
                    }
                    Err(e) => {
                        error!("Failed to persist bot message for {}: {}", turn.conversation_id, e);
                        metrics::inc_failed_turns();
                        yield RelayEvent::Failed("failed to save bot response".to_string());
                    }
                }
            }
        }

        yield RelayEvent::Done;
    }
}
