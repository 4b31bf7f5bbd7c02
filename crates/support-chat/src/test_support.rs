//! Scripted completion provider and state builders for in-crate tests
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};

use crate::caller::{Caller, USER_ID_HEADER, USER_ROLES_HEADER};
use crate::chat_db::ChatDatabase;
use crate::config::create_test_config;
use crate::llm::{ChatMessage, CompletionProvider, FragmentStream};
use crate::shared_state::AppState;

#[derive(Debug, Clone)]
pub enum ProviderScript {
    Fragments(Vec<String>),
    FailToOpen(String),
    FailAfter(Vec<String>, String),
}

pub struct ScriptedProvider {
    script: ProviderScript,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(script: ProviderScript) -> Self {
        Self { script, requests: Mutex::new(Vec::new()) }
    }

    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn record(&self, messages: Vec<ChatMessage>) {
        self.requests.lock().unwrap().push(messages);
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> anyhow::Result<FragmentStream> {
        self.record(messages);
        let items: Vec<anyhow::Result<String>> = match &self.script {
            ProviderScript::FailToOpen(reason) => return Err(anyhow::anyhow!("{}", reason)),
            ProviderScript::Fragments(fragments) => fragments.iter().cloned().map(Ok).collect(),
            ProviderScript::FailAfter(fragments, reason) => fragments
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(anyhow::anyhow!("{}", reason))))
                .collect(),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        self.record(messages);
        match &self.script {
            ProviderScript::Fragments(fragments) => Ok(fragments.concat()),
            ProviderScript::FailToOpen(reason) | ProviderScript::FailAfter(_, reason) => {
                Err(anyhow::anyhow!("{}", reason))
            }
        }
    }

    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        match &self.script {
            ProviderScript::FailToOpen(reason) => Err(anyhow::anyhow!("{}", reason)),
            _ => Ok(vec!["scripted-model".to_string()]),
        }
    }
}

pub fn test_state(script: ProviderScript) -> (AppState, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(script));
    let database = Arc::new(ChatDatabase::new_in_memory().unwrap());
    let state = AppState::with_provider(create_test_config(), database, provider.clone()).unwrap();
    (state, provider)
}

pub fn caller(user_id: &str, roles: &[&str]) -> Caller {
    Caller { user_id: user_id.to_string(), email: None, roles: roles.iter().map(|r| r.to_string()).collect() }
}

pub fn identity_headers(user_id: &str, roles: &[&str]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_ID_HEADER, HeaderValue::from_str(user_id).unwrap());
    headers.insert(USER_ROLES_HEADER, HeaderValue::from_str(&roles.join(",")).unwrap());
    headers
}

/// Build a request, optionally carrying a caller identity and a JSON body
pub fn request(
    method: &str,
    uri: &str,
    identity: Option<(&str, &[&str])>,
    body: Option<serde_json::Value>,
) -> axum::http::Request<axum::body::Body> {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some((user_id, roles)) = identity {
        for (name, value) in identity_headers(user_id, roles).iter() {
            builder = builder.header(name, value);
        }
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    }
}

/// Route one request through the full router; non-JSON bodies come back as a JSON string
pub async fn call(
    state: &AppState,
    request: axum::http::Request<axum::body::Body>,
) -> (axum::http::StatusCode, serde_json::Value) {
    use tower::ServiceExt;

    let response = crate::server::build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}
