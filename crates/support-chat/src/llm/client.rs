//! OpenAI-compatible completion client.
//!
//! Streams `POST {base}/chat/completions` as server-sent events and yields the
//! content deltas; `GET {base}/models` doubles as the connection test.
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::chat_format::ChatMessage;

/// Text fragments of one streamed completion, in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streamed completion. Errors here mean the stream never started.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> anyhow::Result<FragmentStream>;

    async fn complete(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String>;

    async fn list_models(&self) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ChatDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// One decoded line of the provider's event stream
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Content(String),
    Done,
    Skip,
}

/// Decode a single SSE line. Comments, blank lines, malformed JSON and
/// chunks without content are all skipped.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|content| !content.is_empty())
            .map(SseLine::Content)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            debug!("Skipping unparseable stream chunk: {}", e);
            SseLine::Skip
        }
    }
}

/// Splits a byte stream into text lines.
///
/// Bytes are buffered until a newline arrives, so a line or a multi-byte
/// character split across chunks is decoded whole.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Append a chunk and return every line it completed, without the newline
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            lines.push(String::from_utf8_lossy(&line[..newline_pos]).trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever trails the last newline
    pub fn finish(self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

pub struct OpenAiCompatibleClient {
    settings: ProviderSettings,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(settings: ProviderSettings) -> anyhow::Result<Self> {
        if settings.api_key.is_none() {
            warn!("No provider API key configured, requests are sent without authorization");
        }
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        info!("Completion client initialized for {} (model {})", settings.base_url, settings.model);
        Ok(Self { settings, http_client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.settings.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post_completion(&self, messages: &[ChatMessage], stream: bool) -> anyhow::Result<reqwest::Response> {
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream,
        };
        let response = self
            .authorize(self.http_client.post(self.completions_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Completion request failed: {}", e))?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow::anyhow!("Completion provider returned {}: {}", status, body))
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleClient {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> anyhow::Result<FragmentStream> {
        debug!("Opening completion stream with {} messages", messages.len());
        let response = self.post_completion(&messages, true).await?;
        let byte_stream = response.bytes_stream();

        let fragments = async_stream::try_stream! {
            let mut lines = LineDecoder::default();
            futures_util::pin_mut!(byte_stream);
            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result
                    .map_err(|e| anyhow::anyhow!("Stream read error: {}", e))?;
                for line in lines.push(&chunk) {
                    match parse_sse_line(&line) {
                        SseLine::Content(content) => yield content,
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }
            if let SseLine::Content(content) = parse_sse_line(&lines.finish()) {
                yield content;
            }
        };
        Ok(Box::pin(fragments))
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        let response = self.post_completion(&messages, false).await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse completion response: {}", e))?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }

    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        let response = self
            .authorize(self.http_client.get(self.models_url()))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Model listing request failed: {}", e))?;
        let models: ModelList = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse model list: {}", e))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn client_for(server: &mockito::Server, api_key: Option<&str>) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(ProviderSettings {
            base_url: server.url(),
            api_key: api_key.map(str::to_string),
            model: "gpt-4o-mini".into(),
            max_tokens: 200,
            temperature: 0.7,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hola"}}]}"#),
            SseLine::Content("Hola".into())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#), SseLine::Skip);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: not json"), SseLine::Skip);
    }

    #[test]
    fn test_line_decoder_joins_lines_split_across_chunks() {
        let mut lines = LineDecoder::default();
        assert!(lines.push(b"data: {\"choices\":[{\"delta\":").is_empty());
        assert_eq!(
            lines.push(b"{\"content\":\"Hola\"}}]}\r\n\ndata: [DO"),
            vec![r#"data: {"choices":[{"delta":{"content":"Hola"}}]}"#.to_string(), String::new()]
        );
        assert_eq!(lines.push(b"NE]\n"), vec!["data: [DONE]".to_string()]);
        assert_eq!(lines.finish(), "");
    }

    #[test]
    fn test_line_decoder_keeps_multibyte_characters_split_mid_sequence() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"año ✓\"}}]}\n".as_bytes();
        // split inside the two-byte 'ñ' and inside the three-byte '✓'
        let n = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let check = line.iter().position(|b| *b == 0xE2).unwrap() + 2;

        let mut lines = LineDecoder::default();
        assert!(lines.push(&line[..n]).is_empty());
        assert!(lines.push(&line[n..check]).is_empty());
        let decoded = lines.push(&line[check..]);

        assert_eq!(decoded.len(), 1);
        assert_eq!(parse_sse_line(&decoded[0]), SseLine::Content("año ✓".into()));
    }

    #[test]
    fn test_line_decoder_returns_unterminated_tail() {
        let mut lines = LineDecoder::default();
        assert!(lines.push(b"data: [DONE]").is_empty());
        assert_eq!(lines.finish(), "data: [DONE]");
    }

    #[tokio::test]
    async fn test_stream_chat_yields_deltas_until_done() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hola\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\", crea un ticket\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"stream": true, "model": "gpt-4o-mini"})))
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(&server, Some("sk-test"));
        let stream = client.stream_chat(vec![ChatMessage::user("hola")]).await.unwrap();
        let fragments: Vec<String> = stream.try_collect().await.unwrap();

        assert_eq!(fragments, vec!["Hola".to_string(), ", crea un ticket".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stream_chat_rejects_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = match client.stream_chat(vec![ChatMessage::user("hola")]).await {
            Ok(_) => panic!("stream should not open"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_complete_and_list_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"stream": false})))
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Listo"}}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/models")
            .with_body(r#"{"data":[{"id":"gpt-4o-mini"},{"id":"gpt-4o"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert_eq!(client.complete(vec![ChatMessage::user("hola")]).await.unwrap(), "Listo");
        assert_eq!(client.list_models().await.unwrap(), vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_with_no_choices_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/chat/completions").with_body(r#"{"choices":[]}"#).create_async().await;

        let client = client_for(&server, None);
        assert_eq!(client.complete(vec![ChatMessage::user("hola")]).await.unwrap(), "");
    }
}
