use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::api::{ProviderChatRequest, ProviderResponse, ProviderStreamResponse, WireMessage};

/// How the provider is invoked and the reply delivered. Fixed per
/// deployment, not negotiated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Buffered,
    Incremental,
}

/// A lazy, finite, non-restartable sequence of reply fragments.
pub type FragmentStream = BoxStream<'static, String>;

/// Both provider call shapes normalized into one variant, so the relay
/// has a single consumption path.
pub enum ProviderReply {
    Buffered(String),
    Incremental(FragmentStream),
}

#[derive(Debug)]
pub enum ProviderError {
    /// The bearer credential is not configured. Fatal, never retried.
    MissingCredential,
    /// Network-level failure reaching the provider.
    Transport(String),
    /// The provider answered with a non-success status.
    Api { status: u16, body: String },
    /// The provider responded but produced no usable text. Kept
    /// distinct from transport failures so the user can simply retry.
    EmptyReply,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingCredential => write!(f, "API Key 未配置"),
            ProviderError::Transport(e) => write!(f, "API 调用失败: {e}"),
            ProviderError::Api { status, body } => {
                write!(f, "API 调用失败 (status {status}): {body}")
            }
            ProviderError::EmptyReply => write!(f, "API 返回为空"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// One instruction payload in, one normalized reply out. Implementors
/// own authentication and request shaping for their backend.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn invoke(&self, prompt: &str, mode: ReplyMode) -> Result<ProviderReply, ProviderError>;
}

/// Provider backed by an OpenAI-style `chat/completions` endpoint.
/// The bearer credential is read from the environment on every call,
/// so a key set or rotated after startup takes effect without a
/// restart.
pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key_env: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key_env: api_key_env.into(),
            temperature,
            max_tokens,
        }
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    fn request_body(&self, prompt: &str, stream: bool) -> ProviderChatRequest {
        ProviderChatRequest {
            model: self.model.clone(),
            messages: vec![WireMessage::new("user", prompt)],
            stream,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn send(
        &self,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.api_key().ok_or(ProviderError::MissingCredential)?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ProviderError::Api { status, body });
        }
        Ok(response)
    }

    async fn invoke_buffered(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self.send(prompt, false).await?;
        let envelope = response
            .json::<ProviderResponse>()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        // First candidate's first content part.
        let text = envelope
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyReply);
        }
        Ok(text)
    }

    async fn invoke_incremental(&self, prompt: &str) -> Result<FragmentStream, ProviderError> {
        let response = self.send(prompt, true).await?;
        let (tx, rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // Partial output already relayed stands as the
                        // final answer; just stop emitting.
                        tracing::warn!(error = %e, "provider stream failed mid-reply");
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                        Ok(s) => s.trim().to_string(),
                        Err(e) => {
                            tracing::warn!(error = %e, "invalid UTF-8 in provider stream");
                            buffer.drain(..=newline_pos);
                            continue;
                        }
                    };
                    buffer.drain(..=newline_pos);

                    match parse_sse_line(&line) {
                        SseEvent::Fragment(text) => {
                            if tx.send(text).is_err() {
                                return;
                            }
                        }
                        SseEvent::Done => return,
                        SseEvent::Skip => {}
                        SseEvent::Error(detail) => {
                            tracing::warn!(%detail, "provider reported a stream error");
                            return;
                        }
                    }
                }
            }
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[async_trait]
impl Provider for ChatCompletionsProvider {
    async fn invoke(&self, prompt: &str, mode: ReplyMode) -> Result<ProviderReply, ProviderError> {
        match mode {
            ReplyMode::Buffered => self.invoke_buffered(prompt).await.map(ProviderReply::Buffered),
            ReplyMode::Incremental => self
                .invoke_incremental(prompt)
                .await
                .map(ProviderReply::Incremental),
        }
    }
}

enum SseEvent {
    Fragment(String),
    Done,
    Skip,
    Error(String),
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return SseEvent::Skip;
    };
    if payload == "[DONE]" {
        return SseEvent::Done;
    }
    if payload.is_empty() {
        return SseEvent::Skip;
    }
    match serde_json::from_str::<ProviderStreamResponse>(payload) {
        Ok(response) => match response
            .choices
            .first()
            .and_then(|c| c.delta.content.clone())
        {
            Some(content) if !content.is_empty() => SseEvent::Fragment(content),
            _ => SseEvent::Skip,
        },
        Err(_) => SseEvent::Error(payload.to_string()),
    }
}
