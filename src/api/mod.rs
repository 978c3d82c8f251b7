use serde::{Deserialize, Serialize};

use crate::core::message::MimeClass;

/// One dialogue message as it travels between client, relay, and provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Request body for `POST /api/chat`. The new user turn is the last
/// entry of `messages`; `files` carries that turn's attachments only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FilePayload>,
}

/// Attachment as transmitted to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    #[serde(rename = "mimeClass")]
    pub mime_class: MimeClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Buffered success body from the relay.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
}

/// Error body from the relay; always paired with a non-2xx status.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

#[derive(Serialize)]
pub struct ProviderChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Deserialize)]
pub struct ProviderResponse {
    pub choices: Vec<ProviderChoice>,
}

#[derive(Deserialize)]
pub struct ProviderChoice {
    pub message: ProviderMessage,
}

#[derive(Deserialize)]
pub struct ProviderMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ProviderStreamResponse {
    pub choices: Vec<ProviderStreamChoice>,
}

#[derive(Deserialize)]
pub struct ProviderStreamChoice {
    pub delta: ProviderStreamDelta,
}

#[derive(Deserialize)]
pub struct ProviderStreamDelta {
    pub content: Option<String>,
}

pub mod provider;
