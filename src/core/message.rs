use serde::{Deserialize, Serialize};

use crate::api::FilePayload;

/// Display label used for a user turn that carries attachments but no text.
pub const ATTACHMENT_ONLY_LABEL: &str = "[附件已提交]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One committed turn in the conversation transcript. Immutable once
/// appended; attachments are not retained here because they are sent to
/// the relay exactly once, with the triggering turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Coarse attachment classification derived from the declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeClass {
    Image,
    Text,
    Other,
}

impl MimeClass {
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.starts_with("image/") {
            MimeClass::Image
        } else if media_type == "text/plain" || media_type == "text/markdown" {
            MimeClass::Text
        } else {
            MimeClass::Other
        }
    }
}

/// In-memory representation of an attached file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentPayload {
    /// Base64 data URI carrying the full file bytes (images).
    Encoded(String),
    /// UTF-8 text read verbatim (plain text and markdown).
    Text(String),
    /// Content was not extracted (unsupported types, unreadable files).
    Absent,
}

/// A file staged for the next outgoing turn. Created when the file is
/// selected, discarded once the turn is sent.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub name: String,
    pub mime_class: MimeClass,
    pub payload: AttachmentPayload,
}

impl AttachmentRef {
    pub fn into_wire(self) -> FilePayload {
        let payload = match self.payload {
            AttachmentPayload::Encoded(data) => Some(data),
            AttachmentPayload::Text(text) => Some(text),
            AttachmentPayload::Absent => None,
        };
        FilePayload {
            name: self.name,
            mime_class: self.mime_class,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_types_map_to_mime_classes() {
        assert_eq!(MimeClass::from_media_type("image/png"), MimeClass::Image);
        assert_eq!(MimeClass::from_media_type("image/jpeg"), MimeClass::Image);
        assert_eq!(MimeClass::from_media_type("text/plain"), MimeClass::Text);
        assert_eq!(MimeClass::from_media_type("text/markdown"), MimeClass::Text);
        assert_eq!(
            MimeClass::from_media_type("application/pdf"),
            MimeClass::Other
        );
        assert_eq!(MimeClass::from_media_type("text/html"), MimeClass::Other);
    }

    #[test]
    fn absent_payload_is_omitted_on_the_wire() {
        let wire = AttachmentRef {
            name: "report.pdf".to_string(),
            mime_class: MimeClass::Other,
            payload: AttachmentPayload::Absent,
        }
        .into_wire();
        assert!(wire.payload.is_none());

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["mimeClass"], "other");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn text_payload_travels_verbatim() {
        let wire = AttachmentRef {
            name: "notes.txt".to_string(),
            mime_class: MimeClass::Text,
            payload: AttachmentPayload::Text("跟进记录".to_string()),
        }
        .into_wire();
        assert_eq!(wire.payload.as_deref(), Some("跟进记录"));
    }
}
