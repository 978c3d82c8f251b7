use crate::api::{ChatRequest, WireMessage};
use crate::core::message::{AttachmentRef, Message, Role, ATTACHMENT_ONLY_LABEL};

/// The payload handed to the dispatcher when a turn is accepted.
#[derive(Debug)]
pub struct OutboundTurn {
    pub request: ChatRequest,
}

/// Session-local conversation state: the ordered transcript plus the
/// single-turn in-flight guard. History insertion order is significant
/// because it is replayed to the provider as dialogue context.
#[derive(Default)]
pub struct Conversation {
    messages: Vec<Message>,
    in_flight: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Aggregate one logical user turn. Returns `None` (a silent no-op)
    /// when there is nothing to send or a prior turn is still in flight;
    /// a rejected submit leaves the staged attachments untouched so the
    /// caller can keep them alongside the restored draft.
    ///
    /// On acceptance the attachments are drained into the request and
    /// the user turn is appended optimistically, before the network
    /// call resolves. A turn with attachments but no text uses the
    /// placeholder label both in the transcript and on the wire, so the
    /// relay still sees a non-empty user message.
    pub fn submit_turn(
        &mut self,
        text: &str,
        attachments: &mut Vec<AttachmentRef>,
    ) -> Option<OutboundTurn> {
        let trimmed = text.trim();
        if trimmed.is_empty() && attachments.is_empty() {
            return None;
        }
        if self.in_flight {
            return None;
        }

        let content = if trimmed.is_empty() {
            ATTACHMENT_ONLY_LABEL.to_string()
        } else {
            trimmed.to_string()
        };

        let mut messages: Vec<WireMessage> = self
            .messages
            .iter()
            .map(|m| WireMessage::new(m.role.as_str(), m.content.clone()))
            .collect();
        messages.push(WireMessage::new(Role::User.as_str(), content.clone()));

        self.messages.push(Message::user(content));
        self.in_flight = true;

        Some(OutboundTurn {
            request: ChatRequest {
                messages,
                files: attachments.drain(..).map(|a| a.into_wire()).collect(),
            },
        })
    }

    /// Commit the completed assistant reply and clear the guard.
    pub fn commit_assistant(&mut self, content: String) {
        self.messages.push(Message::assistant(content));
        self.in_flight = false;
    }

    /// Abandon the in-flight turn after a failure. The optimistic user
    /// turn stays in the transcript; no assistant turn is added.
    pub fn abort_turn(&mut self) {
        self.in_flight = false;
    }

    pub fn clear(&mut self) {
        if !self.in_flight {
            self.messages.clear();
        }
    }
}
