use std::fmt;

use crate::api::{FilePayload, WireMessage};
use crate::core::message::MimeClass;
use crate::core::persona::{FILES_MARKER, HISTORY_MARKER, KNOWLEDGE_MARKER, MESSAGE_MARKER};

pub const FILE_SECTION_HEADER: &str = "## 用户上传的参考资料";
pub const IMAGE_MARKER: &str = "[图片上传]";
pub const HISTORY_SECTION_HEADER: &str = "## 对话历史";

#[derive(Debug, PartialEq, Eq)]
pub enum PromptError {
    /// The user message is missing after trimming. Rejected fast rather
    /// than silently truncated; the off-topic business rule stays with
    /// the model itself.
    EmptyUserMessage,
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyUserMessage => write!(f, "问题不能为空"),
        }
    }
}

impl std::error::Error for PromptError {}

/// Everything one turn's instruction payload is assembled from.
/// Rebuilt per request; persona and knowledge are read-only
/// configuration injected by the caller.
pub struct PromptContext<'a> {
    pub persona_template: &'a str,
    pub knowledge: &'a str,
    pub files: &'a [FilePayload],
    pub history: &'a [WireMessage],
    pub user_message: &'a str,
}

impl PromptContext<'_> {
    /// Deterministic merge of the persona template, knowledge excerpt,
    /// per-turn file context, replayed history, and the user message.
    pub fn assemble(&self) -> Result<String, PromptError> {
        let message = self.user_message.trim();
        if message.is_empty() {
            return Err(PromptError::EmptyUserMessage);
        }

        Ok(self
            .persona_template
            .replace(KNOWLEDGE_MARKER, self.knowledge.trim())
            .replace(FILES_MARKER, &render_file_context(self.files))
            .replace(HISTORY_MARKER, &render_history(self.history))
            .replace(MESSAGE_MARKER, message))
    }
}

fn render_file_context(files: &[FilePayload]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let mut out = format!("{FILE_SECTION_HEADER}\n");
    for file in files {
        match (file.mime_class, file.payload.as_deref()) {
            // Image bytes are never inlined into the instruction text.
            (MimeClass::Image, _) => {
                out.push_str(&format!("\n{IMAGE_MARKER}\n"));
            }
            (_, Some(content)) => {
                out.push_str(&format!("\n【{}】\n{}\n", file.name, content));
            }
            (_, None) => {
                out.push_str(&format!("\n【{}】（未提取内容）\n", file.name));
            }
        }
    }
    out
}

fn render_history(history: &[WireMessage]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for message in history {
        match message.role.as_str() {
            "user" => lines.push(format!("用户：{}", message.content)),
            "assistant" => lines.push(format!("顾问：{}", message.content)),
            _ => {}
        }
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("{HISTORY_SECTION_HEADER}\n{}", lines.join("\n"))
}
