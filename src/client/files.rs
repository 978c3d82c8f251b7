//! File ingest: read each attached file into its in-memory wire
//! representation without blocking the interface.
//!
//! Files are processed independently and appended to the pending list
//! as each one completes; completion order is not guaranteed to match
//! selection order. There is no cancellation of a read once started,
//! only discarding its result before send.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::core::message::{AttachmentPayload, AttachmentRef, MimeClass};

/// Declared media type inferred from the file extension; the classifier
/// only distinguishes the classes the pipeline cares about.
pub fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        Some("md") | Some("markdown") => "text/markdown",
        _ => "application/octet-stream",
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Read one file into an attachment. Never fails: unreadable or
/// unsupported content degrades to a named placeholder so the turn can
/// still mention the file.
pub async fn ingest_file(path: PathBuf) -> AttachmentRef {
    let name = display_name(&path);
    let media_type = media_type_for(&path);

    match MimeClass::from_media_type(media_type) {
        MimeClass::Image => match tokio::fs::read(&path).await {
            Ok(bytes) => AttachmentRef {
                name,
                mime_class: MimeClass::Image,
                payload: AttachmentPayload::Encoded(format!(
                    "data:{};base64,{}",
                    media_type,
                    BASE64.encode(bytes)
                )),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read image");
                AttachmentRef {
                    name,
                    mime_class: MimeClass::Image,
                    payload: AttachmentPayload::Absent,
                }
            }
        },
        MimeClass::Text => match tokio::fs::read_to_string(&path).await {
            Ok(text) => AttachmentRef {
                name,
                mime_class: MimeClass::Text,
                payload: AttachmentPayload::Text(text),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read text file");
                AttachmentRef {
                    name,
                    mime_class: MimeClass::Text,
                    payload: AttachmentPayload::Absent,
                }
            }
        },
        MimeClass::Other => AttachmentRef {
            name,
            mime_class: MimeClass::Other,
            payload: AttachmentPayload::Absent,
        },
    }
}

/// Read each file on its own task, delivering results as they finish.
pub fn spawn_ingest(paths: Vec<PathBuf>, tx: mpsc::UnboundedSender<AttachmentRef>) {
    for path in paths {
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(ingest_file(path).await);
        });
    }
}
