//! The `/api/chat` handler: prompt assembly, provider invocation, and
//! the reply relay for both deployment modes.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;

use crate::api::provider::ProviderReply;
use crate::api::{ChatReply, ChatRequest};
use crate::server::error::ApiError;
use crate::server::prompt::{PromptContext, PromptError};
use crate::server::state::AppState;

/// POST /api/chat
///
/// The new user turn is the last entry of `messages`; everything before
/// it is replayed history. Buffered deployments answer with one JSON
/// payload; incremental deployments answer with a chunked `text/plain`
/// body whose concatenated bytes equal the final reply.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let Some((current, history)) = request.messages.split_last() else {
        return Err(PromptError::EmptyUserMessage.into());
    };

    let prompt = PromptContext {
        persona_template: &state.persona_template,
        knowledge: &state.knowledge,
        files: &request.files,
        history,
        user_message: &current.content,
    }
    .assemble()?;

    tracing::debug!(
        history_len = history.len(),
        files = request.files.len(),
        prompt_bytes = prompt.len(),
        "dispatching turn to provider"
    );

    match state.provider.invoke(&prompt, state.mode).await? {
        ProviderReply::Buffered(content) => Ok(Json(ChatReply { content }).into_response()),
        ProviderReply::Incremental(fragments) => {
            // Fragments pass through one at a time; hyper flushes each
            // chunk as it is produced. When the provider stream ends
            // (normally or after an upstream error) the body closes
            // cleanly and whatever was relayed stands as the reply.
            let stream = fragments.map(|fragment| Ok::<Bytes, Infallible>(Bytes::from(fragment)));
            Response::builder()
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Body::from_stream(stream))
                .map_err(|e| ApiError::Upstream(e.to_string()))
        }
    }
}
