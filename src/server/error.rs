//! Request-boundary error mapping.
//!
//! Every server-side failure is caught here and flattened into the
//! uniform `{ "error": … }` body the client surfaces verbatim.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::provider::ProviderError;
use crate::api::ErrorReply;
use crate::server::prompt::PromptError;

#[derive(Debug)]
pub enum ApiError {
    /// 400 - the request itself is unusable (e.g. empty user message).
    BadRequest(String),
    /// 500 - deployment misconfiguration (missing credential).
    Config(String),
    /// 502 - the provider call failed.
    Upstream(String),
    /// 502 - the provider answered with no usable text.
    EmptyReply,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::EmptyReply => (
                StatusCode::BAD_GATEWAY,
                ProviderError::EmptyReply.to_string(),
            ),
        };
        (status, Json(ErrorReply { error })).into_response()
    }
}

impl From<PromptError> for ApiError {
    fn from(err: PromptError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingCredential => ApiError::Config(err.to_string()),
            ProviderError::EmptyReply => ApiError::EmptyReply,
            ProviderError::Transport(_) | ProviderError::Api { .. } => {
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn errors_flatten_to_the_uniform_body() {
        let resp = ApiError::Config("API Key 未配置".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let reply: ErrorReply = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply.error, "API Key 未配置");
    }

    #[test]
    fn provider_errors_map_to_their_status_classes() {
        assert!(matches!(
            ApiError::from(ProviderError::MissingCredential),
            ApiError::Config(_)
        ));
        assert!(matches!(
            ApiError::from(ProviderError::EmptyReply),
            ApiError::EmptyReply
        ));
        assert!(matches!(
            ApiError::from(ProviderError::Transport("refused".to_string())),
            ApiError::Upstream(_)
        ));
    }
}
