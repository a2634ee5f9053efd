use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Everything that can go wrong while serving a stats request.
///
/// The variants split into two groups:
/// - caller mistakes (`Configuration`, `InvalidParameter`) are echoed back
///   as a 400 with the message, so the caller can fix the request;
/// - provider faults (`Upstream`, `Normalization`) are logged server-side
///   and surfaced as a generic 500. Their detail may contain provider
///   response bodies and must never reach the caller.
///
/// The type is `Clone` because a single failed fetch is handed to every
/// waiter coalesced onto it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// The competition has no upstream league id and the caller supplied none.
    #[error("{0}")]
    Configuration(String),

    /// A query override is present but malformed.
    #[error("invalid value for '{name}': {value:?}")]
    InvalidParameter { name: &'static str, value: String },

    /// Non-success status, provider-reported error, transport failure or timeout.
    #[error("upstream error (status {status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },

    /// The provider payload lacks a field the row shape requires.
    #[error("normalization error: {0}")]
    Normalization(String),
}

impl ProxyError {
    pub fn upstream(status: Option<u16>, body: impl Into<String>) -> Self {
        ProxyError::Upstream {
            status,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Configuration(_) | ProxyError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::Upstream { .. } | ProxyError::Normalization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::Configuration(_) | ProxyError::InvalidParameter { .. } => self.to_string(),
            ProxyError::Upstream { .. } | ProxyError::Normalization(_) => {
                "Failed to fetch data".to_string()
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status_code(), Json(body)).into_response()
    }
}
