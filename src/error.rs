// Error taxonomy for calls against the todo backend

use http::StatusCode;
use serde::Deserialize;

/// Result alias for backend-facing operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the session manager and the remote stores
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a non-2xx status
    #[error("{}", .detail.as_deref().unwrap_or("Request failed"))]
    Status { status: StatusCode, detail: Option<String> },

    /// The request never produced a response
    #[error("Network error: {0}")]
    Transport(String),

    /// A 2xx body did not match the expected shape
    #[error("Invalid response from server: {0}")]
    Decode(String),

    /// An authenticated call was attempted without an access token
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A 401 survived refresh-and-retry; the session has been logged out
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Client-side precondition failed; nothing was sent
    #[error("{0}")]
    Precondition(String),
}

/// Optional `{detail: string}` payload returned by the backend
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    detail: Option<serde_json::Value>,
}

impl ApiError {
    /// Build a status error, pulling `detail` out of the body when it is there
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let detail = serde_json::from_slice::<ErrorPayload>(body)
            .ok()
            .and_then(|payload| payload.detail)
            .and_then(|detail| match detail {
                serde_json::Value::String(s) => Some(s),
                // FastAPI validation errors carry a list of objects
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            });
        ApiError::Status { status, detail }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for replies that should go through the refresh policy
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Backend detail message, if one was sent
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Human-readable message for `last_error`, falling back to `fallback`
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            ApiError::Status { detail: Some(detail), .. } => detail.clone(),
            ApiError::Precondition(_) | ApiError::SessionExpired | ApiError::NotAuthenticated => self.to_string(),
            _ => fallback.to_string(),
        }
    }
}
