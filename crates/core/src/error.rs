//! Client error model.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::ErrorBody;

/// Result type used across the client layers.
pub type ClientResult<T> = Result<T, ClientError>;

/// A client-side shape check that failed before anything was sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Coarse classification of an [`ApiError`], derived from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Server,
    Other,
}

/// Error reported by the backend (non-success envelope or non-2xx status).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code} ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Build from a status and whatever error body the server sent.
    ///
    /// Missing codes are synthesised as `HTTP_<status>`.
    pub fn from_status(status: u16, body: Option<ErrorBody>, fallback_message: Option<String>) -> Self {
        match body {
            Some(body) => Self {
                status,
                code: body.code.filter(|c| !c.is_empty()).unwrap_or_else(|| synthesized_code(status)),
                message: body
                    .message
                    .filter(|m| !m.is_empty())
                    .or(fallback_message)
                    .unwrap_or_else(|| default_message(status).to_string()),
                details: body.details,
            },
            None => Self {
                status,
                code: synthesized_code(status),
                message: fallback_message.unwrap_or_else(|| default_message(status).to_string()),
                details: None,
            },
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self.status {
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            400 | 422 => ApiErrorKind::Validation,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }
}

fn synthesized_code(status: u16) -> String {
    format!("HTTP_{status}")
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 => "authentication required",
        403 => "access denied",
        404 => "not found",
        409 => "conflict",
        422 => "validation failed",
        500..=599 => "server error",
        _ => "request failed",
    }
}

/// Violation of the optimistic list contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptimisticError {
    /// Another optimistic change on the same list has not settled yet.
    #[error("an optimistic mutation is already pending on this list")]
    MutationPending,

    /// The ticket belongs to a mutation that was superseded by a reload.
    #[error("mutation ticket is stale")]
    StaleTicket,

    #[error("no entry with key {0}")]
    UnknownEntry(String),
}

/// Every failure the client layers can report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Client-side abort after the configured request timeout.
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Transport-level failure; the request never produced a status.
    #[error("network error: {0}")]
    Network(String),

    /// The envelope reported success but carried no `data`.
    #[error("response envelope is missing data")]
    MissingData,

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Client-side permission re-check failed; nothing was sent.
    #[error("forbidden: missing permission '{missing}'")]
    Forbidden { missing: String },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Optimistic(#[from] OptimisticError),
}

impl ClientError {
    /// HTTP status of the failure; `0` for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api(e) => Some(e.status),
            ClientError::Network(_) | ClientError::Timeout { .. } => Some(0),
            _ => None,
        }
    }

    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            ClientError::Api(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.api_kind(), Some(ApiErrorKind::Unauthorized)) || matches!(self, ClientError::NotAuthenticated)
    }

    /// Failures worth retrying for idempotent reads.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout { .. })
    }

    /// Text suitable for a toast/notification.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(e) => e.message.clone(),
            ClientError::Api(e) => match e.kind() {
                ApiErrorKind::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
                ApiErrorKind::Forbidden => "You do not have permission to do that.".to_string(),
                ApiErrorKind::NotFound => "The requested record no longer exists.".to_string(),
                ApiErrorKind::Conflict => format!("Conflict: {}", e.message),
                ApiErrorKind::Validation => e.message.clone(),
                ApiErrorKind::Server => "The server ran into a problem. Please try again.".to_string(),
                ApiErrorKind::Other => e.message.clone(),
            },
            ClientError::Timeout { .. } => "The server took too long to respond.".to_string(),
            ClientError::Network(_) => "Could not reach the server. Check your connection.".to_string(),
            ClientError::MissingData | ClientError::Decode(_) => {
                "The server sent an unexpected response.".to_string()
            }
            ClientError::Forbidden { .. } => "You do not have permission to do that.".to_string(),
            ClientError::NotAuthenticated => "Please sign in to continue.".to_string(),
            ClientError::Optimistic(_) => "Please wait for the previous change to finish.".to_string(),
        }
    }
}
