//! Backend response envelope and pagination contract.
//!
//! Every JSON response from the backend has the shape
//! `{ success, message, data, error, meta, timestamp }`; list endpoints put a
//! [`Paginated`] value in `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ClientError, ClientResult};

/// Error object carried by a failed envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Standard response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
            meta: None,
            timestamp: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            message: error.message.clone(),
            data: None,
            error: Some(error),
            meta: None,
            timestamp: None,
        }
    }

    /// Unwrap `data`, treating a successful envelope without data as an error.
    pub fn into_result(self, status: u16) -> ClientResult<T> {
        match self.into_optional(status)? {
            Some(data) => Ok(data),
            None => Err(ClientError::MissingData),
        }
    }

    /// Unwrap `data` for endpoints whose success carries no payload
    /// (deletes, logout).
    pub fn into_optional(self, status: u16) -> ClientResult<Option<T>> {
        if self.success && (200..300).contains(&status) {
            return Ok(self.data);
        }
        Err(ApiError::from_status(status, self.error, self.message).into())
    }
}

/// Page metadata returned by list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// A page of items as returned by list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}
