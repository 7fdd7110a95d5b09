//! Uniform response envelope for the request layer.
//!
//! ```json
//! {"status":"success","data":{...}}
//! {"status":"error","error":{"code":"state_conflict","message":"...","retryable":false}}
//! ```

use crate::error::BookingError;
use serde::{Deserialize, Serialize};

/// Error body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code (see [`BookingError::code`])
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether the same call may succeed if retried
    pub retryable: bool,
}

impl From<&BookingError> for ErrorBody {
    fn from(err: &BookingError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Success or failure of one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    /// Operation succeeded
    Success {
        /// Payload
        data: T,
    },
    /// Operation failed
    Error {
        /// What went wrong
        error: ErrorBody,
    },
}

impl<T> Envelope<T> {
    /// Returns `true` for [`Envelope::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl<T> From<Result<T, BookingError>> for Envelope<T> {
    fn from(result: Result<T, BookingError>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(err) => Self::Error {
                error: ErrorBody::from(&err),
            },
        }
    }
}
