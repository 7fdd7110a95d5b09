//! Error types for booking lifecycle operations.

use crate::types::{BookingId, BookingKind};
use thiserror::Error;

/// Result type alias for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Error taxonomy for the booking engine.
///
/// Callers must be able to tell "nothing happened because someone else
/// already acted" ([`BookingError::StateConflict`]) apart from a storage
/// failure ([`BookingError::Persistence`]) and from their own bad input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    // ═══════════════════════════════════════════════════════════
    // Caller Errors
    // ═══════════════════════════════════════════════════════════

    /// A required field is missing or malformed.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The transition does not exist for this booking kind.
    #[error("Transition {transition} is not available for {kind} bookings")]
    Unsupported {
        /// Booking kind the lifecycle is bound to
        kind: BookingKind,
        /// Requested transition
        transition: &'static str,
    },

    // ═══════════════════════════════════════════════════════════
    // Concurrency
    // ═══════════════════════════════════════════════════════════

    /// The guarded update matched no row: the booking does not exist, is in
    /// another status, or the caller is not the party the guard requires.
    #[error("{kind} booking {booking_id} not found or not in expected state for {transition}")]
    StateConflict {
        /// Booking kind
        kind: BookingKind,
        /// Target booking
        booking_id: BookingId,
        /// Requested transition
        transition: &'static str,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Storage failure; the unit of work was rolled back.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl BookingError {
    /// Shorthand for [`BookingError::Validation`].
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Only storage failures qualify; a conflict means the world has moved on.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Returns `true` if this error is due to invalid caller input.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Unsupported { .. })
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unsupported { .. } => "unsupported_transition",
            Self::StateConflict { .. } => "state_conflict",
            Self::Persistence(_) => "persistence_error",
        }
    }
}
