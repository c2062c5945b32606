//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, reservation rejections). Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A reservation asked for more rooms than the package has left.
    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: u32 },

    /// The user already holds an active waiting-list entry for this package.
    #[error("already queued")]
    AlreadyQueued,

    /// The user already holds an active booking for this package.
    #[error("duplicate booking")]
    DuplicateBooking,

    /// Booking or cancellation attempted outside its allowed window.
    #[error("deadline passed: {0}")]
    DeadlinePassed(String),

    /// The user has reached the cap on bookings for future departures.
    #[error("booking cap reached (cap: {cap})")]
    BookingCapReached { cap: u32 },

    /// Internal consistency failure (e.g. a release that would exceed
    /// capacity, or an outstanding offer on a package with no rooms).
    ///
    /// This indicates a bug in the per-package serialization discipline.
    /// Callers must log it loudly and never correct it silently.
    #[error("consistency violation: {0}")]
    Consistency(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn deadline_passed(msg: impl Into<String>) -> Self {
        Self::DeadlinePassed(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }
}
