use thiserror::Error;

use orders_storage_core::DomainError;

/// Storage-boundary error reported by order and counter backends.
///
/// These are **infrastructure errors**; the lifecycle translates them into an
/// [`OrderError`] depending on which step failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed row or counter does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A row or counter with the same key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The backend rejected the operation with a non-success status.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection, I/O or unexpected driver failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Caller-visible failure of a lifecycle operation.
///
/// Every variant keeps the message of the original cause; a rollback never
/// replaces it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Malformed input, rejected before any transaction begins.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("purchase order not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("line-number counter creation failed: {0}")]
    CounterCreateFailed(String),

    #[error("line-number counter drop failed: {0}")]
    CounterDropFailed(String),

    #[error("backend failure: {0}")]
    BackendFailure(String),
}

impl OrderError {
    /// HTTP-style status a caller should report for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            OrderError::ValidationFailure(_) => 400,
            OrderError::NotFound(_) => 404,
            OrderError::Conflict(_) => 409,
            OrderError::CounterCreateFailed(_)
            | OrderError::CounterDropFailed(_)
            | OrderError::BackendFailure(_) => 500,
        }
    }

    /// Translate a failure of a primary-record operation.
    pub(crate) fn from_row(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => OrderError::NotFound(msg),
            StoreError::AlreadyExists(msg) | StoreError::Conflict(msg) => OrderError::Conflict(msg),
            StoreError::Backend(msg) => OrderError::BackendFailure(msg),
        }
    }

    pub(crate) fn counter_create(err: StoreError) -> Self {
        OrderError::CounterCreateFailed(err.to_string())
    }

    pub(crate) fn counter_drop(err: StoreError) -> Self {
        OrderError::CounterDropFailed(err.to_string())
    }

    pub(crate) fn backend(err: StoreError) -> Self {
        OrderError::BackendFailure(err.to_string())
    }
}

impl From<DomainError> for OrderError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound => OrderError::NotFound("not found".to_string()),
            DomainError::Conflict(msg) => OrderError::Conflict(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                OrderError::ValidationFailure(msg)
            }
        }
    }
}
