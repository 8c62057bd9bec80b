//! Error kind taxonomy shared across module boundaries.
//!
//! Internal plumbing (storage I/O, HTTP) keeps returning `anyhow::Result`
//! — "library glue" errors nobody outside the call stack branches on.
//! `NtxError` is reserved for the handful of seams that need a *stable*
//! classification: the adapter boundary, the worker/backfill boundary,
//! the RPC boundary, and the CSV ingester.

use thiserror::Error;

pub type NtxResult<T> = Result<T, NtxError>;

#[derive(Debug, Error)]
pub enum NtxError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cancelled")]
    Cancelled,
}

/// Errors returned by the upstream adapter (§4.B), already classified —
/// callers never see a raw `reqwest::Error`.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("transient failure, retry: {0}")]
    Transient(String),
}

/// Storage-layer errors (§4.A). `DataIntegrity` halts the sync worker.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Validation rule violations (§4.I), surfaced at the RPC boundary and by
/// the CSV ingester.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid unit price: {0}")]
    InvalidUnitPrice(String),

    #[error("price outside band: {0}")]
    PriceBand(String),

    #[error("outside trading hours: {0}")]
    TradingHours(String),

    #[error("below minimum transaction value: {0}")]
    MinimumValue(String),
}

/// RPC-facing error code taxonomy (§4.H / §7): `invalid_argument`,
/// `not_found`, `internal`. Stack traces are logged, never returned.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<ValidationError> for RpcError {
    fn from(e: ValidationError) -> Self {
        RpcError::InvalidArgument(e.to_string())
    }
}

impl From<StorageError> for RpcError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => RpcError::NotFound(msg),
            other => RpcError::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(e: anyhow::Error) -> Self {
        RpcError::Internal(e)
    }
}
