use thiserror::Error;

use crate::activity::{ActivityKind, Attribute};

/// Failures raised by an activity store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare store location: {0}")]
    Io(#[from] std::io::Error),
    #[error("{kind} records carry no {attribute} attribute")]
    UnsupportedFilter {
        kind: ActivityKind,
        attribute: Attribute,
    },
    #[error("cannot store a {got} record in the {expected} store")]
    KindMismatch {
        expected: ActivityKind,
        got: ActivityKind,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Missing or invalid limit settings. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The inbound event was not processed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type GuardResult<T> = Result<T, GuardError>;
