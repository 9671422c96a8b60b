//! Error types for pool operations
//!
//! Only store faults are errors. An empty pool, an unknown id, or a transition
//! that is already in effect are ordinary results (`Checkout::Empty`,
//! `Outcome::NotFound`, `Outcome::Unchanged`).

/// Errors from the account store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("account store I/O error: {0}")]
    Io(String),

    #[error("account store is corrupt: {0}")]
    Corrupt(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
