//! Common result and error types for the dexon toolchain.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in dexon), not a
/// user-facing error. User errors are reported through the diagnostic sink
/// and carried by each crate's own error enum.
pub type DexonResult<T> = Result<T, InternalError>;

/// An internal error indicating a broken invariant, not a user input problem.
///
/// Examples are a type that overflows an empty dex file after it was already
/// rejected by a full one, or a pool lookup for an entry that was never
/// committed.
#[derive(Debug, thiserror::Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
