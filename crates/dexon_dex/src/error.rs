//! Error types for dex encoding, merging and writing.

use crate::limits::IdTable;
use dexon_common::InternalError;
use dexon_diagnostics::{Diagnostic, DiagnosticCode};
use std::path::PathBuf;

/// Result type for dex operations.
pub type DexResult<T> = Result<T, DexError>;

/// Errors that abort dex output.
///
/// None of these are retried. The only recovery in the dex writer is the
/// redirect of an overflowing type into a fresh file, which never surfaces
/// as an error.
#[derive(Debug, thiserror::Error)]
pub enum DexError {
    /// Single-dex output exceeded a per-file id limit.
    #[error("classes.dex has too many IDs ({table} ids: {required} > {limit}). Try using multi-dex")]
    SingleDexOverflow {
        /// The table that overflowed.
        table: IdTable,
        /// Ids the table would have needed.
        required: usize,
        /// The per-file limit.
        limit: usize,
    },

    /// The main dex set does not fit into the primary dex file.
    #[error("main dex has too many IDs ({table} ids: {required} > {limit}); reduce the main dex set")]
    MainDexOverflow {
        /// The table that overflowed.
        table: IdTable,
        /// Ids the table would have needed.
        required: usize,
        /// The per-file limit.
        limit: usize,
    },

    /// A compiled type is internally inconsistent.
    #[error("malformed type {type_name}: {reason}")]
    Malformed {
        /// Descriptor of the offending type.
        type_name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A dex file could not be written.
    #[error("dex I/O error at {path}: {source}")]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An internal invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl DexError {
    /// Creates a [`DexError::Malformed`].
    pub fn malformed(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        DexError::Malformed {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Converts the error into a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            DexError::SingleDexOverflow { .. } => {
                Diagnostic::error(DiagnosticCode::SINGLE_DEX_OVERFLOW, self.to_string())
                    .at("classes.dex")
                    .with_help("set `dex.multidex` to \"legacy-minimal\" in dexon.toml")
            }
            DexError::MainDexOverflow { .. } => {
                Diagnostic::error(DiagnosticCode::MAIN_DEX_OVERFLOW, self.to_string())
                    .at("classes.dex")
                    .with_help("remove entries from `main_dex.classes` or the main dex list file")
            }
            DexError::Malformed { type_name, reason } => Diagnostic::error(
                DiagnosticCode::MALFORMED_TYPE,
                format!("malformed compiled type: {reason}"),
            )
            .at(type_name.clone()),
            DexError::Io { path, source } => {
                Diagnostic::error(DiagnosticCode::DEX_OUTPUT_IO, format!("cannot write dex file: {source}"))
                    .at(path.display().to_string())
            }
            DexError::Internal(e) => Diagnostic::error(DiagnosticCode::DEX_INTERNAL, e.to_string()),
        }
    }
}
