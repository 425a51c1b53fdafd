//! Error types for incremental state handling.

use dexon_diagnostics::{Diagnostic, DiagnosticCode};
use std::path::PathBuf;

/// Errors raised while reading, updating or persisting incremental state.
///
/// [`Format`](IncrementalError::Format) and
/// [`Artifact`](IncrementalError::Artifact) mean the previous state cannot be
/// trusted; the caller falls back to a full rebuild. Everything else aborts
/// the compilation.
#[derive(Debug, thiserror::Error)]
pub enum IncrementalError {
    /// An I/O operation on incremental state failed.
    #[error("incremental I/O error: cannot {op} {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// What was being done, e.g. `"delete"`.
        op: &'static str,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A persisted dependency file is malformed.
    #[error("malformed dependency file {path} at line {line}: {reason}")]
    Format {
        /// The dependency file.
        path: PathBuf,
        /// One-based line number, 0 when the whole file is affected.
        line: usize,
        /// What is wrong.
        reason: String,
    },

    /// A stored compiled-type artifact failed validation.
    #[error("invalid artifact {path}: {reason}")]
    Artifact {
        /// The artifact file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A library could not be read.
    #[error("cannot read library {path}: {source}")]
    Library {
        /// The library location.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Encoding or decoding of persisted state failed.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },
}

impl IncrementalError {
    /// Returns `true` if the error only invalidates the previous state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IncrementalError::Format { .. } | IncrementalError::Artifact { .. }
        )
    }

    /// Converts the error into a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            IncrementalError::Format { path, .. } | IncrementalError::Artifact { path, .. } => {
                Diagnostic::warning(DiagnosticCode::CORRUPT_INCREMENTAL_STATE, self.to_string())
                    .at(path.display().to_string())
                    .with_note("falling back to a full rebuild")
            }
            IncrementalError::Io { path, op, .. } => {
                let code = if *op == "delete" {
                    DiagnosticCode::STALE_ARTIFACT_DELETE
                } else {
                    DiagnosticCode::INCREMENTAL_PERSIST
                };
                Diagnostic::error(code, self.to_string()).at(path.display().to_string())
            }
            IncrementalError::Library { path, .. } => {
                Diagnostic::error(DiagnosticCode::BAD_CLASSPATH_ENTRY_STRICT, self.to_string())
                    .at(path.display().to_string())
            }
            IncrementalError::Serialization { .. } => {
                Diagnostic::error(DiagnosticCode::INCREMENTAL_PERSIST, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = IncrementalError::Io {
            path: PathBuf::from("build/incremental/dex/com/example/A.dex"),
            op: "delete",
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cannot delete"));
        assert!(msg.contains("A.dex"));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_diagnostic().code, DiagnosticCode::STALE_ARTIFACT_DELETE);
    }

    #[test]
    fn format_error_is_recoverable() {
        let err = IncrementalError::Format {
            path: PathBuf::from("deps/types.deps"),
            line: 3,
            reason: "value before any key".to_string(),
        };
        assert!(err.to_string().contains("at line 3"));
        assert!(err.is_recoverable());
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::CORRUPT_INCREMENTAL_STATE);
        assert_eq!(diag.severity, dexon_diagnostics::Severity::Warning);
    }

    #[test]
    fn artifact_error_display() {
        let err = IncrementalError::Artifact {
            path: PathBuf::from("compiled/A.cty"),
            reason: "checksum mismatch".to_string(),
        };
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn serialization_error_display() {
        let err = IncrementalError::Serialization {
            reason: "invalid bincode data".to_string(),
        };
        assert!(err.to_string().contains("invalid bincode data"));
        assert!(!err.is_recoverable());
    }
}
