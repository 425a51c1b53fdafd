//! Errors of a build.

use dexon_common::InternalError;
use dexon_config::ConfigError;
use dexon_dex::DexError;
use dexon_incremental::IncrementalError;
use std::path::PathBuf;

/// A frontend could not compile its input.
#[derive(Debug, thiserror::Error)]
#[error("{}{reason}", .file.as_ref().map(|f| format!("{f}: ")).unwrap_or_default())]
pub struct FrontendError {
    /// The file that failed, if the failure is specific to one.
    pub file: Option<String>,
    /// What went wrong.
    pub reason: String,
}

impl FrontendError {
    /// Creates an error about `file`.
    pub fn in_file(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            reason: reason.into(),
        }
    }
}

/// Everything that can abort a build.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The project configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing dex output failed.
    #[error(transparent)]
    Dex(#[from] DexError),

    /// Incremental state could not be read or updated.
    #[error(transparent)]
    Incremental(#[from] IncrementalError),

    /// The frontend failed.
    #[error("compilation failed: {0}")]
    Frontend(#[from] FrontendError),

    /// A broken invariant inside dexon.
    #[error(transparent)]
    Internal(#[from] InternalError),

    /// A source path could not be read.
    #[error("cannot read sources at {path}: {source}")]
    Sources {
        /// The path given.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The requested operation needs an incremental folder.
    #[error("no incremental folder configured; set `incremental.folder` in dexon.toml")]
    NoIncrementalFolder,
}

/// Result type of driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_error_display() {
        let err = FrontendError::in_file("src/A.java", "unexpected token");
        assert_eq!(err.to_string(), "src/A.java: unexpected token");
        let err = FrontendError {
            file: None,
            reason: "out of memory".into(),
        };
        assert_eq!(err.to_string(), "out of memory");
        assert_eq!(
            DriverError::from(err).to_string(),
            "compilation failed: out of memory"
        );
    }

    #[test]
    fn incremental_errors_pass_through() {
        let err = DriverError::from(IncrementalError::Serialization {
            reason: "bad".into(),
        });
        assert_eq!(err.to_string(), "serialization error: bad");
    }
}
