//! The seam between the driver and a Java frontend.

use crate::error::FrontendError;
use dexon_diagnostics::DiagnosticSink;
use dexon_incremental::CompiledUnit;

/// Compiles Java source files into compiled types.
///
/// The driver hands over the files to compile, each after the files it
/// depends on, and expects one [`CompiledUnit`] per file, including files
/// that define no type. Per-file problems the frontend can recover from
/// go to the sink; returning `Err` aborts the build and leaves the
/// incremental state untouched.
pub trait Frontend: Send + Sync {
    /// The frontend's name, for logs.
    fn name(&self) -> &str;

    /// Compiles `files`.
    fn compile(
        &self,
        files: &[String],
        sink: &DiagnosticSink,
    ) -> Result<Vec<CompiledUnit>, FrontendError>;
}
