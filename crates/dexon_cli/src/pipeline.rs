//! Shared helpers for CLI commands: project resolution, logging setup and
//! diagnostic output.

use std::path::{Path, PathBuf};

use dexon_config::{load_config, ProjectConfig};
use dexon_diagnostics::{
    DiagnosticRenderer, DiagnosticSink, JsonRenderer, Severity, TerminalRenderer,
};

use crate::{GlobalArgs, ReportFormat};

/// Walks up from `start` looking for the nearest directory containing `dexon.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join("dexon.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find dexon.toml in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root from `--config` (a file or a directory) or by
/// searching upwards from the current directory.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &global.config {
        Some(config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() {
                Ok(p.parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")))
            } else {
                Ok(p)
            }
        }
        None => find_project_root(&std::env::current_dir()?),
    }
}

/// Resolves the project and loads its configuration.
pub fn load_project(
    global: &GlobalArgs,
) -> Result<(PathBuf, ProjectConfig), Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    let config = load_config(&root)?;
    tracing::debug!(root = %root.display(), project = %config.project.name, "loaded project");
    Ok((root, config))
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise only warnings are shown, or
/// everything from dexon at `info` with `--verbose`.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Prints every collected diagnostic to stderr and returns the exit code:
/// 1 if any of them is an error. With `--quiet` only errors are printed.
pub fn report(sink: &DiagnosticSink, format: ReportFormat, global: &GlobalArgs) -> i32 {
    let renderer: Box<dyn DiagnosticRenderer> = match format {
        ReportFormat::Text => Box::new(TerminalRenderer::new(global.color)),
        ReportFormat::Json => Box::new(JsonRenderer),
    };
    for diag in sink.take_all() {
        if global.quiet && !diag.severity.is_error() {
            continue;
        }
        eprint!("{}", renderer.render(&diag));
    }

    let errors = sink.error_count();
    let warnings = sink.count(Severity::Warning);
    if format == ReportFormat::Text && !global.quiet && errors + warnings > 0 {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
    i32::from(sink.worst() == Some(Severity::Error))
}
