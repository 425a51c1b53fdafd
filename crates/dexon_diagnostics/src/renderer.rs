//! Diagnostic rendering backends for human-readable and machine-readable output.

use crate::diagnostic::Diagnostic;

/// Trait for rendering diagnostics into formatted output strings.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a rustc-style terminal format.
///
/// Produces output like:
/// ```text
/// error[D002]: main dex list is too large
///   --> classes.dex
///    = note: method ids: 65537 > 65536
///    = help: reduce the main dex set
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes for the severity prefix.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn severity_label(&self, diag: &Diagnostic) -> String {
        if !self.color {
            return diag.severity.to_string();
        }
        let ansi = match diag.severity {
            crate::Severity::Error => "31",
            crate::Severity::Warning => "33",
            crate::Severity::Note => "36",
            crate::Severity::Help => "32",
        };
        format!("\x1b[1;{ansi}m{}\x1b[0m", diag.severity)
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = format!(
            "{}[{}]: {}\n",
            self.severity_label(diag),
            diag.code,
            diag.message
        );

        if let Some(location) = &diag.location {
            out.push_str(&format!("  --> {location}\n"));
        }

        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }

        for help in &diag.help {
            out.push_str(&format!("   = help: {help}\n"));
        }

        out
    }
}

/// Renders each diagnostic as one line of JSON.
pub struct JsonRenderer;

impl DiagnosticRenderer for JsonRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let code = diag.code.to_string();
        let value = serde_json::json!({
            "severity": diag.severity,
            "code": code,
            "message": diag.message,
            "location": diag.location,
            "notes": diag.notes,
            "help": diag.help,
        });
        format!("{value}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::DiagnosticCode;

    #[test]
    fn render_error_with_location() {
        let diag = Diagnostic::error(DiagnosticCode::MAIN_DEX_OVERFLOW, "main dex list is too large")
            .at("classes.dex")
            .with_note("method ids: 65537 > 65536")
            .with_help("reduce the main dex set");

        let output = TerminalRenderer::new(false).render(&diag);

        assert!(output.starts_with("error[D002]: main dex list is too large\n"));
        assert!(output.contains("  --> classes.dex\n"));
        assert!(output.contains("= note: method ids: 65537 > 65536"));
        assert!(output.contains("= help: reduce the main dex set"));
    }

    #[test]
    fn render_without_location() {
        let diag = Diagnostic::warning(DiagnosticCode::CORRUPT_INCREMENTAL_STATE, "bad state");
        let output = TerminalRenderer::new(false).render(&diag);
        assert_eq!(output, "warning[I001]: bad state\n");
    }

    #[test]
    fn colored_severity() {
        let diag = Diagnostic::error(DiagnosticCode::DEX_OUTPUT_IO, "cannot write");
        let output = TerminalRenderer::new(true).render(&diag);
        assert!(output.contains("\x1b[1;31merror\x1b[0m[D004]"));
    }

    #[test]
    fn json_line() {
        let diag = Diagnostic::error(DiagnosticCode::SINGLE_DEX_OVERFLOW, "overflow").at("classes.dex");
        let output = JsonRenderer.render(&diag);
        assert!(output.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(value["code"], "D001");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["location"], "classes.dex");
    }
}
