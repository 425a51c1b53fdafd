//! How serious a diagnostic is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic. The derived order runs from `Help` up to
/// `Error`, so `max` gives the worst of a set.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A suggestion attached to the build output.
    Help,
    /// Information about a decision, e.g. why a full rebuild was chosen.
    Note,
    /// Something the user should fix; the build still succeeds.
    Warning,
    /// The build cannot produce output.
    Error,
}

impl Severity {
    /// All severities, least serious first.
    pub const ALL: [Severity; 4] = [
        Severity::Help,
        Severity::Note,
        Severity::Warning,
        Severity::Error,
    ];

    /// Returns `true` for [`Severity::Error`].
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    fn as_str(self) -> &'static str {
        match self {
            Severity::Help => "help",
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_wins() {
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Error));
        assert_eq!(Severity::Note.max(Severity::Warning), Severity::Warning);
    }

    #[test]
    fn only_errors_are_errors() {
        let errors: Vec<_> = Severity::ALL.into_iter().filter(|s| s.is_error()).collect();
        assert_eq!(errors, vec![Severity::Error]);
    }

    #[test]
    fn indices_follow_order() {
        for (i, severity) in Severity::ALL.into_iter().enumerate() {
            assert_eq!(severity.index(), i);
        }
    }

    #[test]
    fn display_matches_serde() {
        for severity in Severity::ALL {
            assert_eq!(
                serde_json::to_string(&severity).unwrap(),
                format!("\"{severity}\"")
            );
        }
    }
}
