//! Diagnostic codes with category prefixes for structured error identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
///
/// Each category maps to a single-character prefix used in diagnostic code
/// display (e.g., `D001` for a dex capacity error, `I002` for an incremental
/// state problem).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// General error diagnostics, prefixed with `E`.
    Error,
    /// General warning diagnostics, prefixed with `W`.
    Warning,
    /// Dex writing diagnostics (capacity, malformed input), prefixed with `D`.
    Dex,
    /// Incremental state diagnostics, prefixed with `I`.
    Incremental,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Error => 'E',
            Category::Warning => 'W',
            Category::Dex => 'D',
            Category::Incremental => 'I',
        }
    }
}

/// A structured diagnostic code combining a category prefix and a numeric identifier.
///
/// Displayed as the category prefix followed by a zero-padded 3-digit number,
/// e.g., `D001`, `I003`, `W101`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }

    /// All types do not fit into a single `classes.dex`.
    pub const SINGLE_DEX_OVERFLOW: Self = Self::new(Category::Dex, 1);
    /// The main dex set does not fit into the primary dex file.
    pub const MAIN_DEX_OVERFLOW: Self = Self::new(Category::Dex, 2);
    /// A compiled type is internally inconsistent.
    pub const MALFORMED_TYPE: Self = Self::new(Category::Dex, 3);
    /// A dex file could not be written.
    pub const DEX_OUTPUT_IO: Self = Self::new(Category::Dex, 4);
    /// An internal invariant was violated while writing dex files.
    pub const DEX_INTERNAL: Self = Self::new(Category::Dex, 5);

    /// Persisted incremental state is unreadable; a full rebuild follows.
    pub const CORRUPT_INCREMENTAL_STATE: Self = Self::new(Category::Incremental, 1);
    /// A stale artifact could not be deleted.
    pub const STALE_ARTIFACT_DELETE: Self = Self::new(Category::Incremental, 2);
    /// Incremental state could not be persisted.
    pub const INCREMENTAL_PERSIST: Self = Self::new(Category::Incremental, 3);
    /// A library changed since the previous build; a full rebuild follows.
    pub const LIBRARY_CHANGED: Self = Self::new(Category::Incremental, 4);

    /// A classpath entry could not be read.
    pub const BAD_CLASSPATH_ENTRY: Self = Self::new(Category::Warning, 101);
    /// A classpath entry could not be read and strict classpath checking is on.
    pub const BAD_CLASSPATH_ENTRY_STRICT: Self = Self::new(Category::Error, 101);
    /// The frontend rejected the input files.
    pub const FRONTEND_FAILURE: Self = Self::new(Category::Error, 201);
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
