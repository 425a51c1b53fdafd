//! Session-scoped interning of type names.

use lasso::ThreadedRodeo;
use std::fmt;

/// A name interned by an [`Interner`]. Equality and hashing are O(1);
/// comparing idents from different interners is meaningless.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Ident(u32);

// SAFETY: `try_from_usize` only accepts values that fit a `u32`, and
// `into_usize` returns exactly the value it was built from.
unsafe impl lasso::Key for Ident {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(Ident)
    }
}

/// Interns descriptors and file names for one compilation session.
///
/// Interning takes `&self`, so rayon workers can share one interner.
/// Sessions never share an interner.
pub struct Interner {
    rodeo: ThreadedRodeo<Ident>,
}

impl Interner {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns `name`, reusing the existing ident if it was seen before.
    pub fn get_or_intern(&self, name: &str) -> Ident {
        self.rodeo.get_or_intern(name)
    }

    /// The ident of `name` if it was interned; never interns.
    pub fn get(&self, name: &str) -> Option<Ident> {
        self.rodeo.get(name)
    }

    /// The name behind `ident`, or `None` for an ident of another interner
    /// that is out of range here.
    pub fn resolve(&self, ident: Ident) -> Option<&str> {
        self.rodeo.try_resolve(&ident)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    /// Returns `true` if nothing was interned.
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner").field("names", &self.len()).finish()
    }
}
