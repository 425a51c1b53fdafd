//! Shared foundational types used across the dexon toolchain.
//!
//! This crate provides content hashing, session-scoped name interning, the
//! internal-error result type, and the resource container that every other
//! crate uses to create and read dex outputs and incremental state.

#![warn(missing_docs)]

pub mod container;
pub mod hash;
pub mod ident;
pub mod result;

pub use container::{AtomicFile, Container, DirectoryContainer, FileKind};
pub use hash::{ContentHash, ContentHasher};
pub use ident::{Ident, Interner};
pub use result::{DexonResult, InternalError};
