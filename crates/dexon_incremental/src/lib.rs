//! Incremental build support.
//!
//! The previous build's state lives in a [`Container`](dexon_common::Container):
//! which types each source file defined ([`FileDependencies`]), what each
//! type depends on ([`TypeDependencies`]), the fingerprints of the libraries
//! it compiled against ([`LibraryDependencies`]), and one compiled artifact
//! plus one dex fragment per type ([`ArtifactStore`]).
//!
//! [`IncrementalInputFilter`] compares the sources of a new build with that
//! state, selects what to compile and, after a successful build, brings the
//! state up to date.

#![warn(missing_docs)]

pub mod artifact;
pub mod changes;
pub mod error;
pub mod file_deps;
pub mod filter;
pub mod library_deps;
pub mod map;
pub mod order;
pub mod state;
pub mod type_deps;

pub use artifact::ArtifactStore;
pub use changes::ChangeSet;
pub use error::IncrementalError;
pub use file_deps::FileDependencies;
pub use filter::{
    CompiledUnit, FilterOptions, IncrementalInputFilter, RebuildReason, ReconcileSummary,
};
pub use library_deps::{fingerprint, LibraryDependencies, LibraryFingerprint};
pub use map::{DependencyMap, DependencyStats};
pub use order::DependencyOrder;
pub use state::DependencyState;
pub use type_deps::TypeDependencies;
