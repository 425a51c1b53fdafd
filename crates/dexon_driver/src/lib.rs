//! Build orchestration for dexon.
//!
//! A [`BuildSession`] runs one build of a project: it fingerprints the
//! libraries, asks the incremental filter which sources to compile, hands
//! them to a [`Frontend`], merges the fresh and the reused types into
//! `classes*.dex`, and finally records the new incremental state.

#![warn(missing_docs)]

pub mod build;
pub mod error;
pub mod frontend;
pub mod sources;

pub use build::{BuildOutcome, BuildPlan, BuildSession};
pub use error::{DriverError, DriverResult, FrontendError};
pub use frontend::Frontend;
pub use sources::collect_sources;
