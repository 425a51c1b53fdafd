//! Classification of source files against the previous build.

use crate::artifact::ArtifactStore;
use crate::file_deps::FileDependencies;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

/// How the source files of this build relate to the previous one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Files that were not compiled before.
    pub added: BTreeSet<String>,
    /// Previously compiled files that changed since.
    pub modified: BTreeSet<String>,
    /// Previously compiled files no longer part of the build.
    pub deleted: BTreeSet<String>,
    /// Previously compiled files that did not change.
    pub unchanged: BTreeSet<String>,
}

impl ChangeSet {
    /// Returns `true` if nothing was added, modified or deleted.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Classifies `sources` against the files compiled by the previous
    /// build.
    ///
    /// A previous file is modified when, for any type it defined, the dex
    /// fragment is missing or older than the source file. A file that
    /// defined no type has no fragment to compare against; it counts as
    /// modified when it is newer than `state_saved`, the time the previous
    /// state was written.
    pub fn classify(
        sources: &BTreeSet<String>,
        previous: &FileDependencies,
        store: &ArtifactStore<'_>,
        state_saved: Option<SystemTime>,
    ) -> Self {
        let mut changes = Self::default();
        for file in previous.compiled_files() {
            if !sources.contains(file) {
                changes.deleted.insert(file.to_string());
            } else if is_modified(file, previous, store, state_saved) {
                changes.modified.insert(file.to_string());
            } else {
                changes.unchanged.insert(file.to_string());
            }
        }
        changes.added = sources
            .iter()
            .filter(|file| !previous.contains_file(file))
            .cloned()
            .collect();

        tracing::info!(
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            unchanged = changes.unchanged.len(),
            "classified source files"
        );
        changes
    }
}

fn is_modified(
    file: &str,
    previous: &FileDependencies,
    store: &ArtifactStore<'_>,
    state_saved: Option<SystemTime>,
) -> bool {
    // An unreadable source time is treated as a change.
    let source_time = std::fs::metadata(Path::new(file))
        .and_then(|m| m.modified())
        .ok();
    let Some(source_time) = source_time else {
        return true;
    };

    let mut types = previous.type_names(file).peekable();
    if types.peek().is_none() {
        return state_saved.map_or(true, |saved| source_time > saved);
    }
    types.any(|ty| match store.fragment_modified(ty) {
        None => true,
        Some(fragment_time) => source_time > fragment_time,
    })
}
