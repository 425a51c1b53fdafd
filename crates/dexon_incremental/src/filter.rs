//! Selection of the source files an incremental build must compile.
//!
//! A filter is created from the command-line sources, the current library
//! fingerprints and whatever state the previous build left behind. It
//! classifies the sources, decides between a full and an incremental
//! build, and computes the files to compile: the added and modified files,
//! plus every file that depends, directly or through other recompiled
//! files, on a type of a modified or deleted file.
//!
//! Once the build has produced its output, [`IncrementalInputFilter::reconcile`]
//! consumes the filter: it deletes artifacts of deleted and recompiled
//! files, stores the new ones and saves the updated state. A build that
//! fails before reconciling leaves the previous state untouched.

use crate::artifact::ArtifactStore;
use crate::changes::ChangeSet;
use crate::error::IncrementalError;
use crate::library_deps::LibraryDependencies;
use crate::order::DependencyOrder;
use crate::state::DependencyState;
use dexon_common::Container;
use dexon_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use dexon_ir::CompiledType;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings of the filter.
#[derive(Clone, Debug, Default)]
pub struct FilterOptions {
    /// Rebuild everything when the libraries changed since the last build.
    pub auto_full_rebuild: bool,
    /// Directory that relative library locations are resolved against.
    pub library_base: PathBuf,
}

/// Why everything is compiled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildReason {
    /// No previous build state exists.
    NoPreviousState,
    /// The previous state could not be read.
    CorruptState,
    /// The set of libraries or their contents changed.
    LibrariesChanged,
    /// A library was touched after the previous build.
    LibraryNewer,
    /// A configured library could not be read.
    UnreadableLibrary,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RebuildReason::NoPreviousState => "no previous build",
            RebuildReason::CorruptState => "previous build state is unusable",
            RebuildReason::LibrariesChanged => "libraries changed",
            RebuildReason::LibraryNewer => "a library is newer than the previous build",
            RebuildReason::UnreadableLibrary => "a library could not be read",
        })
    }
}

/// The types compiled from one source file.
#[derive(Clone, Debug)]
pub struct CompiledUnit {
    /// The source file, as given on the command line.
    pub source: String,
    /// The types it defines.
    pub types: Vec<Arc<CompiledType>>,
}

/// What [`IncrementalInputFilter::reconcile`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Source files recorded from this build's compilation.
    pub compiled_files: usize,
    /// Types stored from this build's compilation.
    pub compiled_types: usize,
    /// Stale artifact types removed.
    pub removed_types: usize,
    /// Every type defined by the sources after the build.
    pub types: BTreeSet<String>,
}

/// Decides what to compile and keeps the incremental state in step.
pub struct IncrementalInputFilter<'a> {
    container: &'a dyn Container,
    sources: BTreeSet<String>,
    state: DependencyState,
    changes: ChangeSet,
    rebuild: Option<RebuildReason>,
    files_to_compile: BTreeSet<String>,
}

impl<'a> IncrementalInputFilter<'a> {
    /// Classifies `sources` against the state stored in `container`.
    ///
    /// Unusable previous state and unreadable libraries lead to a full
    /// rebuild.
    pub fn new(
        container: &'a dyn Container,
        sources: impl IntoIterator<Item = String>,
        libraries: LibraryDependencies,
        options: &FilterOptions,
        sink: &DiagnosticSink,
    ) -> Self {
        let sources: BTreeSet<String> = sources.into_iter().collect();
        let saved_at = DependencyState::saved_at(container);
        let previous = match DependencyState::load(container) {
            Ok(previous) => previous,
            Err(err) => {
                sink.emit(err.to_diagnostic());
                None
            }
        };
        let corrupt = previous.is_none() && saved_at.is_some();

        let rebuild = match &previous {
            None if corrupt => Some(RebuildReason::CorruptState),
            None => Some(RebuildReason::NoPreviousState),
            Some(_) if !libraries.is_complete() => Some(RebuildReason::UnreadableLibrary),
            Some(_) if !options.auto_full_rebuild => None,
            Some(previous) if previous.libraries != libraries => {
                Some(RebuildReason::LibrariesChanged)
            }
            Some(_) => libraries
                .newest_modification(&options.library_base)
                .zip(saved_at)
                .filter(|(library, saved)| library > saved)
                .map(|_| RebuildReason::LibraryNewer),
        };
        if let Some(reason @ (RebuildReason::LibrariesChanged | RebuildReason::LibraryNewer)) =
            rebuild
        {
            sink.emit(Diagnostic::note(
                DiagnosticCode::LIBRARY_CHANGED,
                format!("full rebuild: {reason}"),
            ));
        }

        let store = ArtifactStore::new(container);
        let (state, changes, files_to_compile) = match (rebuild, previous) {
            (None, Some(previous)) => {
                let changes = ChangeSet::classify(&sources, &previous.files, &store, saved_at);
                let to_compile = ripple(&previous, &changes);
                let state = DependencyState {
                    libraries,
                    ..previous
                };
                (state, changes, to_compile)
            }
            (_, previous) => {
                // Deleted files are still reported so their outputs get cleaned up.
                let deleted = previous
                    .map(|p| {
                        p.files
                            .compiled_files()
                            .filter(|f| !sources.contains(*f))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let changes = ChangeSet {
                    added: sources.clone(),
                    deleted,
                    ..ChangeSet::default()
                };
                let state = DependencyState {
                    libraries,
                    ..DependencyState::default()
                };
                (state, changes, sources.clone())
            }
        };

        match rebuild {
            Some(reason) => tracing::info!(%reason, files = files_to_compile.len(), "full build"),
            None => tracing::info!(
                files = files_to_compile.len(),
                of = sources.len(),
                "incremental build"
            ),
        }
        Self {
            container,
            sources,
            state,
            changes,
            rebuild,
            files_to_compile,
        }
    }

    /// Returns `true` if everything is compiled from scratch.
    pub fn needs_full_rebuild(&self) -> bool {
        self.rebuild.is_some()
    }

    /// Why everything is compiled, if it is.
    pub fn rebuild_reason(&self) -> Option<RebuildReason> {
        self.rebuild
    }

    /// The classification of the sources.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Every source file of this build.
    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    /// The files to hand to the frontend. Never contains a deleted file.
    pub fn files_to_compile(&self) -> &BTreeSet<String> {
        &self.files_to_compile
    }

    /// The files to compile, each after the files it depends on.
    pub fn ordered_files_to_compile(&self) -> Vec<String> {
        let mut order = DependencyOrder::new();
        for file in &self.files_to_compile {
            order.add_node(file);
        }
        for file in &self.files_to_compile {
            for ty in self.state.files.type_names(file) {
                for dep in self.state.types.dependencies_of(ty).into_iter().flatten() {
                    match self.state.files.java_file_name(dep) {
                        Some(owner)
                            if owner != file.as_str() && self.files_to_compile.contains(owner) =>
                        {
                            order.add_edge(file, owner);
                        }
                        _ => {}
                    }
                }
            }
        }
        order.sort()
    }

    /// Returns `true` if no file needs compiling but files were deleted,
    /// so the output must be merged again from stored fragments.
    pub fn needs_remerge(&self) -> bool {
        self.files_to_compile.is_empty() && !self.changes.deleted.is_empty()
    }

    /// Returns `true` if nothing changed since the previous build.
    pub fn is_up_to_date(&self) -> bool {
        self.rebuild.is_none() && self.changes.is_empty() && self.files_to_compile.is_empty()
    }

    /// Drops the previous state and selects every source, e.g. after a
    /// stored artifact turned out to be unusable.
    pub fn force_full_rebuild(&mut self, reason: RebuildReason) {
        tracing::info!(%reason, files = self.sources.len(), "switching to a full build");
        self.rebuild = Some(reason);
        self.state = DependencyState {
            libraries: std::mem::take(&mut self.state.libraries),
            ..DependencyState::default()
        };
        self.changes.added = self.sources.clone();
        self.changes.modified.clear();
        self.changes.unchanged.clear();
        self.files_to_compile = self.sources.clone();
    }

    /// Types of the previous build that this build reuses unchanged.
    pub fn reused_types(&self) -> BTreeSet<String> {
        if self.rebuild.is_some() {
            return BTreeSet::new();
        }
        self.state
            .files
            .compiled_files()
            .filter(|file| {
                self.sources.contains(*file) && !self.files_to_compile.contains(*file)
            })
            .flat_map(|file| self.state.files.type_names(file))
            .map(str::to_string)
            .collect()
    }

    /// Loads the stored compiled form of every reused type.
    pub fn load_reused(&self) -> Result<Vec<Arc<CompiledType>>, IncrementalError> {
        let store = ArtifactStore::new(self.container);
        self.reused_types()
            .iter()
            .map(|ty| store.read_compiled(ty).map(Arc::new))
            .collect()
    }

    /// Records the result of the build and saves the new state.
    ///
    /// Artifacts of deleted and recompiled files are deleted first; failing
    /// to delete one is fatal, since a stale fragment would be merged into
    /// later outputs. `fragments` maps descriptors to their single-type dex
    /// images.
    pub fn reconcile(
        mut self,
        units: &[CompiledUnit],
        fragments: &HashMap<String, Vec<u8>>,
    ) -> Result<ReconcileSummary, IncrementalError> {
        let store = ArtifactStore::new(self.container);
        let mut summary = ReconcileSummary::default();

        if self.rebuild.is_some() {
            summary.removed_types = store.compiled_types()?.len();
            let files = store.clear()?;
            tracing::debug!(files, "cleared stored artifacts");
        } else {
            let stale: BTreeSet<String> = self
                .changes
                .deleted
                .iter()
                .chain(&self.files_to_compile)
                .flat_map(|file| self.state.files.type_names(file))
                .map(str::to_string)
                .collect();
            for ty in &stale {
                store.delete(ty)?;
            }
            summary.removed_types = stale.len();
            self.state
                .types
                .update(&self.state.files, &self.changes.deleted, &self.files_to_compile);
            self.state
                .files
                .update(&self.changes.deleted, &self.files_to_compile);
        }

        for unit in units {
            if !self.files_to_compile.contains(&unit.source) {
                tracing::warn!(file = %unit.source, "compiled a file that was not selected");
            }
            self.state.files.add_file(
                &unit.source,
                unit.types.iter().map(|ty| ty.descriptor.clone()),
            );
            for ty in &unit.types {
                self.state.types.add(&ty.descriptor, ty.referenced_types());
                store.write_compiled(ty)?;
                match fragments.get(&ty.descriptor) {
                    Some(image) => store.write_fragment(&ty.descriptor, image)?,
                    None => tracing::warn!(ty = %ty.descriptor, "no dex fragment to store"),
                }
                summary.compiled_types += 1;
            }
            summary.compiled_files += 1;
        }

        self.state.save(self.container)?;
        summary.types = self
            .state
            .files
            .all_types()
            .into_iter()
            .map(str::to_string)
            .collect();
        tracing::info!(
            compiled_files = summary.compiled_files,
            compiled_types = summary.compiled_types,
            removed_types = summary.removed_types,
            total_types = summary.types.len(),
            "reconciled incremental state"
        );
        Ok(summary)
    }

    /// The dependency state as it stands.
    pub fn state(&self) -> &DependencyState {
        &self.state
    }
}

/// Added and modified files, plus every file reached by repeatedly
/// following recompile dependencies from the types of modified and
/// deleted files. Deleted files are never selected.
fn ripple(previous: &DependencyState, changes: &ChangeSet) -> BTreeSet<String> {
    let mut selected: BTreeSet<String> = changes
        .added
        .iter()
        .chain(&changes.modified)
        .cloned()
        .collect();
    let mut frontier: Vec<String> = changes
        .modified
        .iter()
        .chain(&changes.deleted)
        .cloned()
        .collect();
    let mut rounds = 0;

    while !frontier.is_empty() {
        rounds += 1;
        let changed_types: Vec<&str> = frontier
            .iter()
            .flat_map(|file| previous.files.type_names(file))
            .collect();
        let dependents = previous
            .types
            .recompile_dependencies_of(changed_types.iter().copied());

        let mut next = Vec::new();
        for ty in &dependents {
            let Some(file) = previous.files.java_file_name(ty) else {
                continue;
            };
            if changes.deleted.contains(file) {
                continue;
            }
            if selected.insert(file.to_string()) {
                next.push(file.to_string());
            }
        }
        frontier = next;
    }

    tracing::debug!(
        rounds,
        selected = selected.len(),
        "expanded recompile dependencies"
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexon_common::DirectoryContainer;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn previous() -> DependencyState {
        let mut state = DependencyState::default();
        state.files.add_file("A.java", ["LA;"]);
        state.files.add_file("B.java", ["LB;"]);
        state.files.add_file("C.java", ["LC;"]);
        state.files.add_file("D.java", ["LD;"]);
        state.files.add_file("E.java", ["LE;"]);
        // A -> B -> C, D -> C, E standalone
        state.types.add("LA;", ["LB;"]);
        state.types.add("LB;", ["LC;"]);
        state.types.add("LC;", std::iter::empty::<String>());
        state.types.add("LD;", ["LC;"]);
        state.types.add("LE;", ["Ljava/lang/Object;"]);
        state
    }

    fn changes(added: &[&str], modified: &[&str], deleted: &[&str]) -> ChangeSet {
        ChangeSet {
            added: set(added),
            modified: set(modified),
            deleted: set(deleted),
            unchanged: BTreeSet::new(),
        }
    }

    #[test]
    fn direct_dependent_only() {
        let mut state = DependencyState::default();
        state.files.add_file("A.java", ["LA;"]);
        state.files.add_file("B.java", ["LB;"]);
        state.files.add_file("Other.java", ["LOther;"]);
        state.types.add("LA;", ["LB;"]);
        state.types.add("LB;", std::iter::empty::<String>());
        state.types.add("LOther;", std::iter::empty::<String>());
        assert_eq!(
            ripple(&state, &changes(&[], &["B.java"], &[])),
            set(&["A.java", "B.java"])
        );
    }

    #[test]
    fn ripples_until_stable() {
        assert_eq!(
            ripple(&previous(), &changes(&[], &["C.java"], &[])),
            set(&["A.java", "B.java", "C.java", "D.java"])
        );
    }

    #[test]
    fn deleted_files_ripple_but_are_not_selected() {
        assert_eq!(
            ripple(&previous(), &changes(&["F.java"], &[], &["C.java"])),
            set(&["A.java", "B.java", "D.java", "F.java"])
        );
    }

    #[test]
    fn cycles_terminate() {
        let mut state = previous();
        state.types.add("LC;", ["LA;"]);
        assert_eq!(
            ripple(&state, &changes(&[], &["E.java"], &[])),
            set(&["E.java"])
        );
        assert_eq!(
            ripple(&state, &changes(&[], &["A.java"], &[])),
            set(&["A.java", "B.java", "C.java", "D.java"])
        );
    }

    #[test]
    fn first_build_compiles_everything() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        let sink = DiagnosticSink::new();
        let filter = IncrementalInputFilter::new(
            &container,
            ["X.java".to_string(), "Y.java".to_string()],
            LibraryDependencies::default(),
            &FilterOptions::default(),
            &sink,
        );
        assert!(filter.needs_full_rebuild());
        assert_eq!(filter.rebuild_reason(), Some(RebuildReason::NoPreviousState));
        assert_eq!(filter.files_to_compile(), &set(&["X.java", "Y.java"]));
        assert!(!filter.needs_remerge());
        assert!(!filter.is_up_to_date());
        assert!(filter.reused_types().is_empty());
        assert!(sink.take_all().is_empty());
    }

    #[test]
    fn forced_full_rebuild_selects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        previous().save(&container).unwrap();
        let sink = DiagnosticSink::new();
        let mut filter = IncrementalInputFilter::new(
            &container,
            ["A.java".to_string(), "E.java".to_string()],
            LibraryDependencies::default(),
            &FilterOptions::default(),
            &sink,
        );
        assert!(!filter.needs_full_rebuild());
        filter.force_full_rebuild(RebuildReason::CorruptState);
        assert_eq!(filter.files_to_compile(), &set(&["A.java", "E.java"]));
        assert!(filter.reused_types().is_empty());
        assert!(filter.state().files.is_empty());
        assert_eq!(filter.changes().deleted, set(&["B.java", "C.java", "D.java"]));
    }

    #[test]
    fn corrupt_state_forces_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        previous().save(&container).unwrap();
        std::fs::write(
            container.location(dexon_common::FileKind::Dependencies, crate::state::TYPES_NAME),
            "garbage",
        )
        .unwrap();

        let sink = DiagnosticSink::new();
        let filter = IncrementalInputFilter::new(
            &container,
            ["A.java".to_string()],
            LibraryDependencies::default(),
            &FilterOptions::default(),
            &sink,
        );
        assert_eq!(filter.rebuild_reason(), Some(RebuildReason::CorruptState));
        let diags = sink.take_all();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::CORRUPT_INCREMENTAL_STATE);
    }

    #[test]
    fn changed_libraries_rebuild_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        previous().save(&container).unwrap();
        let mut libraries = LibraryDependencies::default();
        libraries.imports.push(crate::library_deps::LibraryFingerprint {
            location: PathBuf::from("new.jar"),
            digest: dexon_common::ContentHash::from_bytes(b"new"),
        });

        let sink = DiagnosticSink::new();
        let sources = || ["A.java".to_string()];
        let filter = IncrementalInputFilter::new(
            &container,
            sources(),
            libraries.clone(),
            &FilterOptions::default(),
            &sink,
        );
        assert!(!filter.needs_full_rebuild());

        let options = FilterOptions {
            auto_full_rebuild: true,
            library_base: dir.path().to_path_buf(),
        };
        let filter = IncrementalInputFilter::new(&container, sources(), libraries, &options, &sink);
        assert_eq!(filter.rebuild_reason(), Some(RebuildReason::LibrariesChanged));
        // Deleted files are still reported on a full rebuild.
        assert_eq!(
            filter.changes().deleted,
            set(&["B.java", "C.java", "D.java", "E.java"])
        );
        assert!(sink.contains(DiagnosticCode::LIBRARY_CHANGED));
    }
}
