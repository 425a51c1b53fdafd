//! One build of a project, from source selection to persisted state.

use crate::error::{DriverError, DriverResult};
use crate::frontend::Frontend;
use dexon_common::{Container, DirectoryContainer, FileKind};
use dexon_config::ProjectConfig;
use dexon_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use dexon_dex::{
    dex_fragment, trace_main_dex, write_dex_files, DexFileSummary, DexInput, DexOptions,
    MainDexSeeds,
};
use dexon_incremental::{
    ArtifactStore, ChangeSet, CompiledUnit, FilterOptions, IncrementalError,
    IncrementalInputFilter, LibraryDependencies, RebuildReason, ReconcileSummary,
};
use dexon_ir::{CompilationSession, CompiledType};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a build would do, without doing it.
#[derive(Clone, Debug, Default)]
pub struct BuildPlan {
    /// `false` when no incremental folder is configured.
    pub incremental: bool,
    /// Why everything would be compiled, if it would.
    pub rebuild: Option<RebuildReason>,
    /// How the sources relate to the previous build.
    pub changes: ChangeSet,
    /// Files to compile, dependencies first.
    pub files_to_compile: Vec<String>,
    /// Nothing to compile, but the output must be merged again.
    pub remerge: bool,
    /// Nothing changed at all.
    pub up_to_date: bool,
}

/// What a build did.
#[derive(Clone, Debug, Default)]
pub struct BuildOutcome {
    /// The output was already current; nothing was written.
    pub up_to_date: bool,
    /// Why everything was compiled, if it was.
    pub rebuild: Option<RebuildReason>,
    /// Files handed to the frontend, in order.
    pub compiled_files: Vec<String>,
    /// Types taken unchanged from the previous build.
    pub reused_types: usize,
    /// The dex files written.
    pub dex_files: Vec<DexFileSummary>,
    /// The incremental bookkeeping, when incremental builds are enabled.
    pub reconcile: Option<ReconcileSummary>,
}

/// Runs builds of one project.
pub struct BuildSession<'a> {
    config: &'a ProjectConfig,
    project_dir: PathBuf,
    sink: &'a DiagnosticSink,
}

impl<'a> BuildSession<'a> {
    /// Creates a session for the project rooted at `project_dir`.
    pub fn new(
        config: &'a ProjectConfig,
        project_dir: impl Into<PathBuf>,
        sink: &'a DiagnosticSink,
    ) -> Self {
        Self {
            config,
            project_dir: project_dir.into(),
            sink,
        }
    }

    /// The project directory.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Where `classes*.dex` are written.
    pub fn output(&self) -> DirectoryContainer {
        DirectoryContainer::new(self.project_dir.join(&self.config.output.dir))
    }

    /// Where incremental state is kept, if incremental builds are enabled.
    pub fn incremental_state(&self) -> Option<DirectoryContainer> {
        self.config
            .incremental
            .folder
            .as_ref()
            .map(|folder| DirectoryContainer::new(self.project_dir.join(folder)))
    }

    /// Classifies `sources` and reports what a build would compile.
    pub fn plan(&self, sources: &[String]) -> DriverResult<BuildPlan> {
        let libraries = self.libraries()?;
        let Some(state) = self.incremental_state() else {
            let mut files = sources.to_vec();
            files.sort();
            return Ok(BuildPlan {
                changes: ChangeSet {
                    added: files.iter().cloned().collect(),
                    ..ChangeSet::default()
                },
                files_to_compile: files,
                ..BuildPlan::default()
            });
        };
        let filter = self.filter(&state, sources, libraries);
        Ok(BuildPlan {
            incremental: true,
            rebuild: filter.rebuild_reason(),
            changes: filter.changes().clone(),
            files_to_compile: filter.ordered_files_to_compile(),
            remerge: filter.needs_remerge(),
            up_to_date: filter.is_up_to_date(),
        })
    }

    /// Builds `sources` with `frontend`.
    ///
    /// With an incremental folder, only the files the filter selects are
    /// compiled; everything else is loaded from the previous build. The
    /// incremental state is only updated once the dex output is written.
    #[tracing::instrument(level = "debug", skip_all, fields(frontend = frontend.name(), sources = sources.len()))]
    pub fn build(&self, frontend: &dyn Frontend, sources: &[String]) -> DriverResult<BuildOutcome> {
        let libraries = self.libraries()?;
        let options = DexOptions::from_config(&self.config.dex);

        let Some(state) = self.incremental_state() else {
            let mut files = sources.to_vec();
            files.sort();
            let units = self.compile(frontend, &files)?;
            let types = collect_types(&units, Vec::new())?;
            let dex_files = self.write_output(types, &options)?;
            return Ok(BuildOutcome {
                compiled_files: files,
                dex_files,
                ..BuildOutcome::default()
            });
        };

        let mut filter = self.filter(&state, sources, libraries);
        let output = self.output();
        if filter.is_up_to_date() && output.modified(FileKind::Dex, "classes.dex").is_some() {
            tracing::info!("output is up to date");
            return Ok(BuildOutcome {
                up_to_date: true,
                ..BuildOutcome::default()
            });
        }

        let reused = match filter.load_reused() {
            Ok(reused) => reused,
            Err(err) if err.is_recoverable() => {
                self.sink.emit(err.to_diagnostic());
                filter.force_full_rebuild(RebuildReason::CorruptState);
                Vec::new()
            }
            Err(err) => return Err(self.incremental_failure(err)),
        };
        if filter.needs_remerge() {
            tracing::info!(
                deleted = filter.changes().deleted.len(),
                "no file to compile; merging stored types again"
            );
        }

        let files = filter.ordered_files_to_compile();
        let units = self.compile(frontend, &files)?;
        let reused_types = reused.len();
        let types = collect_types(&units, reused)?;
        let dex_files = self.write_output(types, &options)?;

        let fragments = self.encode_fragments(&units, &options)?;
        let rebuild = filter.rebuild_reason();
        let summary = filter
            .reconcile(&units, &fragments)
            .map_err(|err| self.incremental_failure(err))?;
        Ok(BuildOutcome {
            up_to_date: false,
            rebuild,
            compiled_files: files,
            reused_types,
            dex_files,
            reconcile: Some(summary),
        })
    }

    /// Writes `classes*.dex` again from every compiled type stored by
    /// earlier builds.
    pub fn merge(&self) -> DriverResult<Vec<DexFileSummary>> {
        let state = self.incremental_state().ok_or(DriverError::NoIncrementalFolder)?;
        let store = ArtifactStore::new(&state);
        let names = store
            .compiled_types()
            .map_err(|err| self.incremental_failure(err))?;
        let types = names
            .par_iter()
            .map(|name| store.read_compiled(name).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| self.incremental_failure(err))?;
        tracing::info!(types = types.len(), "merging stored types");
        self.write_output(types, &DexOptions::from_config(&self.config.dex))
    }

    fn libraries(&self) -> DriverResult<LibraryDependencies> {
        Ok(LibraryDependencies::collect(
            &self.config.libraries,
            &self.project_dir,
            self.sink,
        )?)
    }

    fn filter<'s>(
        &self,
        state: &'s DirectoryContainer,
        sources: &[String],
        libraries: LibraryDependencies,
    ) -> IncrementalInputFilter<'s> {
        let options = FilterOptions {
            auto_full_rebuild: self.config.incremental.auto_full_rebuild,
            library_base: self.project_dir.clone(),
        };
        IncrementalInputFilter::new(state, sources.iter().cloned(), libraries, &options, self.sink)
    }

    fn compile(&self, frontend: &dyn Frontend, files: &[String]) -> DriverResult<Vec<CompiledUnit>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let _span = tracing::info_span!("frontend", files = files.len()).entered();
        let units = frontend.compile(files, self.sink).map_err(|err| {
            let mut diag = Diagnostic::error(DiagnosticCode::FRONTEND_FAILURE, err.reason.clone());
            if let Some(file) = &err.file {
                diag = diag.at(file.clone());
            }
            self.sink.emit(diag);
            DriverError::Frontend(err)
        })?;
        tracing::info!(
            files = units.len(),
            types = units.iter().map(|u| u.types.len()).sum::<usize>(),
            "compiled sources"
        );
        Ok(units)
    }

    fn write_output(
        &self,
        types: Vec<Arc<CompiledType>>,
        options: &DexOptions,
    ) -> DriverResult<Vec<DexFileSummary>> {
        let mode = self.config.dex.multidex;
        let main_dex = if mode.is_multidex() {
            let seeds = MainDexSeeds::from_config(&self.config.main_dex, &self.project_dir)?;
            trace_main_dex(&types, &seeds)
        } else {
            BTreeSet::new()
        };
        let input = DexInput::new(types).with_main_dex(main_dex);
        Ok(write_dex_files(mode, &input, options, &self.output(), self.sink)?)
    }

    fn encode_fragments(
        &self,
        units: &[CompiledUnit],
        options: &DexOptions,
    ) -> DriverResult<HashMap<String, Vec<u8>>> {
        units
            .par_iter()
            .flat_map_iter(|unit| unit.types.iter())
            .map(|ty| {
                dex_fragment(Arc::clone(ty), options).map(|image| (ty.descriptor.clone(), image))
            })
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|err| {
                self.sink.emit(err.to_diagnostic());
                DriverError::Dex(err)
            })
    }

    fn incremental_failure(&self, err: IncrementalError) -> DriverError {
        self.sink.emit(err.to_diagnostic());
        DriverError::Incremental(err)
    }
}

/// Freshly compiled types first, then reused ones. A type defined twice is
/// an internal error.
fn collect_types(
    units: &[CompiledUnit],
    reused: Vec<Arc<CompiledType>>,
) -> DriverResult<Vec<Arc<CompiledType>>> {
    let mut session = CompilationSession::new();
    let compiled = units.iter().flat_map(|unit| unit.types.iter().cloned());
    for ty in compiled.chain(reused) {
        session.add_shared(ty)?;
    }
    Ok(session.into_types())
}
