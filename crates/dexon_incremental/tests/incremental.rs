use dexon_common::{Container, DirectoryContainer, FileKind};
use dexon_config::LibrariesConfig;
use dexon_diagnostics::{DiagnosticCode, DiagnosticSink};
use dexon_incremental::{
    ArtifactStore, CompiledUnit, FilterOptions, IncrementalInputFilter, LibraryDependencies,
    RebuildReason,
};
use dexon_ir::{CompiledType, FieldDef};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

struct Project {
    src: tempfile::TempDir,
    state: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            src: tempfile::tempdir().unwrap(),
            state: tempfile::tempdir().unwrap(),
        }
    }

    fn container(&self) -> DirectoryContainer {
        DirectoryContainer::new(self.state.path())
    }

    fn path(&self, name: &str) -> PathBuf {
        self.src.path().join(name)
    }

    fn key(&self, name: &str) -> String {
        self.path(name).to_string_lossy().into_owned()
    }

    /// Writes a source file with a modification time an hour in the past.
    fn write_source(&self, name: &str) {
        let path = self.path(name);
        std::fs::write(&path, format!("// {name}\n")).unwrap();
        set_mtime(&path, SystemTime::now() - Duration::from_secs(3600));
    }

    fn touch(&self, name: &str) {
        set_mtime(&self.path(name), SystemTime::now() + Duration::from_secs(60));
    }

    fn filter<'a>(&self, container: &'a DirectoryContainer, sources: &[&str]) -> IncrementalInputFilter<'a> {
        self.filter_with(container, sources, LibraryDependencies::default())
    }

    fn filter_with<'a>(
        &self,
        container: &'a DirectoryContainer,
        sources: &[&str],
        libraries: LibraryDependencies,
    ) -> IncrementalInputFilter<'a> {
        IncrementalInputFilter::new(
            container,
            sources.iter().map(|s| self.key(s)),
            libraries,
            &FilterOptions::default(),
            &DiagnosticSink::new(),
        )
    }

    fn libraries(&self, imports: &[&str], sink: &DiagnosticSink) -> LibraryDependencies {
        let config = LibrariesConfig {
            imports: imports.iter().map(PathBuf::from).collect(),
            ..LibrariesConfig::default()
        };
        LibraryDependencies::collect(&config, self.src.path(), sink).unwrap()
    }

    fn unit(&self, name: &str, types: Vec<CompiledType>) -> CompiledUnit {
        CompiledUnit {
            source: self.key(name),
            types: types.into_iter().map(Arc::new).collect(),
        }
    }
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn fragments(units: &[CompiledUnit]) -> HashMap<String, Vec<u8>> {
    units
        .iter()
        .flat_map(|u| &u.types)
        .map(|ty| (ty.descriptor.clone(), format!("dex {}", ty.descriptor).into_bytes()))
        .collect()
}

fn depends_on(name: &str, dependency: &str) -> CompiledType {
    CompiledType::new(name).with_field(FieldDef::new("dep", dependency, 0))
}

fn reconcile(filter: IncrementalInputFilter<'_>, units: &[CompiledUnit]) {
    filter.reconcile(units, &fragments(units)).unwrap();
}

#[test]
fn changing_a_dependency_recompiles_its_dependents_only() {
    let project = Project::new();
    let container = project.container();
    for name in ["A.java", "B.java", "C.java"] {
        project.write_source(name);
    }

    let first = project.filter(&container, &["A.java", "B.java", "C.java"]);
    assert!(first.needs_full_rebuild());
    let units = vec![
        project.unit("A.java", vec![depends_on("LA;", "LB;")]),
        project.unit("B.java", vec![CompiledType::new("LB;")]),
        project.unit("C.java", vec![CompiledType::new("LC;")]),
    ];
    reconcile(first, &units);

    project.touch("B.java");
    let second = project.filter(&container, &["A.java", "B.java", "C.java"]);
    assert!(!second.needs_full_rebuild());
    assert_eq!(
        second.files_to_compile(),
        &BTreeSet::from([project.key("A.java"), project.key("B.java")])
    );
    assert_eq!(second.changes().modified, BTreeSet::from([project.key("B.java")]));
    assert_eq!(second.reused_types(), BTreeSet::from(["LC;".to_string()]));
    let reused = second.load_reused().unwrap();
    assert_eq!(reused.len(), 1);
    assert_eq!(reused[0].descriptor, "LC;");
    // B must be compiled before A, which depends on it.
    assert_eq!(
        second.ordered_files_to_compile(),
        vec![project.key("B.java"), project.key("A.java")]
    );
}

#[test]
fn deleting_a_file_removes_all_its_artifacts() {
    let project = Project::new();
    let container = project.container();
    project.write_source("A.java");
    project.write_source("B.java");

    let first = project.filter(&container, &["A.java", "B.java"]);
    let units = vec![
        project.unit("A.java", vec![CompiledType::new("LA;")]),
        project.unit(
            "B.java",
            vec![CompiledType::new("LB;"), CompiledType::new("LB$Helper;")],
        ),
    ];
    reconcile(first, &units);

    let store = ArtifactStore::new(&container);
    assert_eq!(store.compiled_types().unwrap(), vec!["LA;", "LB$Helper;", "LB;"]);
    assert_eq!(container.list(FileKind::DexFragment).unwrap().len(), 3);

    std::fs::remove_file(project.path("B.java")).unwrap();
    let second = project.filter(&container, &["A.java"]);
    assert_eq!(second.changes().deleted, BTreeSet::from([project.key("B.java")]));
    assert!(second.files_to_compile().is_empty());
    assert!(second.needs_remerge());
    let summary = second.reconcile(&[], &HashMap::new()).unwrap();
    assert_eq!(summary.removed_types, 2);
    assert_eq!(summary.types, BTreeSet::from(["LA;".to_string()]));

    assert_eq!(store.compiled_types().unwrap(), vec!["LA;"]);
    assert_eq!(container.list(FileKind::DexFragment).unwrap(), vec!["A.dex"]);

    let third = project.filter(&container, &["A.java"]);
    assert!(third.files_to_compile().is_empty());
    assert!(third.changes().deleted.is_empty());
    assert!(third.is_up_to_date());
}

#[test]
fn full_rebuild_clears_previous_artifacts() {
    let project = Project::new();
    let container = project.container();
    project.write_source("Old.java");
    let first = project.filter(&container, &["Old.java"]);
    let units = vec![project.unit("Old.java", vec![CompiledType::new("LOld;")])];
    reconcile(first, &units);

    // Losing the state makes the next build start over.
    std::fs::remove_dir_all(project.state.path().join("deps")).unwrap();
    project.write_source("New.java");
    let second = project.filter(&container, &["New.java"]);
    assert!(second.needs_full_rebuild());
    let units = vec![project.unit("New.java", vec![CompiledType::new("LNew;")])];
    let summary = second.reconcile(&units, &fragments(&units)).unwrap();
    assert_eq!(summary.removed_types, 1);
    assert_eq!(
        ArtifactStore::new(&container).compiled_types().unwrap(),
        vec!["LNew;"]
    );
}

#[test]
fn unreadable_import_forces_full_rebuild() {
    let project = Project::new();
    let container = project.container();
    project.write_source("A.java");
    std::fs::write(project.path("lib.jar"), b"PK\x03\x04").unwrap();

    let sink = DiagnosticSink::new();
    let libraries = project.libraries(&["lib.jar"], &sink);
    assert!(libraries.is_complete());
    let first = project.filter_with(&container, &["A.java"], libraries);
    let units = vec![project.unit("A.java", vec![CompiledType::new("LA;")])];
    reconcile(first, &units);
    assert!(project.filter(&container, &["A.java"]).is_up_to_date());

    std::fs::remove_file(project.path("lib.jar")).unwrap();
    let libraries = project.libraries(&["lib.jar"], &sink);
    assert!(sink.contains(DiagnosticCode::BAD_CLASSPATH_ENTRY));
    assert!(!sink.has_errors());

    let second = project.filter_with(&container, &["A.java"], libraries);
    assert!(second.needs_full_rebuild());
    assert_eq!(second.rebuild_reason(), Some(RebuildReason::UnreadableLibrary));
    assert_eq!(
        second.files_to_compile(),
        &BTreeSet::from([project.key("A.java")])
    );
}
