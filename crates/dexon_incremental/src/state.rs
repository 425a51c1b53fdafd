//! Loading and saving the dependency state of a build.

use crate::error::IncrementalError;
use crate::file_deps::FileDependencies;
use crate::library_deps::LibraryDependencies;
use crate::type_deps::TypeDependencies;
use dexon_common::{AtomicFile, Container, FileKind};
use std::io::{self, Read, Write};
use std::time::SystemTime;

/// Name of the file-to-types map.
pub const FILES_NAME: &str = "files.deps";
/// Name of the type-to-dependencies map.
pub const TYPES_NAME: &str = "types.deps";
/// Name of the library fingerprints.
pub const LIBRARIES_NAME: &str = "libraries.json";

/// Everything persisted after a successful build.
#[derive(Debug, Default)]
pub struct DependencyState {
    /// Which types each source file defines.
    pub files: FileDependencies,
    /// What each type depends on.
    pub types: TypeDependencies,
    /// The libraries the build compiled against.
    pub libraries: LibraryDependencies,
}

impl DependencyState {
    /// Loads the state of the previous build.
    ///
    /// Returns `Ok(None)` when no state was ever written. A partial or
    /// malformed state is a recoverable [`IncrementalError::Format`].
    pub fn load(container: &dyn Container) -> Result<Option<Self>, IncrementalError> {
        let present: Vec<bool> = [FILES_NAME, TYPES_NAME, LIBRARIES_NAME]
            .iter()
            .map(|name| container.modified(FileKind::Dependencies, name).is_some())
            .collect();
        if present.iter().all(|p| !p) {
            return Ok(None);
        }
        if !present.iter().all(|p| *p) {
            return Err(IncrementalError::Format {
                path: container.location(FileKind::Dependencies, ""),
                line: 0,
                reason: "incomplete dependency state".to_string(),
            });
        }

        let files = read_with(container, FILES_NAME, FileDependencies::read)?;
        let types = read_with(container, TYPES_NAME, TypeDependencies::read)?;
        let libraries = read_with(container, LIBRARIES_NAME, LibraryDependencies::read)?;
        Ok(Some(Self {
            files,
            types,
            libraries,
        }))
    }

    /// When the state was last saved.
    pub fn saved_at(container: &dyn Container) -> Option<SystemTime> {
        container.modified(FileKind::Dependencies, FILES_NAME)
    }

    /// Saves the state. Every file is fully written before any replaces
    /// its predecessor, and the file map is replaced last.
    pub fn save(&self, container: &dyn Container) -> Result<(), IncrementalError> {
        let libraries = write_with(container, LIBRARIES_NAME, |out| self.libraries.write(out))?;
        let types = write_with(container, TYPES_NAME, |out| self.types.write(out))?;
        let files = write_with(container, FILES_NAME, |out| self.files.write(out))?;
        for (name, file) in [
            (LIBRARIES_NAME, libraries),
            (TYPES_NAME, types),
            (FILES_NAME, files),
        ] {
            file.commit().map_err(|source| persist_err(container, name, source))?;
        }
        tracing::info!(
            files = self.files.len(),
            types = self.types.len(),
            "saved dependency state"
        );
        Ok(())
    }
}

fn read_with<T>(
    container: &dyn Container,
    name: &str,
    read: impl FnOnce(&mut dyn Read, &std::path::Path) -> Result<T, IncrementalError>,
) -> Result<T, IncrementalError> {
    let path = container.location(FileKind::Dependencies, name);
    let mut input = container
        .get_file(FileKind::Dependencies, name)
        .map_err(|e| IncrementalError::Format {
            path: path.clone(),
            line: 0,
            reason: e.to_string(),
        })?;
    read(&mut input, &path)
}

fn write_with(
    container: &dyn Container,
    name: &str,
    write: impl FnOnce(&mut dyn Write) -> Result<(), IncrementalError>,
) -> Result<AtomicFile, IncrementalError> {
    let mut file = container
        .create_file(FileKind::Dependencies, name)
        .map_err(|source| persist_err(container, name, source))?;
    write(&mut file)?;
    Ok(file)
}

fn persist_err(container: &dyn Container, name: &str, source: io::Error) -> IncrementalError {
    IncrementalError::Io {
        path: container.location(FileKind::Dependencies, name),
        op: "write",
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_deps::LibraryFingerprint;
    use dexon_common::{ContentHash, DirectoryContainer};
    use std::path::PathBuf;

    fn state() -> DependencyState {
        let mut state = DependencyState::default();
        state.files.add_file("src/A.java", ["LA;"]);
        state.files.add_file("src/BC.java", ["LB;", "LC;"]);
        state.files.add_file("src/package-info.java", std::iter::empty::<String>());
        state.types.add("LA;", ["LB;", "Ljava/lang/Object;"]);
        state.types.add("LB;", ["LC;"]);
        state.types.add("LC;", ["LB;"]);
        state.libraries.classpath.push(LibraryFingerprint {
            location: PathBuf::from("libs/util.jar"),
            digest: ContentHash::from_bytes(b"util"),
        });
        state
    }

    fn assert_same(a: &DependencyState, b: &DependencyState) {
        let files = |s: &DependencyState| {
            s.files
                .compiled_files()
                .map(|f| (f.to_string(), s.files.type_names(f).map(str::to_string).collect::<Vec<_>>()))
                .collect::<Vec<_>>()
        };
        assert_eq!(files(a), files(b));
        assert_eq!(a.types.recompile_dependencies(), b.types.recompile_dependencies());
        assert_eq!(a.types.len(), b.types.len());
        assert_eq!(a.libraries, b.libraries);
    }

    #[test]
    fn nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        assert!(DependencyState::load(&container).unwrap().is_none());
        assert!(DependencyState::saved_at(&container).is_none());
    }

    #[test]
    fn save_then_load() {
        let shapes = [
            DependencyState::default(),
            {
                let mut single = DependencyState::default();
                single.files.add_file("A.java", ["LA;"]);
                single.types.add("LA;", std::iter::empty::<String>());
                single
            },
            state(),
        ];
        for original in shapes {
            let dir = tempfile::tempdir().unwrap();
            let container = DirectoryContainer::new(dir.path());
            original.save(&container).unwrap();
            let loaded = DependencyState::load(&container).unwrap().unwrap();
            assert_same(&original, &loaded);
            assert!(DependencyState::saved_at(&container).is_some());
        }
    }

    #[test]
    fn partial_state_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        state().save(&container).unwrap();
        container
            .delete_file(FileKind::Dependencies, TYPES_NAME)
            .unwrap();
        let err = DependencyState::load(&container).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn garbled_state_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let container = DirectoryContainer::new(dir.path());
        state().save(&container).unwrap();
        std::fs::write(
            container.location(FileKind::Dependencies, FILES_NAME),
            "something else entirely\n",
        )
        .unwrap();
        let err = DependencyState::load(&container).unwrap_err();
        assert!(matches!(err, IncrementalError::Format { line: 1, .. }));
    }
}
