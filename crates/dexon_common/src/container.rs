//! Resource containers for dex output and incremental state.
//!
//! A [`Container`] hands out writable and readable streams keyed by a
//! [`FileKind`] and a relative name. Writes go through an [`AtomicFile`]:
//! bytes land in a temporary file next to the target and only replace the
//! target on [`AtomicFile::commit`]. Dropping an uncommitted file discards it,
//! so an aborted compilation never leaves a half-written dex or dependency
//! file behind.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

/// The kind of resource stored in a container.
///
/// Each kind lives in its own subdirectory of the container root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Final `classes*.dex` output.
    Dex,
    /// Single-type dex fragment kept by incremental builds.
    DexFragment,
    /// Serialized compiled type kept by incremental builds.
    Compiled,
    /// Persisted dependency maps.
    Dependencies,
}

impl FileKind {
    /// Returns the subdirectory, relative to the container root, holding
    /// resources of this kind. `Dex` output lives at the root.
    pub fn subdir(self) -> &'static str {
        match self {
            FileKind::Dex => "",
            FileKind::DexFragment => "dex",
            FileKind::Compiled => "compiled",
            FileKind::Dependencies => "deps",
        }
    }
}

/// A writable stream whose contents replace the target only on commit.
pub struct AtomicFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl AtomicFile {
    /// Creates a temporary file in the target's directory, creating the
    /// directory if needed.
    pub fn create(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let temp = NamedTempFile::new_in(parent)?;
        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Returns the path the file will be renamed to on commit.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flushes and renames the temporary file over the target.
    pub fn commit(mut self) -> io::Result<()> {
        self.temp.flush()?;
        self.temp.as_file().sync_all()?;
        self.temp.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Abstraction over where dex files and incremental state are stored.
pub trait Container: Send + Sync {
    /// Returns a writable stream for `name`. Nothing is visible until the
    /// returned file is committed.
    fn create_file(&self, kind: FileKind, name: &str) -> io::Result<AtomicFile>;

    /// Opens `name` for reading.
    fn get_file(&self, kind: FileKind, name: &str) -> io::Result<Box<dyn Read>>;

    /// Deletes `name`. Returns `Ok(false)` if it did not exist.
    fn delete_file(&self, kind: FileKind, name: &str) -> io::Result<bool>;

    /// Returns the last modification time of `name`, if it exists.
    fn modified(&self, kind: FileKind, name: &str) -> Option<SystemTime>;

    /// Lists every resource of `kind` as a `/`-separated relative name, sorted.
    fn list(&self, kind: FileKind) -> io::Result<Vec<String>>;

    /// Returns a human-readable location for `name`, used in error messages.
    fn location(&self, kind: FileKind, name: &str) -> PathBuf;
}

/// A container backed by a directory on the local file system.
#[derive(Clone, Debug)]
pub struct DirectoryContainer {
    root: PathBuf,
}

impl DirectoryContainer {
    /// Creates a container rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the container root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: FileKind) -> PathBuf {
        match kind.subdir() {
            "" => self.root.clone(),
            sub => self.root.join(sub),
        }
    }
}

impl Container for DirectoryContainer {
    fn create_file(&self, kind: FileKind, name: &str) -> io::Result<AtomicFile> {
        AtomicFile::create(&self.location(kind, name))
    }

    fn get_file(&self, kind: FileKind, name: &str) -> io::Result<Box<dyn Read>> {
        let file = std::fs::File::open(self.location(kind, name))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn delete_file(&self, kind: FileKind, name: &str) -> io::Result<bool> {
        match std::fs::remove_file(self.location(kind, name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn modified(&self, kind: FileKind, name: &str) -> Option<SystemTime> {
        std::fs::metadata(self.location(kind, name))
            .and_then(|m| m.modified())
            .ok()
    }

    fn list(&self, kind: FileKind) -> io::Result<Vec<String>> {
        let base = self.kind_dir(kind);
        let mut names = Vec::new();
        if !base.is_dir() {
            return Ok(names);
        }
        // Dex output shares the root with the other kinds' subdirectories.
        let recurse = kind != FileKind::Dex;
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    if recurse {
                        stack.push(path);
                    }
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(&base) {
                    let parts: Vec<_> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    names.push(parts.join("/"));
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self, kind: FileKind, name: &str) -> PathBuf {
        let mut path = self.kind_dir(kind);
        for part in name.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}
