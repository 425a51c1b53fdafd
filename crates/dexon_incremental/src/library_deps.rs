//! Fingerprints of the libraries a build compiled against.
//!
//! A library is a jar or a directory of class files. Its fingerprint is the
//! XXH3 hash of its bytes; a directory is hashed over its files' relative
//! paths and contents in sorted order. The fingerprints of the previous
//! build are kept as pretty-printed JSON next to the dependency maps.

use crate::error::IncrementalError;
use dexon_common::{ContentHash, ContentHasher};
use dexon_config::LibrariesConfig;
use dexon_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One library and the hash of its contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFingerprint {
    /// The library as configured.
    pub location: PathBuf,
    /// Hash of its contents.
    pub digest: ContentHash,
}

/// The libraries of one build, in configuration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDependencies {
    /// Platform libraries.
    pub bootclasspath: Vec<LibraryFingerprint>,
    /// Libraries compiled against but not packaged.
    pub classpath: Vec<LibraryFingerprint>,
    /// Libraries whose classes are packaged into the output.
    pub imports: Vec<LibraryFingerprint>,
    /// Configured libraries that could not be read this build. Never saved.
    #[serde(skip)]
    pub unreadable: Vec<PathBuf>,
}

impl LibraryDependencies {
    /// Fingerprints every configured library. Relative locations are
    /// resolved against `base_dir`.
    ///
    /// An unreadable library is reported as a warning, skipped and listed
    /// in [`unreadable`](Self::unreadable), which makes the next filter
    /// rebuild everything. With `strict_classpath` it fails the build.
    pub fn collect(
        config: &LibrariesConfig,
        base_dir: &Path,
        sink: &DiagnosticSink,
    ) -> Result<Self, IncrementalError> {
        let mut unreadable = Vec::new();
        let mut fingerprint_all = |kind: &str,
                                   entries: &[PathBuf]|
         -> Result<Vec<LibraryFingerprint>, IncrementalError> {
            let mut out = Vec::with_capacity(entries.len());
            for location in entries {
                match fingerprint(&base_dir.join(location)) {
                    Ok(digest) => out.push(LibraryFingerprint {
                        location: location.clone(),
                        digest,
                    }),
                    Err(source) if config.strict_classpath => {
                        let err = IncrementalError::Library {
                            path: location.clone(),
                            source,
                        };
                        sink.emit(err.to_diagnostic());
                        return Err(err);
                    }
                    Err(source) => {
                        sink.emit(
                            Diagnostic::warning(
                                DiagnosticCode::BAD_CLASSPATH_ENTRY,
                                format!("ignoring {kind} entry: {source}"),
                            )
                            .at(location.display().to_string())
                            .with_help("set `strict_classpath = true` to make this an error"),
                        );
                        unreadable.push(location.clone());
                    }
                }
            }
            Ok(out)
        };

        let bootclasspath = fingerprint_all("bootclasspath", &config.bootclasspath)?;
        let classpath = fingerprint_all("classpath", &config.classpath)?;
        let imports = fingerprint_all("import", &config.imports)?;
        tracing::debug!(
            bootclasspath = bootclasspath.len(),
            classpath = classpath.len(),
            imports = imports.len(),
            unreadable = unreadable.len(),
            "fingerprinted libraries"
        );
        Ok(Self {
            bootclasspath,
            classpath,
            imports,
            unreadable,
        })
    }

    /// Returns `true` if every configured library could be read.
    pub fn is_complete(&self) -> bool {
        self.unreadable.is_empty()
    }

    /// Every fingerprinted library.
    pub fn all(&self) -> impl Iterator<Item = &LibraryFingerprint> {
        self.bootclasspath
            .iter()
            .chain(&self.classpath)
            .chain(&self.imports)
    }

    /// The most recent modification time among the libraries that still
    /// exist under `base_dir`.
    pub fn newest_modification(&self, base_dir: &Path) -> Option<SystemTime> {
        self.all()
            .filter_map(|lib| newest_in(&base_dir.join(&lib.location)).ok().flatten())
            .max()
    }

    /// Reads fingerprints saved by [`write`](Self::write).
    pub fn read(input: &mut dyn Read, path: &Path) -> Result<Self, IncrementalError> {
        serde_json::from_reader(input).map_err(|e| IncrementalError::Format {
            path: path.to_path_buf(),
            line: e.line(),
            reason: e.to_string(),
        })
    }

    /// Writes the fingerprints as pretty-printed JSON.
    pub fn write(&self, out: &mut dyn Write) -> Result<(), IncrementalError> {
        serde_json::to_writer_pretty(out, self).map_err(|e| IncrementalError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Hashes the library at `path`.
pub fn fingerprint(path: &Path) -> io::Result<ContentHash> {
    let meta = std::fs::metadata(path)?;
    if meta.is_file() {
        return Ok(ContentHash::from_bytes(&std::fs::read(path)?));
    }
    let mut hasher = ContentHasher::new();
    for (relative, file) in directory_files(path)? {
        hasher.update(relative.as_bytes());
        hasher.update(&[0]);
        hasher.update(&std::fs::read(&file)?);
    }
    Ok(hasher.finish())
}

/// Files below `root` with their `/`-separated relative names, sorted.
fn directory_files(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(root) {
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((name, path));
            }
        }
    }
    files.sort();
    Ok(files)
}

fn newest_in(path: &Path) -> io::Result<Option<SystemTime>> {
    let meta = std::fs::metadata(path)?;
    if meta.is_file() {
        return Ok(Some(meta.modified()?));
    }
    let mut newest = Some(meta.modified()?);
    for (_, file) in directory_files(path)? {
        let modified = std::fs::metadata(&file)?.modified()?;
        newest = newest.max(Some(modified));
    }
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(classpath: &[&str], imports: &[&str], strict: bool) -> LibrariesConfig {
        LibrariesConfig {
            bootclasspath: vec![],
            classpath: classpath.iter().map(PathBuf::from).collect(),
            imports: imports.iter().map(PathBuf::from).collect(),
            strict_classpath: strict,
        }
    }

    #[test]
    fn file_and_directory_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.jar"), b"PK\x03\x04").unwrap();
        std::fs::create_dir_all(dir.path().join("classes/com")).unwrap();
        std::fs::write(dir.path().join("classes/com/A.class"), b"\xca\xfe").unwrap();

        let jar = fingerprint(&dir.path().join("lib.jar")).unwrap();
        assert_eq!(jar, ContentHash::from_bytes(b"PK\x03\x04"));

        let classes = fingerprint(&dir.path().join("classes")).unwrap();
        assert_eq!(classes, fingerprint(&dir.path().join("classes")).unwrap());
        std::fs::write(dir.path().join("classes/com/B.class"), b"\xca\xfe").unwrap();
        assert_ne!(classes, fingerprint(&dir.path().join("classes")).unwrap());
    }

    #[test]
    fn missing_classpath_entry_warns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"a").unwrap();
        let sink = DiagnosticSink::new();
        let libs =
            LibraryDependencies::collect(&config(&["a.jar", "gone.jar"], &[], false), dir.path(), &sink)
                .unwrap();
        assert_eq!(libs.classpath.len(), 1);
        assert_eq!(libs.classpath[0].location, PathBuf::from("a.jar"));
        assert_eq!(libs.unreadable, vec![PathBuf::from("gone.jar")]);
        let diags = sink.take_all();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::BAD_CLASSPATH_ENTRY);
        assert!(!sink.has_errors());
    }

    #[test]
    fn missing_classpath_entry_fails_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let err = LibraryDependencies::collect(&config(&["gone.jar"], &[], true), dir.path(), &sink)
            .unwrap_err();
        assert!(matches!(err, IncrementalError::Library { .. }));
        assert!(sink.has_errors());
    }

    #[test]
    fn missing_import_warns_and_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"a").unwrap();
        let sink = DiagnosticSink::new();
        let libs =
            LibraryDependencies::collect(&config(&["a.jar"], &["gone.jar"], false), dir.path(), &sink)
                .unwrap();
        assert!(libs.imports.is_empty());
        assert_eq!(libs.unreadable, vec![PathBuf::from("gone.jar")]);
        assert!(!libs.is_complete());
        let diags = sink.take_all();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::BAD_CLASSPATH_ENTRY);
        assert!(diags[0].message.contains("import"));
        assert!(!sink.has_errors());
    }

    #[test]
    fn missing_import_fails_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let err = LibraryDependencies::collect(&config(&[], &["gone.jar"], true), dir.path(), &sink)
            .unwrap_err();
        assert!(matches!(err, IncrementalError::Library { .. }));
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn json_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"a").unwrap();
        std::fs::write(dir.path().join("b.jar"), b"b").unwrap();
        let sink = DiagnosticSink::new();
        let libs =
            LibraryDependencies::collect(&config(&["a.jar"], &["b.jar"], false), dir.path(), &sink)
                .unwrap();

        let mut out = Vec::new();
        libs.write(&mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains("\"imports\""));
        let read = LibraryDependencies::read(&mut out.as_slice(), Path::new("libraries.json")).unwrap();
        assert_eq!(read, libs);
        assert!(read.is_complete());
        assert!(libs.newest_modification(dir.path()).is_some());
    }

    #[test]
    fn corrupt_json_is_format_error() {
        let err = LibraryDependencies::read(&mut &b"{ not json"[..], Path::new("libraries.json"))
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
