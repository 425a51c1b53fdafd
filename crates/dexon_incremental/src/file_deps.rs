//! File-level dependencies: which types each source file defines.

use crate::error::IncrementalError;
use crate::map::{DependencyMap, DependencyStats};
use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::path::Path;

const KIND: &str = "files";

/// Maps each compiled source file to the types it defines, and each type
/// back to its file. A type belongs to at most one file.
#[derive(Clone, Debug, Default)]
pub struct FileDependencies {
    files: DependencyMap,
    owners: HashMap<String, String>,
}

impl FileDependencies {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `file` defines `types`. A type previously owned by
    /// another file moves to `file`. A file defining no type is still
    /// recorded.
    pub fn add_file<I, S>(&mut self, file: &str, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        for ty in &types {
            if let Some(previous) = self.owners.insert(ty.clone(), file.to_string()) {
                if previous != file {
                    tracing::debug!(ty = %ty, from = %previous, to = %file, "type moved to another file");
                    self.files.remove_value(&previous, ty);
                }
            }
        }
        self.files.insert(file, types);
    }

    /// Types defined by `file`; empty for an unknown file.
    pub fn type_names<'a>(&'a self, file: &str) -> impl Iterator<Item = &'a str> {
        self.files
            .get(file)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// The file defining `ty`.
    pub fn java_file_name(&self, ty: &str) -> Option<&str> {
        self.owners.get(ty).map(String::as_str)
    }

    /// Every recorded file, sorted.
    pub fn compiled_files(&self) -> impl Iterator<Item = &str> {
        self.files.keys()
    }

    /// Returns `true` if `file` is recorded.
    pub fn contains_file(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    /// Every recorded type.
    pub fn all_types(&self) -> BTreeSet<&str> {
        self.owners.keys().map(String::as_str).collect()
    }

    /// Number of recorded files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no file is recorded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Forgets deleted and modified files together with their types.
    /// Modified files are added back once they are recompiled.
    pub fn update(&mut self, deleted: &BTreeSet<String>, modified: &BTreeSet<String>) {
        for file in deleted.iter().chain(modified) {
            if let Some(types) = self.files.remove(file) {
                for ty in types {
                    if self.owners.get(&ty).is_some_and(|owner| owner == file) {
                        self.owners.remove(&ty);
                    }
                }
            }
        }
    }

    /// Size statistics.
    pub fn stats(&self) -> DependencyStats {
        self.files.stats()
    }

    /// Reads the map. `path` is only used in error messages.
    pub fn read(input: &mut dyn Read, path: &Path) -> Result<Self, IncrementalError> {
        let files = DependencyMap::read_from(KIND, input, path)?;
        let mut owners = HashMap::new();
        for (file, types) in files.iter() {
            for ty in types {
                if let Some(other) = owners.insert(ty.clone(), file.to_string()) {
                    return Err(IncrementalError::Format {
                        path: path.to_path_buf(),
                        line: 0,
                        reason: format!("type {ty} is defined by both {other} and {file}"),
                    });
                }
            }
        }
        let stats = files.stats();
        tracing::debug!(
            files = stats.entries,
            types = owners.len(),
            max = stats.max,
            "read file dependencies"
        );
        Ok(Self { files, owners })
    }

    /// Writes the map.
    pub fn write(&self, out: &mut dyn Write) -> Result<(), IncrementalError> {
        self.files.write_to(KIND, out)?;
        tracing::debug!(files = self.files.len(), types = self.owners.len(), "wrote file dependencies");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> FileDependencies {
        let mut files = FileDependencies::new();
        files.add_file("src/A.java", ["LA;", "LA$1;"]);
        files.add_file("src/B.java", ["LB;"]);
        files.add_file("src/package-info.java", std::iter::empty::<String>());
        files
    }

    #[test]
    fn lookups() {
        let files = sample();
        assert_eq!(files.type_names("src/A.java").collect::<Vec<_>>(), vec!["LA$1;", "LA;"]);
        assert_eq!(files.java_file_name("LB;"), Some("src/B.java"));
        assert_eq!(files.java_file_name("LZ;"), None);
        assert_eq!(files.type_names("src/Z.java").count(), 0);
        assert_eq!(
            files.compiled_files().collect::<Vec<_>>(),
            vec!["src/A.java", "src/B.java", "src/package-info.java"]
        );
        assert_eq!(files.all_types().len(), 3);
    }

    #[test]
    fn moved_type_is_reassigned() {
        let mut files = sample();
        files.add_file("src/C.java", ["LB;"]);
        assert_eq!(files.java_file_name("LB;"), Some("src/C.java"));
        assert_eq!(files.type_names("src/B.java").count(), 0);
    }

    #[test]
    fn update_forgets_files_and_types() {
        let mut files = sample();
        files.update(&set(&["src/A.java"]), &set(&["src/B.java"]));
        assert_eq!(files.len(), 1);
        assert!(!files.contains_file("src/A.java"));
        assert_eq!(files.java_file_name("LA;"), None);
        assert_eq!(files.java_file_name("LB;"), None);
    }

    #[test]
    fn persisted_form_reads_back() {
        let files = sample();
        let mut out = Vec::new();
        files.write(&mut out).unwrap();
        let read = FileDependencies::read(&mut out.as_slice(), Path::new("files.deps")).unwrap();
        assert_eq!(read.files, files.files);
        assert_eq!(read.owners, files.owners);
        assert!(read.contains_file("src/package-info.java"));
    }

    #[test]
    fn type_in_two_files_is_corrupt() {
        let text = "dexon-dependencies 1 files\nA.java\n\tLA;\nB.java\n\tLA;\n";
        let err = FileDependencies::read(&mut text.as_bytes(), Path::new("files.deps")).unwrap_err();
        assert!(err.is_recoverable());
    }
}
