//! Source file discovery.

use crate::error::{DriverError, DriverResult};
use std::path::{Path, PathBuf};

/// Expands `paths` into the Java source files of a build.
///
/// Files are taken as given; directories are searched recursively for
/// `.java` files. The result is sorted and free of duplicates.
pub fn collect_sources(paths: &[PathBuf]) -> DriverResult<Vec<String>> {
    let mut files = Vec::new();
    for path in paths {
        let meta = std::fs::metadata(path).map_err(|source| DriverError::Sources {
            path: path.clone(),
            source,
        })?;
        if meta.is_dir() {
            walk_dir(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    let mut names: Vec<String> = files
        .iter()
        .map(|f| f.to_string_lossy().into_owned())
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> DriverResult<()> {
    let read_err = |source| DriverError::Sources {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            walk_dir(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "java") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_java_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("src/com/example");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("B.java"), "").unwrap();
        std::fs::write(pkg.join("A.java"), "").unwrap();
        std::fs::write(pkg.join("notes.txt"), "").unwrap();
        let extra = dir.path().join("Extra.java");
        std::fs::write(&extra, "").unwrap();

        let found = collect_sources(&[dir.path().join("src"), extra.clone(), pkg.join("A.java")])
            .unwrap();
        let expected: Vec<String> = {
            let mut v = vec![
                pkg.join("A.java").to_string_lossy().into_owned(),
                pkg.join("B.java").to_string_lossy().into_owned(),
                extra.to_string_lossy().into_owned(),
            ];
            v.sort();
            v
        };
        assert_eq!(found, expected);
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_sources(&[dir.path().join("nope")]).unwrap_err();
        assert!(matches!(err, DriverError::Sources { .. }));
    }
}
