//! The line-oriented text form of the dependency maps.
//!
//! A dependency file starts with a header line naming its kind:
//!
//! ```text
//! dexon-dependencies 1 types
//! Lcom/example/A;
//! 	Lcom/example/B;
//! 	Lcom/example/C;
//! Lcom/example/B;
//! ```
//!
//! Every key sits on its own line, followed by its values, one per line,
//! each prefixed with a tab. A key with no values is written alone. Keys and
//! values are written in sorted order, so a map always serializes to the
//! same bytes.

use crate::error::IncrementalError;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

const MAGIC: &str = "dexon-dependencies";
const FORMAT_VERSION: u32 = 1;

/// A sorted one-to-many map of names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyMap {
    entries: BTreeMap<String, BTreeSet<String>>,
}

/// Size statistics of a dependency map, logged after every load and save.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DependencyStats {
    /// Number of keys.
    pub entries: usize,
    /// Smallest value set.
    pub min: usize,
    /// Largest value set.
    pub max: usize,
    /// Mean value set size.
    pub average: f64,
}

impl DependencyMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `values` to the set of `key`, creating the key if needed.
    pub fn insert<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Returns the values of `key`.
    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes `key` and returns its values.
    pub fn remove(&mut self, key: &str) -> Option<BTreeSet<String>> {
        self.entries.remove(key)
    }

    /// Removes `value` from the set of `key`, keeping the key.
    pub fn remove_value(&mut self, key: &str, value: &str) {
        if let Some(values) = self.entries.get_mut(key) {
            values.remove(value);
        }
    }

    /// Iterates over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the size statistics.
    pub fn stats(&self) -> DependencyStats {
        if self.entries.is_empty() {
            return DependencyStats::default();
        }
        let sizes = self.entries.values().map(BTreeSet::len);
        let total: usize = sizes.clone().sum();
        DependencyStats {
            entries: self.entries.len(),
            min: sizes.clone().min().unwrap_or(0),
            max: sizes.max().unwrap_or(0),
            average: total as f64 / self.entries.len() as f64,
        }
    }

    /// Writes the map in text form under the header for `kind`.
    ///
    /// Names that would not read back unchanged (empty, containing a line
    /// break, or a key starting with a tab) are rejected.
    pub fn write_to(&self, kind: &str, out: &mut dyn Write) -> Result<(), IncrementalError> {
        let mut text = format!("{MAGIC} {FORMAT_VERSION} {kind}\n");
        for (key, values) in &self.entries {
            check_name(key)?;
            if key.starts_with('\t') {
                return Err(invalid_name(key));
            }
            text.push_str(key);
            text.push('\n');
            for value in values {
                check_name(value)?;
                text.push('\t');
                text.push_str(value);
                text.push('\n');
            }
        }
        out.write_all(text.as_bytes())
            .map_err(|e| IncrementalError::Serialization {
                reason: format!("cannot write {kind} dependencies: {e}"),
            })
    }

    /// Reads a map written by [`write_to`](Self::write_to). `path` is only
    /// used in error messages.
    pub fn read_from(
        kind: &str,
        input: &mut dyn Read,
        path: &Path,
    ) -> Result<Self, IncrementalError> {
        let format_err = |line: usize, reason: String| IncrementalError::Format {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut lines = BufReader::new(input).lines();
        let header = match lines.next() {
            Some(Ok(header)) => header,
            Some(Err(e)) => return Err(format_err(1, e.to_string())),
            None => return Err(format_err(0, "empty file".to_string())),
        };
        let expected = format!("{MAGIC} {FORMAT_VERSION} {kind}");
        if header != expected {
            return Err(format_err(1, format!("expected header `{expected}`, found `{header}`")));
        }

        let mut map = Self::new();
        let mut current: Option<String> = None;
        for (index, line) in lines.enumerate() {
            let number = index + 2;
            let line = line.map_err(|e| format_err(number, e.to_string()))?;
            if let Some(value) = line.strip_prefix('\t') {
                let Some(key) = &current else {
                    return Err(format_err(number, "value before any key".to_string()));
                };
                if value.is_empty() {
                    return Err(format_err(number, "empty value".to_string()));
                }
                map.insert(key.as_str(), [value]);
            } else {
                if line.is_empty() {
                    return Err(format_err(number, "empty key".to_string()));
                }
                if map.contains_key(&line) {
                    return Err(format_err(number, format!("duplicate key `{line}`")));
                }
                map.insert(line.as_str(), std::iter::empty::<String>());
                current = Some(line);
            }
        }
        Ok(map)
    }
}

fn check_name(name: &str) -> Result<(), IncrementalError> {
    if name.is_empty() || name.contains(['\n', '\r']) {
        return Err(invalid_name(name));
    }
    Ok(())
}

fn invalid_name(name: &str) -> IncrementalError {
    IncrementalError::Serialization {
        reason: format!("name {name:?} cannot be stored in a dependency file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DependencyMap {
        let mut map = DependencyMap::new();
        map.insert("src/A.java", ["LA;", "LA$Inner;"]);
        map.insert("src/Empty.java", std::iter::empty::<&str>());
        map.insert("src/B.java", ["LB;"]);
        map
    }

    fn to_text(map: &DependencyMap, kind: &str) -> String {
        let mut out = Vec::new();
        map.write_to(kind, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn parse(kind: &str, text: &str) -> Result<DependencyMap, IncrementalError> {
        DependencyMap::read_from(kind, &mut text.as_bytes(), Path::new("deps/test.deps"))
    }

    #[test]
    fn text_layout() {
        assert_eq!(
            to_text(&sample(), "files"),
            "dexon-dependencies 1 files\n\
             src/A.java\n\tLA$Inner;\n\tLA;\n\
             src/B.java\n\tLB;\n\
             src/Empty.java\n"
        );
    }

    #[test]
    fn reads_back_what_it_writes() {
        let map = sample();
        let read = parse("files", &to_text(&map, "files")).unwrap();
        assert_eq!(read, map);
        assert!(read.get("src/Empty.java").unwrap().is_empty());
    }

    #[test]
    fn wrong_kind_rejected() {
        let err = parse("types", &to_text(&sample(), "files")).unwrap_err();
        assert!(matches!(err, IncrementalError::Format { line: 1, .. }));
    }

    #[test]
    fn empty_file_rejected() {
        let err = parse("types", "").unwrap_err();
        assert!(matches!(err, IncrementalError::Format { line: 0, .. }));
    }

    #[test]
    fn value_before_key_rejected() {
        let err = parse("types", "dexon-dependencies 1 types\n\tLA;\n").unwrap_err();
        assert!(matches!(err, IncrementalError::Format { line: 2, .. }));
        assert!(err.to_string().contains("value before any key"));
    }

    #[test]
    fn duplicate_key_rejected() {
        let text = "dexon-dependencies 1 types\nLA;\n\tLB;\nLB;\nLA;\n";
        let err = parse("types", text).unwrap_err();
        assert!(matches!(err, IncrementalError::Format { line: 5, .. }));
    }

    #[test]
    fn blank_line_rejected() {
        let err = parse("types", "dexon-dependencies 1 types\nLA;\n\nLB;\n").unwrap_err();
        assert!(matches!(err, IncrementalError::Format { line: 3, .. }));
    }

    #[test]
    fn unstorable_names_rejected() {
        let mut map = DependencyMap::new();
        map.insert("LA;", ["LB;\nLC;"]);
        assert!(matches!(
            map.write_to("types", &mut Vec::new()),
            Err(IncrementalError::Serialization { .. })
        ));
        let mut map = DependencyMap::new();
        map.insert("\tLA;", std::iter::empty::<&str>());
        assert!(map.write_to("types", &mut Vec::new()).is_err());
    }

    #[test]
    fn stats() {
        let stats = sample().stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 2);
        assert!((stats.average - 1.0).abs() < f64::EPSILON);
        assert_eq!(DependencyMap::new().stats(), DependencyStats::default());
    }

    #[test]
    fn remove_value_keeps_key() {
        let mut map = sample();
        map.remove_value("src/B.java", "LB;");
        assert!(map.get("src/B.java").unwrap().is_empty());
        assert!(map.remove("src/B.java").is_some());
        assert!(!map.contains_key("src/B.java"));
    }
}
