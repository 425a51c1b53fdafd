//! Type-level dependencies.
//!
//! The forward map records, for each compiled type, every type it refers
//! to. The reverse map answers the question incremental builds actually
//! ask: which types must be recompiled when a given type changes.

use crate::error::IncrementalError;
use crate::file_deps::FileDependencies;
use crate::map::{DependencyMap, DependencyStats};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;

const KIND: &str = "types";

/// Maps each type to the set of types it depends on.
#[derive(Debug, Default)]
pub struct TypeDependencies {
    forward: DependencyMap,
    recompile: OnceLock<BTreeMap<String, BTreeSet<String>>>,
}

impl TypeDependencies {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `ty` depends on each of `dependencies`. References of a
    /// type to itself are not recorded.
    pub fn add<I, S>(&mut self, ty: &str, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deps: Vec<String> = dependencies
            .into_iter()
            .map(Into::into)
            .filter(|d| d != ty)
            .collect();
        self.forward.insert(ty, deps);
        self.invalidate();
    }

    /// Returns what `ty` depends on.
    pub fn dependencies_of(&self, ty: &str) -> Option<&BTreeSet<String>> {
        self.forward.get(ty)
    }

    /// Returns `true` if `ty` has an entry.
    pub fn contains(&self, ty: &str) -> bool {
        self.forward.contains_key(ty)
    }

    /// Every type with an entry, sorted.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.forward.keys()
    }

    /// Number of types with an entry.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Returns `true` if no type is recorded.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Removes the entries of `types`.
    pub fn remove_types<'a>(&mut self, types: impl IntoIterator<Item = &'a str>) {
        for ty in types {
            self.forward.remove(ty);
        }
        self.invalidate();
    }

    /// Drops every type defined by a deleted or modified file. Must run
    /// before `files` itself is updated.
    pub fn update(
        &mut self,
        files: &FileDependencies,
        deleted: &BTreeSet<String>,
        modified: &BTreeSet<String>,
    ) {
        let stale: Vec<String> = deleted
            .iter()
            .chain(modified)
            .flat_map(|file| files.type_names(file))
            .map(str::to_string)
            .collect();
        self.remove_types(stale.iter().map(String::as_str));
    }

    /// The reverse map: for each type, the types that depend on it. Built
    /// on first use after the graph was read or changed.
    pub fn recompile_dependencies(&self) -> &BTreeMap<String, BTreeSet<String>> {
        self.recompile.get_or_init(|| {
            let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for (ty, deps) in self.forward.iter() {
                for dep in deps {
                    reverse
                        .entry(dep.clone())
                        .or_default()
                        .insert(ty.to_string());
                }
            }
            reverse
        })
    }

    /// The types directly depending on any of `changed`, one level deep.
    pub fn recompile_dependencies_of<'a>(
        &self,
        changed: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        let reverse = self.recompile_dependencies();
        changed
            .into_iter()
            .filter_map(|ty| reverse.get(ty))
            .flatten()
            .cloned()
            .collect()
    }

    /// Size statistics of the forward map.
    pub fn stats(&self) -> DependencyStats {
        self.forward.stats()
    }

    /// Reads the graph. `path` is only used in error messages.
    pub fn read(input: &mut dyn Read, path: &Path) -> Result<Self, IncrementalError> {
        let forward = DependencyMap::read_from(KIND, input, path)?;
        let deps = Self {
            forward,
            recompile: OnceLock::new(),
        };
        log_stats("read", &deps.stats());
        Ok(deps)
    }

    /// Writes the graph.
    pub fn write(&self, out: &mut dyn Write) -> Result<(), IncrementalError> {
        self.forward.write_to(KIND, out)?;
        log_stats("wrote", &self.stats());
        Ok(())
    }

    fn invalidate(&mut self) {
        self.recompile = OnceLock::new();
    }
}

fn log_stats(action: &str, stats: &DependencyStats) {
    tracing::debug!(
        entries = stats.entries,
        min = stats.min,
        max = stats.max,
        average = stats.average,
        "{action} type dependencies"
    );
}
