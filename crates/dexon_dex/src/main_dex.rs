//! Main dex tracing.
//!
//! The main dex holds what the runtime needs before multidex support is
//! installed. Seeds come from explicit class entries, the main dex list file
//! and marker annotations. The traced set contains every seed, every type a
//! seed directly references, and then, transitively, the supertypes and
//! class annotation types of everything already in the set. Only types
//! defined in the current input are traced; platform classes are never part
//! of the set.

use dexon_config::{load_main_dex_list, ConfigError, MainDexConfig};
use dexon_ir::CompiledType;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Entry criteria for the main dex.
#[derive(Clone, Debug, Default)]
pub struct MainDexSeeds {
    /// Explicit entry points, as class descriptors.
    pub classes: Vec<String>,
    /// Marker annotation descriptors.
    pub annotations: Vec<String>,
}

impl MainDexSeeds {
    /// Creates an empty seed set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the seeds from the `[main_dex]` section, reading the list
    /// file relative to `project_dir`.
    pub fn from_config(config: &MainDexConfig, project_dir: &Path) -> Result<Self, ConfigError> {
        let mut classes = config.classes.clone();
        if let Some(list_file) = &config.list_file {
            classes.extend(load_main_dex_list(&project_dir.join(list_file))?);
        }
        Ok(Self {
            classes,
            annotations: config.annotations.clone(),
        })
    }

    /// Returns `true` if nothing selects a main dex type.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.annotations.is_empty()
    }
}

/// Computes the main dex closure over `types`.
pub fn trace_main_dex(types: &[Arc<CompiledType>], seeds: &MainDexSeeds) -> BTreeSet<String> {
    let defined: HashMap<&str, &CompiledType> = types
        .iter()
        .map(|ty| (ty.descriptor.as_str(), ty.as_ref()))
        .collect();
    let markers: HashSet<&str> = seeds.annotations.iter().map(String::as_str).collect();

    let mut roots: BTreeSet<&str> = BTreeSet::new();
    for class in &seeds.classes {
        if defined.contains_key(class.as_str()) {
            roots.insert(class.as_str());
        } else {
            tracing::debug!(class = %class, "main dex entry is not defined by the input");
        }
    }
    for ty in types {
        if ty.annotations.iter().any(|a| markers.contains(a.type_())) {
            roots.insert(ty.descriptor.as_str());
        }
    }

    let mut traced: BTreeSet<String> = BTreeSet::new();
    let mut worklist: Vec<String> = Vec::new();
    let enqueue = |name: &str, traced: &mut BTreeSet<String>, worklist: &mut Vec<String>| {
        if defined.contains_key(name) && traced.insert(name.to_string()) {
            worklist.push(name.to_string());
        }
    };

    for root in &roots {
        enqueue(root, &mut traced, &mut worklist);
        if let Some(ty) = defined.get(root) {
            for referenced in ty.referenced_types() {
                enqueue(&referenced, &mut traced, &mut worklist);
            }
        }
    }

    while let Some(name) = worklist.pop() {
        let Some(ty) = defined.get(name.as_str()) else {
            continue;
        };
        for supertype in ty.supertypes() {
            enqueue(supertype, &mut traced, &mut worklist);
        }
        for annotation in &ty.annotations {
            enqueue(annotation.type_(), &mut traced, &mut worklist);
        }
    }

    tracing::debug!(
        roots = roots.len(),
        traced = traced.len(),
        "traced main dex"
    );
    traced
}
