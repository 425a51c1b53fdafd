//! Configuration types deserialized from `dexon.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The top-level project configuration parsed from `dexon.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Dex output settings.
    #[serde(default)]
    pub dex: DexConfig,
    /// Criteria selecting the types that must land in the primary dex.
    #[serde(default)]
    pub main_dex: MainDexConfig,
    /// Incremental compilation settings.
    #[serde(default)]
    pub incremental: IncrementalConfig,
    /// Libraries the compilation depends on.
    #[serde(default)]
    pub libraries: LibrariesConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Core project metadata required in every `dexon.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
}

/// How compiled types are spread over dex files.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MultiDexMode {
    /// Everything goes into a single `classes.dex`.
    #[default]
    None,
    /// Main dex types first, then the remainder in unspecified order.
    LegacyMinimal,
    /// As `LegacyMinimal`, but both sets are sorted by type name first.
    LegacyMinimalDeterministic,
}

impl MultiDexMode {
    /// Returns the configuration spelling of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            MultiDexMode::None => "none",
            MultiDexMode::LegacyMinimal => "legacy-minimal",
            MultiDexMode::LegacyMinimalDeterministic => "legacy-minimal-deterministic",
        }
    }

    /// Returns `true` if output may span several dex files.
    pub fn is_multidex(self) -> bool {
        self != MultiDexMode::None
    }
}

impl fmt::Display for MultiDexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MultiDexMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(MultiDexMode::None),
            "legacy-minimal" => Ok(MultiDexMode::LegacyMinimal),
            "legacy-minimal-deterministic" => Ok(MultiDexMode::LegacyMinimalDeterministic),
            other => Err(format!(
                "unknown multidex mode '{other}' (expected none, legacy-minimal or legacy-minimal-deterministic)"
            )),
        }
    }
}

/// Dex output settings.
#[derive(Debug, Deserialize)]
pub struct DexConfig {
    /// The multidex policy.
    #[serde(default)]
    pub multidex: MultiDexMode,
    /// Always emit the jumbo form of string constants.
    #[serde(default)]
    pub force_jumbo: bool,
    /// Minimum Android API level; selects the dex format version.
    #[serde(default = "default_min_api")]
    pub min_api: u32,
}

fn default_min_api() -> u32 {
    21
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            multidex: MultiDexMode::default(),
            force_jumbo: false,
            min_api: default_min_api(),
        }
    }
}

/// Main dex entry criteria.
#[derive(Debug, Default, Deserialize)]
pub struct MainDexConfig {
    /// Explicit entry points, as descriptors or `a/b/C.class` paths.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub classes: Vec<String>,
    /// Marker annotations; every type carrying one is a main dex seed.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub annotations: Vec<String>,
    /// A file listing one main dex class per line.
    #[serde(default)]
    pub list_file: Option<PathBuf>,
}

impl MainDexConfig {
    /// Returns `true` if no main dex criterion is configured.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.annotations.is_empty() && self.list_file.is_none()
    }
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// Incremental compilation settings.
#[derive(Debug, Deserialize)]
pub struct IncrementalConfig {
    /// Folder holding dependency maps and per-type artifacts. Absent disables
    /// incremental support.
    #[serde(default)]
    pub folder: Option<PathBuf>,
    /// Rebuild everything when a library changed or the library set differs.
    #[serde(default = "default_true")]
    pub auto_full_rebuild: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            folder: None,
            auto_full_rebuild: true,
        }
    }
}

/// Libraries the compilation depends on.
#[derive(Debug, Default, Deserialize)]
pub struct LibrariesConfig {
    /// Boot classpath entries.
    #[serde(default)]
    pub bootclasspath: Vec<PathBuf>,
    /// Classpath entries.
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// Imported libraries whose classes are merged into the output.
    #[serde(default)]
    pub imports: Vec<PathBuf>,
    /// Treat an unreadable classpath entry as an error instead of a warning.
    #[serde(default)]
    pub strict_classpath: bool,
}

/// Output locations.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving `classes*.dex`.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build/out")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}
