//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Loads and validates a `dexon.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join("dexon.toml");
    let content = read(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `dexon.toml` configuration from a string.
///
/// Main dex class entries are normalized to descriptor form.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let mut config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&mut config)?;
    Ok(config)
}

/// Validates required fields and normalizes main dex entries.
fn validate_config(config: &mut ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    for (key, entries) in [
        ("main_dex.classes", &mut config.main_dex.classes),
        ("main_dex.annotations", &mut config.main_dex.annotations),
    ] {
        for entry in entries.iter_mut() {
            *entry = normalize_class_entry(entry).ok_or_else(|| ConfigError::InvalidClassEntry {
                entry: entry.clone(),
                origin: key.to_string(),
            })?;
        }
    }
    if config.incremental.folder.as_deref() == Some(Path::new("")) {
        return Err(ConfigError::ValidationError(
            "incremental.folder must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Converts a class entry to descriptor form.
///
/// Accepts `Lcom/example/App;` and `com/example/App.class`. Returns `None`
/// for anything else, including dotted names.
pub fn normalize_class_entry(entry: &str) -> Option<String> {
    let entry = entry.trim();
    let binary_name = if let Some(inner) = entry
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
    {
        inner
    } else {
        entry.strip_suffix(".class")?
    };
    let valid = !binary_name.is_empty()
        && binary_name
            .split('/')
            .all(|seg| !seg.is_empty() && !seg.contains(|c| matches!(c, '.' | ';' | '[')));
    valid.then(|| format!("L{binary_name};"))
}

/// Reads a main dex list file: one class per line, `#` starts a comment,
/// blank lines are ignored. Entries are returned in descriptor form.
pub fn load_main_dex_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = read(path)?;
    let mut classes = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let class = normalize_class_entry(line).ok_or_else(|| ConfigError::InvalidClassEntry {
            entry: line.to_string(),
            origin: format!("{}:{}", path.display(), idx + 1),
        })?;
        classes.push(class);
    }
    Ok(classes)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
