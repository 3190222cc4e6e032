//! Layered TOML loading, builder-style, without pulling in a multi-source
//! configuration crate: this workspace merges plain [`toml::Value`] tables
//! by hand instead.

use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;

use crate::error::{ConfigError, Result};
use crate::paths::Paths;
use crate::RuntimeConfig;

/// Builds a [`RuntimeConfig`] from the default layer stack, or a
/// caller-supplied project directory.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    project_dir: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { project_dir: None }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Merges, in ascending precedence: built-in defaults, the user config
    /// file, `<project_dir>/otp.toml`, `<project_dir>/otp.local.toml`.
    /// Missing files are skipped silently; malformed ones are an error.
    pub fn load(self) -> Result<RuntimeConfig> {
        let mut merged = Value::try_from(RuntimeConfig::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let paths = Paths::new();
        if let Ok(user_file) = paths.user_config_file() {
            merge_file(&mut merged, &user_file)?;
        }

        let project_dir = self
            .project_dir
            .unwrap_or_else(|| PathBuf::from("."));
        merge_file(&mut merged, &Paths::project_config_file(&project_dir))?;
        merge_file(&mut merged, &Paths::local_config_file(&project_dir))?;

        merged
            .try_into()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn merge_file(base: &mut Value, path: &Path) -> Result<()> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let overlay: Value = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    merge_values(base, overlay);
    Ok(())
}

/// Recursively merges `overlay` into `base`: tables merge key by key,
/// anything else (scalars, arrays) is replaced wholesale by the overlay's
/// value.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn project_file_overrides_defaults_and_local_overrides_project() {
        let temp = tempdir().unwrap();
        let dir = temp.path();

        fs::write(
            Paths::project_config_file(dir),
            "[node]\nport = 5000\n\n[cluster]\nheartbeat_interval_ms = 2000\n",
        )
        .unwrap();
        fs::write(
            Paths::local_config_file(dir),
            "[node]\nport = 6000\n",
        )
        .unwrap();

        let config = ConfigLoader::new().with_project_dir(dir).load().unwrap();

        assert_eq!(config.node.port, 6000);
        assert_eq!(config.cluster.heartbeat_interval_ms, 2000);
        assert_eq!(config.supervisor.max_restarts, 3);
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let temp = tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap();

        assert_eq!(config.node.port, 4369);
    }

    #[test]
    fn malformed_project_file_is_an_error() {
        let temp = tempdir().unwrap();
        fs::write(Paths::project_config_file(temp.path()), "not valid toml =").unwrap();

        let err = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
