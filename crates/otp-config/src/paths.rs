//! XDG-compliant path discovery for the user-level config overlay.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{ConfigError, Result};

/// Locates the user config directory and the well-known config file names
/// layered underneath a project directory.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "otp-rs", "otp"),
        }
    }

    /// `~/.config/otp/` (platform-appropriate equivalent).
    pub fn user_config_dir(&self) -> Result<PathBuf> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or(ConfigError::NoUserConfigDir)
    }

    /// `~/.config/otp/config.toml`.
    pub fn user_config_file(&self) -> Result<PathBuf> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// `<project_dir>/otp.toml`, git-tracked.
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("otp.toml")
    }

    /// `<project_dir>/otp.local.toml`, for gitignored local overrides.
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("otp.local.toml")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn project_file_names_are_scoped_to_the_project_dir() {
        let temp = tempdir().unwrap();
        let project = temp.path();

        assert_eq!(Paths::project_config_file(project), project.join("otp.toml"));
        assert_eq!(
            Paths::local_config_file(project),
            project.join("otp.local.toml")
        );
    }
}
