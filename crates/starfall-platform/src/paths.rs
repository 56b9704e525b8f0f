use std::path::PathBuf;
use thiserror::Error;

const APP_DIR: &str = "starfall-launcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("could not determine the user config directory")]
    ConfigDirUnavailable,
    #[error("could not determine the user data directory")]
    DataDirUnavailable,
}

/// Launcher-owned directories: config holds the settings document, data
/// holds the log. The game install directory is a settings value, not a
/// platform path.
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the launcher directories for the current user.
    ///
    /// # Errors
    /// Returns an error when the platform config or data base directory
    /// cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        Ok(Self {
            config_dir: dirs::config_dir()
                .ok_or(AppPathsError::ConfigDirUnavailable)?
                .join(APP_DIR),
            data_dir: dirs::data_dir()
                .ok_or(AppPathsError::DataDirUnavailable)?
                .join(APP_DIR),
        })
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("launcher.log")
    }

    /// Create the launcher directories if they are missing.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)
    }
}
