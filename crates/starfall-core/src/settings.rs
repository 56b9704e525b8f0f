use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use starfall_platform::AppPaths;

use crate::branch::Branch;

/// Sentinel stored in `last_used_version` when no version has been played.
pub const NO_VERSION: &str = "NONE";

/// Persisted launcher settings.
///
/// Missing or corrupt settings files fall back to defaults; startup must
/// never fail because of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSettings {
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Maximum game heap in megabytes.
    #[serde(default = "default_memory_mb")]
    pub memory: u32,

    /// Extra user-supplied launch arguments, space separated.
    #[serde(default)]
    pub launch_args: String,

    #[serde(default = "default_last_used_version")]
    pub last_used_version: String,

    /// Selection index of the last used branch, see
    /// [`Branch::selection_index`].
    #[serde(default)]
    pub last_used_branch: u8,
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("Starfall")
}

fn default_memory_mb() -> u32 {
    4096
}

fn default_last_used_version() -> String {
    NO_VERSION.to_string()
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            memory: default_memory_mb(),
            launch_args: String::new(),
            last_used_version: default_last_used_version(),
            last_used_branch: 0,
        }
    }
}

impl LaunchSettings {
    pub fn load() -> Self {
        let Ok(paths) = AppPaths::new() else {
            return Self::default();
        };
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            match std::fs::read_to_string(&settings_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => Self::default(),
            }
        } else {
            Self::default()
        }
    }

    /// Persist the settings document as pretty JSON in the config directory.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let paths = AppPaths::new().map_err(std::io::Error::other)?;
        paths.ensure_dirs()?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.settings_file(), content)?;
        Ok(())
    }

    #[must_use]
    pub fn last_used_branch(&self) -> Branch {
        Branch::from_selection_index(self.last_used_branch).unwrap_or(Branch::Release)
    }

    pub fn set_last_used_branch(&mut self, branch: Branch) {
        self.last_used_branch = branch.selection_index();
    }

    pub fn set_last_used_version(&mut self, version: &str) {
        self.last_used_version = version.to_string();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LaunchSettings, NO_VERSION};
    use crate::branch::Branch;

    #[test]
    fn defaults_are_safe_for_first_run() {
        let settings = LaunchSettings::default();

        assert_eq!(settings.memory, 4096);
        assert_eq!(settings.last_used_version, NO_VERSION);
        assert_eq!(settings.last_used_branch(), Branch::Release);
        assert!(settings.launch_args.is_empty());
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings: LaunchSettings =
            serde_json::from_value(json!({ "memory": 8192 })).expect("partial JSON deserializes");

        assert_eq!(settings.memory, 8192);
        assert_eq!(settings.last_used_version, NO_VERSION);
        assert_eq!(settings.install_dir, std::path::PathBuf::from("Starfall"));
    }

    #[test]
    fn corrupt_document_falls_back_to_defaults() {
        let settings: LaunchSettings =
            serde_json::from_str("{ not json").unwrap_or_default();
        assert_eq!(settings.memory, 4096);
    }

    #[test]
    fn out_of_range_branch_index_resolves_to_release() {
        let mut settings = LaunchSettings::default();
        settings.last_used_branch = 200;
        assert_eq!(settings.last_used_branch(), Branch::Release);

        settings.set_last_used_branch(Branch::Pre);
        assert_eq!(settings.last_used_branch(), Branch::Pre);
        assert_eq!(settings.last_used_branch, 2);
    }
}
