//! Repository automation file (`.treeline.toml`).

use std::path::{Path, PathBuf};

use config::ConfigError;
use serde::{Deserialize, Serialize};

use super::deserialize_string_or_vec;

pub const PROJECT_CONFIG_FILENAME: &str = ".treeline.toml";

/// Commands a repository asks to run around a worktree's lifetime.
///
/// ```toml
/// init-commands = ["npm ci", "cp $MAIN_WORKTREE_PATH/.env .env"]
/// terminate-commands = "docker compose down"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// Run after a worktree is created or first entered.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub init_commands: Vec<String>,
    /// Run before a worktree is removed.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub terminate_commands: Vec<String>,
}

impl ProjectConfig {
    /// Path of the automation file for the repository whose main worktree is
    /// `main_worktree`.
    pub fn path_in(main_worktree: &Path) -> PathBuf {
        main_worktree.join(PROJECT_CONFIG_FILENAME)
    }

    /// Load `.treeline.toml` from the main worktree; `Ok(None)` if absent.
    pub fn load(main_worktree: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = Self::path_in(main_worktree);
        if !config_path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::Message(format!("Failed to read config file: {e}")))?;
        Self::parse(&contents).map(Some)
    }

    /// Parse the contents of an automation file.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::Message(format!("Failed to parse TOML: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        self.init_commands.is_empty() && self.terminate_commands.is_empty()
    }
}
