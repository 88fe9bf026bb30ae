//! User configuration: `config.toml` plus `TREELINE_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Case, Config, ConfigError, File};
use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};
use serde::{Deserialize, Serialize};

use super::deserialize_string_or_vec;
use crate::git::DiffLimits;

/// Keys accepted in `config.toml`; anything else is warned about.
const KNOWN_KEYS: &[&str] = &[
    "worktree-dir",
    "auto-refresh",
    "refresh-interval",
    "max-diff-chars",
    "max-untracked-diffs",
    "trust-mode",
    "sort-by-active",
    "git-pager",
    "git-pager-args",
    "log-entries",
];

/// How repository automation files are gated.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrustMode {
    /// Ask on first use and whenever the file changes.
    #[default]
    Tofu,
    /// Never run repository automation.
    Never,
    /// Run without asking.
    Always,
}

/// User-level treeline configuration.
///
/// ```toml
/// worktree-dir = "~/worktrees"
/// refresh-interval = 5
/// trust-mode = "tofu"
/// git-pager = ""          # disable delta
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    /// Root for worktrees and the snapshot cache. `None` uses the data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_dir: Option<PathBuf>,
    pub auto_refresh: bool,
    /// Seconds between periodic refreshes; 0 disables.
    pub refresh_interval: f64,
    pub max_diff_chars: i64,
    pub max_untracked_diffs: i64,
    pub trust_mode: TrustMode,
    pub sort_by_active: bool,
    /// Diff pretty-printer looked up on `PATH`; empty disables.
    pub git_pager: String,
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub git_pager_args: Vec<String>,
    pub log_entries: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worktree_dir: None,
            auto_refresh: true,
            refresh_interval: 10.0,
            max_diff_chars: 200_000,
            max_untracked_diffs: 10,
            trust_mode: TrustMode::Tofu,
            sort_by_active: true,
            git_pager: "delta".to_string(),
            git_pager_args: vec!["--no-gitconfig".to_string(), "--paging=never".to_string()],
            log_entries: 20,
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Later sources override earlier ones:
    /// 1. Defaults
    /// 2. The config file (`explicit`, else [`get_config_path`]) if it exists
    /// 3. Environment variables (`TREELINE_*`)
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_path = explicit.map(Path::to_path_buf).or_else(get_config_path);
        if let Some(config_path) = config_path.as_ref() {
            if config_path.exists() {
                if let Ok(content) = std::fs::read_to_string(config_path) {
                    for key in find_unknown_keys(&content) {
                        log::warn!(
                            "Unknown key {key:?} in {} will be ignored",
                            config_path.display()
                        );
                    }
                }
                builder = builder.add_source(File::from(config_path.clone()));
            } else if explicit.is_some() {
                return Err(ConfigError::Message(format!(
                    "Config file not found: {}",
                    config_path.display()
                )));
            }
        }

        // TREELINE_MAX_DIFF_CHARS → max-diff-chars
        builder = builder.add_source(
            config::Environment::with_prefix("TREELINE")
                .prefix_separator("_")
                .separator("__")
                .convert_case(Case::Kebab),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document directly (no environment layer).
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Message(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.refresh_interval.is_finite() || self.refresh_interval < 0.0 {
            return Err(ConfigError::Message(format!(
                "refresh-interval must be a non-negative number of seconds, got {}",
                self.refresh_interval
            )));
        }
        if self.refresh_interval > f64::from(u32::MAX) {
            return Err(ConfigError::Message(format!(
                "refresh-interval is too large, got {} (max {})",
                self.refresh_interval,
                u32::MAX
            )));
        }
        if self.max_diff_chars <= 0 {
            return Err(ConfigError::Message(format!(
                "max-diff-chars must be positive, got {}",
                self.max_diff_chars
            )));
        }
        for (key, value) in [
            ("max-untracked-diffs", self.max_untracked_diffs),
            ("log-entries", self.log_entries),
        ] {
            if value < 0 {
                return Err(ConfigError::Message(format!(
                    "{key} cannot be negative, got {value}"
                )));
            }
        }
        if let Some(dir) = &self.worktree_dir
            && dir.as_os_str().is_empty()
        {
            return Err(ConfigError::Message("worktree-dir cannot be empty".into()));
        }
        Ok(())
    }

    /// Configured worktree dir, or `<data_dir>/worktrees`.
    pub fn worktree_dir(&self) -> PathBuf {
        if let Some(dir) = &self.worktree_dir {
            return expand_home(dir);
        }
        choose_base_strategy()
            .map(|s| s.data_dir().join("worktrees"))
            .unwrap_or_else(|_| PathBuf::from(".worktrees"))
    }

    /// Period of the refresh tick, clamped to at least one second. `None`
    /// when auto-refresh or the tick is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        if !self.auto_refresh || self.refresh_interval == 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.refresh_interval.max(1.0)).ok()
    }

    pub fn diff_limits(&self) -> DiffLimits {
        DiffLimits {
            max_total_chars: usize::try_from(self.max_diff_chars).unwrap_or(usize::MAX),
            max_untracked_files: usize::try_from(self.max_untracked_diffs).unwrap_or(0),
        }
    }

    pub fn log_entries(&self) -> usize {
        usize::try_from(self.log_entries).unwrap_or(0)
    }
}

/// `~` or `~/...` → home directory.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match choose_base_strategy() {
        Ok(strategy) => strategy.home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Path of the user config file.
///
/// `TREELINE_CONFIG_PATH` overrides the platform location
/// (`$XDG_CONFIG_HOME/treeline/config.toml`, `%APPDATA%` on Windows).
pub fn get_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("TREELINE_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("treeline").join("config.toml"))
}

/// Top-level keys in `contents` that treeline does not recognize.
pub fn find_unknown_keys(contents: &str) -> Vec<String> {
    let Ok(table) = contents.parse::<toml::Table>() else {
        return vec![];
    };
    table
        .keys()
        .filter(|k| !KNOWN_KEYS.contains(&k.as_str()))
        .cloned()
        .collect()
}
