//! Configuration for treeline
//!
//! Two independent files:
//!
//! # User config (`~/.config/treeline/config.toml`)
//!
//! Personal preferences, never checked in:
//! - `worktree-dir` - where worktrees and the snapshot cache live
//! - `auto-refresh`, `refresh-interval` - filesystem watching and periodic refresh
//! - `max-diff-chars`, `max-untracked-diffs` - diff size limits
//! - `trust-mode` - `tofu`, `never` or `always` for repository automation
//! - `sort-by-active`, `git-pager`, `git-pager-args`, `log-entries`
//!
//! Loaded in layers: defaults, then the file, then `TREELINE_*` environment
//! variables (`TREELINE_MAX_DIFF_CHARS=5000`).
//!
//! # Project config (`<main worktree>/.treeline.toml`)
//!
//! Checked into the repository; lists the `init-commands` and
//! `terminate-commands` run when worktrees are created and removed. Because it
//! comes from the repository, it only runs under the trust policy
//! (see [`crate::trust`]).

use serde::Deserializer;

mod project;
mod user;

pub use project::{PROJECT_CONFIG_FILENAME, ProjectConfig};
pub use user::{AppConfig, TrustMode, get_config_path};

/// Deserialize a `Vec<String>` that can also accept a single string.
///
/// Lets list settings be given as `key = "cmd"` in TOML or as a plain
/// environment variable.
pub(crate) fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct StringOrVec;

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("string or array of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                items.push(item);
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
