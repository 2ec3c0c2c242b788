//! Configuration file parsing for `strap.toml`.
//!
//! Searches the current directory then its ancestors and falls back to the
//! built-in defaults when no file is found.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "strap.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct StrapConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub utils: UtilsConfig,
}

/// Limits enforced by the runtime boundary.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of stack slots across all frames.
    pub max_stack_size: usize,
    /// Maximum nesting of native calls.
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 8000,
            max_call_depth: 200,
        }
    }
}

/// Names under which the lifecycle utilities are published.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct UtilsConfig {
    pub unbake: String,
    pub mark_for_baking: String,
}

impl Default for UtilsConfig {
    fn default() -> Self {
        Self {
            unbake: "unbaked".to_string(),
            mark_for_baking: "markedForBaking".to_string(),
        }
    }
}

impl StrapConfig {
    /// Load `strap.toml` from the current directory or a parent.
    /// Returns `Default` when no file is found or it fails to parse.
    pub fn load() -> Self {
        Self::find_and_load()
            .map(|(_path, cfg)| cfg)
            .unwrap_or_default()
    }

    /// Load config and return the path to the config file that was found.
    pub fn load_with_path() -> Option<(PathBuf, Self)> {
        Self::find_and_load()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a TOML string directly.
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    fn find_and_load() -> Option<(PathBuf, Self)> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                let cfg = Self::load_from(&config_path).ok()?;
                return Some((config_path, cfg));
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    pub fn default_template() -> &'static str {
        r#"# strap configuration

[runtime]
max_stack_size = 8000
max_call_depth = 200

# Names of the lifecycle utilities published by `publish_utils`
[utils]
unbake = "unbaked"
mark_for_baking = "markedForBaking"
"#
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_returns_default() {
        let cfg = StrapConfig::parse("").expect("empty config parses");
        assert_eq!(cfg, StrapConfig::default());
        assert_eq!(cfg.runtime.max_stack_size, 8000);
        assert_eq!(cfg.utils.unbake, "unbaked");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = StrapConfig::parse(
            r#"
[runtime]
max_call_depth = 16
"#,
        )
        .expect("should parse");
        assert_eq!(cfg.runtime.max_call_depth, 16);
        assert_eq!(cfg.runtime.max_stack_size, 8000);
        assert_eq!(cfg.utils.mark_for_baking, "markedForBaking");
    }

    #[test]
    fn renamed_utils() {
        let cfg = StrapConfig::parse(
            r#"
[utils]
unbake = "toDynamic"
mark_for_baking = "toNative"
"#,
        )
        .expect("should parse");
        assert_eq!(cfg.utils.unbake, "toDynamic");
        assert_eq!(cfg.utils.mark_for_baking, "toNative");
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(StrapConfig::parse("[runtime\nmax_stack_size = ").is_err());
        assert!(StrapConfig::parse("[runtime]\nmax_stack_size = \"big\"").is_err());
    }

    #[test]
    fn default_template_round_trips() {
        let cfg = StrapConfig::parse(StrapConfig::default_template()).expect("template parses");
        assert_eq!(cfg, StrapConfig::default());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = StrapConfig::load_from(Path::new("/definitely/not/here/strap.toml"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().starts_with("cannot read"));
    }
}
