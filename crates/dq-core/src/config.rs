//! Engine configuration loaded from `~/.config/doc-query/config.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::LoopConfig;
use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model override passed through on every completion request.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum reasoning iterations per query.
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,

    /// Per-call tool execution timeout.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Child hits requested per search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_parent_size")]
    pub parent_size: usize,

    #[serde(default = "default_parent_overlap")]
    pub parent_overlap: usize,

    #[serde(default = "default_child_size")]
    pub child_size: usize,

    #[serde(default = "default_child_overlap")]
    pub child_overlap: usize,
}

fn default_max_loops() -> usize {
    10
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_top_k() -> usize {
    5
}

fn default_parent_size() -> usize {
    2000
}

fn default_parent_overlap() -> usize {
    200
}

fn default_child_size() -> usize {
    400
}

fn default_child_overlap() -> usize {
    50
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            parent_size: default_parent_size(),
            parent_overlap: default_parent_overlap(),
            child_size: default_child_size(),
            child_overlap: default_child_overlap(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            max_loops: default_max_loops(),
            tool_timeout_secs: default_tool_timeout_secs(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, Error> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| Error::config(format!("failed to read {:?}: {}", config_path, e)))?;
            toml::from_str(&content)
                .map_err(|e| Error::config(format!("invalid {:?}: {}", config_path, e)))
        } else {
            Err(Error::config(format!(
                "no configuration found at {:?}",
                config_path
            )))
        }
    }

    /// Like `load()`, but an absent or unreadable file falls back to the
    /// built-in defaults.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            debug!(error = %e, "using default engine configuration");
            Self::default()
        })
    }

    pub fn config_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::config("could not determine config directory"))?;
        Ok(config_dir.join("doc-query").join("config.toml"))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Reasoning-loop settings derived from this configuration.
    pub fn loop_config(&self) -> LoopConfig {
        let mut config = LoopConfig::new().with_max_loops(self.max_loops);
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_loops, 10);
        assert_eq!(config.tool_timeout_secs, 30);
        assert_eq!(config.retrieval.parent_size, 2000);
        assert_eq!(config.retrieval.child_overlap, 50);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            model = "gpt-4o-mini"
            max_loops = 6

            [retrieval]
            top_k = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.max_loops, 6);
        assert_eq!(config.retrieval.top_k, 8);
        // unspecified fields keep their defaults
        assert_eq!(config.retrieval.parent_overlap, 200);
        assert_eq!(config.tool_timeout().as_secs(), 30);
    }

    #[test]
    fn test_loop_config_derivation() {
        let config: EngineConfig = toml::from_str(
            r#"
            model = "gpt-4o"
            temperature = 0.3
            max_loops = 4
            "#,
        )
        .unwrap();

        let loop_config = config.loop_config();
        assert_eq!(loop_config.max_loops, 4);
        assert_eq!(loop_config.model.as_deref(), Some("gpt-4o"));
        assert_eq!(loop_config.temperature, Some(0.3));
    }
}
