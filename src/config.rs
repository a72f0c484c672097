//! Optional `kubemerge.toml` configuration file

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use kubemerge_logs::{AggregatorConfig, DEFAULT_QUEUE_CAPACITY, LiveMergeConfig};

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "kubemerge.toml";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub engine: EngineConfig,
    pub defaults: Defaults,
}

/// Merge engine tunables
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub queue_capacity: usize,
    pub tick_ms: u64,
    pub delay_window_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let live = LiveMergeConfig::default();
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_ms: live.tick.as_millis() as u64,
            delay_window_ms: live.delay_window.as_millis() as u64,
        }
    }
}

/// Defaults for options usually given on the command line
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub namespace: Option<String>,
    pub selector: Option<String>,
    pub container: Option<String>,
}

impl FileConfig {
    /// Load `path`, or `kubemerge.toml` from the working directory if present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::read(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl EngineConfig {
    /// Convert to engine settings, with an optional override of the delay window
    pub fn to_aggregator_config(&self, delay_window: Option<Duration>) -> Result<AggregatorConfig> {
        if self.queue_capacity == 0 {
            anyhow::bail!("engine.queue_capacity must be at least 1");
        }
        if self.tick_ms == 0 {
            anyhow::bail!("engine.tick_ms must be at least 1");
        }

        Ok(AggregatorConfig {
            queue_capacity: self.queue_capacity,
            live: LiveMergeConfig {
                tick: Duration::from_millis(self.tick_ms),
                delay_window: delay_window.unwrap_or(Duration::from_millis(self.delay_window_ms)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert_eq!(config, FileConfig::default());

        let engine = config.engine.to_aggregator_config(None).unwrap();
        assert_eq!(engine, AggregatorConfig::default());
    }

    #[test]
    fn test_partial_engine_section() {
        let config = FileConfig::parse(
            r#"
            [engine]
            delay_window_ms = 2500

            [defaults]
            namespace = "game"
            container = "shard-server"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.delay_window_ms, 2500);
        assert_eq!(config.engine.tick_ms, 50);
        assert_eq!(config.defaults.namespace.as_deref(), Some("game"));
        assert_eq!(config.defaults.selector, None);
    }

    #[test]
    fn test_delay_window_override() {
        let engine = EngineConfig::default()
            .to_aggregator_config(Some(Duration::from_millis(300)))
            .unwrap();
        assert_eq!(engine.live.delay_window, Duration::from_millis(300));
    }

    #[test]
    fn test_rejects_unknown_keys_and_zero_values() {
        assert!(FileConfig::parse("[engine]\nwindow = 3").is_err());

        let config = FileConfig::parse("[engine]\nqueue_capacity = 0").unwrap();
        assert!(config.engine.to_aggregator_config(None).is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults]\nselector = \"app=server\"").unwrap();

        let config = FileConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.defaults.selector.as_deref(), Some("app=server"));
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let err = FileConfig::load(Some(Path::new("/nonexistent/kubemerge.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
