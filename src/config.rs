//! Configuration for MineAgent
//!
//! Loads YAML configuration from:
//! - Global: ~/.config/mine-agent/config.yaml (XDG_CONFIG_HOME)
//! - Project: <workspace>/.mine-agent/config.yaml
//!
//! Files are merged key by key over the built-in defaults; project values
//! win over global ones. CLI flags are applied on top by the binary.

use crate::agent::AgentConfig;
use crate::provider::ProviderConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Project config location, relative to the workspace
pub const PROJECT_CONFIG_PATH: &str = ".mine-agent/config.yaml";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub knowledge: KnowledgeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Directory of knowledge documents, relative paths resolve against the workspace
    pub dir: PathBuf,
    /// Product version the generated content targets
    pub target_version: String,
    /// Results injected into the system prompt
    pub prompt_results: usize,
    /// Results returned by the query_knowledge tool
    pub tool_results: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("knowledge"),
            target_version: "1.21.0".to_string(),
            prompt_results: 2,
            tool_results: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for log files, relative paths resolve against the workspace
    pub log_dir: PathBuf,
    /// Enable verbose console logging
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(".mine_agent/logs"),
            verbose: false,
        }
    }
}

/// Global config file, if a config directory exists on this platform
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mine-agent").join("config.yaml"))
}

pub fn project_config_path(workspace: &Path) -> PathBuf {
    workspace.join(PROJECT_CONFIG_PATH)
}

impl Config {
    /// Load global then project configuration for `workspace`
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let mut paths = Vec::new();
        if let Some(global) = global_config_path() {
            paths.push(global);
        }
        paths.push(project_config_path(workspace));
        Self::load_layers(&paths)
    }

    /// Merge the given files in order over the defaults. Missing files are
    /// skipped; unreadable or malformed ones are errors.
    pub fn load_layers(paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut merged = serde_yaml::to_value(Config::default())
            .context("Failed to serialize default config")?;

        for path in paths {
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let layer: Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Config layer loaded");
            merge_yaml(&mut merged, layer);
        }

        serde_yaml::from_value(merged).context("Invalid configuration")
    }

    /// Knowledge directory resolved against the workspace
    pub fn knowledge_dir(&self, workspace: &Path) -> PathBuf {
        resolve(workspace, &self.knowledge.dir)
    }

    /// Log directory resolved against the workspace
    pub fn log_dir(&self, workspace: &Path) -> PathBuf {
        resolve(workspace, &self.logging.log_dir)
    }

    /// Save as YAML, creating parent directories
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Deep-merge `overlay` into `base`. Mappings merge per key; anything else
/// replaces. An explicit `null` in the overlay does not erase a value.
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::InteractionMode;
    use crate::provider::Backend;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_layers(&[temp.path().join("missing.yaml")]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.agent.max_iterations, 25);
        assert_eq!(config.knowledge.target_version, "1.21.0");
        assert_eq!(config.knowledge.prompt_results, 2);
        assert_eq!(config.knowledge.tool_results, 3);
    }

    #[test]
    fn test_project_overrides_global_per_key() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.yaml");
        let project = temp.path().join("project.yaml");

        std::fs::write(
            &global,
            "provider:\n  backend: openai\n  model: gpt-4o\nagent:\n  max_iterations: 10\n  interaction_mode: free\n",
        )
        .unwrap();
        std::fs::write(&project, "provider:\n  model: gpt-4o-mini\nagent:\n  max_iterations: 40\n").unwrap();

        let config = Config::load_layers(&[global, project]).unwrap();
        assert_eq!(config.provider.backend, Backend::OpenAi);
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.agent.max_iterations, 40);
        assert_eq!(config.agent.interaction_mode, InteractionMode::Free);
    }

    #[test]
    fn test_malformed_file_is_error_with_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        std::fs::write(&path, "agent: [unclosed").unwrap();

        let err = Config::load_layers(&[path]).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.yaml"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = project_config_path(temp.path());

        let mut config = Config::default();
        config.knowledge.dir = PathBuf::from("docs/knowledge");
        config.logging.verbose = true;
        config.save(&path).unwrap();

        let loaded = Config::load_layers(&[path]).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.knowledge_dir(temp.path()), temp.path().join("docs/knowledge"));
    }

    #[test]
    fn test_merge_yaml_null_keeps_value() {
        let mut base: Value = serde_yaml::from_str("a: 1\nb: {c: 2}").unwrap();
        merge_yaml(&mut base, serde_yaml::from_str("a: ~\nb: {d: 3}").unwrap());
        assert_eq!(base["a"], Value::from(1));
        assert_eq!(base["b"]["c"], Value::from(2));
        assert_eq!(base["b"]["d"], Value::from(3));
    }
}
