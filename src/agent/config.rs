//! Agent configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the agent engages with the user, announced in the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Ask clarifying questions and confirm the design before generating files
    #[default]
    Guide,
    /// Act directly on the request
    Free,
    /// Start from a known content template
    Template,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Guide => "guide",
            InteractionMode::Free => "free",
            InteractionMode::Template => "template",
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guide" => Ok(InteractionMode::Guide),
            "free" => Ok(InteractionMode::Free),
            "template" => Ok(InteractionMode::Template),
            other => Err(format!("unknown interaction mode: {}", other)),
        }
    }
}

/// Loop limits and sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on think/act cycles per run
    pub max_iterations: usize,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Approve every gated tool without asking
    pub auto_approve: bool,
    pub interaction_mode: InteractionMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            temperature: 0.0,
            max_tokens: None,
            auto_approve: false,
            interaction_mode: InteractionMode::Guide,
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 25);
        assert_eq!(config.temperature, 0.0);
        assert!(config.max_tokens.is_none());
        assert!(!config.auto_approve);
        assert_eq!(config.interaction_mode, InteractionMode::Guide);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Template".parse::<InteractionMode>(), Ok(InteractionMode::Template));
        assert!("wizard".parse::<InteractionMode>().is_err());
    }

    #[test]
    fn test_partial_yaml() {
        let config: AgentConfig =
            serde_yaml::from_str("max_iterations: 5\ninteraction_mode: free\n").unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.interaction_mode, InteractionMode::Free);
        assert_eq!(config.temperature, 0.0);
    }
}
