use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Name prefix of temporary groups created for consecutive execution.
    pub temporary_group_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temporary_group_prefix: "TmpGroup".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_file(file_path: &str) -> Result<Self> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file from {}", file_path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to deserialize config from {}", file_path))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
