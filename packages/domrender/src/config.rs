use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use vellum_common::DEFAULT_SIGNAL_CAPACITY;

pub const DEFAULT_CONFIG_NAME: &str = "vellum.config.json";

/// Renderer configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    /// Selector of the host element the root component is mounted on
    #[serde(default = "default_mount_point_selector")]
    pub mount_point_selector: String,

    /// Size of the instruction buffer shared with the host, in bytes
    #[serde(default = "default_buffer_size")]
    pub instruction_buffer_size: usize,

    /// Largest event payload accepted from the host, in bytes
    #[serde(default = "default_buffer_size")]
    pub event_buffer_size: usize,

    /// Pending render requests held before new ones are dropped
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,
}

fn default_mount_point_selector() -> String {
    "#vellum_mount_point".to_string()
}

fn default_buffer_size() -> usize {
    16384
}

fn default_signal_capacity() -> usize {
    DEFAULT_SIGNAL_CAPACITY
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Invalid renderer config")
    }

    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_json_str(&content)
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            mount_point_selector: default_mount_point_selector(),
            instruction_buffer_size: default_buffer_size(),
            event_buffer_size: default_buffer_size(),
            signal_capacity: default_signal_capacity(),
        }
    }
}
