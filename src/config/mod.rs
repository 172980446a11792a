//! Configuration management for midi-staff
//!
//! Handles loading, parsing, and validation of the YAML configuration file.
//! Every field has a default, so an absent file or an empty document is a
//! valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::session::SessionOptions;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// MIDI access and device selection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MidiConfig {
    /// Client name announced to the OS MIDI subsystem
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Port list polling period used to detect hot-plug
    #[serde(default = "default_hotplug_poll_ms")]
    pub hotplug_poll_ms: u64,
    /// Case-insensitive substring of the input to select on startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_device: Option<String>,
    /// Select the first connected input when no preferred device is set
    #[serde(default = "default_true")]
    pub auto_select: bool,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            hotplug_poll_ms: default_hotplug_poll_ms(),
            preferred_device: None,
            auto_select: default_true(),
        }
    }
}

/// Terminal output
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub color: bool,
    /// Print every decoded event in addition to the staff line
    #[serde(default)]
    pub show_events: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: default_true(),
            show_events: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        };

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }
        if self.midi.hotplug_poll_ms == 0 {
            anyhow::bail!("midi.hotplug_poll_ms must be greater than 0");
        }
        if let Some(pattern) = &self.midi.preferred_device {
            if pattern.trim().is_empty() {
                anyhow::bail!("midi.preferred_device cannot be empty when set");
            }
        }
        Ok(())
    }

    /// Device selection options for the session actor
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_select: self.midi.auto_select,
            preferred_device: self.midi.preferred_device.clone(),
        }
    }
}

fn default_client_name() -> String { "midi-staff".to_string() }
fn default_hotplug_poll_ms() -> u64 { 500 }
fn default_true() -> bool { true }
