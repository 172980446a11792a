//! Configuration file location.
//!
//! Resolution order:
//!
//! 1. An explicit `--config` path, used as given.
//! 2. `config.yaml` in the current working directory, when it exists
//!    (typical with `cargo run` from the project root).
//! 3. `config.yaml` under the platform config directory
//!    (`~/.config/midi-staff` on Linux, `%APPDATA%\midi-staff` on Windows).

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for the platform config directory
const APP_NAME: &str = "midi-staff";

const CONFIG_FILE: &str = "config.yaml";

/// Resolve the configuration path for this run.
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_config_in(explicit, &cwd, dirs::config_dir())
}

fn resolve_config_in(explicit: Option<&Path>, cwd: &Path, config_dir: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        debug!("Using explicit config path {}", path.display());
        return path.to_path_buf();
    }

    let cwd_config = cwd.join(CONFIG_FILE);
    if cwd_config.exists() {
        debug!("Using config from working directory {}", cwd.display());
        return cwd_config;
    }

    match config_dir {
        Some(dir) => dir.join(APP_NAME).join(CONFIG_FILE),
        None => cwd_config,
    }
}
