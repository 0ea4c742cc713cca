// ABOUTME: TOML configuration file support for the scoring bridge
// ABOUTME: Loads BridgeConfig from a file, defaulting to the user config directory
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! Example file:
//!
//! ```toml
//! program = "python3"
//! args = ["src/lib/ml_model.py"]
//! timeout_secs = 30
//! working_directory = "/srv/scoring"
//! allowed_env_keys = ["HOME", "PATH", "PYTHONPATH"]
//! decode_mode = "last-line"
//! error_field = "error"
//!
//! [env]
//! TF_CPP_MIN_LOG_LEVEL = "3"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::config::{BridgeConfig, ConfigError, DecodeMode};
use crate::discovery::resolve_program;

/// File name looked up inside the `scorebridge` config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// On-disk shape of the configuration file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    /// `0` disables the deadline; absent keeps the default
    timeout_secs: Option<u64>,
    working_directory: Option<PathBuf>,
    allowed_env_keys: Option<Vec<String>>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    decode_mode: DecodeMode,
    error_field: Option<String>,
}

/// Default configuration file path (`<config dir>/scorebridge/config.toml`)
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scorebridge").join(CONFIG_FILE_NAME))
}

/// Load a bridge configuration from a TOML file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, or if the
/// configured program cannot be resolved.
pub fn load(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ConfigError::new(format!("Failed to read {}: {e}", path.display())))?;
    let config = parse(&raw)?;
    debug!(
        path = %path.display(),
        program = %config.program.display(),
        "Loaded configuration file"
    );
    Ok(config)
}

/// Parse a bridge configuration from TOML text
///
/// # Errors
///
/// Returns `ConfigError` if the text is not a valid configuration or the
/// configured program cannot be resolved.
pub fn parse(raw: &str) -> Result<BridgeConfig, ConfigError> {
    let file: FileConfig = toml::from_str(raw)
        .map_err(|e| ConfigError::new(format!("Invalid configuration file: {e}")))?;

    let program = resolve_program(&file.program, None).map_err(|e| ConfigError::new(e.detail))?;
    let mut config = BridgeConfig::new(program)
        .with_args(file.args)
        .with_decode_mode(file.decode_mode);

    match file.timeout_secs {
        Some(0) => config = config.without_timeout(),
        Some(secs) => config = config.with_timeout(Duration::from_secs(secs)),
        None => {}
    }
    if let Some(dir) = file.working_directory {
        config = config.with_working_directory(dir);
    }
    if let Some(keys) = file.allowed_env_keys {
        config = config.with_allowed_env_keys(keys);
    }
    for (key, value) in file.env {
        config = config.with_env(key, value);
    }
    if let Some(field) = file.error_field {
        config = config.with_error_field(field);
    }

    Ok(config)
}
