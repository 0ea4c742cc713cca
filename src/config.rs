// ABOUTME: Process-wide configuration for the scoring bridge
// ABOUTME: Defines the scoring command, deadline, environment policy, and env-var loading
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::resolve_program;

/// Default deadline for one prediction (120 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Interpreter used by [`BridgeConfig::python_script`]
const PYTHON_INTERPRETER: &str = "python3";

/// Environment variable naming the scoring program
pub const ENV_PROGRAM: &str = "SCOREBRIDGE_PROGRAM";
/// Environment variable with comma-separated program arguments
pub const ENV_ARGS: &str = "SCOREBRIDGE_ARGS";
/// Environment variable with the deadline in seconds (`0` disables it)
pub const ENV_TIMEOUT_SECS: &str = "SCOREBRIDGE_TIMEOUT_SECS";
/// Environment variable with comma-separated env keys passed to the process
pub const ENV_ENV_KEYS: &str = "SCOREBRIDGE_ENV_KEYS";
/// Environment variable with the working directory of the process
pub const ENV_WORKDIR: &str = "SCOREBRIDGE_WORKDIR";
/// Environment variable selecting the stdout decode mode
pub const ENV_DECODE_MODE: &str = "SCOREBRIDGE_DECODE_MODE";
/// Environment variable naming the in-band error field of result documents
pub const ENV_ERROR_FIELD: &str = "SCOREBRIDGE_ERROR_FIELD";

/// Error raised while building a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Human-readable error message
    pub message: String,
}

impl ConfigError {
    /// Create a configuration error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// How the collected standard output is turned into a result document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeMode {
    /// The whole stdout buffer is one JSON document
    #[default]
    Document,
    /// Only the last non-blank line of stdout is the JSON document
    LastLine,
}

impl FromStr for DecodeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "document" => Ok(Self::Document),
            "last-line" | "last_line" => Ok(Self::LastLine),
            other => Err(ConfigError::new(format!(
                "unknown decode mode '{other}' (expected 'document' or 'last-line')"
            ))),
        }
    }
}

/// Options consulted when turning stdout into a [`PredictionResult`](crate::PredictionResult)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Which part of stdout holds the document
    pub mode: DecodeMode,
    /// Top-level field whose non-null presence marks an in-band failure report
    pub error_field: Option<String>,
}

/// Configuration for a scoring bridge instance
///
/// Read once at initialization and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to the scoring program (an interpreter or an executable)
    pub program: PathBuf,
    /// Fixed arguments passed on every launch (e.g. the script path)
    pub args: Vec<String>,
    /// Default deadline per prediction; `None` waits for process exit
    pub timeout: Option<Duration>,
    /// Environment variable keys passed through from the host
    pub allowed_env_keys: Vec<String>,
    /// Explicit environment variables set on the process
    pub env: Vec<(String, String)>,
    /// Working directory for the process
    pub working_directory: Option<PathBuf>,
    /// Stdout decoding options
    pub decode: DecodeOptions,
}

impl BridgeConfig {
    /// Create a configuration for the given program path
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            allowed_env_keys: default_allowed_env_keys(),
            env: Vec::new(),
            working_directory: None,
            decode: DecodeOptions::default(),
        }
    }

    /// Configuration that runs a Python scoring script with `python3`
    #[must_use]
    pub fn python_script(script: impl Into<PathBuf>) -> Self {
        let script: PathBuf = script.into();
        Self::new(PYTHON_INTERPRETER).with_args(vec![script.to_string_lossy().into_owned()])
    }

    /// Build a configuration from `SCOREBRIDGE_*` environment variables
    ///
    /// Reads:
    /// - `SCOREBRIDGE_PROGRAM` → program (required, resolved on `PATH` when not a path)
    /// - `SCOREBRIDGE_ARGS` → comma-separated arguments
    /// - `SCOREBRIDGE_TIMEOUT_SECS` → deadline (`0` disables it)
    /// - `SCOREBRIDGE_ENV_KEYS` → comma-separated environment whitelist
    /// - `SCOREBRIDGE_WORKDIR` → working directory
    /// - `SCOREBRIDGE_DECODE_MODE` → `document` or `last-line`
    /// - `SCOREBRIDGE_ERROR_FIELD` → in-band error field name
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the program is unset or unresolvable, or if a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let program_name = env::var(ENV_PROGRAM).map_err(|_| {
            ConfigError::new(format!("{ENV_PROGRAM} environment variable is required"))
        })?;
        let program =
            resolve_program(&program_name, None).map_err(|e| ConfigError::new(e.detail))?;

        let mut config = Self::new(program);

        if let Ok(args) = env::var(ENV_ARGS) {
            config.args = parse_list(&args);
        }

        if let Ok(raw) = env::var(ENV_TIMEOUT_SECS) {
            config.timeout = parse_timeout(&raw).map_err(|e| {
                ConfigError::new(format!("{ENV_TIMEOUT_SECS} is not a valid u64: {e}"))
            })?;
        }

        if let Ok(keys) = env::var(ENV_ENV_KEYS) {
            config.allowed_env_keys = parse_list(&keys);
        }

        if let Ok(dir) = env::var(ENV_WORKDIR) {
            config.working_directory = Some(PathBuf::from(dir));
        }

        if let Ok(mode) = env::var(ENV_DECODE_MODE) {
            config.decode.mode = mode.parse()?;
        }

        config.decode.error_field = env::var(ENV_ERROR_FIELD)
            .ok()
            .map(|f| f.trim().to_owned())
            .filter(|f| !f.is_empty());

        Ok(config)
    }

    /// Set the fixed program arguments
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set the default deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for process exit without a default deadline
    #[must_use]
    pub const fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the environment variable keys passed through to the process
    #[must_use]
    pub fn with_allowed_env_keys(mut self, keys: Vec<String>) -> Self {
        self.allowed_env_keys = keys;
        self
    }

    /// Set an explicit environment variable on the process
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory for the process
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the stdout decode mode
    #[must_use]
    pub const fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode.mode = mode;
        self
    }

    /// Treat result objects carrying `field` as in-band failure reports
    #[must_use]
    pub fn with_error_field(mut self, field: impl Into<String>) -> Self {
        self.decode.error_field = Some(field.into());
        self
    }
}

/// Default set of environment variable keys safe to pass through to the scoring process
#[must_use]
pub fn default_allowed_env_keys() -> Vec<String> {
    ["HOME", "PATH", "TERM", "USER", "LANG", "PYTHONPATH", "VIRTUAL_ENV"]
        .iter()
        .map(|k| (*k).to_owned())
        .collect()
}

/// Parse a comma-separated list, dropping blank entries
#[must_use]
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse a deadline in seconds; `0` means no deadline
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a `u64`.
pub fn parse_timeout(input: &str) -> Result<Option<Duration>, ParseIntError> {
    let secs = input.trim().parse::<u64>()?;
    Ok((secs > 0).then_some(Duration::from_secs(secs)))
}
