// ABOUTME: Environment sandboxing for scoring subprocesses
// ABOUTME: Clears environment, whitelists keys, injects explicit vars, and sets working directory
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::config::BridgeConfig;

/// Policy controlling the subprocess execution environment
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Environment variable keys to pass through from the host
    pub allowed_env_keys: Vec<String>,
    /// Explicit variables set after the whitelist is applied
    pub env: Vec<(String, String)>,
    /// Working directory for the subprocess; inherited when `None`
    pub working_directory: Option<PathBuf>,
}

impl SandboxPolicy {
    /// Derive the policy for a bridge configuration
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            allowed_env_keys: config.allowed_env_keys.clone(),
            env: config.env.clone(),
            working_directory: config.working_directory.clone(),
        }
    }
}

/// Apply sandbox policy to a command before execution
///
/// This clears the subprocess environment, then re-injects only the
/// allowed keys from the host environment followed by the explicit
/// variables. The working directory is set when the policy names one.
pub fn apply_sandbox(cmd: &mut Command, policy: &SandboxPolicy) {
    cmd.env_clear();

    let mut missing = Vec::new();
    let mut resolved_count = 0usize;
    for key in &policy.allowed_env_keys {
        if let Ok(value) = env::var(key) {
            cmd.env(key, value);
            resolved_count += 1;
        } else {
            missing.push(key.as_str());
        }
    }

    for (key, value) in &policy.env {
        cmd.env(key, value);
    }

    if let Some(dir) = &policy.working_directory {
        cmd.current_dir(dir);
    }

    debug!(
        cwd = ?policy.working_directory,
        resolved_count,
        explicit_count = policy.env.len(),
        ?missing,
        "Applied sandbox policy"
    );
}
