// ABOUTME: Scoring program resolution for the bridge
// ABOUTME: Resolves the configured program via env override, explicit path, or PATH lookup
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::PredictionError;

/// Resolve a scoring program, optionally using an override path
///
/// Resolution order:
/// 1. If `env_override` is `Some`, use that value as the path
/// 2. If `name` contains a path separator, use it as a path
/// 3. Otherwise, search `PATH` using `which`
///
/// # Errors
///
/// Returns a launch-kind `PredictionError` if the program cannot be found.
pub fn resolve_program(name: &str, env_override: Option<&str>) -> Result<PathBuf, PredictionError> {
    if let Some(override_path) = env_override {
        return existing_path(name, Path::new(override_path), "override");
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return existing_path(name, candidate, "explicit path");
    }

    which::which(name)
        .inspect(|path| debug!(program = name, path = %path.display(), "Resolved via PATH"))
        .map_err(|e| PredictionError::launch(format!("Program '{name}' not found on PATH: {e}")))
}

fn existing_path(name: &str, path: &Path, source: &str) -> Result<PathBuf, PredictionError> {
    if path.exists() {
        debug!(program = name, path = %path.display(), source, "Resolved program");
        Ok(path.to_path_buf())
    } else {
        Err(PredictionError::launch(format!(
            "Program path for '{name}' does not exist ({source}): {}",
            path.display()
        )))
    }
}
