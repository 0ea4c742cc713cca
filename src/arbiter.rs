// ABOUTME: Completion arbiter correlating a scoring process's exit status with its output
// ABOUTME: Produces exactly one Outcome: decoded result or classified failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::process::ExitStatus;

use tracing::debug;

use crate::codec::decode;
use crate::collector::CollectedOutput;
use crate::config::DecodeOptions;
use crate::types::{Outcome, PredictionError};

/// Detail text for a process that did not exit with a code
pub const ABNORMAL_TERMINATION: &str = "abnormal termination";

/// Resolve the terminal outcome of a finished scoring process
///
/// - exit code zero: stdout is decoded; malformed output is still a failure
/// - non-zero exit code: process failure with stderr as detail, whatever stdout holds
/// - no exit code (signal): process failure with [`ABNORMAL_TERMINATION`]
pub fn resolve(status: ExitStatus, output: &CollectedOutput, options: &DecodeOptions) -> Outcome {
    let stderr = output.stderr_text();

    match status.code() {
        Some(0) => decode(&output.stdout, &stderr, options),
        Some(code) => {
            let trimmed = stderr.trim();
            let detail = if trimmed.is_empty() {
                format!("process exited with code {code}")
            } else {
                trimmed.to_owned()
            };
            debug!(
                exit_code = code,
                stdout_len = output.stdout.len(),
                "Scoring process exited non-zero"
            );
            Err(PredictionError::process(detail)
                .with_stderr(stderr)
                .with_exit_code(code))
        }
        None => {
            debug!(signal = ?termination_signal(status), "Scoring process terminated abnormally");
            Err(PredictionError::process(ABNORMAL_TERMINATION).with_stderr(stderr))
        }
    }
}

#[cfg(unix)]
fn termination_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: ExitStatus) -> Option<i32> {
    None
}
