// ABOUTME: Bridge façade running one scoring process per prediction request
// ABOUTME: Joins stdin feed, stdout/stderr drains, and exit wait under an optional deadline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, info, warn};

use crate::arbiter::resolve;
use crate::codec::{diagnostic_prefix, encode};
use crate::collector::{drain_into, feed_stdin, CollectedOutput, StreamName};
use crate::config::BridgeConfig;
use crate::discovery::resolve_program;
use crate::launcher::{launch, ProcessHandle};
use crate::types::{Outcome, PredictionError, PredictionRequest, Predictor};

/// Public entry point for running predictions through an external scoring process
///
/// Cloning is cheap; clones share the read-only configuration and nothing
/// else. Every call to [`predict`](Self::predict) launches its own process
/// with its own pipes and buffers, so concurrent calls are fully isolated.
///
/// Dropping an in-flight `predict` future kills the scoring process.
#[derive(Debug, Clone)]
pub struct ScoringBridge {
    config: Arc<BridgeConfig>,
}

impl ScoringBridge {
    /// Create a bridge for the given configuration
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration this bridge launches processes with
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run one prediction using the configured default deadline
    pub async fn predict(&self, request: &PredictionRequest) -> Outcome {
        self.predict_with_deadline(request, self.config.timeout).await
    }

    /// Run one prediction with an explicit deadline (`None` waits for exit)
    pub async fn predict_with_deadline(
        &self,
        request: &PredictionRequest,
        deadline: Option<Duration>,
    ) -> Outcome {
        let start = Instant::now();
        let outcome = self.run(request, deadline).await;
        let duration = start.elapsed();

        match &outcome {
            Ok(_) => info!(?duration, "Prediction completed"),
            Err(e) => warn!(
                kind = %e.kind,
                exit_code = ?e.exit_code,
                detail = %e.detail,
                stderr = %e.stderr,
                ?duration,
                "Prediction failed"
            ),
        }
        outcome
    }

    /// Run one prediction and deserialize the result into `T`
    ///
    /// # Errors
    ///
    /// Returns the prediction failure, or a decode-kind error if the result
    /// does not have the shape of `T`.
    pub async fn predict_typed<T: DeserializeOwned>(
        &self,
        request: &PredictionRequest,
    ) -> Result<T, PredictionError> {
        let result = self.predict(request).await?;
        result.decode_as().map_err(|e| {
            PredictionError::decode(format!("Result does not match the expected shape: {e}"))
                .with_stdout_prefix(diagnostic_prefix(result.as_value().to_string().as_bytes()))
        })
    }

    /// Check that the scoring program resolves and the working directory exists
    pub fn is_ready(&self) -> bool {
        let program = self.config.program.to_string_lossy();
        if let Err(e) = resolve_program(&program, None) {
            warn!(detail = %e.detail, "Scoring program is not available");
            return false;
        }
        if let Some(dir) = &self.config.working_directory {
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "Scoring working directory does not exist");
                return false;
            }
        }
        debug!(program = %program, "Scoring bridge ready");
        true
    }

    async fn run(&self, request: &PredictionRequest, deadline: Option<Duration>) -> Outcome {
        let body = encode(request);
        let mut handle = launch(&self.config)?;
        let pid = handle.pid();

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (handle.take_stdin(), handle.take_stdout(), handle.take_stderr())
        else {
            return Err(PredictionError::launch(
                "Scoring process started without all three standard pipes",
            ));
        };

        let mut output = CollectedOutput::default();
        let finished = {
            let pipeline = run_pipeline(&mut handle, stdin, stdout, stderr, &body, &mut output);
            match deadline {
                Some(limit) => tokio_timeout(limit, pipeline).await.map_err(|_| limit),
                None => Ok(pipeline.await),
            }
        };

        match finished {
            Ok(Ok(status)) => {
                debug!(
                    pid,
                    exit_code = ?status.code(),
                    stdout_len = output.stdout.len(),
                    stderr_len = output.stderr.len(),
                    "Scoring process completed"
                );
                resolve(status, &output, &self.config.decode)
            }
            Ok(Err(e)) => {
                if let Err(kill_err) = handle.kill().await {
                    warn!(pid, error = %kill_err, "Failed to kill scoring process");
                }
                Err(e.with_stderr(output.stderr_text()))
            }
            Err(limit) => {
                warn!(pid, ?limit, "Scoring process exceeded deadline, killing process");
                if let Err(kill_err) = handle.kill().await {
                    warn!(pid, error = %kill_err, "Failed to kill scoring process");
                }
                Err(PredictionError::timeout(format!(
                    "Scoring process did not finish within {limit:?} and was killed"
                ))
                .with_stderr(output.stderr_text()))
            }
        }
    }
}

/// Feed stdin, drain both output streams, and wait for exit, all concurrently
///
/// Returns only after the process has exited and both streams reached
/// end-of-file, so the caller never sees a partial read.
async fn run_pipeline(
    handle: &mut ProcessHandle,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    body: &[u8],
    output: &mut CollectedOutput,
) -> Result<ExitStatus, PredictionError> {
    let CollectedOutput {
        stdout: stdout_buf,
        stderr: stderr_buf,
    } = output;

    let (fed, stdout_read, stderr_read, waited) = tokio::join!(
        feed_stdin(stdin, body),
        drain_into(stdout, stdout_buf, StreamName::Stdout),
        drain_into(stderr, stderr_buf, StreamName::Stderr),
        handle.wait(),
    );

    let status = waited.map_err(|e| {
        PredictionError::process(format!("Failed to wait for scoring process: {e}"))
    })?;
    stdout_read.map_err(|e| {
        PredictionError::process(format!("Failed to read scoring process stdout: {e}"))
    })?;
    stderr_read.map_err(|e| {
        PredictionError::process(format!("Failed to read scoring process stderr: {e}"))
    })?;
    fed.map_err(|e| {
        PredictionError::process(format!("Failed to write request to scoring process: {e}"))
    })?;

    Ok(status)
}

#[async_trait]
impl Predictor for ScoringBridge {
    fn name(&self) -> &str {
        "scoring-bridge"
    }

    async fn predict(&self, request: &PredictionRequest) -> Outcome {
        Self::predict(self, request).await
    }

    async fn health_check(&self) -> Result<bool, PredictionError> {
        Ok(self.is_ready())
    }
}
