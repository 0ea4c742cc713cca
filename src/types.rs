// ABOUTME: Core types for the scoring bridge: requests, results, failures, and the Predictor trait
// ABOUTME: Defines the Outcome contract returned to the calling service layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Core Types
//!
//! Self-contained type definitions shared by every stage of the bridge.
//! Requests and results are opaque JSON; failures are plain data carrying
//! a [`FailureKind`] plus the diagnostics captured from the scoring process.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Error Type
// ============================================================================

/// Generic text shown to end users for any failed prediction
const USER_FACING_FAILURE: &str = "processing failed";

/// Categories of terminal failures produced by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The scoring process could not be started
    Launch,
    /// The scoring process ran but exited non-zero or terminated abnormally
    Process,
    /// The scoring process output could not be parsed as a result document
    Decode,
    /// The deadline expired and the scoring process was killed
    Timeout,
}

impl FailureKind {
    /// Stable identifier used in logs and CLI output
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch_error",
            Self::Process => "process_error",
            Self::Decode => "decode_error",
            Self::Timeout => "timeout_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a single prediction request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionError {
    /// Failure category
    pub kind: FailureKind,
    /// Diagnostic detail (OS error text, stderr summary, parser message)
    pub detail: String,
    /// Everything the scoring process wrote to standard error
    pub stderr: String,
    /// Exit code, when the process exited normally
    pub exit_code: Option<i32>,
    /// Bounded prefix of standard output, kept for decode diagnostics
    pub stdout_prefix: Option<String>,
}

impl PredictionError {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            stderr: String::new(),
            exit_code: None,
            stdout_prefix: None,
        }
    }

    /// Create a launch error
    pub fn launch(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Launch, detail)
    }

    /// Create a process error
    pub fn process(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Process, detail)
    }

    /// Create a decode error
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Decode, detail)
    }

    /// Create a timeout error
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    /// Attach the captured standard error text
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Attach the process exit code
    #[must_use]
    pub const fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attach a prefix of the raw standard output
    #[must_use]
    pub fn with_stdout_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stdout_prefix = Some(prefix.into());
        self
    }

    /// Text safe to show to end users; the diagnostic detail is for logs only
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        USER_FACING_FAILURE
    }
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {code}): {}", self.kind, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

impl std::error::Error for PredictionError {}

// ============================================================================
// Request/Result Types
// ============================================================================

/// Input features for one scoring operation
///
/// A mapping of field names to JSON values. The bridge enforces no schema;
/// validation belongs to the scoring process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionRequest {
    fields: Map<String, Value>,
}

impl PredictionRequest {
    /// Create an empty request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build a request from any value that serializes to a JSON object
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails or the value is not an object.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Self::try_from(serde_json::to_value(value)?)
    }

    /// Look up a field by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Number of fields in the request
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the request carries no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying field map
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Value> for PredictionRequest {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let fields: Map<String, Value> = serde_json::from_value(value)?;
        Ok(Self { fields })
    }
}

impl From<Map<String, Value>> for PredictionRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Structured value returned by the scoring process on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResult(Value);

impl PredictionResult {
    /// Wrap a decoded JSON value
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the decoded JSON value
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take ownership of the decoded JSON value
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a top-level key when the result is an object
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize the result into a caller-defined type
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the result does not match `T`.
    pub fn decode_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }
}

/// Terminal value produced exactly once per request
pub type Outcome = Result<PredictionResult, PredictionError>;

// ============================================================================
// Predictor Trait
// ============================================================================

/// Seam between the calling service layer and a prediction backend
///
/// [`ScoringBridge`](crate::ScoringBridge) is the production implementation;
/// service-layer tests can substitute their own.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Run one prediction to completion
    async fn predict(&self, request: &PredictionRequest) -> Outcome;

    /// Check whether the backend is able to serve requests
    async fn health_check(&self) -> Result<bool, PredictionError>;
}
