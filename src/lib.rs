// ABOUTME: External process prediction bridge library
// ABOUTME: Runs a scoring program per request over a JSON stdin/stdout contract
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # scorebridge: External Process Prediction Bridge
//!
//! Hands a structured scoring request to a separately running program
//! (typically a Python model script) through its standard input, and returns
//! the JSON document it prints on standard output, or a classified failure.
//!
//! Each prediction launches its own process. Standard input is written and
//! closed while standard output and standard error are drained concurrently,
//! so a process that writes heavily to either stream can never deadlock the
//! bridge on a full pipe.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scorebridge::{BridgeConfig, PredictionRequest, ScoringBridge};
//!
//! # async fn example() -> Result<(), scorebridge::PredictionError> {
//! let bridge = ScoringBridge::new(BridgeConfig::python_script("src/lib/ml_model.py"));
//! let request = PredictionRequest::new()
//!     .with_field("age", 20)
//!     .with_field("attendance_rate", 92.5);
//! let result = bridge.predict(&request).await?;
//! println!("{}", result.as_value());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: requests, results, failures, and the `Predictor` trait
//! - [`config`]: process-wide configuration and env-var loading
//! - [`discovery`]: scoring program resolution
//! - [`sandbox`]: environment whitelisting and working directory control
//! - [`launcher`]: one subprocess per request
//! - [`codec`]: JSON framing of requests and results
//! - [`collector`]: concurrent stdin feed and stdout/stderr drain loops
//! - [`arbiter`]: exit status to outcome resolution
//! - [`bridge`]: the `ScoringBridge` façade

/// Core types: requests, results, failures, and the `Predictor` trait
pub mod types;

/// Exit status to outcome resolution
pub mod arbiter;
/// Public prediction façade
pub mod bridge;
/// JSON framing of requests and results
pub mod codec;
/// Concurrent stdin feed and output drain loops
pub mod collector;
/// Process-wide bridge configuration
pub mod config;
/// TOML configuration file loading
#[cfg(feature = "config-file")]
pub mod config_file;
/// Scoring program resolution
pub mod discovery;
/// Scoring subprocess launch
pub mod launcher;
/// Environment sandboxing
pub mod sandbox;

pub use bridge::ScoringBridge;
pub use config::{BridgeConfig, ConfigError, DecodeMode};
pub use launcher::ProcessHandle;
pub use types::{
    FailureKind, Outcome, PredictionError, PredictionRequest, PredictionResult, Predictor,
};
