// ABOUTME: Framing codec for the scoring process wire contract
// ABOUTME: Encodes a request as one JSON document and decodes the collected stdout after exit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! The wire contract is versionless: one JSON document on stdin, closed
//! after writing, and one JSON document on stdout. Decoding only ever sees
//! the complete stdout buffer.

use serde_json::Value;

use crate::config::{DecodeMode, DecodeOptions};
use crate::types::{PredictionError, PredictionRequest, PredictionResult};

/// Maximum number of stdout bytes echoed back in decode diagnostics (4 KiB)
pub const DIAGNOSTIC_PREFIX_BYTES: usize = 4096;

/// Serialize a request as a single newline-terminated JSON document
#[must_use]
pub fn encode(request: &PredictionRequest) -> Vec<u8> {
    let mut bytes = Value::Object(request.fields().clone())
        .to_string()
        .into_bytes();
    bytes.push(b'\n');
    bytes
}

/// Decode the full standard-output buffer into a result
///
/// `stderr` is attached to any failure because malformed output is almost
/// always explained by what the process wrote to its error stream.
///
/// # Errors
///
/// Returns a decode-kind `PredictionError` for empty or malformed JSON, and a
/// process-kind error when `options.error_field` marks the document as an
/// in-band failure report.
pub fn decode(
    stdout: &[u8],
    stderr: &str,
    options: &DecodeOptions,
) -> Result<PredictionResult, PredictionError> {
    let document = match options.mode {
        DecodeMode::Document => stdout,
        DecodeMode::LastLine => last_non_blank_line(stdout),
    };

    let value: Value = serde_json::from_slice(document).map_err(|e| {
        let detail = if document.iter().all(u8::is_ascii_whitespace) {
            "scoring process produced no output".to_owned()
        } else {
            format!("Failed to parse scoring process output as JSON: {e}")
        };
        PredictionError::decode(detail)
            .with_stderr(stderr)
            .with_stdout_prefix(diagnostic_prefix(stdout))
    })?;

    if let Some(field) = options.error_field.as_deref() {
        if let Some(reported) = value.get(field).filter(|v| !v.is_null()) {
            let detail = reported
                .as_str()
                .map_or_else(|| reported.to_string(), ToOwned::to_owned);
            return Err(PredictionError::process(detail)
                .with_stderr(stderr)
                .with_exit_code(0));
        }
    }

    Ok(PredictionResult::new(value))
}

/// Lossy UTF-8 prefix of `bytes`, at most [`DIAGNOSTIC_PREFIX_BYTES`] long
#[must_use]
pub fn diagnostic_prefix(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(DIAGNOSTIC_PREFIX_BYTES)]);
    let mut end = text.len().min(DIAGNOSTIC_PREFIX_BYTES);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}

fn last_non_blank_line(bytes: &[u8]) -> &[u8] {
    bytes
        .split(|b| *b == b'\n')
        .rev()
        .find(|line| !line.iter().all(u8::is_ascii_whitespace))
        .unwrap_or(&[])
}
