// ABOUTME: Integration tests driving real shell scoring processes through the bridge
// ABOUTME: Covers success, failure classification, large output, deadlines, and isolation
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::time::{Duration, Instant};

use scorebridge::{
    BridgeConfig, DecodeMode, FailureKind, PredictionRequest, Predictor, ScoringBridge,
};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinSet;

/// Bridge whose scoring process is `sh -c <script>`
fn shell_bridge(script: &str) -> ScoringBridge {
    ScoringBridge::new(shell_config(script))
}

fn shell_config(script: &str) -> BridgeConfig {
    BridgeConfig::new("sh").with_args(vec!["-c".to_owned(), script.to_owned()])
}

fn sample_request() -> PredictionRequest {
    PredictionRequest::new()
        .with_field("feature_a", 1)
        .with_field("feature_b", "x")
}

// ============================================================================
// Success Path
// ============================================================================

#[tokio::test]
async fn echo_process_returns_request_payload() {
    let bridge = shell_bridge("cat");
    let request = PredictionRequest::new()
        .with_field("age", 20)
        .with_field("scores", json!([88, 92.5, 79]))
        .with_field("career_interest", "data science");

    let result = bridge.predict(&request).await.unwrap();
    assert_eq!(
        result.as_value(),
        &json!({"age": 20, "scores": [88, 92.5, 79], "career_interest": "data science"})
    );
}

#[tokio::test]
async fn scoring_process_result_is_returned() {
    let bridge = shell_bridge(r#"cat > /dev/null; printf '{"score": 0.87}\n'"#);
    let result = bridge.predict(&sample_request()).await.unwrap();
    assert_eq!(result.as_value(), &json!({"score": 0.87}));
}

#[tokio::test]
async fn typed_prediction_deserializes_result() {
    #[derive(Debug, Deserialize)]
    struct Insights {
        #[serde(rename = "Strengths")]
        strengths: Vec<String>,
    }
    #[derive(Debug, Deserialize)]
    struct Report {
        prediction: f64,
        insights: Insights,
    }

    let document = r#"{"prediction": 81.25, "insights": {"Strengths": ["Strong attendance."]}}"#;
    let bridge = shell_bridge(&format!("cat > /dev/null; echo '{document}'"));
    let report: Report = bridge.predict_typed(&sample_request()).await.unwrap();
    assert!((report.prediction - 81.25).abs() < f64::EPSILON);
    assert_eq!(report.insights.strengths, vec!["Strong attendance."]);

    let err = bridge
        .predict_typed::<Vec<u32>>(&sample_request())
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn process_that_ignores_stdin_still_succeeds() {
    let bridge = shell_bridge(r#"echo '{"ok": true}'"#);
    let request = PredictionRequest::new().with_field("blob", "y".repeat(512 * 1024));
    let result = bridge.predict(&request).await.unwrap();
    assert_eq!(result.get("ok"), Some(&json!(true)));
}

// ============================================================================
// Failure Classification
// ============================================================================

#[tokio::test]
async fn non_zero_exit_is_process_error_with_stderr_detail() {
    let bridge = shell_bridge(
        r#"cat > /dev/null; echo '{"score": 0.87}'; echo "invalid feature_b" >&2; exit 1"#,
    );
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Process);
    assert_eq!(err.detail, "invalid feature_b");
    assert_eq!(err.exit_code, Some(1));
    assert_eq!(err.user_message(), "processing failed");
}

#[tokio::test]
async fn malformed_output_with_clean_exit_is_decode_error() {
    let bridge = shell_bridge(
        r#"cat > /dev/null; echo 'Prediction: 0.87'; echo 'UserWarning: feature names' >&2"#,
    );
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
    assert_eq!(err.exit_code, None);
    assert!(err
        .stdout_prefix
        .as_deref()
        .is_some_and(|p| p.contains("Prediction: 0.87")));
    assert!(err.stderr.contains("UserWarning"));
}

#[tokio::test]
async fn empty_output_is_decode_error() {
    let bridge = shell_bridge("cat > /dev/null");
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
    assert_eq!(err.detail, "scoring process produced no output");
}

#[tokio::test]
async fn missing_program_is_launch_error() {
    let bridge = ScoringBridge::new(BridgeConfig::new("/nonexistent/bin/ml-scorer"));
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Launch);
    assert!(err.detail.contains("/nonexistent/bin/ml-scorer"));
}

#[cfg(unix)]
#[tokio::test]
async fn signal_termination_is_abnormal() {
    let bridge = shell_bridge("kill -9 $$");
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Process);
    assert_eq!(err.detail, "abnormal termination");
    assert_eq!(err.exit_code, None);
}

#[tokio::test]
async fn in_band_error_report_is_process_error() {
    let document = r#"{"error": "could not convert string to float", "traceback": "..."}"#;
    let script = format!("cat > /dev/null; echo '{document}'");
    let bridge = ScoringBridge::new(shell_config(&script).with_error_field("error"));
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Process);
    assert_eq!(err.detail, "could not convert string to float");
}

#[tokio::test]
async fn last_line_mode_ignores_progress_text() {
    let script = r#"cat > /dev/null; echo 'Epoch 1/1 - 0s 40ms/step'; echo '{"prediction": 72.4}'"#;
    let bridge = ScoringBridge::new(shell_config(script).with_decode_mode(DecodeMode::LastLine));
    let result = bridge.predict(&sample_request()).await.unwrap();
    assert_eq!(result.get("prediction"), Some(&json!(72.4)));
}

// ============================================================================
// Pipe Backpressure
// ============================================================================

#[tokio::test]
async fn large_output_on_both_streams_does_not_deadlock() {
    // 4 MiB on each stream, interleaved, far beyond any kernel pipe buffer
    let script = r#"
        cat > /dev/null
        i=0
        printf '{"blob":"'
        while [ $i -lt 64 ]; do
            head -c 65536 /dev/zero | tr '\0' 'e' >&2
            head -c 65536 /dev/zero | tr '\0' 'o'
            i=$((i + 1))
        done
        printf '"}'
    "#;
    let bridge = ScoringBridge::new(shell_config(script).with_timeout(Duration::from_secs(60)));
    let result = bridge.predict(&sample_request()).await.unwrap();
    let blob = result.get("blob").and_then(|v| v.as_str()).unwrap();
    assert_eq!(blob.len(), 64 * 65536);
    assert!(blob.bytes().all(|b| b == b'o'));
}

#[tokio::test]
async fn large_stderr_before_failure_is_captured_in_full() {
    let script = "cat > /dev/null; head -c 1048576 /dev/zero | tr '\\0' 'w' >&2; exit 2";
    let bridge = shell_bridge(script);
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Process);
    assert_eq!(err.exit_code, Some(2));
    assert_eq!(err.stderr.len(), 1_048_576);
}

// ============================================================================
// Deadlines
// ============================================================================

#[cfg(target_os = "linux")]
#[tokio::test]
async fn deadline_kills_process_and_reports_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("scorer.pid");
    let script = format!(
        "echo $$ > {}; echo 'loading model' >&2; exec sleep 30",
        pid_file.display()
    );
    let bridge = shell_bridge(&script);

    let started = Instant::now();
    let err = bridge
        .predict_with_deadline(&sample_request(), Some(Duration::from_millis(500)))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert!(err.stderr.contains("loading model"));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(
        !is_running(pid.trim()),
        "scoring process {} still running after timeout",
        pid.trim()
    );
}

/// Whether a pid refers to a process that is still running (zombies count as gone)
#[cfg(target_os = "linux")]
fn is_running(pid: &str) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
        stat.rsplit_once(") ")
            .and_then(|(_, rest)| rest.chars().next())
            .is_some_and(|state| state != 'Z')
    })
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn abandoned_prediction_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("scorer.pid");
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
    let bridge = shell_bridge(&script);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        bridge.predict_with_deadline(&sample_request(), None),
    )
    .await;
    assert!(abandoned.is_err());

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    assert!(wait_until_gone(pid).await, "scoring process {pid} survived cancellation");
}

/// Poll until `pid` is gone or five seconds pass
#[cfg(target_os = "linux")]
async fn wait_until_gone(pid: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while is_running(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !is_running(pid)
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn deadline_kills_forked_helper_after_parent_exits() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("helper.pid");
    let script = format!("sleep 30 & echo $! > {}; exit 0", pid_file.display());
    let bridge = shell_bridge(&script);

    let started = Instant::now();
    let err = bridge
        .predict_with_deadline(&sample_request(), Some(Duration::from_millis(500)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    assert!(wait_until_gone(pid).await, "helper {pid} survived the deadline");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn abandoned_prediction_kills_forked_helper() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("helper.pid");
    let script = format!("sleep 30 & echo $! > {}; exec sleep 30", pid_file.display());
    let bridge = shell_bridge(&script);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        bridge.predict_with_deadline(&sample_request(), None),
    )
    .await;
    assert!(abandoned.is_err());

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    assert!(wait_until_gone(pid).await, "helper {pid} survived cancellation");
}

#[cfg(unix)]
#[tokio::test]
async fn non_executable_scoring_program_is_launch_error() {
    use std::io::Write;

    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "#!/bin/sh\necho '{{\"score\": 1}}'").unwrap();
    script.flush().unwrap();

    let bridge = ScoringBridge::new(BridgeConfig::new(script.path()));
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Launch);
    assert!(err.stderr.is_empty());
}

#[tokio::test]
async fn process_that_never_reads_stdin_is_bounded_by_deadline() {
    let bridge = shell_bridge("sleep 30");
    let request = PredictionRequest::new().with_field("blob", "z".repeat(1024 * 1024));
    let err = bridge
        .predict_with_deadline(&request, Some(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn configured_default_deadline_applies() {
    let bridge =
        ScoringBridge::new(shell_config("sleep 30").with_timeout(Duration::from_millis(200)));
    let err = bridge.predict(&sample_request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn no_deadline_waits_for_exit() {
    let bridge = ScoringBridge::new(
        shell_config(r#"cat > /dev/null; sleep 0.2; echo '{"done": true}'"#).without_timeout(),
    );
    let result = bridge.predict(&sample_request()).await.unwrap();
    assert_eq!(result.get("done"), Some(&json!(true)));
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_predictions_are_isolated() {
    // Pid-derived jitter so processes finish out of order
    let bridge = shell_bridge("sleep 0.0$(( $$ % 9 )); cat");
    let mut tasks = JoinSet::new();
    for tag in 0..24 {
        let bridge = bridge.clone();
        tasks.spawn(async move {
            let request = PredictionRequest::new()
                .with_field("tag", tag)
                .with_field("padding", format!("request-{tag}-").repeat(2000));
            let result = bridge.predict(&request).await;
            (tag, request, result)
        });
    }

    let mut seen = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (tag, request, result) = joined.unwrap();
        let result = result.unwrap();
        assert_eq!(result.get("tag"), Some(&json!(tag)));
        assert_eq!(result.as_value(), &serde_json::Value::Object(request.fields().clone()));
        seen.push(tag);
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..24).collect::<Vec<_>>());
}

#[tokio::test]
async fn repeated_predictions_each_launch_a_fresh_process() {
    let bridge = shell_bridge(r#"cat > /dev/null; printf '{"pid": %s}' $$"#);
    let first = bridge.predict(&sample_request()).await.unwrap();
    let second = bridge.predict(&sample_request()).await.unwrap();
    assert_ne!(first.get("pid"), second.get("pid"));
}

// ============================================================================
// Environment
// ============================================================================

#[tokio::test]
async fn environment_is_whitelisted() {
    let script = r#"printf '{"mode": "%s", "cargo": "%s"}' "$SCORER_MODE" "${CARGO_PKG_NAME:-}""#;
    let bridge = ScoringBridge::new(
        shell_config(script)
            .with_allowed_env_keys(vec!["PATH".to_owned()])
            .with_env("SCORER_MODE", "batch"),
    );
    let result = bridge.predict(&sample_request()).await.unwrap();
    assert_eq!(result.get("mode"), Some(&json!("batch")));
    assert_eq!(result.get("cargo"), Some(&json!("")));
}

#[tokio::test]
async fn working_directory_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.json"), r#"{"weights": [0.1, 0.2]}"#).unwrap();
    let bridge = ScoringBridge::new(
        shell_config("cat > /dev/null; cat model.json").with_working_directory(dir.path()),
    );
    let result = bridge.predict(&sample_request()).await.unwrap();
    assert_eq!(result.get("weights"), Some(&json!([0.1, 0.2])));
}

#[tokio::test]
async fn predictor_trait_object_runs_predictions() {
    let predictor: Box<dyn Predictor> = Box::new(shell_bridge("cat"));
    assert!(predictor.health_check().await.unwrap());
    let result = predictor.predict(&sample_request()).await.unwrap();
    assert_eq!(result.get("feature_b"), Some(&json!("x")));
}
