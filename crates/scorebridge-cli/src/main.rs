// ABOUTME: CLI entry point for the scorebridge binary
// ABOUTME: Builds the bridge configuration, runs one prediction, and maps failures to exit codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use scorebridge::config::ENV_PROGRAM;
use scorebridge::discovery::resolve_program;
use scorebridge::{
    config_file, BridgeConfig, ConfigError, DecodeMode, FailureKind, PredictionRequest,
    ScoringBridge,
};
use tokio::io::AsyncReadExt;

/// scorebridge: run one prediction through an external scoring process
#[derive(Parser, Debug)]
#[command(name = "scorebridge", version, about)]
struct Cli {
    /// Scoring program (interpreter or executable); defaults to `SCOREBRIDGE_*` env vars
    #[arg(long)]
    program: Option<String>,

    /// Argument passed to the scoring program (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Deadline in seconds (`0` waits for the process to exit)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Working directory for the scoring process
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Decode only the last non-blank line of the process output
    #[arg(long)]
    last_line: bool,

    /// Treat result objects carrying this field as failure reports
    #[arg(long)]
    error_field: Option<String>,

    /// TOML configuration file
    #[arg(long, conflicts_with = "program")]
    config: Option<PathBuf>,

    /// Only check that the scoring program is available
    #[arg(long)]
    check: bool,

    /// Request document (`-` reads standard input)
    #[arg(default_value = "-")]
    input: String,
}

/// Process exit code reported for each failure kind
const fn exit_code_for(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::Launch => 2,
        FailureKind::Process => 3,
        FailureKind::Decode => 4,
        FailureKind::Timeout => 5,
    }
}

/// Base configuration: `--program`, `--config`, env vars, then the default config file
fn base_config(cli: &Cli) -> Result<BridgeConfig, ConfigError> {
    if let Some(program) = &cli.program {
        let path = resolve_program(program, None).map_err(|e| ConfigError::new(e.detail))?;
        return Ok(BridgeConfig::new(path));
    }
    if let Some(path) = &cli.config {
        return config_file::load(path);
    }
    if env::var_os(ENV_PROGRAM).is_none() {
        if let Some(path) = config_file::default_path().filter(|p| p.exists()) {
            return config_file::load(&path);
        }
    }
    BridgeConfig::from_env()
}

/// Apply command-line overrides on top of the base configuration
fn build_config(cli: &Cli) -> Result<BridgeConfig, ConfigError> {
    let mut config = base_config(cli)?;

    if !cli.args.is_empty() {
        config = config.with_args(cli.args.clone());
    }
    match cli.timeout_secs {
        Some(0) => config = config.without_timeout(),
        Some(secs) => config = config.with_timeout(Duration::from_secs(secs)),
        None => {}
    }
    if let Some(dir) = &cli.workdir {
        config = config.with_working_directory(dir.clone());
    }
    if cli.last_line {
        config = config.with_decode_mode(DecodeMode::LastLine);
    }
    if let Some(field) = &cli.error_field {
        config = config.with_error_field(field.clone());
    }
    Ok(config)
}

async fn read_request(input: &str) -> Result<PredictionRequest, Box<dyn std::error::Error>> {
    let raw = if input == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(input).await?
    };
    let value: serde_json::Value = serde_json::from_slice(&raw)?;
    Ok(PredictionRequest::try_from(value)?)
}

async fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = build_config(cli)?;
    let bridge = ScoringBridge::new(config);

    if cli.check {
        let ready = bridge.is_ready();
        println!("{}", if ready { "ready" } else { "not ready" });
        return Ok(if ready {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(exit_code_for(FailureKind::Launch))
        });
    }

    let request = read_request(&cli.input).await?;
    tracing::debug!(fields = request.len(), "Request loaded");

    match bridge.predict(&request).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(result.as_value())?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("scorebridge: {err}");
            if !err.stderr.trim().is_empty() && err.stderr.trim() != err.detail {
                eprintln!("--- scoring process stderr ---\n{}", err.stderr.trim_end());
            }
            if let Some(prefix) = &err.stdout_prefix {
                eprintln!("--- scoring process stdout (prefix) ---\n{prefix}");
            }
            Ok(ExitCode::from(exit_code_for(err.kind)))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr to keep stdout clean for the result document
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("scorebridge: {e}");
            ExitCode::FAILURE
        }
    }
}
