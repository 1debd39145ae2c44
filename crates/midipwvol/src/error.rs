//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use midipwvol_config::ConfigError;
use midipwvol_core::error::{DispatchError, InputError, MonitorError, QueryError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const MONITOR: i32 = 3;
    pub const INPUT: i32 = 4;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid configuration")]
    #[diagnostic(
        code(midipwvol::config),
        help("Run: midipwvol check-config\nExpected at: {path}")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(midipwvol::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(midipwvol::query),
        help("Attribute names are snake_case (node_description, is_sink) or a parameter group (Props, Route).")
    )]
    Query(#[from] QueryError),

    // ── Monitor ──────────────────────────────────────────────────────

    #[error("PipeWire monitor failed")]
    #[diagnostic(
        code(midipwvol::monitor),
        help("Check that pw-dump is installed and PipeWire is running.\nTry: pw-dump --monitor")
    )]
    Monitor(#[source] MonitorError),

    #[error("No output from the PipeWire monitor after {seconds}s")]
    #[diagnostic(code(midipwvol::timeout), help("Increase the wait with --timeout."))]
    MonitorTimeout { seconds: u64 },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Controller input failed")]
    #[diagnostic(
        code(midipwvol::input),
        help("Input is one JSON object per line, e.g.\n{{\"port\":\"nano\",\"type\":\"control_change\",\"channel\":0,\"control\":1,\"value\":64}}")
    )]
    Input(#[source] InputError),

    #[error("Dispatch loop stopped")]
    #[diagnostic(code(midipwvol::dispatch))]
    Dispatch(#[source] DispatchError),

    #[error("Background task failed: {0}")]
    #[diagnostic(code(midipwvol::task))]
    Task(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(midipwvol::json))]
    Json(#[from] serde_json::Error),
}

impl From<MonitorError> for CliError {
    fn from(err: MonitorError) -> Self {
        Self::Monitor(err)
    }
}

impl From<InputError> for CliError {
    fn from(err: InputError) -> Self {
        Self::Input(err)
    }
}

impl From<DispatchError> for CliError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

impl CliError {
    pub fn config(err: ConfigError, path: &std::path::Path) -> Self {
        Self::Config {
            path: path.display().to_string(),
            source: err,
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::Validation { .. } | Self::Query(_) => exit_code::USAGE,
            Self::Monitor(_) => exit_code::MONITOR,
            Self::MonitorTimeout { .. } => exit_code::TIMEOUT,
            Self::Input(_) => exit_code::INPUT,
            Self::Dispatch(_) | Self::Task(_) | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}
