//! Error types for the `waypoint` binary.
//!
//! [`CliError`] is the top-level error type that wraps all possible
//! failure modes during startup and command execution.

use std::process::ExitCode;

use serde::Serialize;
use waypoint_core::{ConfigError, EngineError, ErrorKind};
use waypoint_db::DbError;
use waypoint_types::RequirementResult;

/// Machine-readable failure printed on stdout when a command fails.
#[derive(Debug, Serialize)]
pub struct ErrorReport<'a> {
    /// Always `false`.
    pub success: bool,
    /// Stable error code.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Unmet requirements when a start was rejected; empty otherwise.
    pub missing_requirements: &'a [RequirementResult],
}

/// Top-level error for the `waypoint` binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Connecting to or migrating the database failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: DbError,
    },

    /// The engine rejected or failed the operation.
    #[error("{source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// A JSON argument could not be parsed, or a result could not be printed.
    #[error("JSON error: {source}")]
    Json {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

impl CliError {
    /// Process exit code: 2 for rejected requests, 3 for missing records,
    /// 1 for everything else.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Engine { source } => match source.kind() {
                ErrorKind::Validation => ExitCode::from(2),
                ErrorKind::NotFound => ExitCode::from(3),
                ErrorKind::Fatal => ExitCode::FAILURE,
            },
            Self::Config { .. } | Self::Database { .. } | Self::Json { .. } => ExitCode::FAILURE,
        }
    }

    /// The report printed for this error.
    pub fn report(&self) -> ErrorReport<'_> {
        let (error, missing_requirements) = match self {
            Self::Engine { source } => (source.code(), source.missing_requirements()),
            Self::Config { .. } => ("config_error", &[][..]),
            Self::Database { .. } => ("database_error", &[][..]),
            Self::Json { .. } => ("invalid_json", &[][..]),
        };
        ErrorReport {
            success: false,
            error,
            message: self.to_string(),
            missing_requirements,
        }
    }
}
