//! Errors surfaced by the CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use ridewise_core::CoordinateError;
use ridewise_service::{ConfigError, QueryError};
use ridewise_tracking::TransportError;
use thiserror::Error;

/// Errors raised while running a subcommand.
#[derive(Debug, Error)]
pub enum CliError {
    /// Command-line arguments were rejected by clap.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layers could not be merged.
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required value was supplied by no layer.
    #[error("missing {field}; pass --{field} or set {env}")]
    MissingArgument {
        /// Flag name.
        field: &'static str,
        /// Environment variable that also supplies it.
        env: &'static str,
    },
    /// The query point is outside the valid coordinate range.
    #[error("invalid query point: {0}")]
    InvalidCoordinate(#[from] CoordinateError),
    /// The engine rejected the query.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The engine configuration is invalid.
    #[error("invalid engine configuration: {0}")]
    Engine(#[from] ConfigError),
    /// The feed could not be opened.
    #[error("failed to open feed {path}: {source}")]
    OpenFeed {
        /// Feed location.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The feed could not be read.
    #[error("failed to read feed {path}: {source}")]
    ReadFeed {
        /// Feed location.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The async runtime could not start.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Ingestion stopped on an unrecoverable transport error.
    #[error("failed to replay feed {path}: {source}")]
    Transport {
        /// Feed location.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: TransportError,
    },
    /// The result could not be encoded.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// The result could not be written.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
