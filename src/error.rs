//! Error types

use std::path::PathBuf;

use thiserror::Error;

use crate::smt::ParseError;

/// Failures reading graph documents
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read graph {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid graph document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid file id `{0}`")]
    InvalidFileId(String),
}

/// Failures of the formula cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Failures talking to a solver
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("failed to start solver `{path}`: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("solver io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("solver closed its output")]
    Closed,

    #[error("unexpected solver response: {0}")]
    Protocol(String),

    #[error("solver reported an error: {0}")]
    Solver(String),

    #[error("solver timed out")]
    Timeout,

    #[error("no model available: {0}")]
    NoModel(String),

    #[error("failed to parse solver output: {0}")]
    Parse(#[from] ParseError),
}

impl SolverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SolverError::Timeout)
    }
}

/// Failures loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of an operation request
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Solver(e) if e.is_timeout())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
