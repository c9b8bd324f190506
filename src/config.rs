//! Configuration management for depex

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default solver wall clock per check (3 seconds)
const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Extra slack before a solver process that ignores its timeout is killed
const DEFAULT_GRACE_MS: u64 = 500;

/// Default number of assignments the built-in solver may explore
const DEFAULT_EXHAUSTIVE_LIMIT: u64 = 1_000_000;

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Solver configuration
    pub solver: SolverConfig,
    /// Formula cache configuration
    pub cache: CacheConfig,
    /// Request limits
    pub engine: EngineConfig,
}

/// Which solver answers `check-sat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// External `z3` process
    #[default]
    Z3,
    /// Built-in enumeration, for small graphs
    Exhaustive,
}

/// Solver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: SolverKind,
    /// Path or name of the z3 binary
    pub z3_path: PathBuf,
    /// Per check-sat timeout in milliseconds
    pub timeout_ms: u64,
    /// Slack added to `timeout_ms` before the process is killed
    pub grace_ms: u64,
    /// Maximum assignments explored by the exhaustive backend
    pub exhaustive_limit: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverKind::default(),
            z3_path: PathBuf::from("z3"),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            grace_ms: DEFAULT_GRACE_MS,
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
        }
    }
}

impl SolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Where translated formulas are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    Sqlite,
    Memory,
}

/// Formula cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheKind,
    /// Database file; defaults to `<cache dir>/depex/formulas.db`
    pub path: Option<PathBuf>,
    pub max_pool_size: u32,
    pub min_idle_connections: u32,
    pub connection_timeout_secs: u64,
    pub busy_timeout_ms: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheKind::default(),
            path: None,
            max_pool_size: 10,
            min_idle_connections: 2,
            connection_timeout_secs: 5,
            busy_timeout_ms: 5000,
        }
    }
}

/// Request limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Models returned when a request does not ask for a limit
    pub default_limit: usize,
    pub max_limit: usize,
    pub max_depth_limit: u32,
    /// Wall clock for a whole enumeration (milliseconds)
    pub enumeration_deadline_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            max_depth_limit: 10,
            enumeration_deadline_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn enumeration_deadline(&self) -> Duration {
        Duration::from_millis(self.enumeration_deadline_ms)
    }
}

impl Config {
    /// Parse configuration from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; JSON when the extension is `.json`, TOML otherwise
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_value(serde_json::from_str(&text)?)
        } else {
            Self::from_toml(&text)
        }
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.solver.timeout_ms == 0 {
            return Err(ConfigError::Invalid("solver.timeout_ms must be positive".into()));
        }
        if self.engine.max_limit == 0 || self.engine.default_limit > self.engine.max_limit {
            return Err(ConfigError::Invalid(
                "engine.default_limit must be within 1..=engine.max_limit".into(),
            ));
        }
        if self.engine.max_depth_limit == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_depth_limit must be positive".into(),
            ));
        }
        if self.cache.max_pool_size == 0 {
            return Err(ConfigError::Invalid("cache.max_pool_size must be positive".into()));
        }
        Ok(())
    }
}
