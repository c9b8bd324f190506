//! Request and response bodies of the operation surface

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::translate::Aggregator;
use crate::versions::Ecosystem;

/// Fields shared by every operation: which graph, how deep, how to score it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRequest {
    pub requirement_file_id: String,
    pub max_depth: u32,
    #[serde(alias = "node_type")]
    pub ecosystem: Ecosystem,
    #[serde(default)]
    pub aggregator: Aggregator,
}

impl FileRequest {
    pub fn new(requirement_file_id: impl Into<String>, max_depth: u32, ecosystem: Ecosystem) -> Self {
        Self {
            requirement_file_id: requirement_file_id.into(),
            max_depth,
            ecosystem,
            aggregator: Aggregator::default(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn validate(&self, settings: &EngineConfig) -> Result<(), EngineError> {
        if self.requirement_file_id.is_empty() {
            return Err(EngineError::InvalidRequest(
                "requirement_file_id must not be empty".into(),
            ));
        }
        if !(1..=settings.max_depth_limit).contains(&self.max_depth) {
            return Err(EngineError::InvalidRequest(format!(
                "max_depth must be within 1..={}, got {}",
                settings.max_depth_limit, self.max_depth
            )));
        }
        Ok(())
    }
}

fn validate_limit(limit: Option<usize>, settings: &EngineConfig) -> Result<(), EngineError> {
    match limit {
        Some(limit) if !(1..=settings.max_limit).contains(&limit) => {
            Err(EngineError::InvalidRequest(format!(
                "limit must be within 1..={}, got {limit}",
                settings.max_limit
            )))
        }
        _ => Ok(()),
    }
}

fn validate_finite(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::InvalidRequest(format!("{name} must be a finite number")))
    }
}

/// `valid_config` and `complete_config`: a partial `{package: version name}` assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(flatten)]
    pub file: FileRequest,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl ConfigRequest {
    pub fn validate(&self, settings: &EngineConfig) -> Result<(), EngineError> {
        self.file.validate(settings)
    }
}

/// `minimise_impact` and `maximise_impact`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRequest {
    #[serde(flatten)]
    pub file: FileRequest,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ImpactRequest {
    pub fn validate(&self, settings: &EngineConfig) -> Result<(), EngineError> {
        self.file.validate(settings)?;
        validate_limit(self.limit, settings)
    }
}

/// `config_by_impact`: the file risk to aim for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigByImpactRequest {
    #[serde(flatten)]
    pub file: FileRequest,
    pub impact: f64,
}

impl ConfigByImpactRequest {
    pub fn validate(&self, settings: &EngineConfig) -> Result<(), EngineError> {
        self.file.validate(settings)?;
        validate_finite("impact", self.impact)
    }
}

/// `filter_configs`: inclusive file risk bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfigsRequest {
    #[serde(flatten)]
    pub file: FileRequest,
    pub max_threshold: f64,
    pub min_threshold: f64,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FilterConfigsRequest {
    pub fn validate(&self, settings: &EngineConfig) -> Result<(), EngineError> {
        self.file.validate(settings)?;
        validate_limit(self.limit, settings)?;
        validate_finite("max_threshold", self.max_threshold)?;
        validate_finite("min_threshold", self.min_threshold)?;
        if self.min_threshold > self.max_threshold {
            return Err(EngineError::InvalidRequest(format!(
                "min_threshold {} exceeds max_threshold {}",
                self.min_threshold, self.max_threshold
            )));
        }
        Ok(())
    }
}

/// Outcome tag of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    OperationSuccess,
    SmtTimeout,
    NoDependencies,
    InvalidRequest,
    InternalError,
}

impl ResponseCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::OperationSuccess => "operation_success",
            ResponseCode::SmtTimeout => "smt_timeout",
            ResponseCode::NoDependencies => "no_dependencies",
            ResponseCode::InvalidRequest => "invalid_request",
            ResponseCode::InternalError => "internal_error",
        }
    }
}

/// `{result, code}`; `result` is `""` whenever there is nothing to report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub result: serde_json::Value,
    pub code: ResponseCode,
}

impl OperationResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            result,
            code: ResponseCode::OperationSuccess,
        }
    }

    pub fn timeout() -> Self {
        Self::empty(ResponseCode::SmtTimeout)
    }

    pub fn no_dependencies() -> Self {
        Self::empty(ResponseCode::NoDependencies)
    }

    /// Response for a failed request; the message is carried in `result`
    pub fn from_error(error: &EngineError) -> Self {
        if error.is_timeout() {
            return Self::timeout();
        }
        let code = match error {
            EngineError::InvalidRequest(_) => ResponseCode::InvalidRequest,
            _ => ResponseCode::InternalError,
        };
        Self {
            result: serde_json::Value::String(error.to_string()),
            code,
        }
    }

    fn empty(code: ResponseCode) -> Self {
        Self {
            result: serde_json::Value::String(String::new()),
            code,
        }
    }
}
