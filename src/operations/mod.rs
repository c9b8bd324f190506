//! Operation runners
//!
//! Every operation follows the same path: read the graph projection, reuse
//! or rebuild its formula, install it into a fresh solver session, add the
//! operation's own constraints and objective, then check or enumerate.
//! Enumeration blocks each model on its integer choices so the next
//! `check-sat` must pick a different configuration.
//!
//! A solver timeout anywhere turns the whole operation into `smt_timeout`;
//! partial enumerations are discarded.
//!
//! `file_info` needs no solver: it lists the requirements of the projection
//! and keeps its answer in the result store until the graph changes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{
    EngineCache, FormulaKey, MemoryFormulaCache, ReadFormulaCache, ReadResultCache,
    SqliteFormulaCache, WriteFormulaCache, WriteResultCache,
};
use crate::config::{CacheKind, Config, EngineConfig};
use crate::error::{CacheError, EngineError, Result, SolverError};
use crate::graph::{GraphData, GraphProvider};
use crate::sanitize::{Configuration, is_internal, sanitize};
use crate::smt::{Formula, Sort, Term};
use crate::solver::{self, Model, SolverBackend, SolverSession, install};
use crate::translate::{IMPACT_PREFIX, file_risk_var, translate};

pub mod info;
pub mod requests;

pub use info::{DependencyInfo, FileInfo};
pub use requests::{
    ConfigByImpactRequest, ConfigRequest, FileRequest, FilterConfigsRequest, ImpactRequest,
    OperationResponse, ResponseCode,
};

/// The operations of the request surface, keyed by wire path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FileInfo,
    ValidGraph,
    ValidFile,
    ValidConfig,
    MinimiseImpact,
    MaximiseImpact,
    CompleteConfig,
    ConfigByImpact,
    FilterConfigs,
    NumberOfProducts,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::FileInfo,
        Operation::ValidGraph,
        Operation::ValidFile,
        Operation::ValidConfig,
        Operation::MinimiseImpact,
        Operation::MaximiseImpact,
        Operation::CompleteConfig,
        Operation::ConfigByImpact,
        Operation::FilterConfigs,
        Operation::NumberOfProducts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::FileInfo => "file_info",
            Operation::ValidGraph => "valid_graph",
            Operation::ValidFile => "valid_file",
            Operation::ValidConfig => "valid_config",
            Operation::MinimiseImpact => "minimise_impact",
            Operation::MaximiseImpact => "maximise_impact",
            Operation::CompleteConfig => "complete_config",
            Operation::ConfigByImpact => "config_by_impact",
            Operation::FilterConfigs => "filter_configs",
            Operation::NumberOfProducts => "number_of_products",
        }
    }

    pub fn path(&self) -> String {
        let surface = match self {
            Operation::ValidConfig | Operation::CompleteConfig | Operation::ConfigByImpact => {
                "config"
            }
            _ => "file",
        };
        format!("/operation/{surface}/{}", self.name())
    }

    /// Look up an operation by wire path; the leading slash is optional
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        Operation::ALL
            .into_iter()
            .find(|op| op.path() == path || op.path()[1..] == *path)
    }
}

/// A graph projection and the formula built from it
struct Prepared {
    graph: GraphData,
    formula: Formula,
}

/// Runs operations against a graph provider, a cache and a solver backend
///
/// The engine holds no per-request state; every call opens its own solver
/// session, so one engine serves concurrent requests.
pub struct Engine {
    graphs: Arc<dyn GraphProvider>,
    cache: Arc<dyn EngineCache>,
    solver: Arc<dyn SolverBackend>,
    settings: EngineConfig,
}

impl Engine {
    pub fn new(
        graphs: Arc<dyn GraphProvider>,
        cache: Arc<dyn EngineCache>,
        solver: Arc<dyn SolverBackend>,
        settings: EngineConfig,
    ) -> Self {
        Self {
            graphs,
            cache,
            solver,
            settings,
        }
    }

    /// Build the cache and solver described by `config`
    pub fn from_config(config: &Config, graphs: Arc<dyn GraphProvider>) -> Result<Self, CacheError> {
        let cache: Arc<dyn EngineCache> = match config.cache.backend {
            CacheKind::Sqlite => Arc::new(SqliteFormulaCache::from_config(&config.cache)?),
            CacheKind::Memory => Arc::new(MemoryFormulaCache::new()),
        };
        let solver = solver::from_config(&config.solver);
        tracing::info!(
            solver = solver.name(),
            cache = ?config.cache.backend,
            "Engine initialized"
        );
        Ok(Self::new(graphs, cache, solver, config.engine.clone()))
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Decode `body` for the operation at `path` and run it
    ///
    /// Timeouts are folded into the response; every other failure is returned.
    pub async fn handle(&self, path: &str, body: serde_json::Value) -> Result<OperationResponse> {
        let operation = Operation::from_path(path)
            .ok_or_else(|| EngineError::InvalidRequest(format!("unknown operation path `{path}`")))?;
        let decode = |e: serde_json::Error| EngineError::InvalidRequest(e.to_string());

        match operation {
            Operation::FileInfo => {
                self.file_info(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::ValidGraph => {
                self.valid_graph(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::ValidFile => {
                self.valid_file(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::ValidConfig => {
                self.valid_config(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::MinimiseImpact => {
                self.minimise_impact(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::MaximiseImpact => {
                self.maximise_impact(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::CompleteConfig => {
                self.complete_config(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::ConfigByImpact => {
                self.config_by_impact(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::FilterConfigs => {
                self.filter_configs(&serde_json::from_value(body).map_err(decode)?).await
            }
            Operation::NumberOfProducts => {
                self.number_of_products(&serde_json::from_value(body).map_err(decode)?).await
            }
        }
    }

    /// Direct and per-depth indirect requirements with the versions they admit
    ///
    /// The answer is stored under `{ecosystem}:{file}:{depth}` and reused
    /// while it is newer than the graph.
    pub async fn file_info(&self, request: &FileRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let started = Instant::now();
        let file_id = request.requirement_file_id.as_str();
        let Some(graph) = self.graphs.read_graph(file_id, request.max_depth).await? else {
            return Ok(OperationResponse::no_dependencies());
        };
        if graph.require.direct.is_empty() {
            tracing::info!(operation = "file_info", file_id = %file_id, "No dependencies");
            return Ok(OperationResponse::no_dependencies());
        }

        let id = format!("{}:{file_id}:{}", request.ecosystem, request.max_depth);
        if let Some(entry) = self.cache.read_result(&id)
            && entry.is_fresh_for(graph.moment)
        {
            tracing::debug!(id = %id, "Result cache hit");
            return Ok(OperationResponse::success(entry.result));
        }

        let info = FileInfo::from_graph(&graph, request.ecosystem, request.max_depth);
        let result = serde_json::to_value(&info)?;
        if let Err(e) = self.cache.replace_result(&id, &result) {
            tracing::warn!(id = %id, error = %e, "Failed to store operation result");
        }
        tracing::info!(
            operation = "file_info",
            file_id = %file_id,
            direct = info.total_direct_dependencies,
            indirect = info.total_indirect_dependencies,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Operation finished"
        );
        Ok(OperationResponse::success(result))
    }

    /// Whether the graph admits at least one configuration
    pub async fn valid_graph(&self, request: &FileRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        self.run(Operation::ValidGraph, request, |mut session, _| async move {
            Ok::<_, EngineError>(serde_json::Value::Bool(session.is_sat().await?))
        })
        .await
    }

    /// [`Engine::valid_graph`] on the file surface
    pub async fn valid_file(&self, request: &FileRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        self.run(Operation::ValidFile, request, |mut session, _| async move {
            Ok::<_, EngineError>(serde_json::Value::Bool(session.is_sat().await?))
        })
        .await
    }

    /// Whether the partial configuration extends to a valid one
    pub async fn valid_config(&self, request: &ConfigRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let config = request.config.clone();
        self.run(Operation::ValidConfig, &request.file, |mut session, prepared| async move {
            for pin in config_constraints(&prepared, &config) {
                session.assert(&pin).await?;
            }
            Ok::<_, EngineError>(serde_json::Value::Bool(session.is_sat().await?))
        })
        .await
    }

    /// Up to `limit` configurations, lowest file risk first
    pub async fn minimise_impact(&self, request: &ImpactRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let limit = request.limit.unwrap_or(self.settings.default_limit);
        self.run(Operation::MinimiseImpact, &request.file, |mut session, prepared| async move {
            session.minimize(&prepared.formula.file_risk_term()).await?;
            self.enumerate(session, &prepared, Some(limit)).await
        })
        .await
    }

    /// Up to `limit` configurations, highest file risk first
    pub async fn maximise_impact(&self, request: &ImpactRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let limit = request.limit.unwrap_or(self.settings.default_limit);
        self.run(Operation::MaximiseImpact, &request.file, |mut session, prepared| async move {
            session.maximize(&prepared.formula.file_risk_term()).await?;
            self.enumerate(session, &prepared, Some(limit)).await
        })
        .await
    }

    /// The lowest-risk configuration extending the given partial one
    pub async fn complete_config(&self, request: &ConfigRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let config = request.config.clone();
        self.run(Operation::CompleteConfig, &request.file, |mut session, prepared| async move {
            for pin in config_constraints(&prepared, &config) {
                session.assert(&pin).await?;
            }
            session.minimize(&prepared.formula.file_risk_term()).await?;
            self.enumerate(session, &prepared, Some(1)).await
        })
        .await
    }

    /// The configuration whose file risk is closest to `impact`
    pub async fn config_by_impact(&self, request: &ConfigByImpactRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let target = request.impact;
        self.run(Operation::ConfigByImpact, &request.file, |mut session, prepared| async move {
            let distance = Term::abs(Term::sub(
                prepared.formula.file_risk_term(),
                Term::real(target),
            ));
            session.minimize(&distance).await?;
            self.enumerate(session, &prepared, Some(1)).await
        })
        .await
    }

    /// Up to `limit` configurations whose file risk lies within the thresholds
    pub async fn filter_configs(&self, request: &FilterConfigsRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        let limit = request.limit.unwrap_or(self.settings.default_limit);
        let (min, max) = (request.min_threshold, request.max_threshold);
        self.run(Operation::FilterConfigs, &request.file, |mut session, prepared| async move {
            let risk = prepared.formula.file_risk_term();
            session.assert(&Term::le(risk.clone(), Term::real(max))).await?;
            session.assert(&Term::ge(risk, Term::real(min))).await?;
            self.enumerate(session, &prepared, Some(limit)).await
        })
        .await
    }

    /// Number of distinct configurations
    pub async fn number_of_products(&self, request: &FileRequest) -> Result<OperationResponse> {
        request.validate(&self.settings)?;
        self.run(Operation::NumberOfProducts, request, |session, _| async move {
            let models = self.collect_models(session, None).await?;
            Ok::<_, EngineError>(serde_json::Value::from(models.len()))
        })
        .await
    }

    /// Shared driver: prepare, open a session, run `body`, fold timeouts
    async fn run<'a, F, Fut>(
        &'a self,
        operation: Operation,
        request: &'a FileRequest,
        body: F,
    ) -> Result<OperationResponse>
    where
        F: FnOnce(Box<dyn SolverSession>, Arc<Prepared>) -> Fut,
        Fut: Future<Output = Result<serde_json::Value>> + 'a,
    {
        let started = Instant::now();
        let Some(prepared) = self.prepare(request).await? else {
            tracing::info!(
                operation = operation.name(),
                file_id = %request.requirement_file_id,
                "No dependencies"
            );
            return Ok(OperationResponse::no_dependencies());
        };
        let prepared = Arc::new(prepared);

        let outcome = async {
            let mut session = self.solver.open().await?;
            install(session.as_mut(), &prepared.formula).await?;
            body(session, Arc::clone(&prepared)).await
        }
        .await;

        let response = match outcome {
            Ok(result) => OperationResponse::success(result),
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    operation = operation.name(),
                    file_id = %request.requirement_file_id,
                    "Solver timed out"
                );
                OperationResponse::timeout()
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            operation = operation.name(),
            file_id = %request.requirement_file_id,
            code = response.code.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Operation finished"
        );
        Ok(response)
    }

    /// Graph projection plus formula; `None` when there is nothing to solve
    async fn prepare(&self, request: &FileRequest) -> Result<Option<Prepared>> {
        let file_id = request.requirement_file_id.as_str();
        let Some(graph) = self.graphs.read_graph(file_id, request.max_depth).await? else {
            return Ok(None);
        };
        if !graph.has_dependencies() {
            return Ok(None);
        }
        let file_name = graph.name.clone().unwrap_or_else(|| file_id.to_string());
        let file_risk = file_risk_var(&file_name);
        let key = FormulaKey::new(file_id, request.max_depth);

        match self.cache.read(&key) {
            Some(entry) if entry.is_fresh_for(graph.moment, request.aggregator) => {
                match Formula::parse(&entry.text, &file_risk) {
                    Ok(formula) => {
                        tracing::debug!(key = %key, "Formula cache hit");
                        return Ok(Some(Prepared { graph, formula }));
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Cached formula unreadable, rebuilding");
                        self.cache.remove(&key);
                    }
                }
            }
            Some(_) => tracing::debug!(key = %key, "Formula cache stale"),
            None => tracing::debug!(key = %key, "Formula cache miss"),
        }

        let formula = translate(&graph, &file_name, request.ecosystem, request.aggregator);
        if let Err(e) = self
            .cache
            .replace(&key, &formula.to_smt2(), request.aggregator)
        {
            tracing::warn!(key = %key, error = %e, "Failed to store formula");
        }
        Ok(Some(Prepared { graph, formula }))
    }

    /// Enumerate sanitised configurations as a JSON array
    async fn enumerate(
        &self,
        session: Box<dyn SolverSession>,
        prepared: &Prepared,
        limit: Option<usize>,
    ) -> Result<serde_json::Value> {
        let models = self.collect_models(session, limit).await?;
        let configs: Vec<Configuration> = models
            .iter()
            .map(|model| sanitize(model, &prepared.graph))
            .collect();
        Ok(serde_json::to_value(configs)?)
    }

    /// Check, record, block, repeat; bounded by `limit` and the enumeration deadline
    async fn collect_models(
        &self,
        mut session: Box<dyn SolverSession>,
        limit: Option<usize>,
    ) -> Result<Vec<Model>> {
        let deadline = self.settings.enumeration_deadline();
        let enumeration = async {
            let mut models = Vec::new();
            while limit.is_none_or(|limit| models.len() < limit) && session.is_sat().await? {
                let model = session.get_model().await?;
                let blocker = blocking_clause(&model);
                models.push(model);
                if blocker == Term::Bool(false) {
                    break;
                }
                session.assert(&blocker).await?;
            }
            Ok::<_, SolverError>(models)
        };
        match tokio::time::timeout(deadline, enumeration).await {
            Ok(models) => Ok(models?),
            Err(_) => {
                tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Enumeration deadline passed");
                Err(SolverError::Timeout.into())
            }
        }
    }
}

/// Clause excluding the integer choices of `model`
///
/// Impact and file risk constants are left out: they are functions of the
/// integer choices, and a real read back from the solver need not compare
/// equal once re-rendered.
pub fn blocking_clause(model: &Model) -> Term {
    Term::or(
        model
            .entries
            .iter()
            .filter(|entry| {
                entry.sort != Sort::Real
                    && !entry.name.contains(IMPACT_PREFIX)
                    && !is_internal(&entry.name)
            })
            .map(|entry| {
                Term::not(Term::eq(
                    Term::sym(entry.name.clone()),
                    entry.value.to_term(),
                ))
            })
            .collect(),
    )
}

/// Pin each `{package: version name}` entry to its serial number
///
/// Entries naming an unknown package or version, or a package the formula
/// has no variable for, are dropped.
fn config_constraints(prepared: &Prepared, config: &BTreeMap<String, String>) -> Vec<Term> {
    config
        .iter()
        .filter_map(|(package, version)| {
            if prepared.formula.sort_of(package) != Some(Sort::Int) {
                tracing::debug!(package = %package, "Config entry for a package outside the formula");
                return None;
            }
            let Some(serial) = prepared.graph.serial_of(package, version) else {
                tracing::debug!(package = %package, version = %version, "Config entry names an unknown version");
                return None;
            };
            Some(Term::eq(Term::sym(package.clone()), Term::int(serial)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedFormula;
    use crate::graph::{RequireEdge, Requirements, StaticGraphProvider, VersionRecord};
    use crate::smt::Value;
    use crate::solver::{ExhaustiveBackend, ModelEntry};
    use crate::translate::Aggregator;
    use crate::versions::Ecosystem;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn graph() -> GraphData {
        let mut have = BTreeMap::new();
        have.insert(
            "A".to_string(),
            vec![
                VersionRecord::new("1.0", 0, 0.0, 0.0),
                VersionRecord::new("2.0", 1, 3.0, 3.0),
            ],
        );
        have.insert("B".to_string(), vec![VersionRecord::new("0.1", 0, 5.0, 5.0)]);
        GraphData {
            name: Some("f".into()),
            moment: Some(Utc::now() - ChronoDuration::minutes(5)),
            require: Requirements {
                direct: vec![RequireEdge::direct("A", ">=1.0")],
                indirect: vec![RequireEdge::indirect("B", "any", "A", 1)],
            },
            have,
        }
    }

    fn engine_with(graph: GraphData, cache: Arc<MemoryFormulaCache>, limit: u64) -> Engine {
        let graphs = StaticGraphProvider::new().with_graph("f1", graph);
        Engine::new(
            Arc::new(graphs),
            cache,
            Arc::new(ExhaustiveBackend::new(Duration::from_secs(3), limit)),
            EngineConfig::default(),
        )
    }

    fn engine() -> Engine {
        engine_with(graph(), Arc::new(MemoryFormulaCache::new()), 1_000)
    }

    fn file() -> FileRequest {
        FileRequest::new("f1", 2, Ecosystem::PyPI)
    }

    /// B pulled in by A 2.0 or by C 0.5
    fn two_parent_graph() -> GraphData {
        let mut graph = graph();
        graph.require.direct.push(RequireEdge::direct("C", "any"));
        graph.require.indirect.push(RequireEdge::indirect("B", "any", "C", 0));
        graph.have.insert(
            "C".to_string(),
            vec![
                VersionRecord::new("0.5", 0, 1.0, 1.0),
                VersionRecord::new("1.5", 1, 2.0, 2.0),
            ],
        );
        graph
    }

    /// Memory cache that remembers which formula keys were removed
    #[derive(Default)]
    struct RecordingCache {
        inner: MemoryFormulaCache,
        removed: Mutex<Vec<FormulaKey>>,
    }

    impl ReadFormulaCache for RecordingCache {
        fn read(&self, key: &FormulaKey) -> Option<CachedFormula> {
            self.inner.read(key)
        }
    }

    impl WriteFormulaCache for RecordingCache {
        fn replace(&self, key: &FormulaKey, text: &str, aggregator: Aggregator) -> Result<(), CacheError> {
            self.inner.replace(key, text, aggregator)
        }

        fn remove(&self, key: &FormulaKey) {
            self.removed.lock().unwrap().push(key.clone());
            self.inner.remove(key);
        }

        fn clear(&self) {
            self.inner.clear();
        }
    }

    impl ReadResultCache for RecordingCache {
        fn read_result(&self, id: &str) -> Option<crate::cache::CachedResult> {
            self.inner.read_result(id)
        }
    }

    impl WriteResultCache for RecordingCache {
        fn replace_result(&self, id: &str, result: &serde_json::Value) -> Result<(), CacheError> {
            self.inner.replace_result(id, result)
        }
    }

    #[test]
    fn test_operation_paths() {
        assert_eq!(
            Operation::MinimiseImpact.path(),
            "/operation/file/minimise_impact"
        );
        assert_eq!(
            Operation::from_path("/operation/config/valid_config"),
            Some(Operation::ValidConfig)
        );
        assert_eq!(
            Operation::from_path("operation/file/number_of_products"),
            Some(Operation::NumberOfProducts)
        );
        assert_eq!(Operation::FileInfo.path(), "/operation/file/file_info");
        assert_eq!(Operation::from_path("/operation/file/valid_config"), None);
        for op in Operation::ALL {
            assert_eq!(Operation::from_path(&op.path()), Some(op));
        }
    }

    #[test]
    fn test_blocking_clause_skips_reals_and_internals() {
        let entry = |name: &str, sort, value| ModelEntry {
            name: name.into(),
            sort,
            value,
        };
        let model = Model {
            entries: vec![
                entry("A", Sort::Int, Value::Int(1)),
                entry("impact_A", Sort::Real, Value::Real(3.0)),
                entry("B", Sort::Int, Value::Int(-1)),
                entry("file_risk_f", Sort::Real, Value::Real(3.0)),
                entry("x/0", Sort::Int, Value::Int(0)),
            ],
        };
        assert_eq!(
            blocking_clause(&model).to_string(),
            "(or (not (= A 1)) (not (= B (- 1))))"
        );
        assert_eq!(blocking_clause(&Model::default()), Term::Bool(false));
    }

    #[tokio::test]
    async fn test_valid_graph_and_file() {
        let engine = engine();
        let response = engine.valid_graph(&file()).await.unwrap();
        assert_eq!(response, OperationResponse::success(json!(true)));
        let response = engine.valid_file(&file()).await.unwrap();
        assert_eq!(response.result, json!(true));
    }

    #[tokio::test]
    async fn test_minimise_and_maximise() {
        let engine = engine();
        let request = ImpactRequest {
            file: file(),
            limit: Some(5),
        };
        let response = engine.minimise_impact(&request).await.unwrap();
        assert_eq!(response.code, ResponseCode::OperationSuccess);
        assert_eq!(
            response.result,
            json!([
                {"A": "1.0", "impact_A": 0.0, "file_risk_f": 0.0},
                {"A": "2.0", "impact_A": 3.0, "B": "0.1", "impact_B": 5.0, "file_risk_f": 4.0}
            ])
        );

        let response = engine.maximise_impact(&request).await.unwrap();
        let models = response.result.as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["A"], json!("2.0"));
    }

    #[tokio::test]
    async fn test_valid_config() {
        let engine = engine();
        let mut request = ConfigRequest {
            file: file(),
            config: BTreeMap::from([("A".to_string(), "2.0".to_string())]),
        };
        assert_eq!(engine.valid_config(&request).await.unwrap().result, json!(true));

        // B is only installable alongside A 2.0
        request.config = BTreeMap::from([
            ("A".to_string(), "1.0".to_string()),
            ("B".to_string(), "0.1".to_string()),
        ]);
        assert_eq!(engine.valid_config(&request).await.unwrap().result, json!(false));

        // unknown entries are ignored
        request.config = BTreeMap::from([("Z".to_string(), "9.9".to_string())]);
        assert_eq!(engine.valid_config(&request).await.unwrap().result, json!(true));
    }

    #[tokio::test]
    async fn test_complete_config() {
        let engine = engine();
        let request = ConfigRequest {
            file: file(),
            config: BTreeMap::from([("B".to_string(), "0.1".to_string())]),
        };
        let response = engine.complete_config(&request).await.unwrap();
        assert_eq!(response.result[0]["A"], json!("2.0"));
        assert_eq!(response.result.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_config_by_impact() {
        let engine = engine();
        let request = ConfigByImpactRequest {
            file: file(),
            impact: 2.5,
        };
        let response = engine.config_by_impact(&request).await.unwrap();
        assert_eq!(response.result[0]["file_risk_f"], json!(4.0));
    }

    #[tokio::test]
    async fn test_filter_configs() {
        let engine = engine();
        let request = FilterConfigsRequest {
            file: file(),
            max_threshold: 1.0,
            min_threshold: 0.0,
            limit: Some(10),
        };
        let response = engine.filter_configs(&request).await.unwrap();
        assert_eq!(response.result, json!([{"A": "1.0", "impact_A": 0.0, "file_risk_f": 0.0}]));
    }

    #[tokio::test]
    async fn test_number_of_products() {
        let engine = engine();
        let response = engine.number_of_products(&file()).await.unwrap();
        assert_eq!(response.result, json!(2));

        // depth 1 drops B
        let response = engine
            .number_of_products(&FileRequest::new("f1", 1, Ecosystem::PyPI))
            .await
            .unwrap();
        assert_eq!(response.result, json!(2));
    }

    #[tokio::test]
    async fn test_no_dependencies() {
        let engine = engine();
        let missing = FileRequest::new("absent", 2, Ecosystem::PyPI);
        assert_eq!(
            engine.valid_graph(&missing).await.unwrap(),
            OperationResponse::no_dependencies()
        );

        let empty = GraphData {
            name: Some("f".into()),
            ..GraphData::default()
        };
        let engine = engine_with(empty, Arc::new(MemoryFormulaCache::new()), 1_000);
        assert_eq!(
            engine.number_of_products(&file()).await.unwrap().code,
            ResponseCode::NoDependencies
        );
    }

    #[tokio::test]
    async fn test_timeout_discards_partial_results() {
        let engine = engine_with(graph(), Arc::new(MemoryFormulaCache::new()), 2);
        let request = ImpactRequest {
            file: file(),
            limit: Some(5),
        };
        assert_eq!(
            engine.minimise_impact(&request).await.unwrap(),
            OperationResponse::timeout()
        );
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let engine = engine();
        let request = ImpactRequest {
            file: file(),
            limit: Some(1_000),
        };
        assert!(matches!(
            engine.minimise_impact(&request).await,
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_reuse_and_staleness() {
        let cache = Arc::new(MemoryFormulaCache::new());
        let engine = engine_with(graph(), Arc::clone(&cache), 1_000);
        let key = FormulaKey::new("f1", 2);

        engine.valid_graph(&file()).await.unwrap();
        let stored = cache.read(&key).unwrap();
        assert_eq!(stored.aggregator, Aggregator::Mean);

        // a fresh entry is used as is, even when it differs from a rebuild
        cache.insert_raw(
            key.clone(),
            CachedFormula {
                text: "(declare-const file_risk_f Real)\n(assert false)\n".into(),
                moment: Utc::now(),
                aggregator: Aggregator::Mean,
            },
        );
        assert_eq!(engine.valid_graph(&file()).await.unwrap().result, json!(false));

        // older than the graph: rebuilt and replaced
        cache.set_moment(&key, Utc::now() - ChronoDuration::hours(1));
        assert_eq!(engine.valid_graph(&file()).await.unwrap().result, json!(true));
        assert_eq!(cache.read(&key).unwrap().text, stored.text);

        // other aggregator: rebuilt
        let weighted = file().with_aggregator(Aggregator::WeightedMean);
        engine.valid_graph(&weighted).await.unwrap();
        assert_eq!(cache.read(&key).unwrap().aggregator, Aggregator::WeightedMean);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_replaced() {
        let cache = Arc::new(MemoryFormulaCache::new());
        let engine = engine_with(graph(), Arc::clone(&cache), 1_000);
        let key = FormulaKey::new("f1", 2);
        cache.insert_raw(
            key.clone(),
            CachedFormula {
                text: "(assert (".into(),
                moment: Utc::now(),
                aggregator: Aggregator::Mean,
            },
        );
        assert_eq!(engine.valid_graph(&file()).await.unwrap().result, json!(true));
        assert!(cache.read(&key).unwrap().text.contains("declare-const"));
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_removed_before_rebuild() {
        let cache = Arc::new(RecordingCache::default());
        let engine = Engine::new(
            Arc::new(StaticGraphProvider::new().with_graph("f1", graph())),
            Arc::clone(&cache) as Arc<dyn EngineCache>,
            Arc::new(ExhaustiveBackend::new(Duration::from_secs(3), 1_000)),
            EngineConfig::default(),
        );
        let key = FormulaKey::new("f1", 2);
        cache.inner.insert_raw(
            key.clone(),
            CachedFormula {
                text: "(declare-const".into(),
                moment: Utc::now(),
                aggregator: Aggregator::Mean,
            },
        );
        assert_eq!(engine.valid_graph(&file()).await.unwrap().result, json!(true));
        assert_eq!(*cache.removed.lock().unwrap(), vec![key.clone()]);

        // a readable entry is never removed
        engine.valid_graph(&file()).await.unwrap();
        assert_eq!(cache.removed.lock().unwrap().len(), 1);
        assert!(cache.read(&key).is_some());
    }

    #[tokio::test]
    async fn test_child_of_two_parent_packages() {
        let engine = engine_with(two_parent_graph(), Arc::new(MemoryFormulaCache::new()), 1_000);
        let complete = |a: &str, c: &str| ConfigRequest {
            file: file(),
            config: BTreeMap::from([
                ("A".to_string(), a.to_string()),
                ("C".to_string(), c.to_string()),
            ]),
        };

        // A 1.0 does not pull B in, C 0.5 does
        let response = engine.complete_config(&complete("1.0", "0.5")).await.unwrap();
        assert_eq!(response.result[0]["B"], json!("0.1"));

        let response = engine.complete_config(&complete("2.0", "1.5")).await.unwrap();
        assert_eq!(response.result[0]["B"], json!("0.1"));

        // neither parent requires B
        let response = engine.complete_config(&complete("1.0", "1.5")).await.unwrap();
        assert!(response.result[0].get("B").is_none());

        assert_eq!(engine.number_of_products(&file()).await.unwrap().result, json!(4));
    }

    #[tokio::test]
    async fn test_file_info() {
        let engine = engine_with(two_parent_graph(), Arc::new(MemoryFormulaCache::new()), 1_000);
        let response = engine.file_info(&file()).await.unwrap();
        assert_eq!(response.code, ResponseCode::OperationSuccess);
        assert_eq!(
            response.result,
            json!({
                "direct_dependencies": [
                    {"package_name": "A", "package_constraints": ">=1.0", "versions": ["1.0", "2.0"]},
                    {"package_name": "C", "package_constraints": "any", "versions": ["0.5", "1.5"]}
                ],
                "total_direct_dependencies": 2,
                "indirect_dependencies_by_depth": {
                    "2": [{"package_name": "B", "package_constraints": "any", "versions": ["0.1"]}]
                },
                "total_indirect_dependencies": 1
            })
        );

        let shallow = engine
            .file_info(&FileRequest::new("f1", 1, Ecosystem::PyPI))
            .await
            .unwrap();
        assert_eq!(shallow.result["total_indirect_dependencies"], json!(0));
    }

    #[tokio::test]
    async fn test_file_info_result_reuse_and_staleness() {
        let cache = Arc::new(MemoryFormulaCache::new());
        let engine = engine_with(graph(), Arc::clone(&cache), 1_000);
        let id = "PyPI:f1:2";

        let first = engine.file_info(&file()).await.unwrap();
        assert_eq!(cache.read_result(id).unwrap().result, first.result);
        // no formula is built for a listing
        assert!(cache.is_empty());

        // a fresh result is answered as stored
        let planted = json!({"total_direct_dependencies": 99});
        cache.replace_result(id, &planted).unwrap();
        assert_eq!(engine.file_info(&file()).await.unwrap().result, planted);

        // older than the graph: recomputed and replaced
        cache.set_result_moment(id, Utc::now() - ChronoDuration::hours(1));
        assert_eq!(engine.file_info(&file()).await.unwrap().result, first.result);
        assert_eq!(cache.read_result(id).unwrap().result, first.result);

        // the ecosystem is part of the id
        engine
            .file_info(&FileRequest::new("f1", 2, Ecosystem::Npm))
            .await
            .unwrap();
        assert!(cache.read_result("NPM:f1:2").is_some());
    }

    #[tokio::test]
    async fn test_file_info_without_direct_dependencies() {
        let engine = engine();
        let missing = FileRequest::new("absent", 2, Ecosystem::PyPI);
        assert_eq!(
            engine.file_info(&missing).await.unwrap(),
            OperationResponse::no_dependencies()
        );

        let empty = GraphData {
            name: Some("f".into()),
            ..GraphData::default()
        };
        let cache = Arc::new(MemoryFormulaCache::new());
        let engine = engine_with(empty, Arc::clone(&cache), 1_000);
        assert_eq!(
            engine.file_info(&file()).await.unwrap().code,
            ResponseCode::NoDependencies
        );
        assert!(cache.read_result("PyPI:f1:2").is_none());
    }

    #[tokio::test]
    async fn test_handle_dispatch() {
        let engine = engine();
        let body = json!({
            "requirement_file_id": "f1",
            "max_depth": 2,
            "node_type": "PyPIPackage",
            "limit": 1
        });
        let response = engine
            .handle("/operation/file/minimise_impact", body)
            .await
            .unwrap();
        assert_eq!(response.result.as_array().unwrap().len(), 1);

        assert!(matches!(
            engine.handle("/operation/file/nope", json!({})).await,
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine
                .handle("/operation/file/valid_graph", json!({"max_depth": 1}))
                .await,
            Err(EngineError::InvalidRequest(_))
        ));
    }
}
