//! SQLite persistent formula cache with connection pooling

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

use super::{
    CachedFormula, CachedResult, FormulaKey, ReadFormulaCache, ReadResultCache, WriteFormulaCache,
    WriteResultCache,
};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::translate::Aggregator;

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS formulas (
    file_id TEXT NOT NULL,
    depth INTEGER NOT NULL,
    text TEXT NOT NULL,
    aggregator TEXT NOT NULL,
    moment INTEGER NOT NULL,
    PRIMARY KEY (file_id, depth)
)";

const CREATE_RESULTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS operation_results (
    id TEXT PRIMARY KEY,
    result TEXT NOT NULL,
    moment INTEGER NOT NULL
)";

/// Configuration for SQLite cache pool
#[derive(Debug, Clone)]
pub struct SqliteCacheConfig {
    pub max_pool_size: u32,
    pub min_idle_connections: u32,
    pub connection_timeout_secs: u64,
    pub busy_timeout_ms: u32,
    pub cache_size_kb: i64,
}

impl Default for SqliteCacheConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 10,
            min_idle_connections: 2,
            connection_timeout_secs: 5,
            busy_timeout_ms: 5000,
            cache_size_kb: 64000,
        }
    }
}

impl From<&CacheConfig> for SqliteCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_pool_size: config.max_pool_size,
            min_idle_connections: config.min_idle_connections.min(config.max_pool_size),
            connection_timeout_secs: config.connection_timeout_secs,
            busy_timeout_ms: config.busy_timeout_ms,
            ..Self::default()
        }
    }
}

/// SQLite-based formula store with connection pooling
pub struct SqliteFormulaCache {
    pool: Arc<Pool<SqliteConnectionManager>>,
    config: SqliteCacheConfig,
}

impl SqliteFormulaCache {
    /// Open the store at the default location (`<cache dir>/depex/formulas.db`)
    pub fn new() -> Result<Self, CacheError> {
        Self::with_config(SqliteCacheConfig::default())
    }

    /// Open the store at the default location with custom configuration
    pub fn with_config(config: SqliteCacheConfig) -> Result<Self, CacheError> {
        Self::with_path_and_config(Self::default_path()?, config)
    }

    /// Open the store described by the `[cache]` config section
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let path = match &config.path {
            Some(path) => path.clone(),
            None => Self::default_path()?,
        };
        Self::with_path_and_config(path, config.into())
    }

    /// Open the store at a custom path with custom configuration
    pub fn with_path_and_config(path: PathBuf, config: SqliteCacheConfig) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(&path);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_idle_connections))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(600)))
            .max_lifetime(Some(Duration::from_secs(1800)))
            .build(manager)?;

        let cache = Self {
            pool: Arc::new(pool),
            config,
        };
        cache.init_schema()?;

        let state = cache.pool_state();
        tracing::debug!(
            path = %path.display(),
            connections = state.connections,
            idle = state.idle_connections,
            "SQLite formula cache pool initialized"
        );

        Ok(cache)
    }

    /// Create an in-memory store
    ///
    /// Uses a shared in-memory database URI so all pooled connections access
    /// the same database. Each call generates a unique database name.
    pub fn in_memory() -> Result<Self, CacheError> {
        let db_id = MEMORY_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let uri = format!("file:depexmem{}?mode=memory&cache=shared", db_id);
        let config = SqliteCacheConfig::default();

        let manager = SqliteConnectionManager::file(&uri).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA busy_timeout=5000;
                 PRAGMA synchronous=NORMAL;",
            )
        });

        // min_idle keeps one connection alive so the shared database survives
        let pool = Pool::builder().max_size(5).min_idle(Some(1)).build(manager)?;

        let cache = Self {
            pool: Arc::new(pool),
            config,
        };
        let conn = cache.pool.get()?;
        conn.execute(CREATE_TABLE, [])?;
        conn.execute(CREATE_RESULTS_TABLE, [])?;
        drop(conn);
        Ok(cache)
    }

    fn default_path() -> Result<PathBuf, CacheError> {
        let cache_dir = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(cache_dir.join("depex").join("formulas.db"))
    }

    fn get_conn(&self) -> Option<PooledConnection<SqliteConnectionManager>> {
        match self.pool.get() {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Formula cache connection unavailable");
                None
            }
        }
    }

    /// Initialize the database schema with WAL mode and optimized PRAGMAs
    fn init_schema(&self) -> Result<(), CacheError> {
        let conn = self.pool.get()?;

        let pragmas = format!(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout={};
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=-{};",
            self.config.busy_timeout_ms, self.config.cache_size_kb
        );
        conn.execute_batch(&pragmas)?;
        conn.execute(CREATE_TABLE, [])?;
        conn.execute(CREATE_RESULTS_TABLE, [])?;
        Ok(())
    }

    /// Number of stored formulas
    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM formulas", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Get pool statistics for monitoring
    pub fn pool_state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    fn lookup(&self, key: &FormulaKey) -> Result<Option<CachedFormula>, CacheError> {
        let Some(conn) = self.get_conn() else {
            return Ok(None);
        };
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT text, aggregator, moment FROM formulas WHERE file_id = ? AND depth = ?",
                params![key.file_id, key.depth],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((text, aggregator, moment)) = row else {
            return Ok(None);
        };
        // rows written by an unknown aggregator or with a broken stamp are misses
        let Ok(aggregator) = aggregator.parse::<Aggregator>() else {
            return Ok(None);
        };
        let Some(moment) = DateTime::<Utc>::from_timestamp_micros(moment) else {
            return Ok(None);
        };
        Ok(Some(CachedFormula {
            text,
            moment,
            aggregator,
        }))
    }

    fn lookup_result(&self, id: &str) -> Result<Option<CachedResult>, CacheError> {
        let Some(conn) = self.get_conn() else {
            return Ok(None);
        };
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT result, moment FROM operation_results WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((result, moment)) = row else {
            return Ok(None);
        };
        let Ok(result) = serde_json::from_str(&result) else {
            return Ok(None);
        };
        let Some(moment) = DateTime::<Utc>::from_timestamp_micros(moment) else {
            return Ok(None);
        };
        Ok(Some(CachedResult { result, moment }))
    }

    /// Overwrite the stored moment of an entry
    #[cfg(test)]
    fn set_moment(&self, key: &FormulaKey, moment: DateTime<Utc>) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE formulas SET moment = ? WHERE file_id = ? AND depth = ?",
            params![moment.timestamp_micros(), key.file_id, key.depth],
        )?;
        Ok(())
    }
}

impl ReadFormulaCache for SqliteFormulaCache {
    fn read(&self, key: &FormulaKey) -> Option<CachedFormula> {
        match self.lookup(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Formula cache read failed");
                None
            }
        }
    }
}

impl WriteFormulaCache for SqliteFormulaCache {
    fn replace(&self, key: &FormulaKey, text: &str, aggregator: Aggregator) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO formulas (file_id, depth, text, aggregator, moment) VALUES (?, ?, ?, ?, ?)",
            params![
                key.file_id,
                key.depth,
                text,
                aggregator.as_str(),
                Utc::now().timestamp_micros()
            ],
        )?;
        tracing::debug!(key = %key, bytes = text.len(), "Stored formula");
        Ok(())
    }

    fn remove(&self, key: &FormulaKey) {
        let Some(conn) = self.get_conn() else {
            return;
        };
        let _ = conn.execute(
            "DELETE FROM formulas WHERE file_id = ? AND depth = ?",
            params![key.file_id, key.depth],
        );
    }

    fn clear(&self) {
        let Some(conn) = self.get_conn() else {
            return;
        };
        let _ = conn.execute("DELETE FROM formulas", []);
        let _ = conn.execute("DELETE FROM operation_results", []);
    }
}

impl ReadResultCache for SqliteFormulaCache {
    fn read_result(&self, id: &str) -> Option<CachedResult> {
        match self.lookup_result(id) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(id, error = %e, "Result cache read failed");
                None
            }
        }
    }
}

impl WriteResultCache for SqliteFormulaCache {
    fn replace_result(&self, id: &str, result: &serde_json::Value) -> Result<(), CacheError> {
        let text = result.to_string();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO operation_results (id, result, moment) VALUES (?, ?, ?)",
            params![id, text, Utc::now().timestamp_micros()],
        )?;
        tracing::debug!(id, bytes = text.len(), "Stored operation result");
        Ok(())
    }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone, Copy)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "(declare-const A Int)\n(assert (= A 0))\n";

    #[test]
    fn test_replace_and_read() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        let key = FormulaKey::new("file-1", 2);

        cache.replace(&key, TEXT, Aggregator::Mean).unwrap();
        let entry = cache.read(&key).unwrap();
        assert_eq!(entry.text, TEXT);
        assert_eq!(entry.aggregator, Aggregator::Mean);
        assert!(entry.moment <= Utc::now());
    }

    #[test]
    fn test_read_nonexistent() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        assert!(cache.read(&FormulaKey::new("absent", 1)).is_none());
    }

    #[test]
    fn test_overwrite_updates_text_and_moment() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        let key = FormulaKey::new("file-1", 2);

        cache.replace(&key, "old", Aggregator::Mean).unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        cache.set_moment(&key, past).unwrap();

        cache.replace(&key, "new", Aggregator::WeightedMean).unwrap();
        let entry = cache.read(&key).unwrap();
        assert_eq!(entry.text, "new");
        assert_eq!(entry.aggregator, Aggregator::WeightedMean);
        assert!(entry.moment > past);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_moment_keeps_microseconds() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        let key = FormulaKey::new("file-1", 1);
        cache.replace(&key, TEXT, Aggregator::Mean).unwrap();

        let moment = DateTime::<Utc>::from_timestamp_micros(1_700_000_000_123_456).unwrap();
        cache.set_moment(&key, moment).unwrap();
        assert_eq!(cache.read(&key).unwrap().moment, moment);
    }

    #[test]
    fn test_depths_are_distinct_entries() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        cache.replace(&FormulaKey::new("f", 1), "one", Aggregator::Mean).unwrap();
        cache.replace(&FormulaKey::new("f", 2), "two", Aggregator::Mean).unwrap();
        assert_eq!(cache.read(&FormulaKey::new("f", 1)).unwrap().text, "one");
        assert_eq!(cache.read(&FormulaKey::new("f", 2)).unwrap().text, "two");
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        let key = FormulaKey::new("f", 1);
        cache.replace(&key, TEXT, Aggregator::Mean).unwrap();
        cache.remove(&key);
        assert!(cache.read(&key).is_none());

        for depth in 0..3 {
            cache.replace(&FormulaKey::new("f", depth), TEXT, Aggregator::Mean).unwrap();
        }
        cache.clear();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_operation_results() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        assert!(cache.read_result("PyPI:f:2").is_none());

        let first = serde_json::json!({"total_direct_dependencies": 1});
        let second = serde_json::json!({"total_direct_dependencies": 2});
        cache.replace_result("PyPI:f:2", &first).unwrap();
        cache.replace_result("PyPI:f:2", &second).unwrap();
        let entry = cache.read_result("PyPI:f:2").unwrap();
        assert_eq!(entry.result, second);
        assert!(entry.moment <= Utc::now());

        // results live beside formulas, not among them
        assert!(cache.is_empty().unwrap());
        cache.clear();
        assert!(cache.read_result("PyPI:f:2").is_none());
    }

    #[test]
    fn test_persistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("formulas.db");
        let key = FormulaKey::new("f", 3);
        {
            let cache =
                SqliteFormulaCache::with_path_and_config(path.clone(), SqliteCacheConfig::default())
                    .unwrap();
            cache.replace(&key, TEXT, Aggregator::Mean).unwrap();
        }
        let reopened =
            SqliteFormulaCache::with_path_and_config(path, SqliteCacheConfig::default()).unwrap();
        assert_eq!(reopened.read(&key).unwrap().text, TEXT);
    }

    #[test]
    fn test_pool_state() {
        let cache = SqliteFormulaCache::in_memory().unwrap();
        let state = cache.pool_state();
        assert!(state.connections > 0);
    }

    #[test]
    fn test_concurrent_writes() {
        use std::thread;

        let cache = Arc::new(SqliteFormulaCache::in_memory().unwrap());

        let handles: Vec<_> = (0..5)
            .map(|thread_id| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for depth in 0..10 {
                        let key = FormulaKey::new(format!("file{}", thread_id), depth);
                        cache
                            .replace(&key, &format!("{}:{}", thread_id, depth), Aggregator::Mean)
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        for thread_id in 0..5 {
            for depth in 0..10 {
                let key = FormulaKey::new(format!("file{}", thread_id), depth);
                assert_eq!(
                    cache.read(&key).map(|e| e.text),
                    Some(format!("{}:{}", thread_id, depth)),
                    "Missing key: {}",
                    key
                );
            }
        }
    }

    #[test]
    fn test_concurrent_same_key_last_write_wins() {
        use std::thread;

        let cache = Arc::new(SqliteFormulaCache::in_memory().unwrap());
        let key = FormulaKey::new("shared", 1);

        let handles: Vec<_> = (0..8)
            .map(|thread_id| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                thread::spawn(move || {
                    cache.replace(&key, &format!("writer{}", thread_id), Aggregator::Mean).unwrap();
                    let _ = cache.read(&key);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        let text = cache.read(&key).unwrap().text;
        assert!(text.starts_with("writer"));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_config_from_cache_section() {
        let section = CacheConfig {
            max_pool_size: 1,
            ..CacheConfig::default()
        };
        let config = SqliteCacheConfig::from(&section);
        assert_eq!(config.max_pool_size, 1);
        assert_eq!(config.min_idle_connections, 1);
        assert_eq!(config.cache_size_kb, 64000);
    }
}
