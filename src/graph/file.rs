//! Graph documents stored as JSON files

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{GraphData, GraphProvider};
use crate::error::GraphError;

/// Serves `<dir>/<file_id>.json`
#[derive(Debug, Clone)]
pub struct FileGraphProvider {
    dir: PathBuf,
}

impl FileGraphProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Provider for a single document; returns it together with its file id
    pub fn for_document(path: &Path) -> Result<(Self, String), GraphError> {
        let file_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| GraphError::InvalidFileId(path.display().to_string()))?
            .to_string();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok((Self::new(dir), file_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, file_id: &str) -> Result<PathBuf, GraphError> {
        let valid = !file_id.is_empty()
            && file_id != "."
            && file_id != ".."
            && !file_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(GraphError::InvalidFileId(file_id.to_string()));
        }
        Ok(self.dir.join(format!("{file_id}.json")))
    }
}

#[async_trait]
impl GraphProvider for FileGraphProvider {
    async fn read_graph(
        &self,
        file_id: &str,
        max_depth: u32,
    ) -> Result<Option<GraphData>, GraphError> {
        let path = self.document_path(file_id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Graph document not found");
                return Ok(None);
            }
            Err(source) => return Err(GraphError::Io { path, source }),
        };
        let mut graph: GraphData = serde_json::from_str(&text)
            .map_err(|source| GraphError::Parse {
                path: path.clone(),
                source,
            })?;

        // documents without a moment are as fresh as the file itself
        if graph.moment.is_none() {
            graph.moment = tokio::fs::metadata(&path)
                .await
                .and_then(|meta| meta.modified())
                .ok()
                .map(DateTime::<Utc>::from);
        }

        tracing::debug!(
            file_id,
            max_depth,
            packages = graph.have.len(),
            "Loaded graph document"
        );
        Ok(Some(graph.project(max_depth)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOC: &str = r#"{
        "name": "requirements.txt",
        "moment": "2025-01-01T00:00:00Z",
        "require": {
            "direct": [{"package": "A", "constraints": ">=1.0"}],
            "indirect": [{"package": "B", "parent_version_name": "A", "parent_serial_number": 1, "constraints": "any"}]
        },
        "have": {
            "A": [{"name": "1.0", "serial_number": 0, "mean": 0.0, "weighted_mean": 0.0}],
            "B": [{"name": "0.1", "serial_number": 0, "mean": 5.0, "weighted_mean": 5.0}]
        }
    }"#;

    #[tokio::test]
    async fn test_read_graph() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f1.json"), DOC).unwrap();
        let provider = FileGraphProvider::new(dir.path());

        let graph = provider.read_graph("f1", 5).await.unwrap().unwrap();
        assert_eq!(graph.name.as_deref(), Some("requirements.txt"));
        assert_eq!(graph.have.len(), 2);

        let shallow = provider.read_graph("f1", 1).await.unwrap().unwrap();
        assert!(shallow.require.indirect.is_empty());
    }

    #[tokio::test]
    async fn test_missing_document() {
        let dir = TempDir::new().unwrap();
        let provider = FileGraphProvider::new(dir.path());
        assert!(provider.read_graph("absent", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_document() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let provider = FileGraphProvider::new(dir.path());
        assert!(matches!(
            provider.read_graph("bad", 3).await,
            Err(GraphError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let provider = FileGraphProvider::new("/tmp");
        assert!(matches!(
            provider.read_graph("../etc/passwd", 3).await,
            Err(GraphError::InvalidFileId(_))
        ));
    }

    #[tokio::test]
    async fn test_moment_defaults_to_mtime() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f2.json"), r#"{"name": "x"}"#).unwrap();
        let provider = FileGraphProvider::new(dir.path());
        let graph = provider.read_graph("f2", 1).await.unwrap().unwrap();
        assert!(graph.moment.is_some());
    }

    #[test]
    fn test_for_document() {
        let (provider, id) = FileGraphProvider::for_document(Path::new("graphs/app.json")).unwrap();
        assert_eq!(id, "app");
        assert_eq!(provider.dir(), Path::new("graphs"));

        let (provider, id) = FileGraphProvider::for_document(Path::new("app.json")).unwrap();
        assert_eq!(id, "app");
        assert_eq!(provider.dir(), Path::new("."));
    }
}
