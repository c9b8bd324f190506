//! Newline-delimited JSON request loop
//!
//! Each input line is `{"id", "path", "body"}`. Requests run concurrently,
//! each in its own task with its own solver session, and every response line
//! `{"id", "result", "code"}` is written as soon as it is ready, so responses
//! may come back out of order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::operations::{Engine, OperationResponse, ResponseCode};

/// One request line
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: serde_json::Value,
    pub path: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// One response line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: serde_json::Value,
    pub result: serde_json::Value,
    pub code: ResponseCode,
}

impl Reply {
    fn new(id: serde_json::Value, response: OperationResponse) -> Self {
        Self {
            id,
            result: response.result,
            code: response.code,
        }
    }
}

/// Answer one request line
pub async fn handle_line(engine: &Engine, line: &str) -> Reply {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed request line");
            return Reply {
                id: serde_json::Value::Null,
                result: serde_json::Value::String(format!("malformed request: {e}")),
                code: ResponseCode::InvalidRequest,
            };
        }
    };
    let response = match engine.handle(&envelope.path, envelope.body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(path = %envelope.path, error = %e, "Request failed");
            OperationResponse::from_error(&e)
        }
    };
    Reply::new(envelope.id, response)
}

/// Serve requests from `input` until it closes, writing replies to `output`
///
/// Returns once every in-flight request has been answered.
pub async fn serve<R, W>(engine: Arc<Engine>, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Reply>();

    let writer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            let mut line = match serde_json::to_string(&reply) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode reply");
                    continue;
                }
            };
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = input.lines();
    let mut requests = 0usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        requests += 1;
        let engine = Arc::clone(&engine);
        let tx = tx.clone();
        tokio::spawn(async move {
            let reply = handle_line(&engine, &line).await;
            // the writer only goes away when output fails
            let _ = tx.send(reply);
        });
    }
    drop(tx);
    tracing::info!(requests, "Input closed, draining replies");

    match writer.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    }
}

/// [`serve`] on the process stdin and stdout
pub async fn serve_stdio(engine: Arc<Engine>) -> std::io::Result<()> {
    tracing::info!("Serving requests on stdin");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(engine, stdin, tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryFormulaCache;
    use crate::config::EngineConfig;
    use crate::graph::{GraphData, RequireEdge, Requirements, StaticGraphProvider, VersionRecord};
    use crate::solver::ExhaustiveBackend;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn engine() -> Arc<Engine> {
        let graph = GraphData {
            name: Some("f".into()),
            moment: None,
            require: Requirements {
                direct: vec![RequireEdge::direct("A", "any")],
                indirect: vec![],
            },
            have: BTreeMap::from([(
                "A".to_string(),
                vec![
                    VersionRecord::new("1.0", 0, 0.0, 0.0),
                    VersionRecord::new("2.0", 1, 3.0, 3.0),
                ],
            )]),
        };
        Arc::new(Engine::new(
            Arc::new(StaticGraphProvider::new().with_graph("f1", graph)),
            Arc::new(MemoryFormulaCache::new()),
            Arc::new(ExhaustiveBackend::new(Duration::from_secs(3), 1_000)),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_handle_line() {
        let engine = engine();
        let line = json!({
            "id": 7,
            "path": "/operation/file/valid_graph",
            "body": {"requirement_file_id": "f1", "max_depth": 1, "ecosystem": "NPM"}
        })
        .to_string();
        let reply = handle_line(&engine, &line).await;
        assert_eq!(reply.id, json!(7));
        assert_eq!(reply.result, json!(true));
        assert_eq!(reply.code, ResponseCode::OperationSuccess);
    }

    #[tokio::test]
    async fn test_malformed_and_invalid_lines() {
        let engine = engine();
        let reply = handle_line(&engine, "{not json").await;
        assert_eq!(reply.code, ResponseCode::InvalidRequest);
        assert_eq!(reply.id, serde_json::Value::Null);

        let line = json!({"id": "x", "path": "/operation/file/minimise_impact", "body": {
            "requirement_file_id": "f1", "max_depth": 1, "ecosystem": "NPM", "limit": 0
        }})
        .to_string();
        let reply = handle_line(&engine, &line).await;
        assert_eq!(reply.id, json!("x"));
        assert_eq!(reply.code, ResponseCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_serve_answers_every_request() {
        let engine = engine();
        let input = [
            json!({"id": 1, "path": "/operation/file/number_of_products",
                   "body": {"requirement_file_id": "f1", "max_depth": 1, "ecosystem": "NPM"}}),
            json!({"id": 2, "path": "/operation/file/valid_file",
                   "body": {"requirement_file_id": "missing", "max_depth": 1, "ecosystem": "NPM"}}),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n\n");

        let (client, server_out) = tokio::io::duplex(64 * 1024);
        serve(engine, input.as_bytes(), server_out).await.unwrap();

        let mut replies = Vec::new();
        let mut lines = tokio::io::BufReader::new(client).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            replies.push(serde_json::from_str::<Reply>(&line).unwrap());
            if replies.len() == 2 {
                break;
            }
        }
        replies.sort_by_key(|reply| reply.id.as_i64());

        assert_eq!(replies[0].result, json!(2));
        assert_eq!(replies[0].code, ResponseCode::OperationSuccess);
        assert_eq!(replies[1].result, json!(""));
        assert_eq!(replies[1].code, ResponseCode::NoDependencies);
    }
}
