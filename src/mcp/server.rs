//! Tool-surface serve loop.
//!
//! Reads JSON-RPC requests from stdin, dispatches them against the tool
//! registry with per-call deadlines, and writes responses to stdout.
//! All logging goes to stderr; stdout carries protocol traffic only.

use super::protocol::{METHOD_NOT_FOUND, Request, Response, RpcError, read_message, write_message};
use super::tools::ToolRegistry;
use crate::models::ToolRegistryEntry;
use crate::services::ServiceContainer;
use crate::{Error, Result};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Tools that carry a `session_id` parameter whose calls count as
/// session interactions.
const SESSION_ACCOUNTED_TOOLS: &[&str] = &[
    "store_knowledge",
    "search_similar_knowledge",
    "record_validation",
];

/// The tool-surface server.
pub struct McpServer {
    services: Arc<ServiceContainer>,
    registry: ToolRegistry,
}

impl McpServer {
    /// Creates a server over a wired service container.
    #[must_use]
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self {
            services,
            registry: ToolRegistry::new(),
        }
    }

    /// Registers the tool set in the store's tool registry table.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn register_tools(&self) -> Result<()> {
        for tool in self.registry.list_tools() {
            let entry = ToolRegistryEntry::new(
                tool.name.clone(),
                tool.description.clone(),
                tool.input_schema.clone(),
            );
            self.services.store().put_tool_entry(&entry)?;
        }
        Ok(())
    }

    /// Handles one request.
    pub async fn handle(&self, request: Request) -> Response {
        let Request { id, method, params } = request;
        tracing::debug!(%method, "dispatching tool call");

        match method.as_str() {
            "tools/list" => {
                let tools: Vec<Value> = self
                    .registry
                    .list_tools()
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect();
                Response::ok(id, json!({ "tools": tools }))
            },
            "ping" => Response::ok(id, json!({})),
            name if self.registry.get_tool(name).is_some() => {
                let result = self.call_tool(name, params).await;
                match result {
                    Ok(value) => Response::ok(id, value),
                    Err(e) => {
                        tracing::warn!(tool = name, error = %e, "tool call failed");
                        Response::fail(id, RpcError::from(&e))
                    },
                }
            },
            unknown => Response::fail(
                id,
                RpcError {
                    code: METHOD_NOT_FOUND,
                    message: format!("unknown method: {unknown}"),
                    data: None,
                },
            ),
        }
    }

    /// Runs one tool call under its deadline and accounts the
    /// interaction on the session it names.
    async fn call_tool(&self, name: &str, params: Option<Value>) -> Result<Value> {
        let config = self.services.config();
        // Assembly paths get the longer deadline.
        let deadline_ms = if name == "get_contextual_knowledge" {
            config.assemble_timeout_ms
        } else {
            config.tool_timeout_ms
        };

        let session_id = if SESSION_ACCOUNTED_TOOLS.contains(&name) {
            params
                .as_ref()
                .and_then(|p| p.get("session_id"))
                .and_then(Value::as_str)
                .and_then(|raw| crate::models::SessionId::from_str(raw).ok())
        } else {
            None
        };

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_millis(deadline_ms),
            self.registry
                .execute(name, Arc::clone(&self.services), params),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout {
                operation: name.to_string(),
                deadline_ms,
            })
        });

        if let Some(session_id) = session_id {
            #[allow(clippy::cast_precision_loss)]
            let elapsed_ms = started.elapsed().as_millis() as f64;
            let success = outcome.is_ok();
            let services = Arc::clone(&self.services);
            // Best-effort: a failed interaction is recorded, the session
            // stays open, and accounting never fails the call itself.
            let accounted = tokio::task::spawn_blocking(move || {
                services
                    .store()
                    .record_interaction(session_id, success, elapsed_ms)
            })
            .await;
            if let Ok(Err(e)) = accounted {
                tracing::debug!(error = %e, "interaction accounting skipped");
            }
        }

        outcome
    }

    /// Serves requests over stdin/stdout until EOF.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from the pipe.
    pub async fn serve_stdio(&self) -> Result<()> {
        self.register_tools()?;
        let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
        let mut writer = tokio::io::stdout();
        tracing::info!("tool surface listening on stdio");

        while let Some((body, framed)) = read_message(&mut reader)
            .await
            .map_err(|e| Error::internal("serve_stdio", e))?
        {
            let response = match serde_json::from_str::<Request>(&body) {
                Ok(request) => self.handle(request).await,
                Err(e) => Response::fail(
                    None,
                    RpcError {
                        code: -32700,
                        message: format!("parse error: {e}"),
                        data: None,
                    },
                ),
            };
            let body = serde_json::to_string(&response)
                .map_err(|e| Error::internal("serve_stdio", e))?;
            write_message(&mut writer, &body, framed)
                .await
                .map_err(|e| Error::internal("serve_stdio", e))?;
        }

        self.services.shutdown();
        tracing::info!("tool surface shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngramConfig;

    fn server() -> McpServer {
        let config = EngramConfig {
            embedding_dimension: 32,
            ..EngramConfig::default()
        };
        let services = Arc::new(ServiceContainer::open_in_memory(&config).unwrap());
        McpServer::new(services)
    }

    fn request(method: &str, params: Value) -> Request {
        Request {
            id: Some(json!(1)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[tokio::test]
    async fn test_tools_list() {
        let server = server();
        let response = server.handle(request("tools/list", json!({}))).await;
        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 8);
        assert!(tools.iter().all(|t| t["input_schema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = server();
        let response = server.handle(request("no/such", json!({}))).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_store_and_search_roundtrip() {
        let server = server();

        let stored = server
            .handle(request(
                "store_knowledge",
                json!({
                    "knowledge_type": "technical",
                    "category": "configuration",
                    "title": "X requires absolute path",
                    "content": "Config must use absolute path to X",
                    "importance": 85,
                }),
            ))
            .await;
        let knowledge_id = stored.result.unwrap()["knowledge_id"]
            .as_str()
            .unwrap()
            .to_string();

        let found = server
            .handle(request(
                "search_similar_knowledge",
                json!({ "query": "absolute path configuration" }),
            ))
            .await;
        let result = found.result.unwrap();
        let hits = result["results"].as_array().unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0]["knowledge_id"].as_str().unwrap(), knowledge_id);
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let server = server();
        let response = server
            .handle(request("search_similar_knowledge", json!({ "query": "  " })))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.data.unwrap()["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_session_lifecycle_over_pipe() {
        let server = server();

        let started = server
            .handle(request(
                "start_session",
                json!({
                    "project_context": {
                        "name": "pipe-test",
                        "project_type": "software"
                    }
                }),
            ))
            .await;
        let result = started.result.unwrap();
        let session_id = result["session_id"].as_str().unwrap().to_string();
        assert!(result["startup_knowledge"].as_array().unwrap().is_empty());

        // An interaction accounted on the session.
        server
            .handle(request(
                "store_knowledge",
                json!({
                    "knowledge_type": "experiential",
                    "category": "test",
                    "title": "learned something",
                    "content": "a lesson from the pipe test",
                    "session_id": session_id,
                }),
            ))
            .await;

        let ended = server
            .handle(request("end_session", json!({ "session_id": session_id })))
            .await;
        let result = ended.result.unwrap();
        assert_eq!(result["total_interactions"], 1);
        assert_eq!(result["successful_interactions"], 1);
    }

    #[tokio::test]
    async fn test_unknown_session_not_found_over_pipe() {
        let server = server();
        let response = server
            .handle(request(
                "get_session_context",
                json!({ "session_id": uuid::Uuid::new_v4().to_string() }),
            ))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32001);
        assert_eq!(error.data.unwrap()["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_record_validation_unknown_pattern() {
        let server = server();
        let response = server
            .handle(request(
                "record_validation",
                json!({
                    "pattern_id": uuid::Uuid::new_v4().to_string(),
                    "type": "user_feedback",
                    "result": true,
                }),
            ))
            .await;
        assert_eq!(response.error.unwrap().code, -32001);
    }
}
