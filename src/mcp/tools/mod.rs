//! Tool definitions and dispatch.

mod definitions;
mod handlers;

use crate::services::ServiceContainer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Definition of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (the JSON-RPC method).
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for input validation.
    pub input_schema: Value,
}

/// Registry of the fixed tool set.
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Creates the registry with every engram tool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: vec![
                definitions::start_session_tool(),
                definitions::end_session_tool(),
                definitions::store_knowledge_tool(),
                definitions::search_similar_knowledge_tool(),
                definitions::get_contextual_knowledge_tool(),
                definitions::get_technical_gotchas_tool(),
                definitions::get_session_context_tool(),
                definitions::record_validation_tool(),
            ],
        }
    }

    /// All tool definitions, in registration order.
    #[must_use]
    pub fn list_tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Looks up a tool definition.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Executes a tool by name.
    ///
    /// # Errors
    ///
    /// `Validation` for unknown tools or malformed arguments; handler
    /// errors verbatim.
    pub async fn execute(
        &self,
        name: &str,
        services: Arc<ServiceContainer>,
        params: Option<Value>,
    ) -> Result<Value> {
        match name {
            "start_session" => handlers::start_session(services, params).await,
            "end_session" => handlers::end_session(services, params).await,
            "store_knowledge" => handlers::store_knowledge(services, params).await,
            "search_similar_knowledge" => {
                handlers::search_similar_knowledge(services, params).await
            },
            "get_contextual_knowledge" => {
                handlers::get_contextual_knowledge(services, params).await
            },
            "get_technical_gotchas" => handlers::get_technical_gotchas(services, params).await,
            "get_session_context" => handlers::get_session_context(services, params).await,
            "record_validation" => handlers::record_validation(services, params).await,
            _ => Err(Error::Validation(format!("unknown tool: {name}"))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
