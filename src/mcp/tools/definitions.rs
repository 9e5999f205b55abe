//! Tool schema definitions.
//!
//! JSON Schemas published through `tools/list`; every handler validates
//! its arguments against the shapes declared here before touching the
//! store.

use super::ToolDefinition;

/// All knowledge-type names accepted by `store_knowledge`.
const KNOWLEDGE_TYPES: [&str; 8] = [
    "factual",
    "procedural",
    "contextual",
    "relational",
    "experiential",
    "technical",
    "patterns",
    "strategic",
];

/// Defines the `start_session` tool.
pub fn start_session_tool() -> ToolDefinition {
    ToolDefinition {
        name: "start_session".to_string(),
        description: "Start an AI session within a project and return startup knowledge"
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "project_context": {
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "Unique project name"
                        },
                        "display_name": {
                            "type": "string",
                            "description": "Human-readable project name"
                        },
                        "project_type": {
                            "type": "string",
                            "description": "Declares a new project when it does not exist yet",
                            "enum": ["software", "research", "genealogy", "general", "ai", "pattern_intelligence"]
                        }
                    },
                    "required": ["name"]
                },
                "session_metadata": {
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "Client-supplied external session id"
                        },
                        "session_type": {
                            "type": "string",
                            "description": "Session kind (default: interactive)"
                        },
                        "user_context": {
                            "type": "object",
                            "description": "Free-form context carried on the session"
                        }
                    }
                }
            },
            "required": ["project_context"]
        }),
    }
}

/// Defines the `end_session` tool.
pub fn end_session_tool() -> ToolDefinition {
    ToolDefinition {
        name: "end_session".to_string(),
        description: "End a session, optionally capturing insights and breakthroughs".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session id returned by start_session"
                },
                "insights": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Lessons learned during the session"
                },
                "breakthroughs": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "High-importance discoveries made during the session"
                }
            },
            "required": ["session_id"]
        }),
    }
}

/// Defines the `store_knowledge` tool.
pub fn store_knowledge_tool() -> ToolDefinition {
    ToolDefinition {
        name: "store_knowledge".to_string(),
        description: "Persist a typed knowledge item with vector and lexical indexing"
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "knowledge_type": {
                    "type": "string",
                    "enum": KNOWLEDGE_TYPES,
                    "description": "Coarse category of the item"
                },
                "category": {
                    "type": "string",
                    "description": "Free-form category label"
                },
                "title": {
                    "type": "string",
                    "description": "Short title (max 500 characters)"
                },
                "content": {
                    "type": "string",
                    "description": "Full content"
                },
                "context_data": {
                    "type": "object",
                    "description": "Optional structured context stored with the item"
                },
                "importance": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 100,
                    "description": "Importance score (default 50)"
                },
                "retrieval_triggers": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Extra tokens merged into the lexical index"
                },
                "semantic_type": {
                    "type": "string",
                    "enum": ["factual", "procedural", "contextual", "relational", "experiential", "technical_discovery", "pattern_recognition", "strategic_insight"],
                    "description": "Refined classification; must be compatible with knowledge_type"
                },
                "project": {
                    "type": "string",
                    "description": "Project name to scope the item to"
                },
                "session_id": {
                    "type": "string",
                    "description": "Session the item was learned in"
                }
            },
            "required": ["knowledge_type", "category", "title", "content"]
        }),
    }
}

/// Defines the `search_similar_knowledge` tool.
pub fn search_similar_knowledge_tool() -> ToolDefinition {
    ToolDefinition {
        name: "search_similar_knowledge".to_string(),
        description: "Hybrid semantic + lexical search over stored knowledge".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "knowledge_type": {
                    "type": "string",
                    "enum": KNOWLEDGE_TYPES,
                    "description": "Optional coarse-type filter"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "description": "Maximum results (default 10)"
                },
                "session_id": {
                    "type": "string",
                    "description": "Session to account the interaction on"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Defines the `get_contextual_knowledge` tool.
pub fn get_contextual_knowledge_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_contextual_knowledge".to_string(),
        description: "Assemble warmed + live context for a declared situation".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "situation": {
                    "type": "string",
                    "description": "What the session is currently about"
                },
                "project": {
                    "type": "string",
                    "description": "Project name; enables the warmed-cache path"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "description": "Maximum items (default 10)"
                }
            },
            "required": ["situation"]
        }),
    }
}

/// Defines the `get_technical_gotchas` tool.
pub fn get_technical_gotchas_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_technical_gotchas".to_string(),
        description: "Find technical discoveries matching a problem signature".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "problem_signature": {
                    "type": "string",
                    "description": "Error text or short description of the problem"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "description": "Maximum results (default 10)"
                }
            },
            "required": ["problem_signature"]
        }),
    }
}

/// Defines the `get_session_context` tool.
pub fn get_session_context_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_session_context".to_string(),
        description: "Recent knowledge and pattern usage recorded for a session".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session id returned by start_session"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "description": "Maximum items per list (default 20)"
                }
            },
            "required": ["session_id"]
        }),
    }
}

/// Defines the `record_validation` tool.
pub fn record_validation_tool() -> ToolDefinition {
    ToolDefinition {
        name: "record_validation".to_string(),
        description: "Record validation evidence for a pattern".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "pattern_id": {
                    "type": "string",
                    "description": "The validated pattern"
                },
                "type": {
                    "type": "string",
                    "enum": ["usage_success", "outcome_verification", "contradiction_check", "peer_review", "automated_validation", "user_feedback"],
                    "description": "Kind of evidence"
                },
                "result": {
                    "type": "boolean",
                    "description": "Whether the evidence supports the pattern"
                },
                "evidence": {
                    "type": "object",
                    "description": "Supporting details"
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Validator confidence (default 0.5)"
                },
                "session_id": {
                    "type": "string",
                    "description": "Session the evidence came from"
                }
            },
            "required": ["pattern_id", "type", "result"]
        }),
    }
}
