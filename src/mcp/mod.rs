//! Tool surface.
//!
//! Exposes the fixed tool set over a JSON-RPC request/response pipe,
//! with a `tools/list` meta-call publishing each tool's schema.

mod protocol;
mod server;
mod tools;

pub use protocol::{Request, Response, RpcError, read_message, write_message};
pub use server::McpServer;
pub use tools::{ToolDefinition, ToolRegistry};
