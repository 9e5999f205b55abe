//! JSON-RPC request/response types and pipe framing.
//!
//! The tool pipe speaks newline-delimited JSON by default and also
//! accepts LSP-style `Content-Length` framing; responses mirror the
//! framing of the request they answer.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

/// One incoming request.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Request id echoed in the response; notifications omit it.
    pub id: Option<Value>,
    /// Tool name, or a meta method like `tools/list`.
    pub method: String,
    /// Tool parameters.
    pub params: Option<Value>,
}

/// One outgoing response.
#[derive(Debug, Serialize)]
pub struct Response {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// The request id this answers.
    pub id: Option<Value>,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    /// Numeric JSON-RPC code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable details (stable code, retry hints, cause chain).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Method-not-found JSON-RPC code.
pub const METHOD_NOT_FOUND: i64 = -32601;

impl Response {
    /// Builds a success response.
    #[must_use]
    pub const fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds a failure response.
    #[must_use]
    pub const fn fail(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl From<&Error> for RpcError {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::Validation(_) => -32602,
            Error::NotFound { .. } => -32001,
            Error::Conflict(_) => -32002,
            Error::DependencyUnavailable { .. } => -32003,
            Error::Timeout { .. } => -32004,
            Error::Cancelled { .. } => -32005,
            Error::Degraded(_) => -32006,
            Error::Internal { .. } => -32603,
        };
        let mut data = serde_json::Map::new();
        data.insert("code".to_string(), Value::from(err.code()));
        data.insert("retryable".to_string(), Value::from(err.is_retryable()));
        if let Some(ms) = err.retry_after_ms() {
            data.insert("retry_after_ms".to_string(), Value::from(ms));
        }
        if let Error::DependencyUnavailable { cause, .. } | Error::Internal { cause, .. } = err {
            data.insert("cause".to_string(), Value::from(cause.clone()));
        }
        Self {
            code,
            message: err.to_string(),
            data: Some(Value::Object(data)),
        }
    }
}

/// Reads the next message from the pipe.
///
/// Returns `(body, content_length_framed)`, or `None` at EOF. Non-JSON
/// noise lines (stray logs) are skipped.
///
/// # Errors
///
/// Returns I/O errors from the underlying reader.
pub async fn read_message<R>(
    reader: &mut BufReader<R>,
) -> std::io::Result<Option<(String, bool)>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('{') {
            return Ok(Some((trimmed.to_string(), false)));
        }

        let lower = trimmed.to_ascii_lowercase();
        if let Some(raw_len) = lower.strip_prefix("content-length:") {
            let len: usize = raw_len.trim().parse().unwrap_or(0);

            // Consume remaining header lines up to the blank separator.
            loop {
                let mut header = String::new();
                let read = reader.read_line(&mut header).await?;
                if read == 0 || header.trim().is_empty() {
                    break;
                }
            }

            if len == 0 {
                continue;
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await?;
            return Ok(Some((String::from_utf8_lossy(&body).to_string(), true)));
        }

        // Skip noise and keep reading.
    }
}

/// Writes a response body, framed to match the request.
///
/// # Errors
///
/// Returns I/O errors from the underlying writer.
pub async fn write_message<W>(
    writer: &mut W,
    body: &str,
    content_length_framed: bool,
) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    if content_length_framed {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(body.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    } else {
        writer.write_all(body.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await
}
