// crates/redix-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: MCP server implementations for stdio and HTTP transports.
// Purpose: Expose Redix tools via JSON-RPC 2.0.
// Dependencies: redix-config, redix-client, axum, tokio
// ============================================================================

//! ## Overview
//! The MCP server exposes the Redix tools using JSON-RPC 2.0 over stdio or
//! HTTP and always routes calls through [`crate::tools::ToolRouter`].
//!
//! Stdio accepts newline-delimited JSON, which is what MCP clients send, and
//! `Content-Length` framed messages. Each response is written in the framing
//! of the request it answers. HTTP serves `POST /rpc`.
//!
//! Security posture: request bodies, tool arguments, and correlation headers
//! are untrusted. Bodies are size-limited before parsing; oversized stdio
//! messages are drained and answered with an error so the stream stays
//! usable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::BufRead;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use redix_client::HttpEngineClient;
use redix_config::AuditConfig;
use redix_config::AuditSinkKind;
use redix_config::RedixConfig;
use redix_config::ServerConfig;
use redix_config::ServerTransport;
use redix_core::AuditSink;
use redix_core::ConversionService;
use redix_core::FileAuditSink;
use redix_core::NoopAuditSink;
use redix_core::StderrAuditSink;
use redix_core::correlation::CLIENT_CORRELATION_HEADER;
use redix_core::correlation::sanitize_client_correlation_id;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::tools::ToolDefinition;
use crate::tools::ToolError;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MCP protocol revisions this server can answer with, newest last.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", "2025-06-18"];

/// Server name reported during initialization.
const SERVER_NAME: &str = "redix-mcp";

/// Maximum bytes of a single `Content-Length` header line.
const MAX_HEADER_LINE_BYTES: u64 = 1024;

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
#[derive(Debug)]
pub struct McpServer {
    /// Validated configuration.
    config: RedixConfig,
    /// Tool router for request dispatch.
    router: ToolRouter,
}

impl McpServer {
    /// Builds a new MCP server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the configuration is invalid or the
    /// audit sink or engine client cannot be created.
    pub fn from_config(config: RedixConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config.audit)?;
        let client = HttpEngineClient::with_audit(config.engine.client_config(), Arc::clone(&audit))
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let router = ToolRouter::new(ConversionService::new(Arc::new(client)), audit);
        Ok(Self {
            config,
            router,
        })
    }

    /// Returns the tool router.
    #[must_use]
    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Serves requests using the configured transport.
    ///
    /// Stdio returns when stdin reaches end of file. HTTP runs until the
    /// listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the server fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let max_body_bytes = self.config.server.max_body_bytes;
        match self.config.server.transport {
            ServerTransport::Stdio => {
                let router = self.router;
                tokio::task::spawn_blocking(move || serve_stdio(&router, max_body_bytes))
                    .await
                    .map_err(|err| McpServerError::Transport(format!("stdio worker failed: {err}")))?
            }
            ServerTransport::Http => serve_http(&self.config.server, self.router).await,
        }
    }
}

/// Builds the audit sink named by configuration.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, McpServerError> {
    match config.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| McpServerError::Config("audit.path is required".to_string()))?;
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| McpServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
    }
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves JSON-RPC requests over stdin/stdout.
fn serve_stdio(router: &ToolRouter, max_body_bytes: usize) -> Result<(), McpServerError> {
    let mut reader = io::stdin().lock();
    let mut writer = io::stdout().lock();
    serve_io(router, &mut reader, &mut writer, max_body_bytes)
}

/// Serves JSON-RPC messages from `reader` until end of input.
///
/// # Errors
///
/// Returns [`McpServerError::Transport`] on I/O failure or an unreadable
/// `Content-Length` frame.
pub fn serve_io(
    router: &ToolRouter,
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    max_body_bytes: usize,
) -> Result<(), McpServerError> {
    while let Some(inbound) = read_message(reader, max_body_bytes)? {
        let response = match &inbound.frame {
            Frame::Body(bytes) => parse_request(router, bytes, None),
            Frame::TooLarge => Some(too_large()),
        };
        let Some((_, response)) = response else {
            continue;
        };
        let payload = serde_json::to_vec(&response)
            .map_err(|_| McpServerError::Transport("json-rpc serialization failed".to_string()))?;
        write_message(writer, inbound.framing, &payload)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Serves JSON-RPC requests over HTTP.
async fn serve_http(server: &ServerConfig, router: ToolRouter) -> Result<(), McpServerError> {
    let bind = server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
    if !bind.ip().is_loopback() {
        let _ = writeln!(
            io::stderr(),
            "redix-mcp: WARNING: http transport bound to non-loopback address {bind}; tool calls \
             carry PHI and the endpoint has no authentication"
        );
    }
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| McpServerError::Transport(format!("http bind failed: {err}")))?;
    let app = rpc_app(router, server.max_body_bytes);
    axum::serve(listener, app)
        .await
        .map_err(|err| McpServerError::Transport(format!("http server failed: {err}")))
}

/// Builds the HTTP application serving `POST /rpc`.
#[must_use]
pub fn rpc_app(router: ToolRouter, max_body_bytes: usize) -> Router {
    let state = Arc::new(ServerState {
        router,
        max_body_bytes,
    });
    Router::new()
        .route("/rpc", post(handle_http))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Shared server state for HTTP handlers.
#[derive(Clone)]
struct ServerState {
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let correlation_id = match client_correlation_id(&headers) {
        Ok(correlation_id) => correlation_id,
        Err(message) => {
            let (status, response) = protocol_error(Value::Null, -32600, message);
            return (status, axum::Json(response)).into_response();
        }
    };
    if bytes.len() > state.max_body_bytes {
        let (status, response) = too_large();
        return (status, axum::Json(response)).into_response();
    }
    match parse_request(&state.router, bytes.as_ref(), correlation_id.as_deref()) {
        Some((status, response)) => (status, axum::Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Reads and sanitizes the client correlation header.
fn client_correlation_id(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(raw) = headers.get(CLIENT_CORRELATION_HEADER) else {
        return Ok(None);
    };
    let value = raw
        .to_str()
        .map_err(|_| format!("invalid {CLIENT_CORRELATION_HEADER}: non_ascii"))?;
    sanitize_client_correlation_id(Some(value))
        .map_err(|rejection| format!("invalid {CLIENT_CORRELATION_HEADER}: {rejection}"))
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
}

/// Initialization parameters; only the requested revision is read.
#[derive(Debug, Default, Deserialize)]
struct InitializeParams {
    /// Protocol revision requested by the client.
    #[serde(default, rename = "protocolVersion")]
    protocol_version: Option<String>,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Registered tool definitions.
    tools: Vec<ToolDefinition>,
}

/// Tool call response payload.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Tool output content.
    content: Vec<ToolContent>,
    /// The decision record as structured JSON.
    #[serde(rename = "structuredContent")]
    structured_content: Value,
}

/// Tool output payloads for JSON-RPC responses.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// Serialized decision record.
    Text {
        /// JSON text.
        text: String,
    },
}

/// Parses a raw payload and dispatches it.
///
/// Returns `None` for notifications, which get no response.
pub(crate) fn parse_request(
    router: &ToolRouter,
    bytes: &[u8],
    correlation_id: Option<&str>,
) -> Option<(StatusCode, JsonRpcResponse)> {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        return Some(protocol_error(Value::Null, -32700, "parse error".to_string()));
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => handle_request(router, request, correlation_id),
        Err(_) => Some(protocol_error(id, -32600, "invalid json-rpc request".to_string())),
    }
}

/// Dispatches a JSON-RPC request to the tool router.
fn handle_request(
    router: &ToolRouter,
    request: JsonRpcRequest,
    correlation_id: Option<&str>,
) -> Option<(StatusCode, JsonRpcResponse)> {
    let id = request.id?;
    if request.jsonrpc != "2.0" {
        return Some(protocol_error(id, -32600, "invalid json-rpc version".to_string()));
    }
    let params = request.params.unwrap_or(Value::Null);
    let response = match request.method.as_str() {
        "initialize" => {
            let requested = serde_json::from_value::<InitializeParams>(params).unwrap_or_default();
            success(id, initialize_result(requested.protocol_version.as_deref()))
        }
        "ping" => success(id, json!({})),
        "tools/list" => match serde_json::to_value(ToolListResult {
            tools: router.list_tools(),
        }) {
            Ok(value) => success(id, value),
            Err(_) => jsonrpc_error(id, ToolError::Serialization),
        },
        "tools/call" => match serde_json::from_value::<ToolCallParams>(params) {
            Ok(call) => {
                match call_tool_with_blocking(router, &call.name, call.arguments, correlation_id) {
                    Ok(record) => match serde_json::to_value(ToolCallResult {
                        content: vec![ToolContent::Text {
                            text: record.to_string(),
                        }],
                        structured_content: record,
                    }) {
                        Ok(value) => success(id, value),
                        Err(_) => jsonrpc_error(id, ToolError::Serialization),
                    },
                    Err(err) => jsonrpc_error(id, err),
                }
            }
            Err(_) => protocol_error(id, -32602, "invalid tool params".to_string()),
        },
        _ => protocol_error(id, -32601, "method not found".to_string()),
    };
    Some(response)
}

/// Builds the `initialize` result.
fn initialize_result(requested: Option<&str>) -> Value {
    let latest = SUPPORTED_PROTOCOL_VERSIONS[SUPPORTED_PROTOCOL_VERSIONS.len() - 1];
    let version = requested
        .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
        .unwrap_or(latest);
    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": {
                "listChanged": false,
            },
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Executes a tool call, shifting to a blocking context when available.
fn call_tool_with_blocking(
    router: &ToolRouter,
    name: &str,
    arguments: Value,
    correlation_id: Option<&str>,
) -> Result<Value, ToolError> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| router.handle_tool_call(name, arguments, correlation_id))
        }
        _ => router.handle_tool_call(name, arguments, correlation_id),
    }
}

/// Builds a successful response.
fn success(id: Value, result: Value) -> (StatusCode, JsonRpcResponse) {
    (
        StatusCode::OK,
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        },
    )
}

/// Builds a protocol-level error response.
fn protocol_error(id: Value, code: i64, message: String) -> (StatusCode, JsonRpcResponse) {
    (
        StatusCode::BAD_REQUEST,
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
            }),
        },
    )
}

/// Builds the response for an oversized request body.
fn too_large() -> (StatusCode, JsonRpcResponse) {
    let (_, response) = protocol_error(Value::Null, -32070, "request body too large".to_string());
    (StatusCode::PAYLOAD_TOO_LARGE, response)
}

/// Builds a JSON-RPC error response for a tool failure.
fn jsonrpc_error(id: Value, error: ToolError) -> (StatusCode, JsonRpcResponse) {
    let (status, code, message) = match error {
        ToolError::UnknownTool => (StatusCode::BAD_REQUEST, -32601, "unknown tool".to_string()),
        ToolError::InvalidParams(message) => (StatusCode::BAD_REQUEST, -32602, message),
        ToolError::Serialization => (StatusCode::OK, -32060, "serialization failed".to_string()),
    };
    let (_, response) = protocol_error(id, code, message);
    (status, response)
}

// ============================================================================
// SECTION: Framing Helpers
// ============================================================================

/// Framing used by a stdio message; responses reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// One JSON document per line.
    Line,
    /// MCP `Content-Length` header framing.
    ContentLength,
}

/// Body of one stdio message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Message bytes within the size limit.
    Body(Vec<u8>),
    /// Message exceeded the size limit and was drained.
    TooLarge,
}

/// One inbound stdio message.
#[derive(Debug)]
pub(crate) struct Inbound {
    /// Framing the message arrived in.
    pub(crate) framing: Framing,
    /// Message body.
    pub(crate) frame: Frame,
}

/// Reads the next stdio message, or `None` at end of input.
pub(crate) fn read_message(
    reader: &mut impl BufRead,
    max_body_bytes: usize,
) -> Result<Option<Inbound>, McpServerError> {
    let limit = u64::try_from(max_body_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(2)
        .max(MAX_HEADER_LINE_BYTES);
    loop {
        let mut line = Vec::new();
        let read = Read::take(&mut *reader, limit).read_until(b'\n', &mut line).map_err(read_failed)?;
        if read == 0 {
            return Ok(None);
        }
        let complete = line.last() == Some(&b'\n');
        let truncated = !complete && u64::try_from(read).is_ok_and(|read| read >= limit);
        if truncated {
            discard_line(reader)?;
        }
        let trimmed = line.trim_ascii();
        if !truncated && trimmed.is_empty() {
            continue;
        }
        if !truncated && let Some(length) = content_length(trimmed) {
            let frame = read_framed_body(reader, length?, max_body_bytes)?;
            return Ok(Some(Inbound {
                framing: Framing::ContentLength,
                frame,
            }));
        }
        let frame = if truncated || trimmed.len() > max_body_bytes {
            Frame::TooLarge
        } else {
            Frame::Body(trimmed.to_vec())
        };
        return Ok(Some(Inbound {
            framing: Framing::Line,
            frame,
        }));
    }
}

/// Parses a `Content-Length` header line; `None` when the line is not one.
fn content_length(line: &[u8]) -> Option<Result<usize, McpServerError>> {
    let text = std::str::from_utf8(line).ok()?;
    let (name, value) = text.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    Some(
        value
            .trim()
            .parse::<usize>()
            .map_err(|_| McpServerError::Transport("invalid content length".to_string())),
    )
}

/// Reads the remaining headers and the body of a framed message.
fn read_framed_body(
    reader: &mut impl BufRead,
    length: usize,
    max_body_bytes: usize,
) -> Result<Frame, McpServerError> {
    loop {
        let mut header = Vec::new();
        let read = Read::take(&mut *reader, MAX_HEADER_LINE_BYTES)
            .read_until(b'\n', &mut header)
            .map_err(read_failed)?;
        if read == 0 {
            return Err(McpServerError::Transport("stdio closed mid-frame".to_string()));
        }
        if header.last() != Some(&b'\n') {
            return Err(McpServerError::Transport("frame header too long".to_string()));
        }
        if header.trim_ascii().is_empty() {
            break;
        }
    }
    if length > max_body_bytes {
        let wanted = u64::try_from(length).unwrap_or(u64::MAX);
        let drained = io::copy(&mut Read::take(&mut *reader, wanted), &mut io::sink())
            .map_err(read_failed)?;
        if drained < wanted {
            return Err(McpServerError::Transport("stdio closed mid-frame".to_string()));
        }
        return Ok(Frame::TooLarge);
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).map_err(read_failed)?;
    Ok(Frame::Body(body))
}

/// Consumes input through the next newline.
fn discard_line(reader: &mut impl BufRead) -> Result<(), McpServerError> {
    loop {
        let available = reader.fill_buf().map_err(read_failed)?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(position) = available.iter().position(|byte| *byte == b'\n') {
            reader.consume(position + 1);
            return Ok(());
        }
        let consumed = available.len();
        reader.consume(consumed);
    }
}

/// Writes a response payload in the given framing.
pub(crate) fn write_message(
    writer: &mut impl Write,
    framing: Framing,
    payload: &[u8],
) -> Result<(), McpServerError> {
    if framing == Framing::ContentLength {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        writer.write_all(header.as_bytes()).map_err(write_failed)?;
        writer.write_all(payload).map_err(write_failed)?;
    } else {
        writer.write_all(payload).map_err(write_failed)?;
        writer.write_all(b"\n").map_err(write_failed)?;
    }
    writer.flush().map_err(write_failed)
}

/// Maps a read failure.
fn read_failed(_: io::Error) -> McpServerError {
    McpServerError::Transport("stdio read failed".to_string())
}

/// Maps a write failure.
fn write_failed(_: io::Error) -> McpServerError {
    McpServerError::Transport("stdio write failed".to_string())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
