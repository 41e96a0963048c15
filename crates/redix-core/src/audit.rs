// crates/redix-core/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Structured audit events for engine calls and tool calls.
// Purpose: Emit redacted JSON-line logs without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are plain serializable structs written as one JSON object
//! per line. Sinks are pluggable so deployments can route events to stderr,
//! an append-only file, or nowhere.
//!
//! Security posture: events never carry request bodies, converted content,
//! or credentials. Engine calls record method, URL, query, status, and
//! latency only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::record::DecisionStatus;
use crate::record::GateId;
use crate::upstream::EngineMethod;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome classification for an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCallOutcome {
    /// The engine answered with a success status.
    Ok,
    /// The engine answered with an HTTP error status.
    HttpError,
    /// No usable response was received.
    TransportError,
    /// The engine declared JSON but the body did not decode.
    MalformedResponse,
}

/// Engine call audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct EngineCallEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// HTTP method label.
    pub method: &'static str,
    /// Requested URL without query string.
    pub url: String,
    /// Query parameters as sent.
    pub query: Vec<(String, String)>,
    /// HTTP status, or `0` when no response was received.
    pub status: u16,
    /// Outcome classification.
    pub outcome: EngineCallOutcome,
    /// Wall-clock latency in milliseconds.
    pub elapsed_ms: u128,
}

/// Inputs required to construct an engine call event.
pub struct EngineCallEventParams {
    /// HTTP method.
    pub method: EngineMethod,
    /// Requested URL without query string.
    pub url: String,
    /// Query parameters as sent.
    pub query: Vec<(String, String)>,
    /// HTTP status, or `0` when no response was received.
    pub status: u16,
    /// Outcome classification.
    pub outcome: EngineCallOutcome,
    /// Wall-clock latency in milliseconds.
    pub elapsed_ms: u128,
}

impl EngineCallEvent {
    /// Creates a new engine call event with a consistent timestamp.
    #[must_use]
    pub fn new(params: EngineCallEventParams) -> Self {
        Self {
            event: "engine_call",
            timestamp_ms: now_ms(),
            method: params.method.as_str(),
            url: params.url,
            query: params.query,
            status: params.status,
            outcome: params.outcome,
            elapsed_ms: params.elapsed_ms,
        }
    }
}

/// Tool call audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tool name as requested.
    pub tool: String,
    /// Decision status when a record was produced.
    pub status: Option<DecisionStatus>,
    /// Gate that produced the record, if any.
    pub gate: Option<GateId>,
    /// Correlation identifier of the produced record.
    pub correlation_id: Option<String>,
    /// Protocol error label when no record was produced.
    pub error_kind: Option<&'static str>,
    /// Wall-clock latency in milliseconds.
    pub elapsed_ms: u128,
}

/// Inputs required to construct a tool call event.
pub struct ToolCallEventParams {
    /// Tool name as requested.
    pub tool: String,
    /// Decision status when a record was produced.
    pub status: Option<DecisionStatus>,
    /// Gate that produced the record, if any.
    pub gate: Option<GateId>,
    /// Correlation identifier of the produced record.
    pub correlation_id: Option<String>,
    /// Protocol error label when no record was produced.
    pub error_kind: Option<&'static str>,
    /// Wall-clock latency in milliseconds.
    pub elapsed_ms: u128,
}

impl ToolCallEvent {
    /// Creates a new tool call event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ToolCallEventParams) -> Self {
        Self {
            event: "tool_call",
            timestamp_ms: now_ms(),
            tool: params.tool,
            status: params.status,
            gate: params.gate,
            correlation_id: params.correlation_id,
            error_kind: params.error_kind,
            elapsed_ms: params.elapsed_ms,
        }
    }
}

/// Returns milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait AuditSink: Send + Sync {
    /// Record an engine call event.
    fn record_engine_call(&self, event: &EngineCallEvent);

    /// Record a tool call event.
    fn record_tool_call(&self, _event: &ToolCallEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record_engine_call(&self, event: &EngineCallEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_tool_call(&self, event: &ToolCallEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_engine_call(&self, event: &EngineCallEvent) {
        self.append(event);
    }

    fn record_tool_call(&self, event: &ToolCallEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_engine_call(&self, _event: &EngineCallEvent) {}

    fn record_tool_call(&self, _event: &ToolCallEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
