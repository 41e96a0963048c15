// crates/redix-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common MCP Test Fixtures
// Description: Fixed-response engine transport and collecting audit sink.
// Purpose: Drive the tool router without a live engine.
// Dependencies: redix-core, redix-mcp, serde_json
// ============================================================================

//! ## Overview
//! [`FixedTransport`] answers each endpoint with one canned JSON body and
//! counts calls. Unscripted endpoints fail as unreachable. [`CollectingAudit`]
//! keeps every tool call event for assertions.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use unwrap for clarity."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use redix_core::AuditSink;
use redix_core::ConversionService;
use redix_core::EngineCallEvent;
use redix_core::EngineRequest;
use redix_core::EngineTransport;
use redix_core::ToolCallEvent;
use redix_core::UpstreamFailure;
use redix_core::UpstreamPayload;
use redix_core::UpstreamResult;
use redix_core::gates::VALIDATE_ENDPOINT;
use redix_mcp::ToolRouter;
use serde_json::Value;
use serde_json::json;

/// Transport answering each endpoint with one canned JSON body.
#[derive(Default)]
pub struct FixedTransport {
    responses: BTreeMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl FixedTransport {
    /// Adds a canned response.
    pub fn on(mut self, endpoint: &str, body: Value) -> Self {
        self.responses.insert(endpoint.to_string(), body);
        self
    }

    /// Adds a clean validation report.
    pub fn validating_clean(self) -> Self {
        self.on(
            VALIDATE_ENDPOINT,
            json!({
                "validation_status": "PASSED",
                "errors": {"has_errors": false, "has_warnings": false, "error_lines": []},
            }),
        )
    }

    /// Adds a failing validation report.
    pub fn validating_failed(self) -> Self {
        self.on(
            VALIDATE_ENDPOINT,
            json!({
                "validation_status": "FAILED",
                "errors": {
                    "has_errors": true,
                    "has_warnings": false,
                    "error_count": 1,
                    "error_lines": ["Missing NM1 segment"],
                },
            }),
        )
    }

    /// Returns the endpoints called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl EngineTransport for FixedTransport {
    fn send(&self, request: &EngineRequest) -> UpstreamResult {
        self.calls.lock().unwrap().push(request.endpoint.clone());
        self.responses.get(&request.endpoint).map_or_else(
            || {
                Err(UpstreamFailure::transport(
                    "error sending request: connection refused",
                    request.endpoint.clone(),
                ))
            },
            |body| Ok(UpstreamPayload::Json(body.clone())),
        )
    }
}

/// Audit sink keeping tool call events.
#[derive(Default)]
pub struct CollectingAudit {
    pub tool_calls: Mutex<Vec<ToolCallEvent>>,
}

impl CollectingAudit {
    /// Returns the recorded tool call events.
    pub fn events(&self) -> Vec<ToolCallEvent> {
        self.tool_calls.lock().unwrap().clone()
    }
}

impl AuditSink for CollectingAudit {
    fn record_engine_call(&self, _event: &EngineCallEvent) {}

    fn record_tool_call(&self, event: &ToolCallEvent) {
        self.tool_calls.lock().unwrap().push(event.clone());
    }
}

/// Builds a router over the transport with a collecting audit sink.
pub fn router_with(transport: FixedTransport) -> (ToolRouter, Arc<FixedTransport>, Arc<CollectingAudit>) {
    let transport = Arc::new(transport);
    let audit = Arc::new(CollectingAudit::default());
    let router = ToolRouter::new(ConversionService::new(transport.clone()), audit.clone());
    (router, transport, audit)
}

/// A minimal 837P interchange.
pub const SAMPLE_837P: &str = "ISA*00*          *00*          *ZZ*SUBMITTER      *ZZ*RECEIVER       \
                               *240101*1200*^*00501*000000001*0*T*:~GS*HC*S*R*20240101*1200*1*X*\
                               005010X222A1~ST*837*0001*005010X222A1~SE*2*0001~GE*1*1~IEA*1*\
                               000000001~";
