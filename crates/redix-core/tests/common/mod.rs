// crates/redix-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Scripted engine transport and canned validation reports.
// Purpose: Drive gates and pipelines deterministically without a network.
// Dependencies: redix-core, serde_json
// ============================================================================

//! ## Overview
//! [`RecordingTransport`] answers each endpoint from its own script and
//! records every request, so tests can assert both the returned record and
//! exactly which engine calls were made. The last scripted response of an
//! endpoint is replayed once its script is exhausted.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use unwrap for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use redix_core::ConversionService;
use redix_core::EngineRequest;
use redix_core::EngineTransport;
use redix_core::UpstreamFailure;
use redix_core::UpstreamPayload;
use redix_core::UpstreamResult;
use redix_core::gates::VALIDATE_ENDPOINT;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Recording Transport
// ============================================================================

/// Scripted transport keyed by endpoint path.
#[derive(Default)]
pub struct RecordingTransport {
    scripts: Mutex<BTreeMap<String, VecDeque<UpstreamResult>>>,
    requests: Mutex<Vec<EngineRequest>>,
}

impl RecordingTransport {
    /// Creates an empty transport; unscripted endpoints fail with status 0.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends a response to an endpoint's script.
    pub fn on(self: &Arc<Self>, endpoint: &str, result: UpstreamResult) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(result);
        Arc::clone(self)
    }

    /// Scripts a JSON response for an endpoint.
    pub fn on_json(self: &Arc<Self>, endpoint: &str, value: Value) -> Arc<Self> {
        self.on(endpoint, Ok(UpstreamPayload::Json(value)))
    }

    /// Scripts a validation report.
    pub fn on_validate(self: &Arc<Self>, report: Value) -> Arc<Self> {
        self.on_json(VALIDATE_ENDPOINT, report)
    }

    /// Returns every request received, in order.
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Returns the requests sent to one endpoint.
    pub fn requests_to(&self, endpoint: &str) -> Vec<EngineRequest> {
        self.requests().into_iter().filter(|request| request.endpoint == endpoint).collect()
    }

    /// Returns the number of calls made to one endpoint.
    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.requests_to(endpoint).len()
    }
}

impl EngineTransport for RecordingTransport {
    fn send(&self, request: &EngineRequest) -> UpstreamResult {
        self.requests.lock().unwrap().push(request.clone());
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(&request.endpoint) else {
            return Err(UpstreamFailure::transport(
                "error sending request: connection refused",
                format!("http://127.0.0.1:9{}", request.endpoint),
            ));
        };
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

/// Creates a conversion service over the transport.
pub fn service(transport: &Arc<RecordingTransport>) -> ConversionService {
    ConversionService::new(transport.clone())
}

// ============================================================================
// SECTION: Validation Reports
// ============================================================================

/// A report with no findings.
pub fn clean_report() -> Value {
    json!({
        "validation_status": "PASSED",
        "transaction_type": "837P",
        "transaction_name": "Professional Claim",
        "errors": {
            "has_errors": false,
            "has_warnings": false,
            "error_count": 0,
            "warning_count": 0,
            "error_lines": [],
        },
    })
}

/// A report with blocking errors.
pub fn failed_report(lines: &[&str]) -> Value {
    json!({
        "validation_status": "FAILED",
        "error_code_description": "Missing required segments",
        "errors": {
            "has_errors": true,
            "has_warnings": false,
            "error_count": lines.len(),
            "warning_count": 0,
            "error_lines": lines,
        },
    })
}

/// A report with warnings only.
pub fn warning_report(lines: &[&str]) -> Value {
    json!({
        "validation_status": "WARNING",
        "errors": {
            "has_errors": false,
            "has_warnings": true,
            "error_count": 0,
            "warning_count": lines.len(),
            "error_lines": lines,
        },
    })
}

/// A minimal syntactically plausible 837P interchange.
pub const SAMPLE_837P: &str = "ISA*00*          *00*          *ZZ*SUBMITTER      *ZZ*RECEIVER       \
                               *240101*1200*^*00501*000000001*0*T*:~GS*HC*S*R*20240101*1200*1*X*\
                               005010X222A1~ST*837*0001*005010X222A1~SE*2*0001~GE*1*1~IEA*1*\
                               000000001~";
