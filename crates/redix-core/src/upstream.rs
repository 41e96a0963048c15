// crates/redix-core/src/upstream.rs
// ============================================================================
// Module: Upstream Engine Interface
// Description: Request shapes and normalized results for engine calls.
// Purpose: Decouple gates and pipelines from the HTTP transport.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Gates and pipelines describe engine calls as [`EngineRequest`] values and
//! receive an [`UpstreamResult`]. The transport behind [`EngineTransport`]
//! never panics and never returns a Rust error type of its own: every
//! failure is folded into an [`UpstreamFailure`]. DNS, connect, and timeout
//! failures carry status `0`, as do replies whose JSON body cannot be
//! decoded; [`FailureKind`] tells the two apart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum characters of upstream detail quoted in a ruling.
pub const RULING_DETAIL_CHARS: usize = 300;
/// Condition text used for transport-level failures.
pub const UNREACHABLE_CONDITION: &str = "engine unreachable or timed out";
/// Condition text used for replies that could not be decoded.
pub const MALFORMED_CONDITION: &str = "malformed response from engine";

// ============================================================================
// SECTION: Requests
// ============================================================================

/// HTTP method used for an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMethod {
    /// Read-only lookup.
    Get,
    /// Conversion or validation call.
    Post,
}

impl EngineMethod {
    /// Returns the method label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// In-memory file part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Form field name.
    pub field: String,
    /// File name reported to the engine.
    pub file_name: String,
    /// Content type of the part.
    pub content_type: &'static str,
    /// File contents.
    pub content: String,
}

impl Upload {
    /// Wraps text content as the engine's standard `file` upload.
    #[must_use]
    pub fn text(content: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            content_type: "text/plain",
            content: content.into(),
        }
    }
}

/// Multipart form body: file parts plus plain fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    /// File parts.
    pub uploads: Vec<Upload>,
    /// Plain text fields.
    pub fields: Vec<(String, String)>,
}

impl MultipartBody {
    /// Creates a body with a single upload.
    #[must_use]
    pub fn with_upload(upload: Upload) -> Self {
        Self {
            uploads: vec![upload],
            fields: Vec::new(),
        }
    }

    /// Adds a text field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Adds a text field when a value is present.
    #[must_use]
    pub fn optional_field(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.field(name, value),
            None => self,
        }
    }
}

/// Body shape of an engine request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Multipart form upload.
    Multipart(MultipartBody),
    /// JSON body; `None` posts with no body.
    Json(Option<Value>),
    /// No body (GET lookups).
    Empty,
}

/// Description of one engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Endpoint path, beginning with `/`.
    pub endpoint: String,
    /// Query parameters in order.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
}

impl EngineRequest {
    /// Builds a multipart POST.
    #[must_use]
    pub fn multipart(endpoint: impl Into<String>, body: MultipartBody) -> Self {
        Self {
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Multipart(body),
        }
    }

    /// Builds a JSON POST.
    #[must_use]
    pub fn json(endpoint: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    /// Builds a GET lookup.
    #[must_use]
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Appends a query parameter when a value is present.
    #[must_use]
    pub fn with_optional_query(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_query(name, value),
            None => self,
        }
    }

    /// Returns the HTTP method implied by the body shape.
    #[must_use]
    pub const fn method(&self) -> EngineMethod {
        match self.body {
            RequestBody::Empty => EngineMethod::Get,
            RequestBody::Multipart(_) | RequestBody::Json(_) => EngineMethod::Post,
        }
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Successful engine response.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    /// Decoded `application/json` body.
    Json(Value),
    /// Any other content type, kept verbatim.
    Text {
        /// Response body text.
        body: String,
        /// HTTP status code.
        status: u16,
    },
}

impl UpstreamPayload {
    /// Returns the JSON object when the payload is a JSON object.
    #[must_use]
    pub fn as_object(&self) -> Option<&serde_json::Map<String, Value>> {
        match self {
            Self::Json(value) => value.as_object(),
            Self::Text {
                ..
            } => None,
        }
    }
}

/// Failure class of an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No HTTP response was received.
    Transport,
    /// A response arrived but its body could not be decoded.
    Malformed,
    /// The engine answered with an HTTP error status.
    Http,
}

/// Failed engine call.
///
/// # Invariants
/// - `status` is `0` for transport and malformed-reply failures and the HTTP
///   status otherwise.
/// - `detail` is already truncated by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {detail}")]
pub struct UpstreamFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// HTTP status, or `0` when no usable response was received.
    pub status: u16,
    /// Upstream error detail.
    pub detail: String,
    /// Requested URL.
    pub url: String,
}

impl UpstreamFailure {
    /// Builds a failure for a call that produced no response.
    #[must_use]
    pub fn transport(detail: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            status: 0,
            detail: detail.into(),
            url: url.into(),
        }
    }

    /// Builds a failure for a reply whose body could not be decoded.
    #[must_use]
    pub fn malformed(detail: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Malformed,
            status: 0,
            detail: detail.into(),
            url: url.into(),
        }
    }

    /// Builds a failure for an HTTP error status.
    #[must_use]
    pub fn http(status: u16, detail: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Http,
            status,
            detail: detail.into(),
            url: url.into(),
        }
    }

    /// Returns true when no HTTP response was received.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.kind, FailureKind::Transport)
    }

    /// Returns a short description of the failure class.
    #[must_use]
    pub const fn condition(&self) -> &'static str {
        match self.kind {
            FailureKind::Transport => UNREACHABLE_CONDITION,
            FailureKind::Malformed => MALFORMED_CONDITION,
            FailureKind::Http => match self.status {
                400..=499 => "request rejected by engine",
                500..=599 => "engine internal error",
                _ => "unexpected engine response",
            },
        }
    }

    /// Returns the detail excerpt quoted in rulings.
    #[must_use]
    pub fn detail_excerpt(&self) -> String {
        truncate_chars(&self.detail, RULING_DETAIL_CHARS)
    }

    /// Formats `HTTP <status>: <detail>` for gate rulings.
    ///
    /// Status-0 failures also name their condition.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.kind {
            FailureKind::Http => format!("HTTP {}: {}", self.status, self.detail_excerpt()),
            FailureKind::Transport | FailureKind::Malformed => {
                format!("HTTP 0 ({}): {}", self.condition(), self.detail_excerpt())
            }
        }
    }
}

/// Normalized outcome of one engine call.
pub type UpstreamResult = Result<UpstreamPayload, UpstreamFailure>;

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Issues engine requests.
///
/// Implementations must fold every failure into [`UpstreamFailure`].
pub trait EngineTransport: Send + Sync {
    /// Sends one request and returns its normalized outcome.
    fn send(&self, request: &EngineRequest) -> UpstreamResult;
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Truncates text to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[.. index].to_string(),
        None => text.to_string(),
    }
}
