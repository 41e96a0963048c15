// crates/redix-client/src/http.rs
// ============================================================================
// Module: HTTP Engine Client
// Description: Blocking reqwest implementation of the engine transport.
// Purpose: Issue engine calls and normalize every outcome into one shape.
// Dependencies: redix-core, reqwest, url, serde_json
// ============================================================================

//! ## Overview
//! [`HttpEngineClient`] maps an [`EngineRequest`] onto one HTTP exchange:
//! multipart uploads and JSON bodies are posted, lookups use GET. Responses
//! are normalized as follows:
//!
//! - HTTP status `>= 400` becomes a failure carrying the truncated body.
//! - Transport errors become a status `0` failure with the full source chain.
//! - A declared JSON body that does not decode is a status `0` failure.
//! - Other content types are returned verbatim with their status.
//!
//! Invariants:
//! - Redirects are never followed and nothing is retried.
//! - Exactly one `engine_call` audit event is emitted per call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use redix_core::AuditSink;
use redix_core::EngineCallEvent;
use redix_core::EngineRequest;
use redix_core::EngineTransport;
use redix_core::MultipartBody;
use redix_core::NoopAuditSink;
use redix_core::RequestBody;
use redix_core::UpstreamFailure;
use redix_core::UpstreamPayload;
use redix_core::UpstreamResult;
use redix_core::audit::EngineCallEventParams;
use redix_core::audit::EngineCallOutcome;
use redix_core::upstream::truncate_chars;
use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::multipart::Part;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use serde_json::Value;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default submission channel reported to the engine.
pub const DEFAULT_SUBMISSION_METHOD: &str = "mcp";

/// Default cap on upstream error detail, in characters.
pub const DEFAULT_MAX_ERROR_DETAIL_CHARS: usize = 2_000;

/// Header naming the submission channel.
const SUBMISSION_METHOD_HEADER: &str = "x-submission-method";

/// Header carrying the engine API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Connection settings for the engine.
///
/// # Invariants
/// - `base_url` is an absolute `http` or `https` URL without a trailing `/`
///   once accepted by [`HttpEngineClient::new`].
/// - `api_key` is never rendered by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineClientConfig {
    /// Engine base URL.
    pub base_url: String,
    /// Optional API key sent as `X-API-Key`.
    pub api_key: Option<String>,
    /// Timeout applied to each request.
    pub timeout: Duration,
    /// Value of the `X-Submission-Method` header.
    pub submission_method: String,
    /// Maximum characters of upstream detail kept in failures.
    pub max_error_detail_chars: usize,
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            submission_method: DEFAULT_SUBMISSION_METHOD.to_string(),
            max_error_detail_chars: DEFAULT_MAX_ERROR_DETAIL_CHARS,
        }
    }
}

impl fmt::Debug for EngineClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("submission_method", &self.submission_method)
            .field("max_error_detail_chars", &self.max_error_detail_chars)
            .finish()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while constructing the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL is not an absolute http(s) URL.
    #[error("invalid engine base url: {0}")]
    InvalidBaseUrl(String),
    /// A configured header value is not valid in HTTP.
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
    /// The underlying HTTP client could not be built.
    #[error("http client build failed: {0}")]
    Build(String),
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking engine transport.
#[derive(Clone)]
pub struct HttpEngineClient {
    /// Normalized connection settings.
    config: EngineClientConfig,
    /// Parsed base URL.
    base_url: Url,
    /// HTTP client carrying the default headers.
    client: Client,
    /// Sink receiving one event per call.
    audit: Arc<dyn AuditSink>,
}

impl fmt::Debug for HttpEngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEngineClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl HttpEngineClient {
    /// Creates a client that discards audit events.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the configuration is unusable.
    pub fn new(config: EngineClientConfig) -> Result<Self, ClientError> {
        Self::with_audit(config, Arc::new(NoopAuditSink))
    }

    /// Creates a client that reports each call to `audit`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the base URL is not absolute http(s), a
    /// header value is invalid, or the HTTP client cannot be built.
    pub fn with_audit(
        mut config: EngineClientConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ClientError> {
        config.base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| ClientError::InvalidBaseUrl(format!("{}: {err}", config.base_url)))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(config.base_url));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .default_headers(default_headers(&config)?)
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;
        Ok(Self {
            config,
            base_url,
            client,
            audit,
        })
    }

    /// Returns the normalized configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineClientConfig {
        &self.config
    }

    /// Resolves the full request URL, query included.
    fn request_url(&self, request: &EngineRequest) -> Result<Url, UpstreamFailure> {
        let mut url = Url::parse(&format!("{}{}", self.config.base_url, request.endpoint))
            .map_err(|err| {
                UpstreamFailure::transport(
                    format!("invalid engine url: {err}"),
                    format!("{}{}", self.base_url, request.endpoint),
                )
            })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Performs the HTTP exchange and classifies the outcome.
    fn exchange(&self, request: &EngineRequest, url: &Url) -> Exchange {
        let label = url.as_str().to_string();
        let builder = match self.request_builder(request, url) {
            Ok(builder) => builder,
            Err(err) => return Exchange::transport(self.describe(&err), label),
        };
        let response = match builder.send() {
            Ok(response) => response,
            Err(err) => return Exchange::transport(self.describe(&err), label),
        };
        let status = response.status().as_u16();
        let declares_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"));
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => return Exchange::transport(self.describe(&err), label),
        };

        if status >= 400 {
            return Exchange {
                status,
                outcome: EngineCallOutcome::HttpError,
                result: Err(UpstreamFailure::http(status, self.clip(&body), label)),
            };
        }
        if !declares_json {
            return Exchange {
                status,
                outcome: EngineCallOutcome::Ok,
                result: Ok(UpstreamPayload::Text {
                    body,
                    status,
                }),
            };
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Exchange {
                status,
                outcome: EngineCallOutcome::Ok,
                result: Ok(UpstreamPayload::Json(value)),
            },
            Err(err) => Exchange {
                status,
                outcome: EngineCallOutcome::MalformedResponse,
                result: Err(UpstreamFailure::malformed(
                    self.clip(&format!("malformed JSON from engine (HTTP {status}): {err}")),
                    label,
                )),
            },
        }
    }

    /// Builds the method and body for a request.
    fn request_builder(
        &self,
        request: &EngineRequest,
        url: &Url,
    ) -> Result<RequestBuilder, reqwest::Error> {
        let builder = match &request.body {
            RequestBody::Empty => self.client.get(url.clone()),
            RequestBody::Json(None) => self.client.post(url.clone()),
            RequestBody::Json(Some(body)) => self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string()),
            RequestBody::Multipart(body) => self.client.post(url.clone()).multipart(form(body)?),
        };
        Ok(builder)
    }

    /// Describes a transport error with its source chain.
    fn describe(&self, err: &reqwest::Error) -> String {
        let mut detail = if err.is_timeout() {
            format!("request timed out after {}s", self.config.timeout.as_secs_f64())
        } else {
            err.to_string()
        };
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        self.clip(&detail)
    }

    /// Truncates upstream detail to the configured limit.
    fn clip(&self, detail: &str) -> String {
        truncate_chars(detail, self.config.max_error_detail_chars)
    }
}

impl EngineTransport for HttpEngineClient {
    fn send(&self, request: &EngineRequest) -> UpstreamResult {
        let started = Instant::now();
        let (audit_url, exchange) = match self.request_url(request) {
            Ok(url) => {
                let mut audit_url = url.clone();
                audit_url.set_query(None);
                (audit_url.to_string(), self.exchange(request, &url))
            }
            Err(failure) => (failure.url.clone(), Exchange {
                status: 0,
                outcome: EngineCallOutcome::TransportError,
                result: Err(failure),
            }),
        };
        self.audit.record_engine_call(&EngineCallEvent::new(EngineCallEventParams {
            method: request.method(),
            url: audit_url,
            query: request.query.clone(),
            status: exchange.status,
            outcome: exchange.outcome,
            elapsed_ms: started.elapsed().as_millis(),
        }));
        exchange.result
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// One classified HTTP exchange.
struct Exchange {
    /// HTTP status, or `0` when no response was received.
    status: u16,
    /// Audit classification.
    outcome: EngineCallOutcome,
    /// Normalized result.
    result: UpstreamResult,
}

impl Exchange {
    /// Builds a transport failure exchange.
    fn transport(detail: String, url: String) -> Self {
        Self {
            status: 0,
            outcome: EngineCallOutcome::TransportError,
            result: Err(UpstreamFailure::transport(detail, url)),
        }
    }
}

/// Builds the headers attached to every call.
fn default_headers(config: &EngineClientConfig) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let submission = HeaderValue::from_str(&config.submission_method)
        .map_err(|_| ClientError::InvalidHeader("X-Submission-Method"))?;
    headers.insert(HeaderName::from_static(SUBMISSION_METHOD_HEADER), submission);
    if let Some(api_key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
        let mut value =
            HeaderValue::from_str(api_key).map_err(|_| ClientError::InvalidHeader("X-API-Key"))?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
    }
    Ok(headers)
}

/// Converts a multipart description into a reqwest form.
fn form(body: &MultipartBody) -> Result<Form, reqwest::Error> {
    let mut form = Form::new();
    for upload in &body.uploads {
        let part = Part::text(upload.content.clone())
            .file_name(upload.file_name.clone())
            .mime_str(upload.content_type)?;
        form = form.part(upload.field.clone(), part);
    }
    for (name, value) in &body.fields {
        form = form.text(name.clone(), value.clone());
    }
    Ok(form)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
