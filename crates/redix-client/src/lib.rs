// crates/redix-client/src/lib.rs
// ============================================================================
// Module: Redix Client
// Description: Blocking HTTP transport for the Redix AnyToAny engine.
// Purpose: Implement the core engine transport over reqwest.
// Dependencies: redix-core, reqwest, url, serde_json
// ============================================================================

//! ## Overview
//! This crate provides [`HttpEngineClient`], the production implementation of
//! [`redix_core::EngineTransport`]. It issues one blocking request per call,
//! never retries, never follows redirects, and folds every failure into an
//! [`redix_core::UpstreamFailure`] so the gates can classify it.
//!
//! Security posture: the API key is sent as a header and never logged;
//! audit events carry method, URL, query, status, and latency only.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::ClientError;
pub use http::DEFAULT_MAX_ERROR_DETAIL_CHARS;
pub use http::DEFAULT_SUBMISSION_METHOD;
pub use http::DEFAULT_TIMEOUT;
pub use http::EngineClientConfig;
pub use http::HttpEngineClient;
