// crates/redix-core/src/lib.rs
// ============================================================================
// Module: Redix Core
// Description: Compliance gates and decision records for engine conversions.
// Purpose: Decide whether conversion inputs and outputs are safe to hand back.
// Dependencies: serde, serde_json, thiserror, time, rand
// ============================================================================

//! ## Overview
//! Redix Core wraps calls to the remote Redix `AnyToAny` engine with admission
//! control. The engine performs all parsing, transcoding, and 5010 validation;
//! this crate only decides, from the engine's own validation verdicts, whether
//! a conversion may proceed and whether its output may be returned.
//!
//! Every operation resolves to a [`DecisionRecord`]. Transport failures,
//! engine rejections, and malformed caller input are classified into the
//! record's [`DecisionStatus`] instead of surfacing as Rust errors, because
//! the caller is an autonomous agent that needs an actionable verdict.
//!
//! Invariants:
//! - Input gates run before any conversion call; a verdict short-circuits.
//! - Output gates run on every X12 payload this crate hands back.
//! - Components share no mutable state; the transport is read-only.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod correlation;
pub mod gates;
pub mod pipelines;
pub mod record;
pub mod requests;
pub mod transaction;
pub mod upstream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::EngineCallEvent;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::ToolCallEvent;
pub use correlation::CorrelationIdGenerator;
pub use gates::GateEngine;
pub use gates::GateVerdict;
pub use gates::ValidationCallError;
pub use gates::ValidationReport;
pub use gates::ValidationStatus;
pub use pipelines::ConversionService;
pub use pipelines::Pipeline;
pub use record::DecisionRecord;
pub use record::DecisionRecordBuilder;
pub use record::DecisionStatus;
pub use record::GateId;
pub use transaction::TransactionType;
pub use transaction::normalize_transaction_type;
pub use upstream::EngineMethod;
pub use upstream::EngineRequest;
pub use upstream::EngineTransport;
pub use upstream::FailureKind;
pub use upstream::MultipartBody;
pub use upstream::RequestBody;
pub use upstream::Upload;
pub use upstream::UpstreamFailure;
pub use upstream::UpstreamPayload;
pub use upstream::UpstreamResult;
