// crates/redix-core/src/record.rs
// ============================================================================
// Module: Decision Records
// Description: Uniform outcome record returned by every gated operation.
// Purpose: Give autonomous callers one deterministic, actionable result shape.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! A [`DecisionRecord`] is built once per operation and never mutated after
//! construction. Its status is one of four values, its ruling is a
//! self-contained explanation an agent can relay verbatim, and its structured
//! `data`, `errors`, and `warnings` carry the pipeline payload.
//!
//! The wire keys `redix_ruling` and `transaction_id` are kept for agents that
//! already consume the engine gateway's response format.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Decision outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    /// The operation completed and its result is safe to use.
    Approved,
    /// The operation completed with non-blocking findings.
    ApprovedWithConditions,
    /// A gate refused the input or output.
    Blocked,
    /// The operation could not complete.
    Error,
}

impl DecisionStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::ApprovedWithConditions => "APPROVED_WITH_CONDITIONS",
            Self::Blocked => "BLOCKED",
            Self::Error => "ERROR",
        }
    }

    /// Returns true when the result may be treated as safe downstream.
    #[must_use]
    pub const fn is_actionable(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedWithConditions)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Gate Identifiers
// ============================================================================

/// Identifies the gate that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateId {
    /// Pre-conversion input admission.
    #[serde(rename = "gate1_input_validation")]
    InputValidation,
    /// Post-conversion output admission.
    #[serde(rename = "gate5_output_validation")]
    OutputValidation,
    /// Standalone validation tool.
    #[serde(rename = "validation")]
    Validation,
}

impl GateId {
    /// Returns the stable wire label for this gate.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "gate1_input_validation",
            Self::OutputValidation => "gate5_output_validation",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Decision Record
// ============================================================================

/// Uniform outcome of a gated operation.
///
/// # Invariants
/// - `Blocked` and `Error` records must not be treated as safe downstream,
///   even when `data` carries partial content.
/// - `correlation_id` is empty until the issuing service stamps it; issued
///   IDs are unique per service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Outcome classification.
    status: DecisionStatus,
    /// Actionable explanation of the outcome.
    #[serde(rename = "redix_ruling")]
    ruling: String,
    /// Gate that produced the record, when any.
    gate: Option<GateId>,
    /// Opaque per-call identifier.
    #[serde(rename = "transaction_id")]
    correlation_id: String,
    /// Creation time (UTC).
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    /// Pipeline payload.
    #[serde(default)]
    data: Map<String, Value>,
    /// Blocking findings.
    #[serde(default)]
    errors: Vec<Value>,
    /// Non-blocking findings.
    #[serde(default)]
    warnings: Vec<Value>,
}

impl DecisionRecord {
    /// Starts building a record with the given status and ruling.
    #[must_use]
    pub fn builder(status: DecisionStatus, ruling: impl Into<String>) -> DecisionRecordBuilder {
        DecisionRecordBuilder::new(status, ruling)
    }

    /// Returns the outcome classification.
    #[must_use]
    pub const fn status(&self) -> DecisionStatus {
        self.status
    }

    /// Returns the ruling text.
    #[must_use]
    pub fn ruling(&self) -> &str {
        &self.ruling
    }

    /// Returns the producing gate, if any.
    #[must_use]
    pub const fn gate(&self) -> Option<GateId> {
        self.gate
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// Returns the pipeline payload.
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns the blocking findings.
    #[must_use]
    pub fn errors(&self) -> &[Value] {
        &self.errors
    }

    /// Returns the non-blocking findings.
    #[must_use]
    pub fn warnings(&self) -> &[Value] {
        &self.warnings
    }

    /// Returns true when the result may be treated as safe downstream.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        self.status.is_actionable()
    }

    /// Adds one payload entry while the record is still being assembled.
    #[must_use]
    pub fn with_data_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets the correlation ID, replacing any earlier one.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Serializes the record to its wire JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error when the timestamp cannot be formatted.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`DecisionRecord`].
#[derive(Debug, Clone)]
pub struct DecisionRecordBuilder {
    /// Outcome classification.
    status: DecisionStatus,
    /// Ruling text.
    ruling: String,
    /// Producing gate.
    gate: Option<GateId>,
    /// Payload entries.
    data: Map<String, Value>,
    /// Blocking findings.
    errors: Vec<Value>,
    /// Non-blocking findings.
    warnings: Vec<Value>,
    /// Explicit correlation identifier.
    correlation_id: Option<String>,
}

impl DecisionRecordBuilder {
    /// Creates a builder with empty payload and findings.
    #[must_use]
    pub fn new(status: DecisionStatus, ruling: impl Into<String>) -> Self {
        Self {
            status,
            ruling: ruling.into(),
            gate: None,
            data: Map::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            correlation_id: None,
        }
    }

    /// Sets the producing gate.
    #[must_use]
    pub const fn gate(mut self, gate: GateId) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Replaces the payload map.
    #[must_use]
    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Adds one payload entry.
    #[must_use]
    pub fn data_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets the blocking findings.
    #[must_use]
    pub fn errors(mut self, errors: Vec<Value>) -> Self {
        self.errors = errors;
        self
    }

    /// Sets the non-blocking findings.
    #[must_use]
    pub fn warnings(mut self, warnings: Vec<Value>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Sets the correlation identifier up front.
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Finalizes the record, stamping the creation time.
    #[must_use]
    pub fn build(self) -> DecisionRecord {
        DecisionRecord {
            status: self.status,
            ruling: self.ruling,
            gate: self.gate,
            correlation_id: self.correlation_id.unwrap_or_default(),
            timestamp: OffsetDateTime::now_utc(),
            data: self.data,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
