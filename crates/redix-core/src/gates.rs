// crates/redix-core/src/gates.rs
// ============================================================================
// Module: Compliance Gates
// Description: Input and output admission checks backed by engine validation.
// Purpose: Block conversions whose input or generated X12 fails validation.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Both gates call the engine's validation endpoint and classify the report.
//! A gate returns `None` when it has no objection and `Some(record)` with
//! status `Blocked` or `Error` otherwise; there is no partial gate state.
//!
//! Security posture: gates fail closed. An unreachable validation service or
//! an unreadable report is an `Error` verdict, never a pass.
//!
//! - Input admission blocks on errors, and on warnings in strict mode.
//! - Output admission blocks on errors only; strict mode does not apply and
//!   warnings never escalate a clean pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::record::DecisionRecord;
use crate::record::DecisionStatus;
use crate::record::GateId;
use crate::transaction::present_code;
use crate::upstream::EngineRequest;
use crate::upstream::EngineTransport;
use crate::upstream::RULING_DETAIL_CHARS;
use crate::upstream::UpstreamFailure;
use crate::upstream::UpstreamPayload;
use crate::upstream::truncate_chars;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Engine validation endpoint shared by both gates.
pub const VALIDATE_ENDPOINT: &str = "/api/v2/hipaa-validate/validate-content";
/// Maximum error lines quoted in a blocking ruling.
pub const RULING_ERROR_LINES: usize = 5;

/// Gate outcome: `None` passes, `Some` is a `Blocked` or `Error` record.
pub type GateVerdict = Option<DecisionRecord>;

// ============================================================================
// SECTION: Validation Report
// ============================================================================

/// Overall validation status reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    /// No findings.
    Passed,
    /// Non-blocking findings only.
    Warning,
    /// Blocking findings.
    Failed,
    /// Absent or unrecognized status.
    Unknown,
}

impl ValidationStatus {
    /// Parses an engine label; unrecognized labels read as `Unknown`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "PASSED" => Self::Passed,
            "WARNING" => Self::Warning,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Returns the engine label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Warning => "WARNING",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of a validation endpoint response.
///
/// Missing fields take the engine's documented defaults. The raw object is
/// retained so pass-through fields reach callers unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// Overall status.
    pub status: ValidationStatus,
    /// Engine reported blocking errors.
    pub has_errors: bool,
    /// Engine reported warnings.
    pub has_warnings: bool,
    /// Number of errors.
    pub error_count: u64,
    /// Number of warnings.
    pub warning_count: u64,
    /// Error and warning lines in engine order.
    pub error_lines: Vec<Value>,
    /// Human-readable description of the error codes.
    pub error_code_description: String,
    /// Detected transaction type.
    pub transaction_type: Option<String>,
    /// Detected transaction display name.
    pub transaction_name: Option<String>,
    /// Raw response object.
    pub raw: Map<String, Value>,
}

impl ValidationReport {
    /// Reads a report from a decoded response object.
    #[must_use]
    pub fn from_object(raw: Map<String, Value>) -> Self {
        let status = raw
            .get("validation_status")
            .and_then(Value::as_str)
            .map_or(ValidationStatus::Unknown, ValidationStatus::from_label);
        let errors = raw.get("errors").and_then(Value::as_object);
        let flag = |key: &str| errors.and_then(|obj| obj.get(key)).and_then(Value::as_bool);
        let count = |key: &str| read_count(errors.and_then(|obj| obj.get(key)));
        let error_lines = errors
            .and_then(|obj| obj.get("error_lines"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            status,
            has_errors: flag("has_errors").unwrap_or(false),
            has_warnings: flag("has_warnings").unwrap_or(false),
            error_count: count("error_count"),
            warning_count: count("warning_count"),
            error_lines,
            error_code_description: text("error_code_description").unwrap_or_default(),
            transaction_type: text("transaction_type"),
            transaction_name: text("transaction_name"),
            raw,
        }
    }

    /// Reads a report from an engine payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationCallError::Malformed`] when the payload is not a
    /// JSON object.
    pub fn from_payload(payload: UpstreamPayload) -> Result<Self, ValidationCallError> {
        match payload {
            UpstreamPayload::Json(Value::Object(raw)) => Ok(Self::from_object(raw)),
            UpstreamPayload::Json(_) => Err(ValidationCallError::Malformed {
                detail: "validation response is not a JSON object".to_string(),
            }),
            UpstreamPayload::Text {
                body,
                status,
            } => Err(ValidationCallError::Malformed {
                detail: format!(
                    "unexpected non-JSON response (HTTP {status}): {}",
                    truncate_chars(&body, RULING_DETAIL_CHARS)
                ),
            }),
        }
    }

    /// Returns true when the report carries blocking findings.
    #[must_use]
    pub fn blocks(&self) -> bool {
        self.status == ValidationStatus::Failed || self.has_errors || self.error_count > 0
    }

    /// Returns true when the report carries warnings.
    #[must_use]
    pub fn warns(&self) -> bool {
        self.status == ValidationStatus::Warning || self.has_warnings || self.warning_count > 0
    }

    /// Returns a raw pass-through field, or null when absent.
    #[must_use]
    pub fn passthrough(&self, key: &str) -> Value {
        self.raw.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Joins the first error lines for a ruling.
    #[must_use]
    pub fn error_excerpt(&self) -> String {
        self.error_lines.iter().take(RULING_ERROR_LINES).map(line_text).collect::<Vec<_>>().join("; ")
    }

    /// Returns the error description as a ruling sentence fragment.
    fn description_sentence(&self) -> String {
        let description = self.error_code_description.trim();
        if description.is_empty() {
            String::new()
        } else {
            format!(" {}.", description.trim_end_matches('.'))
        }
    }
}

/// Reads a finding count sent as an integer, float, or numeric string.
///
/// Absent or null reads as zero. Anything present but unreadable reads as one
/// so the finding still counts.
fn read_count(value: Option<&Value>) -> u64 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(number)) => {
            number.as_u64().unwrap_or_else(|| number.as_f64().map_or(1, count_from_float))
        }
        Some(Value::String(text)) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(count_from_float))
                .unwrap_or(1)
        }
        Some(_) => 1,
    }
}

/// Rounds a fractional count up; negative or non-finite values read as one.
fn count_from_float(value: f64) -> u64 {
    if !value.is_finite() || value < 0.0 {
        return 1;
    }
    format!("{:.0}", value.ceil()).parse().unwrap_or(1)
}

/// Formats an upstream failure for gate rulings.
fn failure_summary(failure: &UpstreamFailure) -> String {
    failure.summary()
}

/// Renders one error line as ruling text.
fn line_text(line: &Value) -> String {
    match line {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Failure to obtain a usable validation report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationCallError {
    /// The engine call failed.
    #[error("{}", failure_summary(.0))]
    Upstream(UpstreamFailure),
    /// The engine answered with an unreadable report.
    #[error("malformed validation response: {detail}")]
    Malformed {
        /// What was wrong with the response.
        detail: String,
    },
}

// ============================================================================
// SECTION: Gate Engine
// ============================================================================

/// Stateless pair of admission checks over the engine validator.
#[derive(Clone)]
pub struct GateEngine {
    /// Engine transport.
    transport: Arc<dyn EngineTransport>,
}

impl GateEngine {
    /// Creates a gate engine over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self {
            transport,
        }
    }

    /// Validates content with the engine.
    ///
    /// The transaction type is sent as given, unnormalized, and omitted when
    /// blank.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationCallError`] when the call fails or the report is
    /// unreadable.
    pub fn validate(
        &self,
        content: &str,
        transaction_type: Option<&str>,
    ) -> Result<ValidationReport, ValidationCallError> {
        let mut body = Map::new();
        body.insert("content".to_string(), Value::String(content.to_string()));
        if let Some(code) = present_code(transaction_type) {
            body.insert("transaction_type".to_string(), Value::String(code.to_string()));
        }
        let request = EngineRequest::json(VALIDATE_ENDPOINT, Some(Value::Object(body)));
        let payload = self.transport.send(&request).map_err(ValidationCallError::Upstream)?;
        ValidationReport::from_payload(payload)
    }

    /// Pre-conversion admission check.
    #[must_use]
    pub fn admit_input(
        &self,
        content: &str,
        transaction_type: Option<&str>,
        strict_mode: bool,
    ) -> GateVerdict {
        let report = match self.validate(content, transaction_type) {
            Ok(report) => report,
            Err(err) => {
                return Some(unavailable_record(
                    GateId::InputValidation,
                    "Gate 1 (input validation) could not reach the validation service.",
                    &err,
                ));
            }
        };

        if report.blocks() {
            let ruling = format!(
                "Conversion REFUSED. Input X12 has {} validation error(s).{} Details: {}",
                report.error_count,
                report.description_sentence(),
                report.error_excerpt()
            );
            return Some(
                DecisionRecord::builder(DecisionStatus::Blocked, ruling)
                    .gate(GateId::InputValidation)
                    .errors(report.error_lines.clone())
                    .data_entry("validation_status", report.status.as_str())
                    .data_entry("error_count", report.error_count)
                    .data_entry("warning_count", report.warning_count)
                    .build(),
            );
        }

        if strict_mode && report.warns() {
            let ruling = format!(
                "Conversion REFUSED (strict mode). Input X12 has {} warning(s). Disable \
                 strict_mode or fix warnings before retrying.",
                report.warning_count
            );
            return Some(
                DecisionRecord::builder(DecisionStatus::Blocked, ruling)
                    .gate(GateId::InputValidation)
                    .warnings(report.error_lines.clone())
                    .data_entry("validation_status", report.status.as_str())
                    .data_entry("warning_count", report.warning_count)
                    .build(),
            );
        }

        None
    }

    /// Post-conversion admission check for generated X12.
    #[must_use]
    pub fn admit_output(
        &self,
        content: &str,
        transaction_type: Option<&str>,
        source_label: &str,
    ) -> GateVerdict {
        let report = match self.validate(content, transaction_type) {
            Ok(report) => report,
            Err(err) => {
                return Some(unavailable_record(
                    GateId::OutputValidation,
                    "Gate 5 (output validation) could not re-validate the generated X12.",
                    &err,
                ));
            }
        };

        if report.blocks() {
            let ruling = format!(
                "X12 was generated by {source_label} but FAILED output validation with {} \
                 error(s).{} The source data may be incomplete. DO NOT submit this to payers.",
                report.error_count,
                report.description_sentence()
            );
            return Some(
                DecisionRecord::builder(DecisionStatus::Blocked, ruling)
                    .gate(GateId::OutputValidation)
                    .errors(report.error_lines.clone())
                    .data_entry("validation_status", report.status.as_str())
                    .data_entry("error_count", report.error_count)
                    .build(),
            );
        }

        None
    }

    /// Classifies content for the standalone validation operation.
    #[must_use]
    pub fn validation_record(&self, content: &str, transaction_type: Option<&str>) -> DecisionRecord {
        match self.validate(content, transaction_type) {
            Ok(report) => classify_report(&report, transaction_type),
            Err(err) => DecisionRecord::builder(
                DecisionStatus::Error,
                format!("Validation service error: {err}"),
            )
            .build(),
        }
    }
}

impl fmt::Debug for GateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateEngine").finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Builds the error verdict for a gate whose validation call failed.
fn unavailable_record(gate: GateId, prefix: &str, err: &ValidationCallError) -> DecisionRecord {
    DecisionRecord::builder(DecisionStatus::Error, format!("{prefix} {err}")).gate(gate).build()
}

/// Classifies a validation report into a standalone validation record.
#[must_use]
pub fn classify_report(report: &ValidationReport, requested_type: Option<&str>) -> DecisionRecord {
    let mut data = Map::new();
    data.insert("validation_status".to_string(), json!(report.status.as_str()));
    data.insert("transaction_type".to_string(), json!(report.transaction_type));
    data.insert("transaction_name".to_string(), json!(report.transaction_name));
    data.insert("error_count".to_string(), json!(report.error_count));
    data.insert("warning_count".to_string(), json!(report.warning_count));
    for key in ["validation_levels", "ta1", "ack999", "balance_report"] {
        data.insert(key.to_string(), report.passthrough(key));
    }

    if report.blocks() {
        let ruling = format!(
            "Validation FAILED with {} error(s).{} Details: {}",
            report.error_count,
            report.description_sentence(),
            report.error_excerpt()
        );
        return DecisionRecord::builder(DecisionStatus::Blocked, ruling)
            .gate(GateId::Validation)
            .data(data)
            .errors(report.error_lines.clone())
            .build();
    }

    if report.warns() {
        let ruling = format!(
            "Validation PASSED with {} warning(s). The X12 is structurally valid but review the \
             warnings.",
            report.warning_count
        );
        return DecisionRecord::builder(DecisionStatus::ApprovedWithConditions, ruling)
            .gate(GateId::Validation)
            .data(data)
            .warnings(report.error_lines.clone())
            .build();
    }

    let label = report
        .transaction_name
        .as_deref()
        .or_else(|| present_code(requested_type))
        .unwrap_or("X12");
    DecisionRecord::builder(
        DecisionStatus::Approved,
        format!(
            "Validation PASSED. The {label} X12 content is structurally valid with no errors or \
             warnings."
        ),
    )
    .gate(GateId::Validation)
    .data(data)
    .build()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
