// crates/redix-core/src/requests.rs
// ============================================================================
// Module: Operation Requests
// Description: Typed inputs for every gated conversion operation.
// Purpose: Decode caller arguments strictly before any engine call.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Each operation takes one request struct. Unknown fields are rejected so a
//! misspelled `strict_mode` can never silently disable strict admission.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Claim type meaning "let the engine detect it".
pub const AUTO_CLAIM_TYPE: &str = "auto";

/// Default claim type for PDF generation.
fn default_claim_type() -> String {
    AUTO_CLAIM_TYPE.to_string()
}

// ============================================================================
// SECTION: X12 Requests
// ============================================================================

/// Input for standalone X12 validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateX12Request {
    /// Raw X12 content.
    pub x12_content: String,
    /// Transaction type; auto-detected when absent.
    #[serde(default)]
    pub transaction_type: Option<String>,
}

/// Input for X12 to FHIR and X12 to `RMap` conversions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct X12ConversionRequest {
    /// Raw X12 content.
    pub x12_content: String,
    /// Transaction type; auto-detected when absent.
    #[serde(default)]
    pub transaction_type: Option<String>,
    /// Block on validation warnings as well as errors.
    #[serde(default)]
    pub strict_mode: bool,
}

/// Input for `RMap` to X12 conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RmapToX12Request {
    /// `RMap` record content.
    pub rmap_content: String,
    /// Target transaction type; auto-detected when absent.
    #[serde(default)]
    pub transaction_type: Option<String>,
}

/// Input for loading X12 into the engine database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct X12ToDatabaseRequest {
    /// Raw X12 content.
    pub x12_content: String,
    /// Transaction type; auto-detected when absent.
    #[serde(default)]
    pub transaction_type: Option<String>,
    /// Session scope for created tables; generated by the engine when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Block on validation warnings as well as errors.
    #[serde(default)]
    pub strict_mode: bool,
}

/// Input for generating X12 from database records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseToX12Request {
    /// Transaction type; auto-detected when absent.
    #[serde(default)]
    pub transaction_type: Option<String>,
    /// Record to export; the engine default when absent.
    #[serde(default)]
    pub record_id: Option<i64>,
}

/// Input for PDF claim form generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimPdfRequest {
    /// Raw X12 837 content.
    pub x12_837_content: String,
    /// `837p`, `837i`, `837d`, or `auto`.
    #[serde(default = "default_claim_type")]
    pub claim_type: String,
    /// Block on validation warnings as well as errors.
    #[serde(default)]
    pub strict_mode: bool,
}

impl ClaimPdfRequest {
    /// Returns the explicit claim type, or `None` for auto-detection.
    #[must_use]
    pub fn explicit_claim_type(&self) -> Option<&str> {
        let claim_type = self.claim_type.trim();
        if claim_type.is_empty() || claim_type.eq_ignore_ascii_case(AUTO_CLAIM_TYPE) {
            None
        } else {
            Some(claim_type)
        }
    }
}

/// Input for sample X12 retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleX12Request {
    /// Transaction type to fetch a sample for.
    pub transaction_type: String,
}

// ============================================================================
// SECTION: Clinical Requests
// ============================================================================

/// Input for HL7 v2 to FHIR conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hl7ToFhirRequest {
    /// Raw HL7 v2 message or CDA XML.
    pub hl7_content: String,
}

/// Input for CDA to FHIR conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdaToFhirRequest {
    /// CDA or C-CDA XML document.
    pub cda_content: String,
}

/// Input for FHIR bundle conversions.
///
/// The bundle may arrive as JSON text or as an already-decoded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FhirBundleRequest {
    /// FHIR R4 bundle as JSON text or a JSON value.
    pub fhir_bundle: Value,
}

impl FhirBundleRequest {
    /// Returns the decoded bundle.
    ///
    /// # Errors
    ///
    /// Returns the JSON parse error text when the bundle is a string that is
    /// not valid JSON.
    pub fn bundle(&self) -> Result<Value, String> {
        match &self.fhir_bundle {
            Value::String(text) => serde_json::from_str(text).map_err(|err| err.to_string()),
            other => Ok(other.clone()),
        }
    }
}

/// Input for operations that take no arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyRequest {}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
