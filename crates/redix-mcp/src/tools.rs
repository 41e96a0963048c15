// crates/redix-mcp/src/tools.rs
// ============================================================================
// Module: MCP Tool Router
// Description: Tool catalogue and dispatch for the Redix MCP server.
// Purpose: Decode tool arguments strictly and hand them to gated pipelines.
// Dependencies: redix-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The tool router maps MCP tool names to [`ConversionService`] operations.
//! Handlers are thin: decode the arguments, run the pipeline, stamp the
//! correlation id, and emit one `tool_call` audit event.
//!
//! ## Invariants
//! - Arguments are decoded with `deny_unknown_fields`; a misspelled field is
//!   a protocol error, never a silently ignored option.
//! - Every call that names a known tool and decodes cleanly yields a
//!   serialized [`DecisionRecord`], whatever the pipeline outcome.
//! - Every call, successful or not, emits exactly one audit event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use redix_core::AuditSink;
use redix_core::ConversionService;
use redix_core::DecisionRecord;
use redix_core::ToolCallEvent;
use redix_core::audit::ToolCallEventParams;
use redix_core::requests::EmptyRequest;
use redix_core::upstream::truncate_chars;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum characters of a requested tool name kept in audit events.
const MAX_AUDIT_TOOL_NAME_CHARS: usize = 64;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool names for the Redix MCP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Validate X12 content against 5010 rules.
    ValidateX12,
    /// Convert X12 to a FHIR R4 bundle behind the input gate.
    ConvertX12ToFhir,
    /// Convert X12 to `RMap` behind the input gate.
    ConvertX12ToRmap,
    /// Convert `RMap` to X12 behind the output gate.
    ConvertRmapToX12,
    /// Load X12 into engine database tables behind the input gate.
    ConvertX12ToDatabase,
    /// Generate X12 from engine database records behind the output gate.
    GenerateX12FromDatabase,
    /// Convert an HL7 v2 message to FHIR.
    ConvertHl7ToFhir,
    /// Convert a CDA document to FHIR.
    ConvertCdaToFhir,
    /// Convert a FHIR bundle to X12 278 behind the output gate.
    ConvertFhirToX12,
    /// Convert a FHIR bundle to `RMap`.
    ConvertFhirToRmap,
    /// Render 837 claims as PDF claim forms behind the input gate.
    GenerateClaimPdf,
    /// Report engine capabilities and conversion paths.
    ListSupportedFormats,
    /// Fetch a sample X12 document.
    GetSampleX12,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidateX12 => "validate_x12",
            Self::ConvertX12ToFhir => "convert_x12_to_fhir",
            Self::ConvertX12ToRmap => "convert_x12_to_rmap",
            Self::ConvertRmapToX12 => "convert_rmap_to_x12",
            Self::ConvertX12ToDatabase => "convert_x12_to_database",
            Self::GenerateX12FromDatabase => "generate_x12_from_database",
            Self::ConvertHl7ToFhir => "convert_hl7_to_fhir",
            Self::ConvertCdaToFhir => "convert_cda_to_fhir",
            Self::ConvertFhirToX12 => "convert_fhir_to_x12",
            Self::ConvertFhirToRmap => "convert_fhir_to_rmap",
            Self::GenerateClaimPdf => "generate_claim_pdf",
            Self::ListSupportedFormats => "list_supported_formats",
            Self::GetSampleX12 => "get_sample_x12",
        }
    }

    /// Returns all tool names in catalogue order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ValidateX12,
            Self::ConvertX12ToFhir,
            Self::ConvertX12ToRmap,
            Self::ConvertRmapToX12,
            Self::ConvertX12ToDatabase,
            Self::GenerateX12FromDatabase,
            Self::ConvertHl7ToFhir,
            Self::ConvertCdaToFhir,
            Self::ConvertFhirToX12,
            Self::ConvertFhirToRmap,
            Self::GenerateClaimPdf,
            Self::ListSupportedFormats,
            Self::GetSampleX12,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|tool| tool.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tool Definitions
// ============================================================================

/// MCP tool definition as returned by `tools/list`.
///
/// # Invariants
/// - `input_schema` is a JSON Schema object that rejects unknown properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDefinition {
    /// MCP tool name.
    pub name: ToolName,
    /// Tool description for clients.
    pub description: String,
    /// JSON schema for tool input.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Builds a closed object schema.
fn object_schema(properties: &Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Schema fragment for an optional transaction type.
fn transaction_type_property() -> Value {
    json!({
        "type": ["string", "null"],
        "description": "Transaction type such as 837p, 835, or 270. Auto-detected when omitted.",
    })
}

/// Schema fragment for strict mode.
fn strict_mode_property() -> Value {
    json!({
        "type": "boolean",
        "default": false,
        "description": "Block on validation warnings as well as errors.",
    })
}

/// Schema fragment for a required text payload.
fn content_property(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
    })
}

/// Returns the full tool catalogue.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::all().iter().map(|tool| definition(*tool)).collect()
}

/// Returns the definition for one tool.
fn definition(tool: ToolName) -> ToolDefinition {
    let (description, input_schema) = match tool {
        ToolName::ValidateX12 => (
            "Validate X12 content against HIPAA 5010 rules and report errors and warnings.",
            object_schema(
                &json!({
                    "x12_content": content_property("Raw X12 EDI content."),
                    "transaction_type": transaction_type_property(),
                }),
                &["x12_content"],
            ),
        ),
        ToolName::ConvertX12ToFhir => (
            "Convert X12 to a FHIR R4 bundle. Input is validated first and blocked on errors.",
            object_schema(
                &json!({
                    "x12_content": content_property("Raw X12 EDI content."),
                    "transaction_type": transaction_type_property(),
                    "strict_mode": strict_mode_property(),
                }),
                &["x12_content"],
            ),
        ),
        ToolName::ConvertX12ToRmap => (
            "Convert X12 to RMap records. Input is validated first and blocked on errors.",
            object_schema(
                &json!({
                    "x12_content": content_property("Raw X12 EDI content."),
                    "transaction_type": transaction_type_property(),
                    "strict_mode": strict_mode_property(),
                }),
                &["x12_content"],
            ),
        ),
        ToolName::ConvertRmapToX12 => (
            "Convert RMap records to X12. The generated X12 is validated before it is returned.",
            object_schema(
                &json!({
                    "rmap_content": content_property("RMap record content."),
                    "transaction_type": transaction_type_property(),
                }),
                &["rmap_content"],
            ),
        ),
        ToolName::ConvertX12ToDatabase => (
            "Load X12 into engine database tables. Input is validated first and blocked on errors.",
            object_schema(
                &json!({
                    "x12_content": content_property("Raw X12 EDI content."),
                    "transaction_type": transaction_type_property(),
                    "session_id": {
                        "type": ["string", "null"],
                        "description": "Session scope for created tables. Generated when omitted.",
                    },
                    "strict_mode": strict_mode_property(),
                }),
                &["x12_content"],
            ),
        ),
        ToolName::GenerateX12FromDatabase => (
            "Generate X12 from engine database records. The output is validated before it is \
             returned.",
            object_schema(
                &json!({
                    "transaction_type": transaction_type_property(),
                    "record_id": {
                        "type": ["integer", "null"],
                        "description": "Record to export. The engine default when omitted.",
                    },
                }),
                &[],
            ),
        ),
        ToolName::ConvertHl7ToFhir => (
            "Convert an HL7 v2 message to a FHIR R4 bundle.",
            object_schema(
                &json!({
                    "hl7_content": content_property("Raw HL7 v2 message or CDA XML."),
                }),
                &["hl7_content"],
            ),
        ),
        ToolName::ConvertCdaToFhir => (
            "Convert a CDA or C-CDA document to a FHIR R4 bundle.",
            object_schema(
                &json!({
                    "cda_content": content_property("CDA or C-CDA XML document."),
                }),
                &["cda_content"],
            ),
        ),
        ToolName::ConvertFhirToX12 => (
            "Convert a FHIR R4 bundle to X12 278. The output is validated before it is returned.",
            object_schema(
                &json!({
                    "fhir_bundle": {
                        "type": ["string", "object"],
                        "description": "FHIR R4 bundle as JSON text or a JSON object.",
                    },
                }),
                &["fhir_bundle"],
            ),
        ),
        ToolName::ConvertFhirToRmap => (
            "Convert a FHIR R4 bundle to RMap records.",
            object_schema(
                &json!({
                    "fhir_bundle": {
                        "type": ["string", "object"],
                        "description": "FHIR R4 bundle as JSON text or a JSON object.",
                    },
                }),
                &["fhir_bundle"],
            ),
        ),
        ToolName::GenerateClaimPdf => (
            "Render X12 837 claims as CMS-1500, UB-04, or ADA claim form PDFs. Input is \
             validated first and blocked on errors.",
            object_schema(
                &json!({
                    "x12_837_content": content_property("Raw X12 837 content."),
                    "claim_type": {
                        "type": "string",
                        "enum": ["837p", "837i", "837d", "auto"],
                        "default": "auto",
                        "description": "Claim type. `auto` lets the engine detect it.",
                    },
                    "strict_mode": strict_mode_property(),
                }),
                &["x12_837_content"],
            ),
        ),
        ToolName::ListSupportedFormats => (
            "List supported formats, transaction types, and conversion paths.",
            object_schema(&json!({}), &[]),
        ),
        ToolName::GetSampleX12 => (
            "Fetch a sample X12 document for a transaction type.",
            object_schema(
                &json!({
                    "transaction_type": content_property("Transaction type such as 837p or 835."),
                }),
                &["transaction_type"],
            ),
        ),
    };
    ToolDefinition {
        name: tool,
        description: description.to_string(),
        input_schema,
    }
}

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Tool router for MCP requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Gated conversion pipelines.
    service: Arc<ConversionService>,
    /// Audit sink for tool call events.
    audit: Arc<dyn AuditSink>,
}

impl fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRouter").field("service", &self.service).finish_non_exhaustive()
    }
}

impl ToolRouter {
    /// Creates a router over the conversion service.
    #[must_use]
    pub fn new(service: ConversionService, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            service: Arc::new(service),
            audit,
        }
    }

    /// Lists the tool catalogue.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    /// Handles a tool call by name and returns the serialized decision record.
    ///
    /// When `correlation_id` is provided it replaces the generated one on
    /// the record.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the tool is unknown, the arguments do not
    /// decode, or the record cannot be serialized.
    pub fn handle_tool_call(
        &self,
        name: &str,
        arguments: Value,
        correlation_id: Option<&str>,
    ) -> Result<Value, ToolError> {
        let started = Instant::now();
        let outcome = ToolName::parse(name)
            .ok_or(ToolError::UnknownTool)
            .and_then(|tool| self.dispatch(tool, arguments))
            .map(|record| match correlation_id {
                Some(id) => record.with_correlation_id(id),
                None => record,
            });
        let elapsed_ms = started.elapsed().as_millis();
        let event = match &outcome {
            Ok(record) => ToolCallEventParams {
                tool: name.to_string(),
                status: Some(record.status()),
                gate: record.gate(),
                correlation_id: Some(record.correlation_id().to_string()),
                error_kind: None,
                elapsed_ms,
            },
            Err(err) => ToolCallEventParams {
                tool: truncate_chars(name, MAX_AUDIT_TOOL_NAME_CHARS),
                status: None,
                gate: None,
                correlation_id: correlation_id.map(str::to_string),
                error_kind: Some(err.label()),
                elapsed_ms,
            },
        };
        self.audit.record_tool_call(&ToolCallEvent::new(event));
        outcome?.to_json().map_err(|_| ToolError::Serialization)
    }

    /// Decodes arguments for a known tool and runs its pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] when the arguments do not decode.
    pub fn dispatch(&self, tool: ToolName, arguments: Value) -> Result<DecisionRecord, ToolError> {
        let service = &self.service;
        let record = match tool {
            ToolName::ValidateX12 => service.validate_x12(&decode(arguments)?),
            ToolName::ConvertX12ToFhir => service.convert_x12_to_fhir(&decode(arguments)?),
            ToolName::ConvertX12ToRmap => service.convert_x12_to_rmap(&decode(arguments)?),
            ToolName::ConvertRmapToX12 => service.convert_rmap_to_x12(&decode(arguments)?),
            ToolName::ConvertX12ToDatabase => service.convert_x12_to_database(&decode(arguments)?),
            ToolName::GenerateX12FromDatabase => {
                service.generate_x12_from_database(&decode(arguments)?)
            }
            ToolName::ConvertHl7ToFhir => service.convert_hl7_to_fhir(&decode(arguments)?),
            ToolName::ConvertCdaToFhir => service.convert_cda_to_fhir(&decode(arguments)?),
            ToolName::ConvertFhirToX12 => service.convert_fhir_to_x12(&decode(arguments)?),
            ToolName::ConvertFhirToRmap => service.convert_fhir_to_rmap(&decode(arguments)?),
            ToolName::GenerateClaimPdf => service.generate_claim_pdf(&decode(arguments)?),
            ToolName::ListSupportedFormats => {
                let EmptyRequest {} = decode(arguments)?;
                service.list_supported_formats()
            }
            ToolName::GetSampleX12 => service.get_sample_x12(&decode(arguments)?),
        };
        Ok(record)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool routing errors.
///
/// Pipeline outcomes are never errors here; they are decision records.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool name not recognized.
    #[error("unknown tool")]
    UnknownTool,
    /// Arguments failed to decode.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Record serialization failed.
    #[error("serialization failed")]
    Serialization,
}

impl ToolError {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidParams(_) => "invalid_params",
            Self::Serialization => "serialization",
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes tool arguments; an absent payload decodes as an empty object.
fn decode<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, ToolError> {
    let payload = if payload.is_null() { Value::Object(Map::new()) } else { payload };
    serde_json::from_value(payload).map_err(|err| ToolError::InvalidParams(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
