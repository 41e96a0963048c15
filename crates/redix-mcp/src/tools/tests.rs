// crates/redix-mcp/src/tools/tests.rs
// ============================================================================
// Module: Tool Catalogue Tests
// Description: Unit tests for tool names and definitions.
// Purpose: Keep the published tool surface stable and closed.
// ============================================================================

//! Unit tests for the tool catalogue.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeSet;

use serde_json::Value;

use super::ToolError;
use super::ToolName;
use super::decode;
use super::tool_definitions;

#[test]
fn tool_names_round_trip_through_parse_and_serde() {
    for tool in ToolName::all() {
        assert_eq!(ToolName::parse(tool.as_str()), Some(*tool));
        let wire = serde_json::to_value(tool).unwrap();
        assert_eq!(wire, Value::String(tool.as_str().to_string()));
    }
    assert_eq!(ToolName::parse("Validate_X12"), None);
    assert_eq!(ToolName::parse(""), None);
}

#[test]
fn catalogue_lists_every_tool_once() {
    let definitions = tool_definitions();
    assert_eq!(definitions.len(), 13);
    let names: BTreeSet<&str> = definitions.iter().map(|def| def.name.as_str()).collect();
    assert_eq!(names.len(), definitions.len());
    assert!(names.contains("get_sample_x12"));
    assert!(names.contains("generate_claim_pdf"));
}

#[test]
fn every_schema_is_a_closed_object() {
    for definition in tool_definitions() {
        let schema = &definition.input_schema;
        assert_eq!(schema["type"], "object", "{}", definition.name);
        assert_eq!(schema["additionalProperties"], false, "{}", definition.name);
        let properties = schema["properties"].as_object().unwrap();
        for required in schema["required"].as_array().unwrap() {
            let field = required.as_str().unwrap();
            assert!(properties.contains_key(field), "{} requires unknown {field}", definition.name);
        }
        assert!(!definition.description.is_empty());
    }
}

#[test]
fn definitions_serialize_with_mcp_field_names() {
    let definitions = tool_definitions();
    let rendered = serde_json::to_value(&definitions[0]).unwrap();
    assert_eq!(rendered["name"], "validate_x12");
    assert!(rendered.get("inputSchema").is_some());
    assert!(rendered.get("input_schema").is_none());
}

#[test]
fn claim_pdf_schema_defaults_to_auto() {
    let definitions = tool_definitions();
    let pdf = definitions.iter().find(|def| def.name == ToolName::GenerateClaimPdf).unwrap();
    assert_eq!(pdf.input_schema["properties"]["claim_type"]["default"], "auto");
    assert_eq!(pdf.input_schema["required"], serde_json::json!(["x12_837_content"]));
}

#[test]
fn decode_treats_null_as_empty_object() {
    let decoded: redix_core::requests::DatabaseToX12Request = decode(Value::Null).unwrap();
    assert_eq!(decoded, redix_core::requests::DatabaseToX12Request::default());
}

#[test]
fn decode_reports_invalid_params() {
    let result: Result<redix_core::requests::SampleX12Request, ToolError> =
        decode(serde_json::json!({"transaction": "837p"}));
    match result {
        Err(ToolError::InvalidParams(message)) => assert!(message.contains("unknown field")),
        other => panic!("expected invalid params, got {other:?}"),
    }
}
