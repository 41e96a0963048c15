// crates/redix-core/src/requests/tests.rs
// ============================================================================
// Module: Operation Request Tests
// Description: Unit tests for strict request decoding.
// Purpose: Pin defaults, unknown-field rejection, and bundle decoding.
// Dependencies: redix-core, serde_json
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use serde_json::json;

use super::ClaimPdfRequest;
use super::DatabaseToX12Request;
use super::EmptyRequest;
use super::FhirBundleRequest;
use super::X12ConversionRequest;

#[test]
fn conversion_request_defaults_to_lenient_auto_detect() {
    let request: X12ConversionRequest = serde_json::from_value(json!({"x12_content": "ISA"})).unwrap();
    assert_eq!(request.transaction_type, None);
    assert!(!request.strict_mode);
}

#[test]
fn misspelled_fields_are_rejected() {
    let err = serde_json::from_value::<X12ConversionRequest>(json!({
        "x12_content": "ISA",
        "strictmode": true,
    }))
    .unwrap_err();
    assert!(err.to_string().contains("unknown field"));
    assert!(serde_json::from_value::<EmptyRequest>(json!({"extra": 1})).is_err());
}

#[test]
fn missing_required_content_is_rejected() {
    assert!(serde_json::from_value::<X12ConversionRequest>(json!({"strict_mode": true})).is_err());
}

#[test]
fn claim_type_auto_is_not_explicit() {
    let request: ClaimPdfRequest = serde_json::from_value(json!({"x12_837_content": "ISA"})).unwrap();
    assert_eq!(request.claim_type, "auto");
    assert_eq!(request.explicit_claim_type(), None);

    let request: ClaimPdfRequest =
        serde_json::from_value(json!({"x12_837_content": "ISA", "claim_type": "AUTO"})).unwrap();
    assert_eq!(request.explicit_claim_type(), None);

    let request: ClaimPdfRequest =
        serde_json::from_value(json!({"x12_837_content": "ISA", "claim_type": " 837d "})).unwrap();
    assert_eq!(request.explicit_claim_type(), Some("837d"));
}

#[test]
fn database_request_accepts_empty_arguments() {
    let request: DatabaseToX12Request = serde_json::from_value(json!({})).unwrap();
    assert_eq!(request, DatabaseToX12Request::default());
}

#[test]
fn bundle_decodes_text_or_object() {
    let text = FhirBundleRequest {
        fhir_bundle: json!(r#"{"resourceType":"Bundle"}"#),
    };
    assert_eq!(text.bundle().unwrap(), json!({"resourceType": "Bundle"}));

    let object = FhirBundleRequest {
        fhir_bundle: json!({"resourceType": "Bundle"}),
    };
    assert_eq!(object.bundle().unwrap(), json!({"resourceType": "Bundle"}));

    let broken = FhirBundleRequest {
        fhir_bundle: json!("{broken"),
    };
    assert!(broken.bundle().is_err());
}
