// crates/redix-core/tests/pipelines.rs
// ============================================================================
// Module: Pipeline Integration Tests
// Description: End-to-end gate and conversion behavior over a scripted engine.
// Purpose: Verify ordering, short-circuiting, and record shaping per operation.
// Dependencies: redix-core, serde_json
// ============================================================================

//! ## Overview
//! Each test scripts the engine endpoints an operation touches, runs the
//! operation, and asserts on the returned record plus the recorded calls.
//!
//! Security posture: gates fail closed; rejected X12 is never returned as an
//! actionable result.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeSet;

use redix_core::DecisionStatus;
use redix_core::GateId;
use redix_core::Pipeline;
use redix_core::RequestBody;
use redix_core::UpstreamFailure;
use redix_core::UpstreamPayload;
use redix_core::gates::VALIDATE_ENDPOINT;
use redix_core::requests::CdaToFhirRequest;
use redix_core::requests::ClaimPdfRequest;
use redix_core::requests::DatabaseToX12Request;
use redix_core::requests::FhirBundleRequest;
use redix_core::requests::Hl7ToFhirRequest;
use redix_core::requests::RmapToX12Request;
use redix_core::requests::SampleX12Request;
use redix_core::requests::ValidateX12Request;
use redix_core::requests::X12ConversionRequest;
use redix_core::requests::X12ToDatabaseRequest;
use serde_json::json;

use crate::common::RecordingTransport;
use crate::common::SAMPLE_837P;
use crate::common::clean_report;
use crate::common::failed_report;
use crate::common::service;
use crate::common::warning_report;

fn x12_request(content: &str, transaction_type: Option<&str>, strict: bool) -> X12ConversionRequest {
    X12ConversionRequest {
        x12_content: content.to_string(),
        transaction_type: transaction_type.map(str::to_string),
        strict_mode: strict,
    }
}

fn query_of(transport: &RecordingTransport, endpoint: &str) -> Vec<(String, String)> {
    transport.requests_to(endpoint).first().map(|request| request.query.clone()).unwrap_or_default()
}

// ============================================================================
// SECTION: Input Gate Short-Circuit
// ============================================================================

#[test]
fn blocked_input_never_reaches_conversion_endpoint() {
    let transport = RecordingTransport::new()
        .on_validate(failed_report(&["ISA segment truncated"]))
        .on_json(Pipeline::X12ToFhir.endpoint(), json!({"fhir_bundle": {}}));
    let record = service(&transport).convert_x12_to_fhir(&x12_request("ISA*00", Some("837p"), false));

    assert_eq!(record.status(), DecisionStatus::Blocked);
    assert_eq!(record.gate(), Some(GateId::InputValidation));
    assert_eq!(transport.calls_to(Pipeline::X12ToFhir.endpoint()), 0);
    assert_eq!(transport.calls_to(VALIDATE_ENDPOINT), 1);
}

#[test]
fn every_input_gated_pipeline_short_circuits() {
    let transport = RecordingTransport::new().on_validate(failed_report(&["E1"]));
    let service = service(&transport);
    let records = [
        service.convert_x12_to_fhir(&x12_request("ISA", None, false)),
        service.convert_x12_to_rmap(&x12_request("ISA", None, false)),
        service.convert_x12_to_database(&X12ToDatabaseRequest {
            x12_content: "ISA".to_string(),
            transaction_type: None,
            session_id: None,
            strict_mode: false,
        }),
        service.generate_claim_pdf(&ClaimPdfRequest {
            x12_837_content: "ISA".to_string(),
            claim_type: "auto".to_string(),
            strict_mode: false,
        }),
    ];
    for record in &records {
        assert_eq!(record.status(), DecisionStatus::Blocked);
    }
    let endpoints: BTreeSet<String> =
        transport.requests().into_iter().map(|request| request.endpoint).collect();
    assert_eq!(endpoints, BTreeSet::from([VALIDATE_ENDPOINT.to_string()]));
}

#[test]
fn strict_mode_blocks_warnings_only_when_enabled() {
    let transport = RecordingTransport::new()
        .on_validate(warning_report(&["NM1 length"]))
        .on_json(Pipeline::X12ToRmap.endpoint(), json!({"rmap_content": "R", "rmap_parsed": {"record_count": 3}}));
    let service = service(&transport);

    let lenient = service.convert_x12_to_rmap(&x12_request(SAMPLE_837P, Some("837p"), false));
    assert_eq!(lenient.status(), DecisionStatus::Approved);
    assert_eq!(lenient.ruling(), "X12 837P converted to RMap v5 with 3 record(s).");

    let strict = service.convert_x12_to_rmap(&x12_request(SAMPLE_837P, Some("837p"), true));
    assert_eq!(strict.status(), DecisionStatus::Blocked);
    assert!(strict.ruling().contains("strict mode"));
    assert_eq!(transport.calls_to(Pipeline::X12ToRmap.endpoint()), 1);
}

#[test]
fn truncated_interchange_is_never_approved() {
    let transport = RecordingTransport::new().on_validate(failed_report(&["ISA must be 106 chars"]));
    let record = service(&transport)
        .convert_x12_to_fhir(&x12_request("ISA*00*BAD DATA TRUNCATED", Some("837p"), false));
    assert!(matches!(record.status(), DecisionStatus::Blocked | DecisionStatus::Error));
    assert!(!record.is_actionable());
}

// ============================================================================
// SECTION: X12 Input Pipelines
// ============================================================================

#[test]
fn x12_to_fhir_normalizes_query_and_returns_bundle() {
    let bundle = json!({"resourceType": "Bundle", "entry": [{}]});
    let transport = RecordingTransport::new().on_validate(clean_report()).on_json(
        Pipeline::X12ToFhir.endpoint(),
        json!({"fhir_bundle": bundle, "transaction_type": "837-professional", "metadata": {"ms": 4}}),
    );
    let record = service(&transport).convert_x12_to_fhir(&x12_request(SAMPLE_837P, Some("837P"), false));

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.gate(), None);
    assert_eq!(record.ruling(), "X12 837P successfully converted to FHIR R4 Bundle.");
    assert_eq!(record.data()["fhir_bundle"], bundle);
    assert_eq!(record.data()["transaction_type"], json!("837-professional"));
    assert_eq!(
        query_of(&transport, Pipeline::X12ToFhir.endpoint()),
        vec![("transaction_type".to_string(), "837-professional".to_string())]
    );

    let validate = &transport.requests_to(VALIDATE_ENDPOINT)[0];
    assert_eq!(
        validate.body,
        RequestBody::Json(Some(json!({"content": SAMPLE_837P, "transaction_type": "837P"})))
    );
    let convert = &transport.requests_to(Pipeline::X12ToFhir.endpoint())[0];
    let RequestBody::Multipart(body) = &convert.body else {
        panic!("expected multipart body");
    };
    assert_eq!(body.uploads[0].field, "file");
    assert_eq!(body.uploads[0].file_name, "input.837P.x12");
    assert_eq!(body.uploads[0].content, SAMPLE_837P);
}

#[test]
fn x12_to_fhir_falls_back_to_whole_response_and_reports_warnings() {
    let transport = RecordingTransport::new()
        .on_validate(clean_report())
        .on_json(Pipeline::X12ToFhir.endpoint(), json!({"resourceType": "Bundle", "warnings": ["W"]}));
    let record = service(&transport).convert_x12_to_fhir(&x12_request(SAMPLE_837P, None, false));

    assert_eq!(record.status(), DecisionStatus::ApprovedWithConditions);
    assert!(record.ruling().ends_with("1 warning(s) noted."));
    assert_eq!(record.data()["fhir_bundle"]["resourceType"], json!("Bundle"));
    assert_eq!(record.warnings(), &[json!("W")]);
    assert!(query_of(&transport, Pipeline::X12ToFhir.endpoint()).is_empty());
}

#[test]
fn x12_to_rmap_sends_raw_transaction_type() {
    let transport = RecordingTransport::new()
        .on_validate(clean_report())
        .on_json(Pipeline::X12ToRmap.endpoint(), json!({"rmap_content": "R"}));
    let record = service(&transport).convert_x12_to_rmap(&x12_request(SAMPLE_837P, Some("837p"), false));
    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(
        query_of(&transport, Pipeline::X12ToRmap.endpoint()),
        vec![("transaction_type".to_string(), "837p".to_string())]
    );
    assert_eq!(record.data()["rmap_parsed"], json!({}));
}

#[test]
fn x12_to_database_sends_form_fields_and_summarizes_stage2() {
    let transport = RecordingTransport::new().on_validate(clean_report()).on_json(
        Pipeline::X12ToDatabase.endpoint(),
        json!({
            "success": true,
            "session_id": "sess-9",
            "transaction_type": "835",
            "stage2": {"tables_created": 4, "tables_with_data": 3, "total_rows": 17, "table_counts": {"clp": 2}},
        }),
    );
    let record = service(&transport).convert_x12_to_database(&X12ToDatabaseRequest {
        x12_content: SAMPLE_837P.to_string(),
        transaction_type: Some("835".to_string()),
        session_id: Some("sess-9".to_string()),
        strict_mode: false,
    });

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(
        record.ruling(),
        "X12 835 loaded into database session 'sess-9'. 4 tables created, 17 total rows."
    );
    assert_eq!(record.data()["tables_with_data"], json!(3));
    assert_eq!(record.data()["table_counts"], json!({"clp": 2}));
    let convert = &transport.requests_to(Pipeline::X12ToDatabase.endpoint())[0];
    let RequestBody::Multipart(body) = &convert.body else {
        panic!("expected multipart body");
    };
    assert_eq!(
        body.fields,
        vec![
            ("transaction_type".to_string(), "835".to_string()),
            ("session_id".to_string(), "sess-9".to_string()),
        ]
    );
    assert!(convert.query.is_empty());
}

#[test]
fn x12_to_database_errors_when_engine_reports_failure() {
    let transport = RecordingTransport::new()
        .on_validate(clean_report())
        .on_json(Pipeline::X12ToDatabase.endpoint(), json!({"success": false, "error": "db locked"}));
    let record = service(&transport).convert_x12_to_database(&X12ToDatabaseRequest {
        x12_content: SAMPLE_837P.to_string(),
        transaction_type: None,
        session_id: None,
        strict_mode: false,
    });
    assert_eq!(record.status(), DecisionStatus::Error);
    assert_eq!(record.ruling(), "X12-to-database load failed: db locked");
    assert_eq!(record.data()["error"], json!("db locked"));
}

#[test]
fn claim_pdf_gates_auto_as_837p_and_omits_claim_type_query() {
    let transport = RecordingTransport::new().on_validate(clean_report()).on_json(
        Pipeline::ClaimPdf.endpoint(),
        json!({"form_name": "CMS-1500", "pdf_files": [{"url": "/a.pdf"}, {"url": "/b.pdf"}], "conversion_id": "c1"}),
    );
    let record = service(&transport).generate_claim_pdf(&ClaimPdfRequest {
        x12_837_content: SAMPLE_837P.to_string(),
        claim_type: "auto".to_string(),
        strict_mode: false,
    });

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(
        record.ruling(),
        "Generated 2 CMS-1500 PDF claim form(s). Download via the URLs in the response."
    );
    assert_eq!(record.data()["pdf_count"], json!(2));
    assert!(query_of(&transport, Pipeline::ClaimPdf.endpoint()).is_empty());
    let validate = &transport.requests_to(VALIDATE_ENDPOINT)[0];
    assert_eq!(
        validate.body,
        RequestBody::Json(Some(json!({"content": SAMPLE_837P, "transaction_type": "837p"})))
    );
}

#[test]
fn claim_pdf_passes_explicit_claim_type() {
    let transport = RecordingTransport::new()
        .on_validate(clean_report())
        .on_json(Pipeline::ClaimPdf.endpoint(), json!({"pdf_count": 1, "pdf_files": []}));
    let record = service(&transport).generate_claim_pdf(&ClaimPdfRequest {
        x12_837_content: SAMPLE_837P.to_string(),
        claim_type: "837i".to_string(),
        strict_mode: false,
    });
    assert_eq!(record.data()["pdf_count"], json!(1));
    assert_eq!(
        query_of(&transport, Pipeline::ClaimPdf.endpoint()),
        vec![("claim_type".to_string(), "837i".to_string())]
    );
}

// ============================================================================
// SECTION: X12 Output Pipelines
// ============================================================================

#[test]
fn rmap_to_x12_blocks_failed_output_and_attaches_content() {
    let transport = RecordingTransport::new()
        .on_json(Pipeline::RmapToX12.endpoint(), json!({"hipaa_content": "ISA*GENERATED~"}))
        .on_validate(failed_report(&["CLM01 missing"]));
    let record = service(&transport).convert_rmap_to_x12(&RmapToX12Request {
        rmap_content: "RMAP".to_string(),
        transaction_type: Some("837p".to_string()),
    });

    assert_eq!(record.status(), DecisionStatus::Blocked);
    assert_eq!(record.gate(), Some(GateId::OutputValidation));
    assert_eq!(record.data()["x12_content"], json!("ISA*GENERATED~"));
    assert!(record.ruling().contains("convert_rmap_to_x12"));
    assert!(record.ruling().contains("DO NOT submit"));
    let validate = &transport.requests_to(VALIDATE_ENDPOINT)[0];
    assert_eq!(
        validate.body,
        RequestBody::Json(Some(json!({"content": "ISA*GENERATED~", "transaction_type": "837p"})))
    );
}

#[test]
fn rmap_to_x12_returns_exact_validated_content() {
    let generated = "ISA*00*CLEAN~GS*HC~ST*837*0001~SE*2*0001~GE*1*1~IEA*1*1~";
    let transport = RecordingTransport::new()
        .on_json(Pipeline::RmapToX12.endpoint(), json!({"x12_content": generated}))
        .on_validate(warning_report(&["W"]));
    let record = service(&transport).convert_rmap_to_x12(&RmapToX12Request {
        rmap_content: "RMAP".to_string(),
        transaction_type: None,
    });

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.data()["x12_content"], json!(generated));
    assert_eq!(record.ruling(), "RMap converted to X12 X12 and passed output validation.");
    let convert = &transport.requests_to(Pipeline::RmapToX12.endpoint())[0];
    let RequestBody::Multipart(body) = &convert.body else {
        panic!("expected multipart body");
    };
    assert_eq!(body.uploads[0].file_name, "input.rmap");
}

#[test]
fn rmap_to_x12_errors_on_empty_output_without_validating() {
    let transport = RecordingTransport::new()
        .on_json(Pipeline::RmapToX12.endpoint(), json!({"x12_content": "", "hipaa_content": ""}));
    let record = service(&transport).convert_rmap_to_x12(&RmapToX12Request {
        rmap_content: "RMAP".to_string(),
        transaction_type: None,
    });
    assert_eq!(record.status(), DecisionStatus::Error);
    assert!(record.ruling().contains("returned empty X12 content"));
    assert_eq!(transport.calls_to(VALIDATE_ENDPOINT), 0);
}

#[test]
fn database_to_x12_gates_plain_text_output() {
    let transport = RecordingTransport::new()
        .on(
            Pipeline::DatabaseToX12.endpoint(),
            Ok(UpstreamPayload::Text {
                body: "ISA*FROM-DB~".to_string(),
                status: 200,
            }),
        )
        .on_validate(clean_report());
    let record = service(&transport).generate_x12_from_database(&DatabaseToX12Request {
        transaction_type: Some("835".to_string()),
        record_id: Some(42),
    });

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.data()["x12_content"], json!("ISA*FROM-DB~"));
    assert_eq!(
        record.ruling(),
        "X12 835 generated from database record 42 and passed output validation."
    );
    let convert = &transport.requests_to(Pipeline::DatabaseToX12.endpoint())[0];
    assert_eq!(convert.body, RequestBody::Json(None));
    assert_eq!(
        convert.query,
        vec![
            ("transaction_type".to_string(), "835".to_string()),
            ("record_id".to_string(), "42".to_string()),
        ]
    );
    assert_eq!(transport.calls_to(VALIDATE_ENDPOINT), 1);
}

#[test]
fn database_to_x12_reads_nested_stage_output() {
    let transport = RecordingTransport::new()
        .on_json(
            Pipeline::DatabaseToX12.endpoint(),
            json!({"success": true, "stage2_rmap_to_hipaa": {"hipaa_content": "ISA*NESTED~"}}),
        )
        .on_validate(clean_report());
    let record = service(&transport).generate_x12_from_database(&DatabaseToX12Request::default());
    assert_eq!(record.status(), DecisionStatus::Approved);
    assert!(record.ruling().contains("record (default)"));
    assert_eq!(record.data()["x12_content"], json!("ISA*NESTED~"));
}

#[test]
fn fhir_to_x12_validates_as_278() {
    let transport = RecordingTransport::new()
        .on_json(Pipeline::FhirToX12.endpoint(), json!({"x12_output": "ISA*278~"}))
        .on_validate(clean_report());
    let record = service(&transport).convert_fhir_to_x12(&FhirBundleRequest {
        fhir_bundle: json!(r#"{"resourceType":"Bundle"}"#),
    });

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.data()["conversion_type"], json!("278"));
    assert_eq!(record.ruling(), "FHIR Bundle converted to X12 278 and passed output validation.");
    let convert = &transport.requests_to(Pipeline::FhirToX12.endpoint())[0];
    assert_eq!(convert.body, RequestBody::Json(Some(json!({"resourceType": "Bundle"}))));
    assert_eq!(convert.query, vec![("output_format".to_string(), "x12".to_string())]);
    let validate = &transport.requests_to(VALIDATE_ENDPOINT)[0];
    assert_eq!(
        validate.body,
        RequestBody::Json(Some(json!({"content": "ISA*278~", "transaction_type": "278"})))
    );
}

#[test]
fn invalid_fhir_json_errors_before_any_call() {
    let transport = RecordingTransport::new();
    let service = service(&transport);
    for record in [
        service.convert_fhir_to_x12(&FhirBundleRequest {
            fhir_bundle: json!("{not json"),
        }),
        service.convert_fhir_to_rmap(&FhirBundleRequest {
            fhir_bundle: json!("{not json"),
        }),
    ] {
        assert_eq!(record.status(), DecisionStatus::Error);
        assert!(record.ruling().starts_with("Invalid JSON in fhir_bundle:"));
    }
    assert!(transport.requests().is_empty());
}

// ============================================================================
// SECTION: Ungated Pipelines
// ============================================================================

#[test]
fn fhir_to_rmap_accepts_object_bundle() {
    let transport = RecordingTransport::new()
        .on_json(Pipeline::FhirToRmap.endpoint(), json!({"rmap_output": "RMAP", "warnings": ["w1", "w2"]}));
    let record = service(&transport).convert_fhir_to_rmap(&FhirBundleRequest {
        fhir_bundle: json!({"resourceType": "Bundle"}),
    });
    assert_eq!(record.status(), DecisionStatus::ApprovedWithConditions);
    assert_eq!(record.ruling(), "FHIR Bundle converted to RMap intermediate format. 2 warning(s).");
    assert_eq!(record.data()["rmap_content"], json!("RMAP"));
    assert_eq!(transport.calls_to(VALIDATE_ENDPOINT), 0);
}

#[test]
fn hl7_to_fhir_posts_content_field() {
    let transport = RecordingTransport::new().on_json(
        Pipeline::Hl7ToFhir.endpoint(),
        json!({"fhir_bundle": {"entry": []}, "resource_count": 5, "message_type": "ADT^A01"}),
    );
    let record = service(&transport).convert_hl7_to_fhir(&Hl7ToFhirRequest {
        hl7_content: "MSH|^~\\&|".to_string(),
    });
    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.ruling(), "HL7 ADT^A01 converted to FHIR R4 Bundle with 5 resource(s).");
    let convert = &transport.requests_to(Pipeline::Hl7ToFhir.endpoint())[0];
    let RequestBody::Multipart(body) = &convert.body else {
        panic!("expected multipart body");
    };
    assert!(body.uploads.is_empty());
    assert_eq!(body.fields, vec![("content".to_string(), "MSH|^~\\&|".to_string())]);
}

#[test]
fn hl7_to_fhir_errors_on_explicit_failure_or_text() {
    let transport = RecordingTransport::new()
        .on_json(Pipeline::Hl7ToFhir.endpoint(), json!({"success": false, "error": "bad MSH"}));
    let record = service(&transport).convert_hl7_to_fhir(&Hl7ToFhirRequest {
        hl7_content: "junk".to_string(),
    });
    assert_eq!(record.status(), DecisionStatus::Error);
    assert_eq!(record.ruling(), "HL7-to-FHIR conversion failed: bad MSH");

    let transport = RecordingTransport::new().on(
        Pipeline::Hl7ToFhir.endpoint(),
        Ok(UpstreamPayload::Text {
            body: "<html>gateway</html>".to_string(),
            status: 200,
        }),
    );
    let record = service(&transport).convert_hl7_to_fhir(&Hl7ToFhirRequest {
        hl7_content: "MSH".to_string(),
    });
    assert_eq!(record.status(), DecisionStatus::Error);
    assert!(record.ruling().contains("unexpected non-JSON response"));
}

#[test]
fn cda_to_fhir_counts_bundle_entries_when_engine_omits_count() {
    let transport = RecordingTransport::new().on_json(
        Pipeline::CdaToFhir.endpoint(),
        json!({"fhir_bundle": {"entry": [{}, {}, {}]}}),
    );
    let record = service(&transport).convert_cda_to_fhir(&CdaToFhirRequest {
        cda_content: "<ClinicalDocument/>".to_string(),
    });
    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.data()["resource_count"], json!(3));
    assert_eq!(record.data()["document_type"], json!("CDA"));
    assert_eq!(record.ruling(), "CDA document converted to FHIR R4 Bundle with 3 resource(s).");
}

// ============================================================================
// SECTION: Failures
// ============================================================================

#[test]
fn unreachable_engine_is_an_error_with_empty_data() {
    let transport = RecordingTransport::new();
    let service = service(&transport);
    let records = [
        service.convert_x12_to_fhir(&x12_request(SAMPLE_837P, Some("837p"), false)),
        service.convert_rmap_to_x12(&RmapToX12Request {
            rmap_content: "RMAP".to_string(),
            transaction_type: None,
        }),
        service.convert_hl7_to_fhir(&Hl7ToFhirRequest {
            hl7_content: "MSH".to_string(),
        }),
    ];
    for record in &records {
        assert_eq!(record.status(), DecisionStatus::Error);
        assert!(record.data().is_empty());
        assert!(record.ruling().contains("HTTP 0"), "{}", record.ruling());
        assert!(record.ruling().contains("unreachable"), "{}", record.ruling());
    }
}

#[test]
fn conversion_http_error_names_pipeline_and_status() {
    let transport = RecordingTransport::new().on_validate(clean_report()).on(
        Pipeline::X12ToFhir.endpoint(),
        Err(UpstreamFailure::http(422, "{\"detail\":\"unsupported\"}", "http://engine/x")),
    );
    let record = service(&transport).convert_x12_to_fhir(&x12_request(SAMPLE_837P, None, false));
    assert_eq!(record.status(), DecisionStatus::Error);
    assert_eq!(
        record.ruling(),
        "X12-to-FHIR conversion failed: HTTP 422 (request rejected by engine). {\"detail\":\"unsupported\"}"
    );
}

// ============================================================================
// SECTION: Validation And Discovery
// ============================================================================

#[test]
fn validate_x12_classifies_report() {
    let transport = RecordingTransport::new().on_validate(warning_report(&["W1", "W2"]));
    let record = service(&transport).validate_x12(&ValidateX12Request {
        x12_content: SAMPLE_837P.to_string(),
        transaction_type: None,
    });
    assert_eq!(record.status(), DecisionStatus::ApprovedWithConditions);
    assert_eq!(record.gate(), Some(GateId::Validation));
    assert_eq!(record.warnings().len(), 2);
}

#[test]
fn capability_manifest_omits_failed_lookups() {
    let transport = RecordingTransport::new()
        .on_json("/api/v2/hipaa-validate/supported-transactions", json!(["837P", "835"]))
        .on_json("/api/v2/hipaa-to-rmap/supported-transactions", json!({"types": ["837P"]}))
        .on(
            "/api/v2/hipaa-to-fhir/supported-transactions",
            Err(UpstreamFailure::http(500, "boom", "http://engine/x")),
        );
    let record = service(&transport).list_supported_formats();

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.data()["hipaa_validate"], json!(["837P", "835"]));
    assert!(record.data().contains_key("hipaa_to_rmap"));
    assert!(!record.data().contains_key("hipaa_to_fhir"));
    assert!(!record.data().contains_key("database_to_hipaa"));
    assert_eq!(record.data()["conversion_paths"].as_array().unwrap().len(), 9);
    assert!(record.data()["compliance_gates"].get("gate1_input_validation").is_some());
    assert!(record.ruling().contains("hipaa_to_fhir, database_to_hipaa"));
    assert_eq!(transport.requests().len(), 4);
}

#[test]
fn capability_discovery_errors_when_engine_is_unreachable() {
    let transport = RecordingTransport::new();
    let record = service(&transport).list_supported_formats();

    assert_eq!(record.status(), DecisionStatus::Error);
    assert!(record.data().is_empty());
    assert!(record.ruling().contains("HTTP 0"), "{}", record.ruling());
    assert!(record.ruling().contains("unreachable"), "{}", record.ruling());
    assert_eq!(transport.requests().len(), 4);
}

#[test]
fn capability_manifest_survives_engine_errors_on_every_lookup() {
    let transport = RecordingTransport::new();
    for endpoint in [
        "/api/v2/hipaa-validate/supported-transactions",
        "/api/v2/hipaa-to-rmap/supported-transactions",
        "/api/v2/hipaa-to-fhir/supported-transactions",
        "/api/v2/database-to-hipaa/transaction-types",
    ] {
        transport.on(endpoint, Err(UpstreamFailure::http(503, "maintenance", "http://engine/x")));
    }
    let record = service(&transport).list_supported_formats();

    assert_eq!(record.status(), DecisionStatus::Approved);
    assert!(record.data().contains_key("conversion_paths"));
    assert!(record.ruling().contains("hipaa_validate, hipaa_to_rmap"));
}

#[test]
fn sample_falls_back_to_validation_samples() {
    let transport = RecordingTransport::new()
        .on("/api/v2/hipaa-to-rmap/sample/835", Err(UpstreamFailure::http(404, "nope", "u")))
        .on_json("/api/v2/hipaa-validate/sample/835", json!({"content": "ISA*SAMPLE~"}));
    let record = service(&transport).get_sample_x12(&SampleX12Request {
        transaction_type: "835".to_string(),
    });
    assert_eq!(record.status(), DecisionStatus::Approved);
    assert_eq!(record.data()["content"], json!("ISA*SAMPLE~"));
    assert_eq!(record.data()["source"], json!("hipaa_validate"));
}

#[test]
fn sample_rejects_path_like_transaction_types() {
    let transport = RecordingTransport::new();
    let record = service(&transport).get_sample_x12(&SampleX12Request {
        transaction_type: "../admin".to_string(),
    });
    assert_eq!(record.status(), DecisionStatus::Error);
    assert!(transport.requests().is_empty());
}

// ============================================================================
// SECTION: Record Properties
// ============================================================================

#[test]
fn records_have_rulings_and_unique_ids() {
    let transport = RecordingTransport::new().on_validate(clean_report());
    let service = service(&transport);
    let mut ids = BTreeSet::new();
    for _ in 0..200 {
        let record = service.validate_x12(&ValidateX12Request {
            x12_content: SAMPLE_837P.to_string(),
            transaction_type: Some("837p".to_string()),
        });
        assert!(!record.ruling().is_empty());
        let wire = record.to_json().unwrap();
        assert!(matches!(
            wire["status"].as_str(),
            Some("APPROVED" | "APPROVED_WITH_CONDITIONS" | "BLOCKED" | "ERROR")
        ));
        assert!(ids.insert(record.correlation_id().to_string()));
    }
    assert_eq!(ids.len(), 200);
}

#[test]
fn output_gate_is_idempotent_on_identical_content() {
    let transport = RecordingTransport::new().on_validate(failed_report(&["E"]));
    let gates = service(&transport).gates().clone();
    let statuses: Vec<Option<DecisionStatus>> = (0..3)
        .map(|_| gates.admit_output("ISA*SAME~", None, "convert_rmap_to_x12").map(|r| r.status()))
        .collect();
    assert!(statuses.iter().all(|status| *status == Some(DecisionStatus::Blocked)));
    assert_eq!(transport.calls_to(VALIDATE_ENDPOINT), 3);
}
