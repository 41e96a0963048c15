// crates/redix-core/src/pipelines.rs
// ============================================================================
// Module: Conversion Pipelines
// Description: Gate, convert, gate orchestration for every engine route.
// Purpose: Turn one caller request into exactly one decision record.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Every conversion follows the same shape, parameterized by a [`Pipeline`]
//! descriptor:
//!
//! 1. X12 input runs the input gate. A verdict returns immediately and the
//!    conversion endpoint is never called.
//! 2. The conversion endpoint is invoked once.
//! 3. A failed call becomes an `Error` record naming the pipeline step.
//! 4. Generated X12 is extracted and runs the output gate. A verdict carries
//!    the rejected text as `data.x12_content`.
//! 5. Otherwise the payload is shaped into an `Approved` record, or
//!    `ApprovedWithConditions` when the engine reported warnings.
//!
//! Steps run strictly in order. Internal helpers return
//! `Result<_, DecisionRecord>` so any step can short-circuit with its record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::correlation::CorrelationIdGenerator;
use crate::gates::GateEngine;
use crate::record::DecisionRecord;
use crate::record::DecisionRecordBuilder;
use crate::record::DecisionStatus;
use crate::requests::CdaToFhirRequest;
use crate::requests::ClaimPdfRequest;
use crate::requests::DatabaseToX12Request;
use crate::requests::FhirBundleRequest;
use crate::requests::Hl7ToFhirRequest;
use crate::requests::RmapToX12Request;
use crate::requests::SampleX12Request;
use crate::requests::ValidateX12Request;
use crate::requests::X12ConversionRequest;
use crate::requests::X12ToDatabaseRequest;
use crate::transaction::TransactionType;
use crate::transaction::normalize_transaction_type;
use crate::transaction::present_code;
use crate::upstream::EngineRequest;
use crate::upstream::EngineTransport;
use crate::upstream::MultipartBody;
use crate::upstream::RULING_DETAIL_CHARS;
use crate::upstream::Upload;
use crate::upstream::UpstreamFailure;
use crate::upstream::UpstreamPayload;
use crate::upstream::truncate_chars;

// ============================================================================
// SECTION: Pipeline Descriptors
// ============================================================================

/// How a pipeline treats the engine's `success` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessFlag {
    /// The flag is not consulted.
    Ignored,
    /// The flag must be present and true.
    Required,
    /// Only an explicit `false` fails.
    DefaultTrue,
}

/// Descriptor for one engine conversion route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// X12 to FHIR R4 bundle.
    X12ToFhir,
    /// X12 to `RMap` records.
    X12ToRmap,
    /// `RMap` records to X12.
    RmapToX12,
    /// X12 loaded into database tables.
    X12ToDatabase,
    /// Database records to X12.
    DatabaseToX12,
    /// HL7 v2 to FHIR R4 bundle.
    Hl7ToFhir,
    /// CDA or C-CDA to FHIR R4 bundle.
    CdaToFhir,
    /// FHIR bundle to X12 278.
    FhirToX12,
    /// FHIR bundle to `RMap` records.
    FhirToRmap,
    /// X12 837 to PDF claim forms.
    ClaimPdf,
}

impl Pipeline {
    /// Every pipeline, in catalogue order.
    pub const ALL: [Self; 10] = [
        Self::X12ToFhir,
        Self::X12ToRmap,
        Self::RmapToX12,
        Self::X12ToDatabase,
        Self::DatabaseToX12,
        Self::Hl7ToFhir,
        Self::CdaToFhir,
        Self::FhirToX12,
        Self::FhirToRmap,
        Self::ClaimPdf,
    ];

    /// Returns the engine endpoint path.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::X12ToFhir => "/api/v2/hipaa-to-fhir/convert",
            Self::X12ToRmap => "/api/v2/hipaa-to-rmap/convert",
            Self::RmapToX12 => "/api/v2/rmap-to-hipaa/convert",
            Self::X12ToDatabase => "/api/v2/hipaa-to-database/load",
            Self::DatabaseToX12 => "/api/v2/database-to-hipaa/convert",
            Self::Hl7ToFhir | Self::CdaToFhir => "/api/v2/ai/hl7-convert",
            Self::FhirToX12 | Self::FhirToRmap => "/api/v2/fhir-to-hipaa/convert",
            Self::ClaimPdf => "/api/v2/claims-to-pdf/convert",
        }
    }

    /// Returns the step name used in rulings.
    #[must_use]
    pub const fn step(self) -> &'static str {
        match self {
            Self::X12ToFhir => "X12-to-FHIR conversion",
            Self::X12ToRmap => "X12-to-RMap conversion",
            Self::RmapToX12 => "RMap-to-X12 conversion",
            Self::X12ToDatabase => "X12-to-database load",
            Self::DatabaseToX12 => "Database-to-X12 generation",
            Self::Hl7ToFhir => "HL7-to-FHIR conversion",
            Self::CdaToFhir => "CDA-to-FHIR conversion",
            Self::FhirToX12 => "FHIR-to-X12 conversion",
            Self::FhirToRmap => "FHIR-to-RMap conversion",
            Self::ClaimPdf => "Claims-to-PDF conversion",
        }
    }

    /// Returns the tool name reported as the X12 source in output rulings.
    #[must_use]
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::X12ToFhir => "convert_x12_to_fhir",
            Self::X12ToRmap => "convert_x12_to_rmap",
            Self::RmapToX12 => "convert_rmap_to_x12",
            Self::X12ToDatabase => "convert_x12_to_database",
            Self::DatabaseToX12 => "generate_x12_from_database",
            Self::Hl7ToFhir => "convert_hl7_to_fhir",
            Self::CdaToFhir => "convert_cda_to_fhir",
            Self::FhirToX12 => "convert_fhir_to_x12",
            Self::FhirToRmap => "convert_fhir_to_rmap",
            Self::ClaimPdf => "generate_claim_pdf",
        }
    }

    /// Returns true when the pipeline consumes X12 and runs the input gate.
    #[must_use]
    pub const fn input_gated(self) -> bool {
        matches!(self, Self::X12ToFhir | Self::X12ToRmap | Self::X12ToDatabase | Self::ClaimPdf)
    }

    /// Returns true when the pipeline produces X12 and runs the output gate.
    #[must_use]
    pub const fn output_gated(self) -> bool {
        matches!(self, Self::RmapToX12 | Self::DatabaseToX12 | Self::FhirToX12)
    }

    /// Returns the response paths holding generated X12, in priority order.
    #[must_use]
    pub const fn output_paths(self) -> &'static [&'static [&'static str]] {
        match self {
            Self::RmapToX12 => &[&["x12_content"], &["hipaa_content"]],
            Self::DatabaseToX12 => &[&["stage2_rmap_to_hipaa", "hipaa_content"]],
            Self::FhirToX12 => &[&["x12_output"]],
            _ => &[],
        }
    }

    /// Returns how the engine's `success` flag is treated.
    #[must_use]
    pub const fn success_flag(self) -> SuccessFlag {
        match self {
            Self::X12ToDatabase | Self::DatabaseToX12 => SuccessFlag::Required,
            Self::Hl7ToFhir | Self::CdaToFhir => SuccessFlag::DefaultTrue,
            _ => SuccessFlag::Ignored,
        }
    }
}

// ============================================================================
// SECTION: Capability Lookups
// ============================================================================

/// Read-only lookups merged into the capability manifest.
const CAPABILITY_LOOKUPS: [(&str, &str); 4] = [
    ("hipaa_validate", "/api/v2/hipaa-validate/supported-transactions"),
    ("hipaa_to_rmap", "/api/v2/hipaa-to-rmap/supported-transactions"),
    ("hipaa_to_fhir", "/api/v2/hipaa-to-fhir/supported-transactions"),
    ("database_to_hipaa", "/api/v2/database-to-hipaa/transaction-types"),
];

/// Conversion paths advertised in the capability manifest.
const CONVERSION_PATHS: [&str; 9] = [
    "X12 → FHIR R4 (hipaa-to-fhir)",
    "X12 → RMap v5 (hipaa-to-rmap)",
    "RMap v5 → X12 (rmap-to-hipaa)",
    "X12 → Database (hipaa-to-database)",
    "Database → X12 (database-to-hipaa)",
    "FHIR R4 → X12 278 (fhir-to-hipaa)",
    "FHIR R4 → RMap v5 (fhir-to-hipaa?output_format=rmap)",
    "HL7 v2 / CDA → FHIR R4 (ai/hl7-convert)",
    "X12 837 → PDF claim forms (claims-to-pdf)",
];

/// Sample sources tried in order: manifest key and endpoint prefix.
const SAMPLE_SOURCES: [(&str, &str); 2] = [
    ("hipaa_to_rmap", "/api/v2/hipaa-to-rmap/sample"),
    ("hipaa_validate", "/api/v2/hipaa-validate/sample"),
];

/// Keys that may hold sample content in a JSON sample response.
const SAMPLE_CONTENT_KEYS: [&str; 4] = ["content", "sample", "x12_content", "sample_content"];

/// Transaction type used to re-validate FHIR-generated X12.
const FHIR_X12_TRANSACTION: &str = "278";

// ============================================================================
// SECTION: Conversion Service
// ============================================================================

/// Orchestrates gated engine conversions.
#[derive(Clone)]
pub struct ConversionService {
    /// Engine transport.
    transport: Arc<dyn EngineTransport>,
    /// Admission gates over the same transport.
    gates: GateEngine,
    /// Issues the correlation ID stamped on every returned record.
    ids: Arc<CorrelationIdGenerator>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService").finish_non_exhaustive()
    }
}

impl ConversionService {
    /// Creates a service over the given transport with its own ID generator.
    #[must_use]
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self::with_correlation_ids(transport, Arc::new(CorrelationIdGenerator::new()))
    }

    /// Creates a service that stamps records from a shared ID generator.
    #[must_use]
    pub fn with_correlation_ids(
        transport: Arc<dyn EngineTransport>,
        ids: Arc<CorrelationIdGenerator>,
    ) -> Self {
        let gates = GateEngine::new(Arc::clone(&transport));
        Self {
            transport,
            gates,
            ids,
        }
    }

    /// Returns the admission gates.
    #[must_use]
    pub const fn gates(&self) -> &GateEngine {
        &self.gates
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Validates X12 content and classifies the report.
    #[must_use]
    pub fn validate_x12(&self, request: &ValidateX12Request) -> DecisionRecord {
        let record =
            self.gates.validation_record(&request.x12_content, request.transaction_type.as_deref());
        self.settle(Ok(record))
    }

    // ------------------------------------------------------------------------
    // X12 Input Pipelines
    // ------------------------------------------------------------------------

    /// Converts X12 to a FHIR R4 bundle.
    #[must_use]
    pub fn convert_x12_to_fhir(&self, request: &X12ConversionRequest) -> DecisionRecord {
        self.settle(self.x12_to_fhir(request))
    }

    /// Body of [`Self::convert_x12_to_fhir`].
    fn x12_to_fhir(&self, request: &X12ConversionRequest) -> Outcome {
        let pipeline = Pipeline::X12ToFhir;
        let tx = present_code(request.transaction_type.as_deref());
        self.admit(pipeline, &request.x12_content, tx, request.strict_mode)?;

        let normalized = normalize_transaction_type(tx);
        let engine_request = EngineRequest::multipart(
            pipeline.endpoint(),
            MultipartBody::with_upload(x12_upload(&request.x12_content, tx)),
        )
        .with_optional_query("transaction_type", normalized.as_ref().map(TransactionType::as_str));
        let response = self.convert_object(pipeline, &engine_request)?;

        let warnings = warnings_of(&response);
        let detected = detected_transaction(&response, tx);
        let mut ruling = format!(
            "X12 {} successfully converted to FHIR R4 Bundle.",
            transaction_label(tx, &detected)
        );
        if !warnings.is_empty() {
            ruling.push_str(&format!(" {} warning(s) noted.", warnings.len()));
        }
        let bundle = first_truthy(&response, &["fhir_bundle", "fhir_output"])
            .cloned()
            .unwrap_or_else(|| Value::Object(response.clone()));
        Ok(approved(ruling, warnings)
            .data_entry("fhir_bundle", bundle)
            .data_entry("transaction_type", detected)
            .data_entry("metadata", field(&response, "metadata"))
            .build())
    }

    /// Converts X12 to `RMap` records.
    #[must_use]
    pub fn convert_x12_to_rmap(&self, request: &X12ConversionRequest) -> DecisionRecord {
        self.settle(self.x12_to_rmap(request))
    }

    /// Body of [`Self::convert_x12_to_rmap`].
    fn x12_to_rmap(&self, request: &X12ConversionRequest) -> Outcome {
        let pipeline = Pipeline::X12ToRmap;
        let tx = present_code(request.transaction_type.as_deref());
        self.admit(pipeline, &request.x12_content, tx, request.strict_mode)?;

        let engine_request = EngineRequest::multipart(
            pipeline.endpoint(),
            MultipartBody::with_upload(x12_upload(&request.x12_content, tx)),
        )
        .with_optional_query("transaction_type", tx);
        let response = self.convert_object(pipeline, &engine_request)?;

        let warnings = warnings_of(&response);
        let detected = detected_transaction(&response, tx);
        let parsed = response
            .get("rmap_parsed")
            .filter(|value| !value.is_null())
            .cloned()
            .unwrap_or_else(|| json!({}));
        let record_count = parsed.get("record_count").cloned().unwrap_or_else(|| json!(0));
        let mut ruling = format!(
            "X12 {} converted to RMap v5 with {} record(s).",
            transaction_label(tx, &detected),
            display_value(&record_count)
        );
        push_warning_count(&mut ruling, &warnings);
        Ok(approved(ruling, warnings)
            .data_entry("rmap_content", field(&response, "rmap_content"))
            .data_entry("rmap_parsed", parsed)
            .data_entry("metadata", field(&response, "metadata"))
            .build())
    }

    /// Loads X12 into engine database tables.
    #[must_use]
    pub fn convert_x12_to_database(&self, request: &X12ToDatabaseRequest) -> DecisionRecord {
        self.settle(self.x12_to_database(request))
    }

    /// Body of [`Self::convert_x12_to_database`].
    fn x12_to_database(&self, request: &X12ToDatabaseRequest) -> Outcome {
        let pipeline = Pipeline::X12ToDatabase;
        let tx = present_code(request.transaction_type.as_deref());
        self.admit(pipeline, &request.x12_content, tx, request.strict_mode)?;

        let body = MultipartBody::with_upload(x12_upload(&request.x12_content, tx))
            .optional_field("transaction_type", tx)
            .optional_field("session_id", present_code(request.session_id.as_deref()));
        let engine_request = EngineRequest::multipart(pipeline.endpoint(), body);
        let response = self.convert_object(pipeline, &engine_request)?;

        let warnings = warnings_of(&response);
        let detected = detected_transaction(&response, None);
        let stage2 = response.get("stage2").and_then(Value::as_object).cloned().unwrap_or_default();
        let session_id = field(&response, "session_id");
        let mut ruling = format!(
            "X12 {} loaded into database session '{}'. {} tables created, {} total rows.",
            transaction_label(tx, &detected),
            display_value(&session_id),
            display_value(stage2.get("tables_created").unwrap_or(&json!(0))),
            display_value(stage2.get("total_rows").unwrap_or(&json!(0)))
        );
        push_warning_count(&mut ruling, &warnings);
        Ok(approved(ruling, warnings)
            .data_entry("session_id", session_id)
            .data_entry("transaction_type", detected)
            .data_entry("tables_created", field(&stage2, "tables_created"))
            .data_entry("tables_with_data", field(&stage2, "tables_with_data"))
            .data_entry("total_rows", field(&stage2, "total_rows"))
            .data_entry("table_counts", field(&stage2, "table_counts"))
            .build())
    }

    /// Renders PDF claim forms from an X12 837.
    #[must_use]
    pub fn generate_claim_pdf(&self, request: &ClaimPdfRequest) -> DecisionRecord {
        self.settle(self.claim_pdf(request))
    }

    /// Body of [`Self::generate_claim_pdf`].
    fn claim_pdf(&self, request: &ClaimPdfRequest) -> Outcome {
        let pipeline = Pipeline::ClaimPdf;
        let claim_type = request.explicit_claim_type();
        let gate_type = claim_type.unwrap_or("837p");
        self.admit(pipeline, &request.x12_837_content, Some(gate_type), request.strict_mode)?;

        let engine_request = EngineRequest::multipart(
            pipeline.endpoint(),
            MultipartBody::with_upload(Upload::text(request.x12_837_content.as_str(), "claim.x12")),
        )
        .with_optional_query("claim_type", claim_type);
        let response = self.convert_object(pipeline, &engine_request)?;

        let pdf_files = response
            .get("pdf_files")
            .filter(|value| !value.is_null())
            .cloned()
            .unwrap_or_else(|| json!([]));
        let file_count = pdf_files.as_array().map_or(0, Vec::len);
        let form_name = response
            .get("form_name")
            .filter(|value| !value.is_null())
            .cloned()
            .unwrap_or_else(|| json!("unknown"));
        let pdf_count = response.get("pdf_count").cloned().unwrap_or_else(|| json!(file_count));
        let ruling = format!(
            "Generated {file_count} {} PDF claim form(s). Download via the URLs in the response.",
            display_value(&form_name)
        );
        Ok(approved(ruling, Vec::new())
            .data_entry("claim_type", field(&response, "claim_type"))
            .data_entry("form_name", form_name)
            .data_entry("pdf_count", pdf_count)
            .data_entry("pdf_files", pdf_files)
            .data_entry("zip_download_url", field(&response, "zip_download_url"))
            .data_entry("conversion_id", field(&response, "conversion_id"))
            .build())
    }

    // ------------------------------------------------------------------------
    // X12 Output Pipelines
    // ------------------------------------------------------------------------

    /// Converts `RMap` records to X12 and re-validates the result.
    #[must_use]
    pub fn convert_rmap_to_x12(&self, request: &RmapToX12Request) -> DecisionRecord {
        self.settle(self.rmap_to_x12(request))
    }

    /// Body of [`Self::convert_rmap_to_x12`].
    fn rmap_to_x12(&self, request: &RmapToX12Request) -> Outcome {
        let pipeline = Pipeline::RmapToX12;
        let tx = present_code(request.transaction_type.as_deref());
        let file_name = tx.map_or_else(|| "input.rmap".to_string(), |tx| format!("input.{tx}.rmap"));
        let engine_request = EngineRequest::multipart(
            pipeline.endpoint(),
            MultipartBody::with_upload(Upload::text(request.rmap_content.as_str(), file_name)),
        )
        .with_optional_query("transaction_type", tx);
        let payload = self.convert(pipeline, &engine_request)?;
        let (x12, response) = extract_x12(pipeline, payload)?;
        let x12 = self.release(pipeline, x12, tx)?;

        let warnings = warnings_of(&response);
        let detected = detected_transaction(&response, tx);
        let mut ruling = format!(
            "RMap converted to {} X12 and passed output validation.",
            transaction_label(tx, &detected)
        );
        push_warning_count(&mut ruling, &warnings);
        Ok(approved(ruling, warnings)
            .data_entry("x12_content", x12)
            .data_entry("metadata", field(&response, "metadata"))
            .build())
    }

    /// Generates X12 from database records and re-validates the result.
    #[must_use]
    pub fn generate_x12_from_database(&self, request: &DatabaseToX12Request) -> DecisionRecord {
        self.settle(self.database_to_x12(request))
    }

    /// Body of [`Self::generate_x12_from_database`].
    fn database_to_x12(&self, request: &DatabaseToX12Request) -> Outcome {
        let pipeline = Pipeline::DatabaseToX12;
        let tx = present_code(request.transaction_type.as_deref());
        let record_id = request.record_id.map(|id| id.to_string());
        let engine_request = EngineRequest::json(pipeline.endpoint(), None)
            .with_optional_query("transaction_type", tx)
            .with_optional_query("record_id", record_id.as_deref());
        let payload = self.convert(pipeline, &engine_request)?;
        let (x12, response) = extract_x12(pipeline, payload)?;
        let x12 = self.release(pipeline, x12, tx)?;

        let detected = detected_transaction(&response, None);
        let ruling = format!(
            "X12 {} generated from database record {} and passed output validation.",
            transaction_label(tx, &detected),
            record_id.as_deref().unwrap_or("(default)")
        );
        Ok(approved(ruling, Vec::new())
            .data_entry("x12_content", x12)
            .data_entry("transaction_type", detected)
            .data_entry("metadata", field(&response, "metadata"))
            .build())
    }

    /// Converts a FHIR bundle to X12 278 and re-validates the result.
    #[must_use]
    pub fn convert_fhir_to_x12(&self, request: &FhirBundleRequest) -> DecisionRecord {
        self.settle(self.fhir_to_x12(request))
    }

    /// Body of [`Self::convert_fhir_to_x12`].
    fn fhir_to_x12(&self, request: &FhirBundleRequest) -> Outcome {
        let pipeline = Pipeline::FhirToX12;
        let bundle = decode_bundle(request)?;
        let engine_request = EngineRequest::json(pipeline.endpoint(), Some(bundle))
            .with_query("output_format", "x12");
        let payload = self.convert(pipeline, &engine_request)?;
        let (x12, response) = extract_x12(pipeline, payload)?;
        let x12 = self.release(pipeline, x12, Some(FHIR_X12_TRANSACTION))?;

        let warnings = warnings_of(&response);
        let conversion_type = response
            .get("conversion_type")
            .filter(|value| !value.is_null())
            .cloned()
            .unwrap_or_else(|| json!(FHIR_X12_TRANSACTION));
        let mut ruling = format!(
            "FHIR Bundle converted to X12 {} and passed output validation.",
            display_value(&conversion_type)
        );
        push_warning_count(&mut ruling, &warnings);
        Ok(approved(ruling, warnings)
            .data_entry("x12_content", x12)
            .data_entry("conversion_type", conversion_type)
            .data_entry("metadata", field(&response, "metadata"))
            .build())
    }

    // ------------------------------------------------------------------------
    // Ungated Pipelines
    // ------------------------------------------------------------------------

    /// Converts a FHIR bundle to `RMap` records.
    #[must_use]
    pub fn convert_fhir_to_rmap(&self, request: &FhirBundleRequest) -> DecisionRecord {
        self.settle(self.fhir_to_rmap(request))
    }

    /// Body of [`Self::convert_fhir_to_rmap`].
    fn fhir_to_rmap(&self, request: &FhirBundleRequest) -> Outcome {
        let pipeline = Pipeline::FhirToRmap;
        let bundle = decode_bundle(request)?;
        let engine_request = EngineRequest::json(pipeline.endpoint(), Some(bundle))
            .with_query("output_format", "rmap");
        let response = self.convert_object(pipeline, &engine_request)?;

        let warnings = warnings_of(&response);
        let mut ruling = "FHIR Bundle converted to RMap intermediate format.".to_string();
        push_warning_count(&mut ruling, &warnings);
        let rmap = response.get("rmap_output").cloned().unwrap_or_else(|| json!(""));
        Ok(approved(ruling, warnings)
            .data_entry("rmap_content", rmap)
            .data_entry("metadata", field(&response, "metadata"))
            .build())
    }

    /// Converts an HL7 v2 message to a FHIR R4 bundle.
    #[must_use]
    pub fn convert_hl7_to_fhir(&self, request: &Hl7ToFhirRequest) -> DecisionRecord {
        self.settle(self.hl7_to_fhir(request))
    }

    /// Body of [`Self::convert_hl7_to_fhir`].
    fn hl7_to_fhir(&self, request: &Hl7ToFhirRequest) -> Outcome {
        let pipeline = Pipeline::Hl7ToFhir;
        let engine_request = clinical_request(pipeline, &request.hl7_content);
        let response = self.convert_object(pipeline, &engine_request)?;

        let bundle = response.get("fhir_bundle").cloned().unwrap_or_else(|| json!({}));
        let resource_count = response.get("resource_count").cloned().unwrap_or_else(|| json!(0));
        let message_type = response.get("message_type").cloned().unwrap_or_else(|| json!("unknown"));
        let ruling = format!(
            "HL7 {} converted to FHIR R4 Bundle with {} resource(s).",
            display_value(&message_type),
            display_value(&resource_count)
        );
        Ok(approved(ruling, Vec::new())
            .data_entry("fhir_bundle", bundle)
            .data_entry("message_type", message_type)
            .data_entry("resource_count", resource_count)
            .data_entry("processing_time_ms", field(&response, "processing_time_ms"))
            .build())
    }

    /// Converts a CDA or C-CDA document to a FHIR R4 bundle.
    #[must_use]
    pub fn convert_cda_to_fhir(&self, request: &CdaToFhirRequest) -> DecisionRecord {
        self.settle(self.cda_to_fhir(request))
    }

    /// Body of [`Self::convert_cda_to_fhir`].
    fn cda_to_fhir(&self, request: &CdaToFhirRequest) -> Outcome {
        let pipeline = Pipeline::CdaToFhir;
        let engine_request = clinical_request(pipeline, &request.cda_content);
        let response = self.convert_object(pipeline, &engine_request)?;

        let bundle = response.get("fhir_bundle").cloned().unwrap_or_else(|| json!({}));
        let entry_count = bundle.get("entry").and_then(Value::as_array).map_or(0, Vec::len);
        let resource_count = response
            .get("resource_count")
            .filter(|value| truthy(value))
            .cloned()
            .unwrap_or_else(|| json!(entry_count));
        let document_type = response.get("message_type").cloned().unwrap_or_else(|| json!("CDA"));
        let ruling = format!(
            "{} document converted to FHIR R4 Bundle with {} resource(s).",
            display_value(&document_type),
            display_value(&resource_count)
        );
        Ok(approved(ruling, Vec::new())
            .data_entry("fhir_bundle", bundle)
            .data_entry("document_type", document_type)
            .data_entry("resource_count", resource_count)
            .data_entry("processing_time_ms", field(&response, "processing_time_ms"))
            .build())
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    /// Builds the capability manifest, omitting failed lookups.
    ///
    /// When no lookup answers because the engine is unreachable, the result
    /// is an `Error` record with no data.
    #[must_use]
    pub fn list_supported_formats(&self) -> DecisionRecord {
        self.settle(Ok(self.capability_manifest()))
    }

    /// Body of [`Self::list_supported_formats`].
    fn capability_manifest(&self) -> DecisionRecord {
        let mut manifest = Map::new();
        let mut omitted = Vec::new();
        let mut unreachable = None;
        for (key, endpoint) in CAPABILITY_LOOKUPS {
            match self.transport.send(&EngineRequest::get(endpoint)) {
                Ok(UpstreamPayload::Json(value)) => {
                    manifest.insert(key.to_string(), value);
                }
                Ok(UpstreamPayload::Text {
                    body,
                    ..
                }) => {
                    manifest.insert(key.to_string(), Value::String(body));
                }
                Err(failure) => {
                    if failure.is_transport() && unreachable.is_none() {
                        unreachable = Some(failure);
                    }
                    omitted.push(key);
                }
            }
        }
        if manifest.is_empty()
            && let Some(failure) = unreachable
        {
            return error_record(format!(
                "Capability discovery failed: HTTP 0 ({}). {}",
                failure.condition(),
                failure.detail_excerpt()
            ));
        }

        manifest.insert("conversion_paths".to_string(), json!(CONVERSION_PATHS));
        manifest.insert(
            "compliance_gates".to_string(),
            json!({
                "gate1_input_validation": "Validates X12 input before conversion (5010 rules)",
                "gate5_output_validation": "Re-validates generated X12 output before returning",
            }),
        );

        let mut ruling = "Capability manifest retrieved. See data for all supported formats and \
                          conversion paths."
            .to_string();
        if !omitted.is_empty() {
            ruling.push_str(&format!(
                " Lookups unavailable and omitted: {}.",
                omitted.join(", ")
            ));
        }
        DecisionRecord::builder(DecisionStatus::Approved, ruling).data(manifest).build()
    }

    /// Fetches a sample X12 document for a transaction type.
    #[must_use]
    pub fn get_sample_x12(&self, request: &SampleX12Request) -> DecisionRecord {
        self.settle(self.sample_x12(request))
    }

    /// Body of [`Self::get_sample_x12`].
    fn sample_x12(&self, request: &SampleX12Request) -> Outcome {
        let tx = request.transaction_type.trim();
        let well_formed = tx.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if tx.is_empty() || !well_formed {
            return Err(error_record(format!(
                "Invalid transaction_type '{}': expected a code such as 837p or 835.",
                truncate_chars(tx, RULING_DETAIL_CHARS)
            )));
        }

        let mut last_problem = String::new();
        for (source, prefix) in SAMPLE_SOURCES {
            let engine_request = EngineRequest::get(format!("{prefix}/{tx}"));
            match self.transport.send(&engine_request) {
                Ok(payload) => match sample_content(payload) {
                    Some(content) => {
                        let ruling = format!(
                            "Sample {tx} X12 retrieved from {source}. Use it as test input only; \
                             it contains no real patient data."
                        );
                        return Ok(DecisionRecord::builder(DecisionStatus::Approved, ruling)
                            .data_entry("transaction_type", tx)
                            .data_entry("content", content)
                            .data_entry("source", source)
                            .build());
                    }
                    None => last_problem = format!("{source} returned no sample content"),
                },
                Err(failure) => last_problem = format!("{source}: {}", failure.summary()),
            }
        }
        Err(error_record(format!("No sample X12 available for {tx}. Last attempt: {last_problem}.")))
    }

    // ------------------------------------------------------------------------
    // Shared Steps
    // ------------------------------------------------------------------------

    /// Collapses an internal outcome into the returned record and stamps its
    /// correlation ID.
    fn settle(&self, outcome: Outcome) -> DecisionRecord {
        outcome.unwrap_or_else(|record| record).with_correlation_id(self.ids.issue())
    }

    /// Runs the input gate when the pipeline consumes X12.
    fn admit(
        &self,
        pipeline: Pipeline,
        content: &str,
        transaction_type: Option<&str>,
        strict_mode: bool,
    ) -> Result<(), DecisionRecord> {
        if !pipeline.input_gated() {
            return Ok(());
        }
        self.gates.admit_input(content, transaction_type, strict_mode).map_or(Ok(()), Err)
    }

    /// Invokes the conversion endpoint once.
    fn convert(
        &self,
        pipeline: Pipeline,
        request: &EngineRequest,
    ) -> Result<UpstreamPayload, DecisionRecord> {
        self.transport.send(request).map_err(|failure| conversion_failed(pipeline, &failure))
    }

    /// Invokes the conversion endpoint and requires a successful JSON object.
    fn convert_object(
        &self,
        pipeline: Pipeline,
        request: &EngineRequest,
    ) -> Result<Map<String, Value>, DecisionRecord> {
        let payload = self.convert(pipeline, request)?;
        let response = require_object(pipeline, payload)?;
        check_success(pipeline, &response)?;
        Ok(response)
    }

    /// Runs the output gate, attaching rejected X12 to the verdict.
    fn release(
        &self,
        pipeline: Pipeline,
        x12: String,
        transaction_type: Option<&str>,
    ) -> Result<String, DecisionRecord> {
        if !pipeline.output_gated() {
            return Ok(x12);
        }
        match self.gates.admit_output(&x12, transaction_type, pipeline.tool_name()) {
            Some(verdict) => Err(verdict.with_data_entry("x12_content", x12)),
            None => Ok(x12),
        }
    }
}

// ============================================================================
// SECTION: Outcome Helpers
// ============================================================================

/// Internal pipeline result: either record settles the operation.
type Outcome = Result<DecisionRecord, DecisionRecord>;

/// Builds an `Error` record with no gate and no payload.
fn error_record(ruling: impl Into<String>) -> DecisionRecord {
    DecisionRecord::builder(DecisionStatus::Error, ruling).build()
}

/// Starts an approval, conditional when warnings are present.
fn approved(ruling: String, warnings: Vec<Value>) -> DecisionRecordBuilder {
    let status = if warnings.is_empty() {
        DecisionStatus::Approved
    } else {
        DecisionStatus::ApprovedWithConditions
    };
    DecisionRecord::builder(status, ruling).warnings(warnings)
}

/// Builds the error record for a failed conversion call.
fn conversion_failed(pipeline: Pipeline, failure: &UpstreamFailure) -> DecisionRecord {
    error_record(format!(
        "{} failed: HTTP {} ({}). {}",
        pipeline.step(),
        failure.status,
        failure.condition(),
        failure.detail_excerpt()
    ))
}

/// Requires a JSON object response.
fn require_object(
    pipeline: Pipeline,
    payload: UpstreamPayload,
) -> Result<Map<String, Value>, DecisionRecord> {
    match payload {
        UpstreamPayload::Json(Value::Object(map)) => Ok(map),
        UpstreamPayload::Json(other) => Err(error_record(format!(
            "{} failed: unexpected response shape (expected a JSON object). {}",
            pipeline.step(),
            truncate_chars(&other.to_string(), RULING_DETAIL_CHARS)
        ))),
        UpstreamPayload::Text {
            body,
            status,
        } => Err(error_record(format!(
            "{} failed: unexpected non-JSON response (HTTP {status}). {}",
            pipeline.step(),
            truncate_chars(&body, RULING_DETAIL_CHARS)
        ))),
    }
}

/// Applies the pipeline's `success` flag policy.
fn check_success(pipeline: Pipeline, response: &Map<String, Value>) -> Result<(), DecisionRecord> {
    let flag = response.get("success");
    let succeeded = match pipeline.success_flag() {
        SuccessFlag::Ignored => true,
        SuccessFlag::Required => flag.is_some_and(truthy),
        SuccessFlag::DefaultTrue => flag.is_none_or(truthy),
    };
    if succeeded {
        return Ok(());
    }
    let reason = response.get("error").map_or_else(|| "unknown error".to_string(), display_value);
    Err(DecisionRecord::builder(
        DecisionStatus::Error,
        format!("{} failed: {}", pipeline.step(), truncate_chars(&reason, RULING_DETAIL_CHARS)),
    )
    .data(response.clone())
    .build())
}

/// Extracts generated X12 from a conversion response.
///
/// Plain-text responses are taken as the X12 itself.
fn extract_x12(
    pipeline: Pipeline,
    payload: UpstreamPayload,
) -> Result<(String, Map<String, Value>), DecisionRecord> {
    let (x12, response) = match payload {
        UpstreamPayload::Text {
            body,
            ..
        } => (body, Map::new()),
        payload => {
            let response = require_object(pipeline, payload)?;
            check_success(pipeline, &response)?;
            let x12 = pipeline
                .output_paths()
                .iter()
                .filter_map(|path| lookup_path(&response, path).and_then(Value::as_str))
                .find(|text| !text.trim().is_empty())
                .unwrap_or_default()
                .to_string();
            (x12, response)
        }
    };
    if x12.trim().is_empty() {
        let mut record = DecisionRecord::builder(
            DecisionStatus::Error,
            format!("{} returned empty X12 content.", pipeline.step()),
        );
        if !response.is_empty() {
            record = record.data(response);
        }
        return Err(record.build());
    }
    Ok((x12, response))
}

/// Decodes a FHIR bundle argument before any engine call.
fn decode_bundle(request: &FhirBundleRequest) -> Result<Value, DecisionRecord> {
    request.bundle().map_err(|reason| error_record(format!("Invalid JSON in fhir_bundle: {reason}")))
}

// ============================================================================
// SECTION: Request Helpers
// ============================================================================

/// Wraps X12 content as the standard upload, naming the transaction type.
fn x12_upload(content: &str, transaction_type: Option<&str>) -> Upload {
    let file_name = present_code(transaction_type)
        .map_or_else(|| "input.x12".to_string(), |tx| format!("input.{tx}.x12"));
    Upload::text(content, file_name)
}

/// Builds the clinical conversion request with content as a form field.
fn clinical_request(pipeline: Pipeline, content: &str) -> EngineRequest {
    EngineRequest::multipart(pipeline.endpoint(), MultipartBody::default().field("content", content))
}

// ============================================================================
// SECTION: Response Helpers
// ============================================================================

/// Returns a field or null.
fn field(map: &Map<String, Value>, key: &str) -> Value {
    map.get(key).cloned().unwrap_or(Value::Null)
}

/// Follows a key path through nested objects.
fn lookup_path<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(*first)?;
    for key in rest {
        current = current.get(*key)?;
    }
    Some(current)
}

/// Returns the first present, non-empty value among the keys.
fn first_truthy<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| map.get(*key)).find(|value| truthy(value))
}

/// Returns true for values that are present and non-empty.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Returns the engine's warning list, empty when absent.
fn warnings_of(response: &Map<String, Value>) -> Vec<Value> {
    match response.get("warnings") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

/// Returns the engine-detected transaction type, else the requested one.
fn detected_transaction(response: &Map<String, Value>, requested: Option<&str>) -> Value {
    match response.get("transaction_type") {
        Some(value) if !value.is_null() => value.clone(),
        _ => requested.map_or(Value::Null, |tx| Value::String(tx.to_string())),
    }
}

/// Upper-cased transaction label for rulings, `X12` when unknown.
fn transaction_label(requested: Option<&str>, detected: &Value) -> String {
    let label = present_code(requested)
        .or_else(|| detected.as_str().filter(|text| !text.trim().is_empty()))
        .unwrap_or("X12");
    label.to_uppercase()
}

/// Renders a JSON value for ruling text without string quotes.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

/// Appends the warning count sentence when warnings exist.
fn push_warning_count(ruling: &mut String, warnings: &[Value]) {
    if !warnings.is_empty() {
        ruling.push_str(&format!(" {} warning(s).", warnings.len()));
    }
}

/// Extracts sample text from a sample endpoint payload.
fn sample_content(payload: UpstreamPayload) -> Option<String> {
    let text = match payload {
        UpstreamPayload::Text {
            body,
            ..
        } => body,
        UpstreamPayload::Json(Value::String(text)) => text,
        UpstreamPayload::Json(Value::Object(map)) => SAMPLE_CONTENT_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|text| !text.trim().is_empty())
            .map(str::to_string)?,
        UpstreamPayload::Json(_) => return None,
    };
    if text.trim().is_empty() { None } else { Some(text) }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
