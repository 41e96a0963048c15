// crates/redix-core/src/transaction.rs
// ============================================================================
// Module: Transaction Types
// Description: Normalization of caller transaction codes to engine names.
// Purpose: Map short X12 codes onto the long-form names conversion routes use.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Callers name transactions with short codes such as `837p`. The engine's
//! X12-to-FHIR route expects long-form names such as `837-professional`.
//! [`normalize_transaction_type`] applies a fixed, case-insensitive table and
//! passes unrecognized codes through unchanged so the engine can reject them
//! with its own message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Lookup Table
// ============================================================================

/// Short code to canonical name table. Canonical names map to themselves.
const TRANSACTION_TABLE: &[(&str, &str)] = &[
    ("837p", "837-professional"),
    ("837i", "837-institutional"),
    ("837d", "837-dental"),
    ("835", "835-remittance"),
    ("834", "834-enrollment"),
    ("270", "270-eligibility"),
    ("271", "271-eligibility"),
    ("276", "276-claim-status"),
    ("277", "277-claim-status"),
    ("278", "278-request"),
    ("278-request", "278-request"),
    ("278-response", "278-response"),
    ("837-professional", "837-professional"),
    ("837-institutional", "837-institutional"),
    ("837-dental", "837-dental"),
    ("835-remittance", "835-remittance"),
    ("834-enrollment", "834-enrollment"),
    ("270-eligibility", "270-eligibility"),
    ("271-eligibility", "271-eligibility"),
    ("276-claim-status", "276-claim-status"),
    ("277-claim-status", "277-claim-status"),
];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Normalized transaction identifier sent to conversion routes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionType(String);

impl TransactionType {
    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is one of the known canonical names.
    #[must_use]
    pub fn is_known(&self) -> bool {
        TRANSACTION_TABLE.iter().any(|(_, canonical)| *canonical == self.0)
    }

    /// Consumes the identifier and returns its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TransactionType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes a caller transaction code.
///
/// Returns `None` for absent or blank codes. Known codes are matched
/// case-insensitively after trimming; anything else is returned unchanged.
#[must_use]
pub fn normalize_transaction_type(code: Option<&str>) -> Option<TransactionType> {
    let code = code?;
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    let canonical = TRANSACTION_TABLE
        .iter()
        .find(|(short, _)| *short == lowered)
        .map_or_else(|| code.to_string(), |(_, canonical)| (*canonical).to_string());
    Some(TransactionType(canonical))
}

/// Returns the caller code as-is, treating blank values as absent.
///
/// Routes other than X12-to-FHIR take the caller's code unnormalized.
#[must_use]
pub fn present_code(code: Option<&str>) -> Option<&str> {
    code.filter(|value| !value.trim().is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
