// crates/redix-core/src/correlation.rs
// ============================================================================
// Module: Correlation Identifiers
// Description: Issued transaction IDs and checks on caller-supplied ones.
// Purpose: Tie each decision record to the audit events of its call.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! A [`CorrelationIdGenerator`] is owned by whoever issues records (the
//! conversion service) and stamps `rdx-<boot>-<seq>` identifiers: a random
//! boot value drawn once per generator plus an atomic sequence number.
//! HTTP callers may bring their own identifier in the `x-correlation-id`
//! header; it is echoed back only after [`sanitize_client_correlation_id`]
//! accepts it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix of issued correlation IDs.
pub const CORRELATION_ID_PREFIX: &str = "rdx";
/// Header carrying a caller-supplied correlation ID.
pub const CLIENT_CORRELATION_HEADER: &str = "x-correlation-id";
/// Longest accepted caller-supplied correlation ID.
pub const MAX_CLIENT_CORRELATION_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Issues correlation IDs unique for the generator's lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Random value distinguishing this generator from earlier runs.
    boot: u64,
    /// Next sequence number.
    next: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator with a fresh random boot value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            boot: rand::random::<u64>() & 0xffff_ffff_ffff,
            next: AtomicU64::new(1),
        }
    }

    /// Issues the next correlation ID.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{CORRELATION_ID_PREFIX}-{:012x}-{seq}", self.boot)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Client IDs
// ============================================================================

/// Why a caller-supplied correlation ID was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationIdRejection {
    /// Nothing left after trimming.
    Empty,
    /// Longer than [`MAX_CLIENT_CORRELATION_ID_LENGTH`].
    TooLong,
    /// Contains interior whitespace.
    ContainsWhitespace,
    /// Contains a character outside printable ASCII.
    NotPrintableAscii,
}

impl CorrelationIdRejection {
    /// Returns the label used in protocol error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::ContainsWhitespace => "contains_whitespace",
            Self::NotPrintableAscii => "not_printable_ascii",
        }
    }
}

impl fmt::Display for CorrelationIdRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Trims and checks a caller-supplied correlation ID.
///
/// Returns `Ok(None)` when no value was supplied.
///
/// # Errors
///
/// Returns [`CorrelationIdRejection`] when the trimmed value is empty, too
/// long, or not a single printable ASCII token.
pub fn sanitize_client_correlation_id(
    value: Option<&str>,
) -> Result<Option<String>, CorrelationIdRejection> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CorrelationIdRejection::Empty);
    }
    if trimmed.len() > MAX_CLIENT_CORRELATION_ID_LENGTH {
        return Err(CorrelationIdRejection::TooLong);
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(CorrelationIdRejection::ContainsWhitespace);
    }
    if !trimmed.chars().all(|ch| ch.is_ascii_graphic()) {
        return Err(CorrelationIdRejection::NotPrintableAscii);
    }
    Ok(Some(trimmed.to_string()))
}
