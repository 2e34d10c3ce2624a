//! Jest JSON report parser for covcomment.
//!
//! Parses the output of `jest --json --outputFile=report.json` into the
//! shared [`JestReport`] type. Only structural problems are errors; missing
//! optional fields fall back to empty values.

use covcomment_types::JestReport;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while parsing a Jest report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JestError {
    /// The input is not JSON, or not shaped like a Jest report.
    #[error("Invalid Jest report: {0}")]
    InvalidReport(String),

    /// The input is empty.
    #[error("Jest report is empty")]
    Empty,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a Jest JSON report.
///
/// # Examples
///
/// ```
/// use covcomment_adapters_jest::parse_jest_report;
///
/// let report = parse_jest_report(r#"{"success": false, "testResults": [
///     {"name": "a.test.ts", "status": "failed", "assertionResults": [
///         {"title": "adds", "status": "failed", "failureMessages": ["boom"]}
///     ]}
/// ]}"#).unwrap();
/// assert_eq!(report.test_results.len(), 1);
/// assert!(report.test_results[0].assertion_results[0].is_failing());
/// ```
pub fn parse_jest_report(text: &str) -> Result<JestReport, JestError> {
    if text.trim().is_empty() {
        return Err(JestError::Empty);
    }
    serde_json::from_str(text).map_err(|e| JestError::InvalidReport(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
