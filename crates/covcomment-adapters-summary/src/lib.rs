//! Istanbul `coverage-summary.json` parser for covcomment.

use covcomment_types::CoverageSummary;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while parsing a coverage summary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    /// The input is not JSON, or a metric is malformed.
    #[error("Invalid coverage summary: {0}")]
    InvalidSummary(String),

    /// The document has no `total` section.
    #[error("Coverage summary has no \"total\" section")]
    MissingTotal,
}

#[derive(Deserialize)]
struct SummaryFile {
    total: Option<CoverageSummary>,
}

/// Parse the `total` section of an Istanbul `json-summary` report.
///
/// Per-file sections are ignored.
///
/// # Examples
///
/// ```
/// use covcomment_adapters_summary::parse_coverage_summary;
///
/// let summary = parse_coverage_summary(r#"{"total": {
///     "lines": {"total": 10, "covered": 8, "skipped": 0, "pct": 80}
/// }}"#).unwrap();
/// assert_eq!(summary.lines.pct, 80.0);
/// ```
pub fn parse_coverage_summary(text: &str) -> Result<CoverageSummary, SummaryError> {
    let file: SummaryFile =
        serde_json::from_str(text).map_err(|e| SummaryError::InvalidSummary(e.to_string()))?;
    file.total.ok_or(SummaryError::MissingTotal)
}
