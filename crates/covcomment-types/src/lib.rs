//! Core types and DTOs for covcomment.
//!
//! This crate defines the data transfer objects shared by every other crate:
//! Jest test runs and their assertion results, JUnit summaries, coverage
//! summaries, remote comments, the watermark that identifies our own
//! comments, and the request context describing the current CI event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Marker text embedded in every watermark.
pub const WATERMARK_MARKER: &str = "Jest Coverage Comment";

/// Login of the identity that authors our comments.
pub const BOT_LOGIN: &str = "github-actions[bot]";

/// Hard upper bound on a published comment body, in UTF-16 code units.
pub const MAX_COMMENT_LENGTH: usize = 65536;

/// Page size requested while enumerating issue comments.
pub const REQUESTED_COMMENTS_PER_PAGE: u32 = 20;

/// Page size used for the single-page lookup in update-in-place mode.
pub const UPDATE_LOOKUP_PAGE_SIZE: u32 = 30;

/// Leading text of the only stack frame shape we turn into a source link.
pub const ANONYMOUS_FRAME_MARKER: &str = "at Object.<anonymous>";

/// Jest status for a passing run or assertion.
pub const STATUS_PASSED: &str = "passed";

// ============================================================================
// Jest report
// ============================================================================

/// Top-level Jest JSON report (`jest --json`).
///
/// Only the fields the renderer consumes are modelled; everything else in the
/// report is ignored during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JestReport {
    #[serde(default)]
    pub num_failed_tests: u32,
    #[serde(default)]
    pub num_passed_tests: u32,
    #[serde(default)]
    pub num_total_tests: u32,
    #[serde(default)]
    pub success: bool,
    /// Absent in some truncated reports; treated as no runs.
    #[serde(default)]
    pub test_results: Vec<TestRun>,
}

/// One suite execution: a single test file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    /// Path of the test file.
    #[serde(default)]
    pub name: String,
    /// Overall status of the file (`passed`, `failed`, ...).
    #[serde(default)]
    pub status: String,
    /// Run-level failure message (suite crash output), possibly empty.
    #[serde(default)]
    pub message: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
}

impl TestRun {
    pub fn is_passed(&self) -> bool {
        self.status == STATUS_PASSED
    }

    /// Wall-clock duration of the run, when both timestamps are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// Structured failure record (`failureDetails[]` entry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FailureDetail {
    #[serde(default)]
    pub message: String,
}

/// Failure payload of an assertion.
///
/// Jest emits failures in one of two optional shapes. When a report carries
/// both, `Messages` takes precedence: its first entry is the canonical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Raw strings from `failureMessages`.
    Messages(Vec<String>),
    /// Structured records from `failureDetails`.
    Details(Vec<FailureDetail>),
}

impl Failure {
    /// Build a payload from the two optional raw shapes, applying precedence.
    ///
    /// Returns `None` when neither shape is present and non-empty.
    pub fn from_raw(
        messages: Option<Vec<String>>,
        details: Option<Vec<FailureDetail>>,
    ) -> Option<Self> {
        match (messages, details) {
            (Some(messages), _) if !messages.is_empty() => Some(Failure::Messages(messages)),
            (_, Some(details)) if !details.is_empty() => Some(Failure::Details(details)),
            _ => None,
        }
    }

    /// The canonical message: first entry of whichever shape is held.
    pub fn canonical_message(&self) -> &str {
        match self {
            Failure::Messages(messages) => messages.first().map(String::as_str).unwrap_or(""),
            Failure::Details(details) => details.first().map(|d| d.message.as_str()).unwrap_or(""),
        }
    }
}

/// Wire shape of an assertion result, before the failure payload is resolved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssertionResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    ancestor_titles: Option<Vec<String>>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    failure_messages: Option<Vec<String>>,
    #[serde(default)]
    failure_details: Option<Vec<FailureDetail>>,
}

/// One test case within a test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAssertionResult")]
pub struct AssertionResult {
    pub title: String,
    /// Enclosing `describe` titles, outermost first.
    pub ancestor_titles: Option<Vec<String>>,
    pub status: String,
    pub failure: Option<Failure>,
}

impl From<RawAssertionResult> for AssertionResult {
    fn from(raw: RawAssertionResult) -> Self {
        Self {
            title: raw.title,
            ancestor_titles: raw.ancestor_titles,
            status: raw.status,
            failure: Failure::from_raw(raw.failure_messages, raw.failure_details),
        }
    }
}

impl AssertionResult {
    pub fn is_failing(&self) -> bool {
        self.failure.is_some()
    }

    /// Ancestor titles and the title joined with `" > "`.
    pub fn full_title(&self) -> String {
        match &self.ancestor_titles {
            Some(ancestors) if !ancestors.is_empty() => {
                format!("{} > {}", ancestors.join(" > "), self.title)
            }
            _ => self.title.clone(),
        }
    }
}

// ============================================================================
// JUnit
// ============================================================================

/// Counters of one JUnit report file, or the aggregate of several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JunitSummary {
    pub tests: u64,
    pub skipped: u64,
    pub failures: u64,
    pub errors: u64,
    pub succeeded: u64,
    /// Seconds.
    pub time: f64,
}

/// A JUnit summary together with its rendered markdown table.
#[derive(Debug, Clone, PartialEq)]
pub struct JunitReport {
    pub summary: JunitSummary,
    pub markdown: String,
}

/// A `title, path` pair naming one input file of a multi-file report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitledFile {
    pub title: String,
    pub file: String,
}

// ============================================================================
// Coverage summary
// ============================================================================

/// One metric of an Istanbul `coverage-summary.json` total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub covered: u64,
    #[serde(default)]
    pub skipped: u64,
    /// Percentage; Istanbul writes the string `"Unknown"` for empty totals.
    #[serde(default, deserialize_with = "deserialize_pct")]
    pub pct: f64,
}

fn deserialize_pct<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(0.0))
}

/// The `total` section of an Istanbul coverage summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    #[serde(default)]
    pub lines: MetricSummary,
    #[serde(default)]
    pub statements: MetricSummary,
    #[serde(default)]
    pub functions: MetricSummary,
    #[serde(default)]
    pub branches: MetricSummary,
}

/// Badge colour for a coverage percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageColor {
    Red,
    Orange,
    Yellow,
    Green,
    Brightgreen,
}

impl CoverageColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageColor::Red => "red",
            CoverageColor::Orange => "orange",
            CoverageColor::Yellow => "yellow",
            CoverageColor::Green => "green",
            CoverageColor::Brightgreen => "brightgreen",
        }
    }
}

impl fmt::Display for CoverageColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Comments
// ============================================================================

/// A remote issue or pull request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    /// Author login; absent for deleted ("ghost") users.
    pub author: Option<String>,
    pub body: Option<String>,
}

/// Identity token embedded as the first bytes of every published body.
///
/// Format: `<!-- Jest Coverage Comment: <job> [| <unique-id> ]-->\n`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Watermark(String);

impl Watermark {
    pub fn new(job: &str, unique_id: Option<&str>) -> Self {
        let suffix = match unique_id {
            Some(id) if !id.is_empty() => format!("| {id} "),
            _ => String::new(),
        };
        Self(format!("<!-- {WATERMARK_MARKER}: {job} {suffix}-->\n"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Request context
// ============================================================================

/// Kind of CI event that triggered the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
    PullRequestTarget,
    Other(String),
}

impl EventKind {
    pub fn from_event_name(name: &str) -> Self {
        match name {
            "push" => EventKind::Push,
            "pull_request" => EventKind::PullRequest,
            "pull_request_target" => EventKind::PullRequestTarget,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::PullRequestTarget => "pull_request_target",
            EventKind::Other(name) => name,
        }
    }

    pub fn is_pull_request(&self) -> bool {
        matches!(self, EventKind::PullRequest | EventKind::PullRequestTarget)
    }
}

/// Ambient facts about the repository and the triggering event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// `owner/repo`.
    pub repository: String,
    /// Web root of the hosting service, without trailing slash.
    pub server_url: String,
    pub event: EventKind,
    /// Job id, used in the watermark.
    pub job: String,
    /// Pull request number, when the event carries one.
    pub issue_number: Option<u64>,
    /// Commit SHA the report belongs to.
    pub commit: String,
    /// Head branch name (no `refs/heads/` prefix).
    pub head: Option<String>,
    /// Base branch name for pull requests.
    pub base: Option<String>,
    /// Absolute checkout root, stripped from stack-trace paths.
    pub workspace: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            repository: String::new(),
            server_url: "https://github.com".to_string(),
            event: EventKind::Other(String::new()),
            job: String::new(),
            issue_number: None,
            commit: String::new(),
            head: None,
            base: None,
            workspace: None,
        }
    }
}

impl RequestContext {
    /// Ref used for file links: the head branch, else the commit.
    pub fn link_ref(&self) -> &str {
        self.head.as_deref().unwrap_or(&self.commit)
    }

    /// URL of `path` at `line` in the repository's blob view.
    pub fn blob_url(&self, path: &str, line: u32) -> String {
        format!(
            "{}/{}/blob/{}/{}#L{}",
            self.server_url.trim_end_matches('/'),
            self.repository,
            self.link_ref(),
            path.trim_start_matches('/'),
            line
        )
    }
}

/// A file and line recovered from a stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFrame {
    pub path: String,
    pub line: u32,
}

// ============================================================================
// Tests
// ============================================================================
