//! Markdown rendering for covcomment.
//!
//! Every renderer returns a self-contained GitHub-flavoured markdown fragment.
//! Fragments are joined into the comment body by the application layer.
//!
//! # Example
//!
//! ```rust
//! use covcomment_render::{render_failed_tests, render_junit_table};
//! use covcomment_types::{JunitSummary, RequestContext};
//!
//! let ctx = RequestContext::default();
//! assert_eq!(render_failed_tests(&[], &ctx, true), "");
//!
//! let table = render_junit_table(&JunitSummary::default(), None);
//! assert!(table.starts_with("| Tests | Skipped |"));
//! ```

use covcomment_domain::{coverage_color, failing_assertions, source_link, strip_ansi};
use covcomment_types::{
    AssertionResult, CoverageSummary, JunitSummary, MAX_COMMENT_LENGTH, MetricSummary,
    RequestContext, TestRun,
};

/// Summary tag of an individual failure block.
pub const DEFAULT_SPOILER_TAG: &str = "b";

/// Summary tag of the outer failed-tests block.
pub const FAILED_TESTS_TAG: &str = "h3";

const SHIELDS_BADGE_URL: &str = "https://img.shields.io/badge";

// ============================================================================
// Building blocks
// ============================================================================

/// A collapsible `<details>` block.
///
/// # Examples
///
/// ```rust
/// use covcomment_render::spoiler;
///
/// assert_eq!(
///     spoiler("Title", "body", "b"),
///     "\n<details><summary><b>Title</b></summary>\n<br/>\n\nbody\n\n</details>\n"
/// );
/// ```
pub fn spoiler(summary: &str, body: &str, tag: &str) -> String {
    format!("\n<details><summary><{tag}>{summary}</{tag}></summary>\n<br/>\n\n{body}\n\n</details>\n")
}

/// Wrap text in a fenced code block.
///
/// The fence is one backtick longer than the longest backtick run inside the
/// text, so embedded fences cannot close the block early.
pub fn code_block(code: &str) -> String {
    let longest_run = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    format!("{fence}\n{code}\n{fence}")
}

/// Escape characters that would open markup inside a `<summary>` element.
fn escape_summary(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;")
}

fn escape_pipe(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Round to at most `places` decimals and print without trailing zeros.
fn format_decimal(value: f64, places: i32) -> String {
    let factor = 10f64.powi(places);
    format!("{}", (value * factor).round() / factor)
}

// ============================================================================
// Failed tests
// ============================================================================

fn render_failure(assertion: &AssertionResult, ctx: &RequestContext, include_links: bool) -> String {
    let message = assertion
        .failure
        .as_ref()
        .map(|failure| strip_ansi(failure.canonical_message()))
        .unwrap_or_default();

    let mut body = code_block(&message);
    if include_links && let Some(link) = source_link(&message, ctx) {
        body.push_str("\n\n");
        body.push_str(&link);
    }

    spoiler(&escape_summary(&assertion.full_title()), &body, DEFAULT_SPOILER_TAG)
}

/// Render every failing assertion of every non-passed run.
///
/// Each failure becomes a collapsible block titled with its fully qualified
/// test name, holding the message and, when `include_links` is set and the
/// last stack frame can be located, a link to the source line. All blocks are
/// wrapped in one outer block titled with the failure count.
///
/// Returns the empty string when nothing failed.
pub fn render_failed_tests(runs: &[TestRun], ctx: &RequestContext, include_links: bool) -> String {
    let failing = failing_assertions(runs);
    if failing.is_empty() {
        return String::new();
    }

    let blocks: String = failing
        .iter()
        .map(|assertion| render_failure(assertion, ctx, include_links))
        .collect();

    spoiler(
        &format!("Failed Tests ({})", failing.len()),
        &blocks,
        FAILED_TESTS_TAG,
    )
}

// ============================================================================
// JUnit tables
// ============================================================================

const JUNIT_HEADER: &str = "| Tests | Skipped | Failures | Errors | Time |\n| --- | --- | --- | --- | --- |\n";

const MULTI_JUNIT_HEADER: &str =
    "| Title | Tests | Skipped | Failures | Errors | Time |\n| --- | --- | --- | --- | --- | --- |\n";

fn junit_heading(title: Option<&str>) -> String {
    match title {
        Some(title) if !title.is_empty() => format!("# {title}\n\n"),
        _ => String::new(),
    }
}

/// The counter cells of one JUnit row, without the title cell.
///
/// # Examples
///
/// ```rust
/// use covcomment_render::junit_row;
/// use covcomment_types::JunitSummary;
///
/// let summary = JunitSummary { tests: 5, skipped: 1, failures: 1, errors: 0, succeeded: 3, time: 1.5 };
/// assert_eq!(junit_row(&summary), "| 5 | 1 | 1 | 0 | 1.5s |");
/// ```
pub fn junit_row(summary: &JunitSummary) -> String {
    format!(
        "| {} | {} | {} | {} | {}s |",
        summary.tests,
        summary.skipped,
        summary.failures,
        summary.errors,
        format_decimal(summary.time, 3)
    )
}

/// One-row table for a single JUnit report.
pub fn render_junit_table(summary: &JunitSummary, title: Option<&str>) -> String {
    format!("{}{JUNIT_HEADER}{}\n", junit_heading(title), junit_row(summary))
}

/// Table with one titled row per JUnit report.
pub fn render_multi_junit_table(rows: &[(String, JunitSummary)], title: Option<&str>) -> String {
    let mut table = junit_heading(title);
    table.push_str(MULTI_JUNIT_HEADER);
    for (row_title, summary) in rows {
        table.push_str(&format!("| {} {}\n", escape_pipe(row_title), junit_row(summary)));
    }
    table
}

// ============================================================================
// Coverage summary
// ============================================================================

/// Escape text for the label segment of a shields.io static badge path.
fn shields_label(text: &str) -> String {
    text.replace('-', "--")
        .replace('_', "__")
        .replace('%', "%25")
        .replace(' ', "%20")
}

/// A shields.io badge image for a coverage percentage.
pub fn coverage_badge(badge_title: &str, pct: f64) -> String {
    let pct_text = format_decimal(pct, 2);
    format!(
        "<img alt=\"{badge_title}: {pct_text}%\" src=\"{SHIELDS_BADGE_URL}/{}-{pct_text}%25-{}.svg\" />",
        shields_label(badge_title),
        coverage_color(pct)
    )
}

fn metric_cell(metric: &MetricSummary) -> String {
    format!(
        "{}% ({}/{})",
        format_decimal(metric.pct, 2),
        metric.covered,
        metric.total
    )
}

/// Table of the four Istanbul totals; the lines column holds the badge.
pub fn render_coverage_summary(
    summary: &CoverageSummary,
    badge_title: &str,
    summary_title: Option<&str>,
) -> String {
    format!(
        "{}| Lines | Statements | Branches | Functions |\n| --- | --- | --- | --- |\n| {}<br/> | {} | {} | {} |\n",
        junit_heading(summary_title),
        coverage_badge(badge_title, summary.lines.pct),
        metric_cell(&summary.statements),
        metric_cell(&summary.branches),
        metric_cell(&summary.functions),
    )
}

// ============================================================================
// Status lines
// ============================================================================

/// Headline lines shown above the tables.
///
/// Each line is emitted only for a non-zero value.
///
/// # Examples
///
/// ```rust
/// use covcomment_render::render_status_lines;
/// use covcomment_types::JunitSummary;
///
/// let summary = JunitSummary { tests: 3, failures: 1, succeeded: 2, ..Default::default() };
/// assert_eq!(
///     render_status_lines(&summary, Some(80.0)),
///     "**❌ 1 failed**\n **✅ 2 passed**\n**📊 80% coverage**\n"
/// );
/// ```
pub fn render_status_lines(summary: &JunitSummary, coverage: Option<f64>) -> String {
    let mut lines = String::new();
    if summary.failures > 0 {
        lines.push_str(&format!("**❌ {} failed**\n", summary.failures));
    }
    if summary.succeeded > 0 {
        lines.push_str(&format!(" **✅ {} passed**\n", summary.succeeded));
    }
    if let Some(pct) = coverage.filter(|pct| *pct > 0.0) {
        lines.push_str(&format!("**📊 {}% coverage**\n", format_decimal(pct, 2)));
    }
    lines
}

// ============================================================================
// Size warning
// ============================================================================

/// Warning logged instead of publishing an oversize body.
///
/// Only toggles that are not already enabled are suggested.
pub fn render_size_warning(hide_summary: bool, remove_links_to_lines: bool) -> String {
    let mut lines = vec![
        format!(
            "Your comment is too long (maximum is {MAX_COMMENT_LENGTH} characters), coverage report will not be added."
        ),
        "Try one/some of the following:".to_string(),
    ];
    if !hide_summary {
        lines.push("- Set \"hide_summary = true\" - to remove the summary report".to_string());
    }
    if !remove_links_to_lines {
        lines.push("- Set \"remove_links_to_lines = true\" - to remove links to lines".to_string());
    }
    lines.push("- Set \"hide_comment = true\" - to keep only the action outputs".to_string());
    lines.join("\n")
}

// ============================================================================
// Tests
// ============================================================================
