//! Pure domain logic for covcomment.
//!
//! Nothing in this crate performs I/O. It covers:
//! - recovering a source location from the last frame of a failure message
//! - stripping terminal control sequences from test output
//! - folding JUnit summaries into an aggregate
//! - deciding whether a remote comment is one we authored
//! - the comment size guard and coverage badge colour

use std::sync::LazyLock;

use covcomment_types::{
    ANONYMOUS_FRAME_MARKER, AssertionResult, BOT_LOGIN, Comment, CoverageColor, JunitSummary,
    MAX_COMMENT_LENGTH, RequestContext, SourceFrame, TestRun, Watermark,
};
use regex::Regex;

// ============================================================================
// ANSI Stripping
// ============================================================================

/// CSI sequences (colours, cursor movement) and OSC sequences (hyperlinks).
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI pattern is valid")
});

/// Remove ANSI escape sequences from test runner output.
///
/// # Examples
///
/// ```
/// use covcomment_domain::strip_ansi;
///
/// assert_eq!(strip_ansi("\u{1b}[31mExpected\u{1b}[39m: 1"), "Expected: 1");
/// ```
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

// ============================================================================
// Stack Trace Location
// ============================================================================

/// Recover `(path, line)` from the last non-empty line of a failure message.
///
/// Only frames of the shape `at Object.<anonymous> (<path>:<line>[:<col>])`
/// are recognised. Anything else yields `None`; most failures (plain
/// assertion diffs) have no such frame.
///
/// # Examples
///
/// ```
/// use covcomment_domain::locate_stack_frame;
///
/// let frame = locate_stack_frame("  at Object.<anonymous> (src/foo.ts:12:5)").unwrap();
/// assert_eq!(frame.path, "src/foo.ts");
/// assert_eq!(frame.line, 12);
/// assert!(locate_stack_frame("expect(received).toBe(expected)").is_none());
/// ```
pub fn locate_stack_frame(message: &str) -> Option<SourceFrame> {
    let last = message.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    if !last.starts_with(ANONYMOUS_FRAME_MARKER) {
        return None;
    }

    let open = last.find('(')?;
    let close = last.rfind(')')?;
    if close <= open {
        return None;
    }
    let location = &last[open + 1..close];

    let segments: Vec<&str> = location.split(':').collect();
    if segments.len() < 2 {
        return None;
    }

    // `path:line:col` when the last two segments are numeric, else `path:line`.
    let is_numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let line_index = if segments.len() >= 3
        && is_numeric(segments[segments.len() - 1])
        && is_numeric(segments[segments.len() - 2])
    {
        segments.len() - 2
    } else {
        segments.len() - 1
    };

    let line: u32 = segments[line_index].parse().ok()?;
    let path = segments[..line_index].join(":");
    if path.trim().is_empty() {
        return None;
    }

    Some(SourceFrame { path, line })
}

/// Make a frame path repository-relative.
///
/// Backslashes become forward slashes and the workspace prefix, when it
/// matches, is removed.
pub fn relative_to_workspace(path: &str, workspace: Option<&str>) -> String {
    let normalized = path.replace('\\', "/");
    if let Some(root) = workspace {
        let root = root.replace('\\', "/");
        let root = root.trim_end_matches('/');
        if !root.is_empty()
            && let Some(rest) = normalized.strip_prefix(root)
            && rest.starts_with('/')
        {
            return rest.trim_start_matches('/').to_string();
        }
    }
    normalized.trim_start_matches("./").to_string()
}

/// Link to the source line named by the message's last stack frame.
pub fn source_link(message: &str, ctx: &RequestContext) -> Option<String> {
    let frame = locate_stack_frame(message)?;
    let path = relative_to_workspace(&frame.path, ctx.workspace.as_deref());
    Some(ctx.blob_url(&path, frame.line))
}

// ============================================================================
// Failure Selection
// ============================================================================

/// Failing assertions of every non-passed run, in report order.
pub fn failing_assertions(runs: &[TestRun]) -> Vec<&AssertionResult> {
    runs.iter()
        .filter(|run| !run.is_passed())
        .flat_map(|run| run.assertion_results.iter())
        .filter(|assertion| assertion.is_failing())
        .collect()
}

// ============================================================================
// JUnit Folding
// ============================================================================

/// Fold one file's summary into a running total.
///
/// Every counter is summed except `succeeded`, which is replaced by the
/// incoming value: the aggregate reports the last file's `succeeded`.
pub fn accumulate_junit(total: &mut JunitSummary, next: &JunitSummary) {
    total.tests = total.tests.saturating_add(next.tests);
    total.skipped = total.skipped.saturating_add(next.skipped);
    total.failures = total.failures.saturating_add(next.failures);
    total.errors = total.errors.saturating_add(next.errors);
    total.time += next.time;
    // TODO: decide whether `succeeded` should be summed like the other counters.
    total.succeeded = next.succeeded;
}

/// Fold a sequence of summaries starting from zero.
pub fn fold_junit<'a>(summaries: impl IntoIterator<Item = &'a JunitSummary>) -> JunitSummary {
    let mut total = JunitSummary::default();
    for summary in summaries {
        accumulate_junit(&mut total, summary);
    }
    total
}

// ============================================================================
// Comment Ownership
// ============================================================================

/// Whether a remote comment was authored by us for this watermark.
pub fn is_own_comment(comment: &Comment, watermark: &Watermark) -> bool {
    comment.author.as_deref() == Some(BOT_LOGIN)
        && comment
            .body
            .as_deref()
            .is_some_and(|body| body.starts_with(watermark.as_str()))
}

/// Whether a body is too long to publish.
///
/// Length is measured in UTF-16 code units, the unit the comment API limits.
pub fn exceeds_comment_limit(body: &str) -> bool {
    body.encode_utf16().count() > MAX_COMMENT_LENGTH
}

// ============================================================================
// Coverage
// ============================================================================

/// Badge colour for a coverage percentage.
pub fn coverage_color(pct: f64) -> CoverageColor {
    if pct < 40.0 {
        CoverageColor::Red
    } else if pct < 60.0 {
        CoverageColor::Orange
    } else if pct < 80.0 {
        CoverageColor::Yellow
    } else if pct < 90.0 {
        CoverageColor::Green
    } else {
        CoverageColor::Brightgreen
    }
}

// ============================================================================
// Tests
// ============================================================================
