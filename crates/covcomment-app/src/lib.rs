//! Application orchestration for covcomment.
//!
//! This crate ties the adapters, the domain and the renderers together:
//!
//! 1. Load the coverage summary, JUnit and Jest reports named by the config
//! 2. Render and compose the comment body
//! 3. Locate comments published by earlier runs of the same job
//! 4. Apply the publishing transition for the triggering event
//!
//! # Example
//!
//! ```rust,ignore
//! use covcomment_app::{PublishOptions, build_report, publish_or_log};
//!
//! let report = build_report(&config, &ctx, &reader);
//! if !report.is_empty() {
//!     let watermark = Watermark::new(&ctx.job, None);
//!     let body = report.body(&watermark);
//!     publish_or_log(&client, &ctx, &PublishOptions::from(&config), &watermark, &body).await;
//! }
//! ```

use covcomment_adapters_jest::parse_jest_report;
use covcomment_adapters_junit::parse_junit_xml;
use covcomment_adapters_summary::parse_coverage_summary;
use covcomment_config::{EffectiveConfig, parse_titled_file};
use covcomment_domain::{coverage_color, exceeds_comment_limit, fold_junit, is_own_comment};
use covcomment_ports::{ArtifactReader, CommentApi};
use covcomment_render::{
    render_coverage_summary, render_failed_tests, render_junit_table, render_multi_junit_table,
    render_size_warning, render_status_lines,
};
use covcomment_types::{
    Comment, CoverageColor, CoverageSummary, EventKind, JunitReport, JunitSummary,
    REQUESTED_COMMENTS_PER_PAGE, RequestContext, UPDATE_LOOKUP_PAGE_SIZE, Watermark,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while publishing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppError {
    /// Listing existing comments failed.
    #[error("Failed to list comments: {0}")]
    ListComments(String),

    /// Creating an issue or pull request comment failed.
    #[error("Failed to create comment: {0}")]
    CreateComment(String),

    /// Updating an existing comment failed.
    #[error("Failed to update comment {id}: {message}")]
    UpdateComment { id: u64, message: String },

    /// Creating a commit comment failed.
    #[error("Failed to create commit comment: {0}")]
    CommitComment(String),

    /// A pull request event without a pull request number.
    #[error("'{0}' event does not carry a pull request number")]
    MissingIssueNumber(String),
}

// ============================================================================
// Report inputs
// ============================================================================

fn read_artifact<R: ArtifactReader + ?Sized>(reader: &R, path: &str, kind: &str) -> Option<String> {
    match reader.read_artifact(path) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to read {kind} {path}: {e}");
            None
        }
    }
}

/// Load the `total` section of an Istanbul coverage summary.
pub fn load_coverage_summary<R: ArtifactReader + ?Sized>(
    path: &str,
    reader: &R,
) -> Option<CoverageSummary> {
    let text = read_artifact(reader, path, "coverage summary")?;
    match parse_coverage_summary(&text) {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!("Failed to parse {path}: {e}");
            None
        }
    }
}

fn load_junit_summary<R: ArtifactReader + ?Sized>(path: &str, reader: &R) -> Option<JunitSummary> {
    let text = read_artifact(reader, path, "JUnit report")?;
    match parse_junit_xml(&text) {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!("Failed to parse {path}: {e}");
            None
        }
    }
}

/// Render the failed-tests section from a Jest JSON report.
///
/// An unreadable or unparsable report yields an empty fragment.
pub fn load_failed_tests<R: ArtifactReader + ?Sized>(
    path: &str,
    reader: &R,
    ctx: &RequestContext,
    include_links: bool,
) -> String {
    let Some(text) = read_artifact(reader, path, "Jest report") else {
        return String::new();
    };
    match parse_jest_report(&text) {
        Ok(report) => {
            info!(
                failed = report.num_failed_tests,
                passed = report.num_passed_tests,
                total = report.num_total_tests,
                success = report.success,
                "Jest report loaded"
            );
            for run in report.test_results.iter().filter(|run| !run.is_passed()) {
                debug!(
                    file = %run.name,
                    duration_ms = run.duration().map(|d| d.num_milliseconds()),
                    "Failed test file"
                );
            }
            render_failed_tests(&report.test_results, ctx, include_links)
        }
        Err(e) => {
            error!("Failed to parse {path} as JSON: {e}");
            String::new()
        }
    }
}

/// Summary and one-row table for a single JUnit report.
pub fn single_junit_report<R: ArtifactReader + ?Sized>(
    path: &str,
    reader: &R,
    junit_title: Option<&str>,
) -> Option<JunitReport> {
    let summary = load_junit_summary(path, reader)?;
    Some(JunitReport {
        summary,
        markdown: render_junit_table(&summary, junit_title),
    })
}

/// Aggregate several JUnit reports named by `title, path` lines.
///
/// Lines that do not parse and files that cannot be read or parsed are
/// skipped. Returns `None` when nothing usable remains, which is distinct
/// from a report whose counters are all zero.
///
/// Counters and time are summed over the parsed files; `succeeded` is the
/// value of the last parsed file.
pub fn junit_report_from_files<R: ArtifactReader + ?Sized>(
    lines: &[String],
    reader: &R,
    junit_title: Option<&str>,
) -> Option<JunitReport> {
    let entries: Vec<_> = lines.iter().filter_map(|line| parse_titled_file(line)).collect();
    if entries.is_empty() {
        error!("Generating report for multiple JUnit files. No files are provided");
        return None;
    }

    let rows: Vec<(String, JunitSummary)> = entries
        .into_iter()
        .filter_map(|entry| {
            load_junit_summary(&entry.file, reader).map(|summary| (entry.title, summary))
        })
        .collect();
    if rows.is_empty() {
        return None;
    }

    Some(JunitReport {
        summary: fold_junit(rows.iter().map(|(_, summary)| summary)),
        markdown: render_multi_junit_table(&rows, junit_title),
    })
}

// ============================================================================
// Report assembly
// ============================================================================

/// Values exposed to later workflow steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutputs {
    /// Lines coverage percentage.
    pub coverage: Option<f64>,
    pub color: Option<CoverageColor>,
    pub summary_html: Option<String>,
    pub junit: Option<JunitSummary>,
    pub junit_html: Option<String>,
}

impl ActionOutputs {
    /// Output names and values, in a stable order. Absent values are omitted.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(coverage) = self.coverage {
            entries.push(("coverage", coverage.to_string()));
        }
        if let Some(color) = self.color {
            entries.push(("color", color.to_string()));
        }
        if let Some(html) = &self.summary_html {
            entries.push(("summaryHtml", html.clone()));
        }
        if let Some(junit) = &self.junit {
            entries.push(("tests", junit.tests.to_string()));
            entries.push(("skipped", junit.skipped.to_string()));
            entries.push(("failures", junit.failures.to_string()));
            entries.push(("errors", junit.errors.to_string()));
            entries.push(("time", junit.time.to_string()));
        }
        if let Some(html) = &self.junit_html {
            entries.push(("junitHtml", html.clone()));
        }
        entries
    }
}

/// The rendered comment content and the action outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Comment content without the watermark; empty when there is nothing to report.
    pub content: String,
    pub outputs: ActionOutputs,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The publishable body: watermark first, then the content.
    pub fn body(&self, watermark: &Watermark) -> String {
        format!("{watermark}{}", self.content)
    }
}

/// Join the optional title heading and the non-empty fragments.
///
/// Every fragment is preceded by a blank-line separator.
///
/// # Examples
///
/// ```
/// use covcomment_app::compose_body;
///
/// assert_eq!(compose_body(Some("Report"), &["a", "", "b"]), "# Report\n\n\n\na\n\nb");
/// assert_eq!(compose_body(None, &["", ""]), "");
/// ```
pub fn compose_body(title: Option<&str>, fragments: &[&str]) -> String {
    let mut body = String::new();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        body.push_str(&format!("# {title}\n\n"));
    }
    for fragment in fragments.iter().filter(|f| !f.is_empty()) {
        body.push_str("\n\n");
        body.push_str(fragment);
    }
    body
}

/// Load every configured input and render the comment content.
///
/// Inputs that are missing or fail to parse are logged and left out; they
/// never abort the run.
pub fn build_report<R: ArtifactReader + ?Sized>(
    config: &EffectiveConfig,
    ctx: &RequestContext,
    reader: &R,
) -> Report {
    let mut outputs = ActionOutputs::default();

    let summary = config
        .summary_file
        .as_deref()
        .and_then(|path| load_coverage_summary(path, reader));
    let summary_html = summary.map(|summary| {
        render_coverage_summary(&summary, &config.badge_title, config.summary_title.as_deref())
    });
    if let Some(summary) = &summary {
        let coverage = summary.lines.pct;
        let color = coverage_color(coverage);
        info!(coverage, color = %color, "coverage summary loaded");
        outputs.coverage = Some(coverage);
        outputs.color = Some(color);
        outputs.summary_html = summary_html.clone();
    }

    let mut junit = config
        .junit_file
        .as_deref()
        .and_then(|path| single_junit_report(path, reader, config.junit_title.as_deref()));
    if !config.multiple_junit_files.is_empty()
        && let Some(report) = junit_report_from_files(
            &config.multiple_junit_files,
            reader,
            config.junit_title.as_deref(),
        )
    {
        junit = Some(report);
    }
    if let Some(report) = &junit {
        let s = &report.summary;
        info!(
            tests = s.tests,
            skipped = s.skipped,
            failures = s.failures,
            errors = s.errors,
            time = s.time,
            "JUnit summary loaded"
        );
        outputs.junit = Some(report.summary);
        outputs.junit_html = Some(report.markdown.clone());
    }

    let status_lines = junit
        .as_ref()
        .map(|report| render_status_lines(&report.summary, outputs.coverage))
        .unwrap_or_default();

    let failed_tests = config
        .jest_report_file
        .as_deref()
        .map(|path| load_failed_tests(path, reader, ctx, !config.remove_links_to_lines))
        .unwrap_or_default();

    let summary_fragment = match &summary_html {
        Some(html) if !config.hide_summary => html.as_str(),
        _ => "",
    };
    let junit_fragment = junit.as_ref().map_or("", |report| report.markdown.as_str());

    let content = compose_body(
        config.title.as_deref(),
        &[
            status_lines.as_str(),
            summary_fragment,
            junit_fragment,
            failed_tests.as_str(),
        ],
    );

    Report { content, outputs }
}

// ============================================================================
// Comment location
// ============================================================================

/// Fetch every comment on an issue, page by page, in API order.
///
/// Pages are requested from 1 until one holds fewer than
/// `REQUESTED_COMMENTS_PER_PAGE` comments.
pub async fn list_all_comments<A: CommentApi + ?Sized>(
    api: &A,
    issue_number: u64,
) -> Result<Vec<Comment>, AppError> {
    let mut page = 1_u32;
    let mut comments = Vec::new();
    loop {
        let chunk = api
            .list_issue_comments(issue_number, page, REQUESTED_COMMENTS_PER_PAGE)
            .await
            .map_err(AppError::ListComments)?;
        let chunk_len = chunk.len();
        comments.extend(chunk);
        if chunk_len < REQUESTED_COMMENTS_PER_PAGE as usize {
            break;
        }
        page = page.saturating_add(1);
    }
    Ok(comments)
}

/// Every comment on an issue that carries our watermark, in API order.
pub async fn find_own_comments<A: CommentApi + ?Sized>(
    api: &A,
    issue_number: u64,
    watermark: &Watermark,
) -> Result<Vec<Comment>, AppError> {
    let comments = list_all_comments(api, issue_number).await?;
    Ok(comments
        .into_iter()
        .filter(|comment| is_own_comment(comment, watermark))
        .collect())
}

/// Delete our earlier comments. A failed delete is logged and skipped.
///
/// Returns the ids that were deleted.
async fn delete_own_comments<A: CommentApi + ?Sized>(
    api: &A,
    issue_number: u64,
    watermark: &Watermark,
) -> Result<Vec<u64>, AppError> {
    let mut deleted = Vec::new();
    for comment in find_own_comments(api, issue_number, watermark).await? {
        debug!("Deleting comment: {}", comment.id);
        match api.delete_issue_comment(comment.id).await {
            Ok(()) => deleted.push(comment.id),
            Err(e) => warn!("Failed to delete comment: {}. {e}", comment.id),
        }
    }
    Ok(deleted)
}

// ============================================================================
// Publishing
// ============================================================================

/// Switches that shape the publishing transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub create_new_comment: bool,
    pub delete_old_comments: bool,
    pub hide_comment: bool,
    /// Used only to tailor the oversize warning.
    pub hide_summary: bool,
    /// Used only to tailor the oversize warning.
    pub remove_links_to_lines: bool,
}

impl From<&EffectiveConfig> for PublishOptions {
    fn from(config: &EffectiveConfig) -> Self {
        Self {
            create_new_comment: config.create_new_comment,
            delete_old_comments: config.delete_old_comments,
            hide_comment: config.hide_comment,
            hide_summary: config.hide_summary,
            remove_links_to_lines: config.remove_links_to_lines,
        }
    }
}

/// What a publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Push event: a comment on the commit.
    CommitComment { id: u64 },
    /// A new pull request comment, after deleting `deleted`.
    Created { id: u64, deleted: Vec<u64> },
    /// An earlier pull request comment was replaced in place.
    Updated { id: u64 },
    /// The body was over the size limit; nothing was sent.
    SkippedOversize,
    /// The event cannot carry comments; nothing was sent.
    UnsupportedEvent,
}

/// Whether comments can be published for this event.
pub fn supports_comments(event: &EventKind) -> bool {
    *event == EventKind::Push || event.is_pull_request()
}

/// Warning logged for events that cannot carry comments.
pub fn unsupported_event_message(event: &EventKind) -> String {
    format!(
        "This action supports comments only on 'pull_request', 'pull_request_target' and 'push' events. '{}' events are not supported.\nYou can use the output of the action.",
        event.as_str()
    )
}

/// Publish `body` for the event described by `ctx`.
///
/// - oversize body: warning, nothing sent
/// - push: one commit comment
/// - pull request with `create_new_comment`: optionally delete every earlier
///   comment of ours, then create
/// - pull request otherwise: update our comment on the first page in place,
///   or create one
/// - any other event: warning unless `hide_comment`, nothing sent
///
/// Delete failures are logged and do not fail the publish; every other API
/// failure is returned.
pub async fn publish<A: CommentApi + ?Sized>(
    api: &A,
    ctx: &RequestContext,
    options: &PublishOptions,
    watermark: &Watermark,
    body: &str,
) -> Result<PublishOutcome, AppError> {
    if exceeds_comment_limit(body) {
        warn!(
            "{}",
            render_size_warning(options.hide_summary, options.remove_links_to_lines)
        );
        return Ok(PublishOutcome::SkippedOversize);
    }

    match &ctx.event {
        EventKind::Push => {
            info!("Create commit comment");
            let id = api
                .create_commit_comment(&ctx.commit, body)
                .await
                .map_err(AppError::CommitComment)?;
            Ok(PublishOutcome::CommitComment { id })
        }
        event if event.is_pull_request() => {
            let issue_number = ctx
                .issue_number
                .ok_or_else(|| AppError::MissingIssueNumber(event.as_str().to_string()))?;

            if options.create_new_comment {
                let deleted = if options.delete_old_comments {
                    info!("Deleting old comments");
                    delete_own_comments(api, issue_number, watermark).await?
                } else {
                    Vec::new()
                };
                info!("Creating a new comment");
                let id = api
                    .create_issue_comment(issue_number, body)
                    .await
                    .map_err(AppError::CreateComment)?;
                return Ok(PublishOutcome::Created { id, deleted });
            }

            let first_page = api
                .list_issue_comments(issue_number, 1, UPDATE_LOOKUP_PAGE_SIZE)
                .await
                .map_err(AppError::ListComments)?;
            match first_page.iter().find(|c| is_own_comment(c, watermark)) {
                Some(existing) => {
                    info!("Found previous comment, updating");
                    let id = existing.id;
                    api.update_issue_comment(id, body)
                        .await
                        .map_err(|message| AppError::UpdateComment { id, message })?;
                    Ok(PublishOutcome::Updated { id })
                }
                None => {
                    info!("No previous comment found, creating a new one");
                    let id = api
                        .create_issue_comment(issue_number, body)
                        .await
                        .map_err(AppError::CreateComment)?;
                    Ok(PublishOutcome::Created {
                        id,
                        deleted: Vec::new(),
                    })
                }
            }
        }
        event => {
            if !options.hide_comment {
                warn!("{}", unsupported_event_message(event));
            }
            Ok(PublishOutcome::UnsupportedEvent)
        }
    }
}

/// [`publish`], with any error logged as the run's comment error.
///
/// Never fails: a comment that cannot be published must not fail the job.
pub async fn publish_or_log<A: CommentApi + ?Sized>(
    api: &A,
    ctx: &RequestContext,
    options: &PublishOptions,
    watermark: &Watermark,
    body: &str,
) -> Option<PublishOutcome> {
    match publish(api, ctx, options, watermark, body).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!("{e}");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use covcomment_types::{BOT_LOGIN, MAX_COMMENT_LENGTH};
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct MemoryReader {
        files: HashMap<String, String>,
    }

    impl MemoryReader {
        fn with(mut self, path: &str, content: &str) -> Self {
            self.files.insert(path.to_string(), content.to_string());
            self
        }
    }

    impl ArtifactReader for MemoryReader {
        fn read_artifact(&self, path: &str) -> Result<String, String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| format!("failed to read {path}: not found"))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        List { page: u32, per_page: u32 },
        Create { issue: u64 },
        Update { id: u64 },
        Delete { id: u64 },
        CommitComment { sha: String },
    }

    #[derive(Default)]
    struct FakeApi {
        comments: Vec<Comment>,
        failing_deletes: Vec<u64>,
        fail_create: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeApi {
        fn with_comments(comments: Vec<Comment>) -> Self {
            Self {
                comments,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl CommentApi for FakeApi {
        async fn list_issue_comments(
            &self,
            _issue_number: u64,
            page: u32,
            per_page: u32,
        ) -> Result<Vec<Comment>, String> {
            self.record(Call::List { page, per_page });
            let start = ((page.max(1) - 1) * per_page) as usize;
            Ok(self
                .comments
                .iter()
                .skip(start)
                .take(per_page as usize)
                .cloned()
                .collect())
        }

        async fn create_issue_comment(&self, issue_number: u64, _body: &str) -> Result<u64, String> {
            self.record(Call::Create {
                issue: issue_number,
            });
            if self.fail_create {
                return Err("github api create issue comment failed with status 403".to_string());
            }
            Ok(1000)
        }

        async fn update_issue_comment(&self, comment_id: u64, _body: &str) -> Result<(), String> {
            self.record(Call::Update { id: comment_id });
            Ok(())
        }

        async fn delete_issue_comment(&self, comment_id: u64) -> Result<(), String> {
            self.record(Call::Delete { id: comment_id });
            if self.failing_deletes.contains(&comment_id) {
                return Err("not found".to_string());
            }
            Ok(())
        }

        async fn create_commit_comment(&self, commit_sha: &str, _body: &str) -> Result<u64, String> {
            self.record(Call::CommitComment {
                sha: commit_sha.to_string(),
            });
            Ok(2000)
        }
    }

    fn watermark() -> Watermark {
        Watermark::new("test", None)
    }

    fn ours(id: u64) -> Comment {
        Comment {
            id,
            author: Some(BOT_LOGIN.to_string()),
            body: Some(format!("{}report {id}", watermark())),
        }
    }

    fn theirs(id: u64) -> Comment {
        Comment {
            id,
            author: Some("octocat".to_string()),
            body: Some(format!("{}copied", watermark())),
        }
    }

    fn pr_ctx() -> RequestContext {
        RequestContext {
            repository: "acme/widgets".to_string(),
            event: EventKind::PullRequest,
            job: "test".to_string(),
            issue_number: Some(7),
            commit: "headsha".to_string(),
            ..Default::default()
        }
    }

    fn junit(tests: u64, failures: u64, skipped: u64, time: &str) -> String {
        format!(
            r#"<testsuites tests="{tests}" failures="{failures}" errors="0" time="{time}"><testsuite tests="{tests}" skipped="{skipped}"/></testsuites>"#
        )
    }

    // ------------------------------------------------------------------------
    // JUnit aggregation
    // ------------------------------------------------------------------------

    #[test]
    fn test_junit_aggregate_sums_and_keeps_last_succeeded() {
        let reader = MemoryReader::default()
            .with("unit.xml", &junit(10, 2, 1, "1.5"))
            .with("e2e.xml", &junit(4, 0, 0, "2.5"));
        let lines = vec!["Unit, unit.xml".to_string(), "E2E, e2e.xml".to_string()];

        let report = junit_report_from_files(&lines, &reader, Some("Tests")).unwrap();
        assert_eq!(report.summary.tests, 14);
        assert_eq!(report.summary.failures, 2);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.time, 4.0);
        // Last file: 4 - 0 - 0 - 0.
        assert_eq!(report.summary.succeeded, 4);
        assert_eq!(
            report.markdown,
            "# Tests\n\n| Title | Tests | Skipped | Failures | Errors | Time |\n\
             | --- | --- | --- | --- | --- | --- |\n\
             | Unit | 10 | 1 | 2 | 0 | 1.5s |\n\
             | E2E | 4 | 0 | 0 | 0 | 2.5s |\n"
        );
    }

    #[test]
    fn test_junit_aggregate_skips_broken_inputs() {
        let reader = MemoryReader::default()
            .with("good.xml", &junit(3, 0, 0, "1"))
            .with("bad.xml", "<html></html>");
        let lines = vec![
            "no comma here".to_string(),
            "Missing, missing.xml".to_string(),
            "Bad, bad.xml".to_string(),
            "Good, good.xml".to_string(),
        ];

        let report = junit_report_from_files(&lines, &reader, None).unwrap();
        assert_eq!(report.summary.tests, 3);
        assert!(report.markdown.contains("| Good | 3 |"));
        assert!(!report.markdown.contains("Bad"));
        assert!(!report.markdown.starts_with('#'));
    }

    #[test]
    fn test_junit_aggregate_absent_when_nothing_resolves() {
        let reader = MemoryReader::default();
        assert!(junit_report_from_files(&["only-a-path.xml".to_string()], &reader, None).is_none());
        assert!(junit_report_from_files(&["T, missing.xml".to_string()], &reader, None).is_none());
        assert!(junit_report_from_files(&[], &reader, None).is_none());
    }

    #[test]
    fn test_junit_aggregate_all_zero_is_present() {
        let reader = MemoryReader::default().with("empty.xml", "<testsuites/>");
        let report =
            junit_report_from_files(&["Empty, empty.xml".to_string()], &reader, None).unwrap();
        assert_eq!(report.summary, JunitSummary::default());
    }

    // ------------------------------------------------------------------------
    // Report assembly
    // ------------------------------------------------------------------------

    const JEST_REPORT: &str = r#"{"success": false, "testResults": [
        {"name": "a.test.ts", "status": "failed", "message": "boom", "assertionResults": [
            {"title": "adds", "ancestorTitles": ["math"], "status": "failed",
             "failureMessages": ["Error: boom\n    at Object.<anonymous> (src/a.test.ts:3:1)"]}
        ]}
    ]}"#;

    const SUMMARY: &str = r#"{"total": {
        "lines": {"total": 10, "covered": 8, "skipped": 0, "pct": 80},
        "statements": {"total": 10, "covered": 8, "skipped": 0, "pct": 80},
        "functions": {"total": 2, "covered": 2, "skipped": 0, "pct": 100},
        "branches": {"total": 4, "covered": 1, "skipped": 0, "pct": 25}
    }}"#;

    fn full_reader() -> MemoryReader {
        MemoryReader::default()
            .with("summary.json", SUMMARY)
            .with("junit.xml", &junit(5, 1, 0, "2"))
            .with("report.json", JEST_REPORT)
    }

    fn full_config() -> EffectiveConfig {
        EffectiveConfig {
            title: Some("Coverage report".to_string()),
            summary_file: Some("summary.json".to_string()),
            junit_file: Some("junit.xml".to_string()),
            jest_report_file: Some("report.json".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_report_fragment_order() {
        let report = build_report(&full_config(), &pr_ctx(), &full_reader());
        let content = &report.content;

        assert!(content.starts_with("# Coverage report\n\n\n\n**❌ 1 failed**\n **✅ 4 passed**\n**📊 80% coverage**\n"));
        let summary_at = content.find("| Lines | Statements").unwrap();
        let junit_at = content.find("| Tests | Skipped").unwrap();
        let failed_at = content.find("Failed Tests (1)").unwrap();
        assert!(summary_at < junit_at && junit_at < failed_at);
        assert!(content.contains("https://github.com/acme/widgets/blob/headsha/src/a.test.ts#L3"));
    }

    #[test]
    fn test_build_report_outputs() {
        let report = build_report(&full_config(), &pr_ctx(), &full_reader());
        let entries: HashMap<_, _> = report.outputs.entries().into_iter().collect();

        assert_eq!(entries["coverage"], "80");
        assert_eq!(entries["color"], "green");
        assert_eq!(entries["tests"], "5");
        assert_eq!(entries["failures"], "1");
        assert_eq!(entries["time"], "2");
        assert!(entries["summaryHtml"].contains("| Lines |"));
        assert!(entries["junitHtml"].contains("| Tests |"));
    }

    #[test]
    fn test_build_report_hide_summary_keeps_output() {
        let config = EffectiveConfig {
            hide_summary: true,
            ..full_config()
        };
        let report = build_report(&config, &pr_ctx(), &full_reader());
        assert!(!report.content.contains("| Lines |"));
        assert!(report.outputs.summary_html.is_some());
    }

    #[test]
    fn test_build_report_without_links() {
        let config = EffectiveConfig {
            remove_links_to_lines: true,
            ..full_config()
        };
        let report = build_report(&config, &pr_ctx(), &full_reader());
        assert!(report.content.contains("Failed Tests (1)"));
        assert!(!report.content.contains("/blob/"));
    }

    #[test]
    fn test_load_failed_tests_renders_only_failed_files() {
        let json = r#"{
            "numFailedTests": 1, "numPassedTests": 1, "numTotalTests": 2, "success": false,
            "testResults": [
                {"name": "a.test.ts", "status": "passed",
                 "startTime": 1700000000000, "endTime": 1700000000100,
                 "assertionResults": [{"title": "ok", "status": "passed"}]},
                {"name": "b.test.ts", "status": "failed",
                 "startTime": 1700000000000, "endTime": 1700000000900,
                 "assertionResults": [{"title": "boom", "ancestorTitles": ["suite"],
                   "status": "failed", "failureMessages": ["Error: boom"]}]}
            ]
        }"#;
        let reader = MemoryReader::default().with("jest.json", json);
        let md = load_failed_tests("jest.json", &reader, &pr_ctx(), true);
        assert!(md.contains("Failed Tests (1)"));
        assert!(md.contains("suite > boom"));
        assert!(md.contains("Error: boom"));
        assert!(!md.contains(">ok<"));
    }

    #[test]
    fn test_load_failed_tests_unparsable_report_is_empty() {
        let reader = MemoryReader::default().with("jest.json", "{not json");
        assert_eq!(load_failed_tests("jest.json", &reader, &pr_ctx(), true), "");
    }

    #[test]
    fn test_build_report_multiple_junit_wins() {
        let reader = full_reader().with("other.xml", &junit(2, 0, 0, "1"));
        let config = EffectiveConfig {
            multiple_junit_files: vec!["Other, other.xml".to_string()],
            ..full_config()
        };
        let report = build_report(&config, &pr_ctx(), &reader);
        assert!(report.content.contains("| Other | 2 |"));
        assert_eq!(report.outputs.junit.map(|j| j.tests), Some(2));
    }

    #[test]
    fn test_build_report_nothing_configured_is_empty() {
        let report = build_report(&EffectiveConfig::default(), &pr_ctx(), &MemoryReader::default());
        assert!(report.is_empty());
        assert!(report.outputs.entries().is_empty());
    }

    #[test]
    fn test_build_report_tolerates_broken_inputs() {
        let reader = MemoryReader::default()
            .with("summary.json", "{")
            .with("report.json", "not json");
        let config = EffectiveConfig {
            summary_file: Some("summary.json".to_string()),
            junit_file: Some("missing.xml".to_string()),
            jest_report_file: Some("report.json".to_string()),
            ..Default::default()
        };
        let report = build_report(&config, &pr_ctx(), &reader);
        assert!(report.is_empty());
    }

    #[test]
    fn test_body_starts_with_watermark() {
        let report = Report {
            content: "# T\n\n".to_string(),
            outputs: ActionOutputs::default(),
        };
        assert_eq!(
            report.body(&Watermark::new("build", Some("node-20"))),
            "<!-- Jest Coverage Comment: build | node-20 -->\n# T\n\n"
        );
    }

    // ------------------------------------------------------------------------
    // Comment location
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_locator_walks_pages_until_short_page() {
        let comments: Vec<Comment> = (1..=47).map(theirs).collect();
        let api = FakeApi::with_comments(comments);

        let all = list_all_comments(&api, 7).await.unwrap();
        assert_eq!(all.len(), 47);
        assert_eq!(
            api.calls(),
            vec![
                Call::List { page: 1, per_page: 20 },
                Call::List { page: 2, per_page: 20 },
                Call::List { page: 3, per_page: 20 },
            ]
        );
    }

    #[tokio::test]
    async fn test_locator_full_last_page_needs_one_more_request() {
        let api = FakeApi::with_comments((1..=40).map(theirs).collect());
        let all = list_all_comments(&api, 7).await.unwrap();
        assert_eq!(all.len(), 40);
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_locator_filters_and_preserves_order() {
        let mut comments: Vec<Comment> = (1..=25).map(theirs).collect();
        comments[3] = ours(4);
        comments[21] = ours(22);
        comments.push(Comment {
            id: 99,
            author: Some(BOT_LOGIN.to_string()),
            body: Some("<!-- Jest Coverage Comment: other -->\n".to_string()),
        });
        let api = FakeApi::with_comments(comments);

        let found = find_own_comments(&api, 7, &watermark()).await.unwrap();
        assert_eq!(found.iter().map(|c| c.id).collect::<Vec<_>>(), vec![4, 22]);
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_push_creates_commit_comment_only() {
        let api = FakeApi::with_comments(vec![ours(1)]);
        let ctx = RequestContext {
            event: EventKind::Push,
            issue_number: None,
            commit: "aftersha".to_string(),
            ..pr_ctx()
        };

        let outcome = publish(&api, &ctx, &PublishOptions::default(), &watermark(), "body")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::CommitComment { id: 2000 });
        assert_eq!(
            api.calls(),
            vec![Call::CommitComment {
                sha: "aftersha".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_update_in_place_targets_our_comment() {
        let api = FakeApi::with_comments(vec![theirs(1), ours(2), theirs(3), ours(4)]);

        let outcome = publish(&api, &pr_ctx(), &PublishOptions::default(), &watermark(), "body")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Updated { id: 2 });
        assert_eq!(
            api.calls(),
            vec![
                Call::List { page: 1, per_page: 30 },
                Call::Update { id: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_update_in_place_creates_when_absent() {
        let api = FakeApi::with_comments(vec![theirs(1)]);

        let outcome = publish(&api, &pr_ctx(), &PublishOptions::default(), &watermark(), "body")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Created {
                id: 1000,
                deleted: vec![]
            }
        );
        assert_eq!(api.calls().last(), Some(&Call::Create { issue: 7 }));
    }

    #[tokio::test]
    async fn test_update_in_place_ignores_delete_old_comments() {
        let api = FakeApi::with_comments(vec![ours(2), ours(3)]);
        let options = PublishOptions {
            delete_old_comments: true,
            ..Default::default()
        };

        publish(&api, &pr_ctx(), &options, &watermark(), "body").await.unwrap();
        assert!(!api.calls().iter().any(|c| matches!(c, Call::Delete { .. })));
    }

    #[tokio::test]
    async fn test_create_new_deletes_old_and_continues_past_failures() {
        let mut api = FakeApi::with_comments(vec![ours(1), theirs(2), ours(3), ours(5)]);
        api.failing_deletes = vec![3];
        let options = PublishOptions {
            create_new_comment: true,
            delete_old_comments: true,
            ..Default::default()
        };

        let outcome = publish(&api, &pr_ctx(), &options, &watermark(), "body")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Created {
                id: 1000,
                deleted: vec![1, 5]
            }
        );
        assert_eq!(
            api.calls(),
            vec![
                Call::List { page: 1, per_page: 20 },
                Call::Delete { id: 1 },
                Call::Delete { id: 3 },
                Call::Delete { id: 5 },
                Call::Create { issue: 7 },
            ]
        );
    }

    #[tokio::test]
    async fn test_create_new_without_delete() {
        let api = FakeApi::with_comments(vec![ours(1)]);
        let options = PublishOptions {
            create_new_comment: true,
            ..Default::default()
        };

        publish(&api, &pr_ctx(), &options, &watermark(), "body").await.unwrap();
        assert_eq!(api.calls(), vec![Call::Create { issue: 7 }]);
    }

    #[tokio::test]
    async fn test_oversize_body_is_not_published() {
        let api = FakeApi::with_comments(vec![ours(1)]);
        let body = "x".repeat(MAX_COMMENT_LENGTH + 1);

        let outcome = publish(&api, &pr_ctx(), &PublishOptions::default(), &watermark(), &body)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::SkippedOversize);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_body_at_limit_is_published() {
        let api = FakeApi::default();
        let body = "x".repeat(MAX_COMMENT_LENGTH);

        let outcome = publish(&api, &pr_ctx(), &PublishOptions::default(), &watermark(), &body)
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_event_has_no_network_effect() {
        let api = FakeApi::with_comments(vec![ours(1)]);
        let ctx = RequestContext {
            event: EventKind::Other("workflow_dispatch".to_string()),
            ..pr_ctx()
        };

        let outcome = publish(&api, &ctx, &PublishOptions::default(), &watermark(), "body")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::UnsupportedEvent);
        assert!(api.calls().is_empty());
        assert!(!supports_comments(&ctx.event));
    }

    #[tokio::test]
    async fn test_pull_request_without_number() {
        let api = FakeApi::default();
        let ctx = RequestContext {
            event: EventKind::PullRequestTarget,
            issue_number: None,
            ..pr_ctx()
        };

        let err = publish(&api, &ctx, &PublishOptions::default(), &watermark(), "body")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::MissingIssueNumber("pull_request_target".to_string())
        );
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_logged_not_raised() {
        let mut api = FakeApi::default();
        api.fail_create = true;

        let err = publish(&api, &pr_ctx(), &PublishOptions::default(), &watermark(), "body")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CreateComment(_)));

        let outcome =
            publish_or_log(&api, &pr_ctx(), &PublishOptions::default(), &watermark(), "body").await;
        assert_eq!(outcome, None);
    }

    #[test]
    fn test_unsupported_event_message() {
        let message = unsupported_event_message(&EventKind::Other("schedule".to_string()));
        assert!(message.contains("'schedule' events are not supported."));
        assert!(message.ends_with("\nYou can use the output of the action."));
    }

    #[test]
    fn test_publish_options_from_config() {
        let config = EffectiveConfig {
            create_new_comment: true,
            hide_comment: true,
            ..Default::default()
        };
        let options = PublishOptions::from(&config);
        assert!(options.create_new_comment);
        assert!(options.hide_comment);
        assert!(!options.delete_old_comments);
    }
}
