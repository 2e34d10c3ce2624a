//! covcomment renders Jest failures, JUnit totals and Istanbul coverage
//! summaries as markdown and publishes the result as a GitHub comment.
//!
//! The request context comes from the GitHub Actions environment; inputs and
//! switches come from flags and `covcomment.toml`.

use clap::Parser;
use covcomment_adapters_fs::FsArtifactReader;
use covcomment_adapters_github::{ActionEnvironment, GithubClient, GithubError};
use covcomment_app::{
    ActionOutputs, PublishOptions, build_report, publish_or_log, supports_comments,
    unsupported_event_message,
};
use covcomment_config::{
    CliOverrides, ConfigError, discover_config, load_config, resolve_config, validate_effective,
};
use covcomment_types::Watermark;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Render test and coverage reports and publish them as a GitHub comment.
#[derive(Parser)]
#[command(name = "covcomment")]
#[command(version)]
struct Cli {
    /// Path to config file (default: auto-discover covcomment.toml)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Directory relative input paths are read from (default: GITHUB_WORKSPACE, else cwd)
    #[arg(long)]
    root: Option<String>,

    /// Token used for the comment API; only needed when a comment is published
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// File the action outputs are appended to
    #[arg(long, env = "GITHUB_OUTPUT")]
    outputs_file: Option<String>,

    /// Write the composed comment body to this path
    #[arg(long)]
    body_out: Option<String>,

    /// Main heading of the comment
    #[arg(long)]
    title: Option<String>,

    /// Label of the coverage badge
    #[arg(long)]
    badge_title: Option<String>,

    /// Title of the collapsible coverage summary
    #[arg(long)]
    summary_title: Option<String>,

    /// Path to the Istanbul coverage-summary.json
    #[arg(long)]
    summary_file: Option<String>,

    /// Path to a JUnit XML report
    #[arg(long)]
    junit_file: Option<String>,

    /// Heading above the JUnit table
    #[arg(long)]
    junit_title: Option<String>,

    /// Path to the Jest JSON report
    #[arg(long)]
    jest_report_file: Option<String>,

    /// JUnit report as "title, path" (repeatable; replaces --junit-file)
    #[arg(long = "multiple-junit-files")]
    multiple_junit_files: Vec<String>,

    /// Leave the coverage summary out of the comment
    #[arg(long)]
    hide_summary: bool,

    /// Compute outputs only; never publish
    #[arg(long)]
    hide_comment: bool,

    /// Create a new comment instead of updating the previous one
    #[arg(long)]
    create_new_comment: bool,

    /// Delete earlier comments of this job (with --create-new-comment)
    #[arg(long)]
    delete_old_comments: bool,

    /// Do not link failed tests to source lines
    #[arg(long)]
    remove_links_to_lines: bool,

    /// Distinguishes comments of several runs of the same job
    #[arg(long)]
    unique_id_for_comment: Option<String>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        let flag = |set: bool| set.then_some(true);
        CliOverrides {
            title: self.title.clone(),
            badge_title: self.badge_title.clone(),
            summary_title: self.summary_title.clone(),
            summary_file: self.summary_file.clone(),
            junit_file: self.junit_file.clone(),
            junit_title: self.junit_title.clone(),
            jest_report_file: self.jest_report_file.clone(),
            multiple_junit_files: if self.multiple_junit_files.is_empty() {
                None
            } else {
                Some(self.multiple_junit_files.clone())
            },
            hide_summary: flag(self.hide_summary),
            hide_comment: flag(self.hide_comment),
            create_new_comment: flag(self.create_new_comment),
            delete_old_comments: flag(self.delete_old_comments),
            remove_links_to_lines: flag(self.remove_links_to_lines),
            unique_id_for_comment: self.unique_id_for_comment.clone(),
        }
    }
}

/// CLI errors
#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Github(#[from] GithubError),

    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("A GitHub token is required to publish comments (--github-token or GITHUB_TOKEN)")]
    MissingToken,

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Exit code for configuration, environment and I/O failures. A comment that
/// could not be published does not change the exit code.
const EXIT_CODE_ERROR: i32 = 1;

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), CliError> {
    let env = ActionEnvironment::from_env()?;

    let loaded_config = match &cli.config {
        Some(path) => Some(load_config(Path::new(path))?),
        None => discover_config().map(|(_, config)| config),
    };
    let effective = resolve_config(loaded_config.as_ref(), &cli.overrides());
    validate_effective(&effective)?;

    let root = cli
        .root
        .clone()
        .or_else(|| env.context.workspace.clone())
        .unwrap_or_else(|| ".".to_string());
    let reader = FsArtifactReader::new(root);
    let report = build_report(&effective, &env.context, &reader);

    if let Some(path) = &cli.outputs_file {
        write_outputs(path, &report.outputs)?;
    }

    let watermark = Watermark::new(
        &env.context.job,
        effective.unique_id_for_comment.as_deref(),
    );
    let body = report.body(&watermark);
    if let Some(path) = &cli.body_out {
        fs::write(path, &body).map_err(|source| CliError::FileWrite {
            path: path.clone(),
            source,
        })?;
    }

    if report.is_empty() || effective.hide_comment {
        info!("Nothing to report");
        return Ok(());
    }
    if !supports_comments(&env.context.event) {
        warn!("{}", unsupported_event_message(&env.context.event));
        return Ok(());
    }

    let token = cli
        .github_token
        .filter(|token| !token.trim().is_empty())
        .ok_or(CliError::MissingToken)?;
    let client = GithubClient::new(&env.api_url, &token, &env.context.repository)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let options = PublishOptions::from(&effective);
    if let Some(outcome) = runtime.block_on(publish_or_log(
        &client,
        &env.context,
        &options,
        &watermark,
        &body,
    )) {
        info!(?outcome, "Publish finished");
    }
    Ok(())
}

/// Delimiter for a multi-line output value, derived from the value itself so
/// it cannot occur inside it.
fn output_delimiter(name: &str, value: &str) -> String {
    let digest = Sha256::new()
        .chain_update(name.as_bytes())
        .chain_update([0u8])
        .chain_update(value.as_bytes())
        .finalize();
    format!("ghadelimiter_{digest:x}")
}

fn format_outputs(outputs: &ActionOutputs) -> String {
    let mut text = String::new();
    for (name, value) in outputs.entries() {
        let delimiter = output_delimiter(name, &value);
        text.push_str(&format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"));
    }
    text
}

fn write_outputs(path: &str, outputs: &ActionOutputs) -> Result<(), CliError> {
    let write_error = |source| CliError::FileWrite {
        path: path.to_string(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_error)?;
    file.write_all(format_outputs(outputs).as_bytes())
        .map_err(write_error)
}
