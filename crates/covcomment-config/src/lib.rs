//! Configuration parsing and management for covcomment.
//!
//! This crate provides:
//! - The `covcomment.toml` file format (`Config`)
//! - Discovery of the file in the current directory or its parents
//! - Precedence handling (CLI > config file > defaults)
//! - Parsing of `title, path` lines for multi-file JUnit reports

use std::path::{Path, PathBuf};

use covcomment_types::TitledFile;
use serde::Deserialize;
use thiserror::Error;

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "covcomment.toml";

/// Badge label used when none is configured.
pub const DEFAULT_BADGE_TITLE: &str = "Coverage";

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Contents of `covcomment.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Heading at the top of the comment.
    pub title: Option<String>,
    /// Label of the coverage badge.
    pub badge_title: Option<String>,
    /// Heading above the coverage summary table.
    pub summary_title: Option<String>,
    /// Istanbul `coverage-summary.json`.
    pub summary_file: Option<String>,
    /// Single JUnit XML report.
    pub junit_file: Option<String>,
    /// Heading above the JUnit table.
    pub junit_title: Option<String>,
    /// Jest `--json` report, source of the failed-tests section.
    pub jest_report_file: Option<String>,
    /// `title, path` lines, one per JUnit report.
    pub multiple_junit_files: Option<Vec<String>>,
    pub hide_summary: Option<bool>,
    pub hide_comment: Option<bool>,
    pub create_new_comment: Option<bool>,
    pub delete_old_comments: Option<bool>,
    pub remove_links_to_lines: Option<bool>,
    /// Distinguishes several comments published by the same job.
    pub unique_id_for_comment: Option<String>,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub title: Option<String>,
    pub badge_title: String,
    pub summary_title: Option<String>,
    pub summary_file: Option<String>,
    pub junit_file: Option<String>,
    pub junit_title: Option<String>,
    pub jest_report_file: Option<String>,
    pub multiple_junit_files: Vec<String>,
    pub hide_summary: bool,
    pub hide_comment: bool,
    pub create_new_comment: bool,
    /// Only honoured together with `create_new_comment`.
    pub delete_old_comments: bool,
    pub remove_links_to_lines: bool,
    pub unique_id_for_comment: Option<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            title: None,
            badge_title: DEFAULT_BADGE_TITLE.to_string(),
            summary_title: None,
            summary_file: None,
            junit_file: None,
            junit_title: None,
            jest_report_file: None,
            multiple_junit_files: vec![],
            hide_summary: false,
            hide_comment: false,
            create_new_comment: false,
            delete_old_comments: false,
            remove_links_to_lines: false,
            unique_id_for_comment: None,
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_badge_title(badge_title: &str) -> Result<(), ConfigError> {
    if badge_title.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "badge_title must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_unique_id(unique_id: &str) -> Result<(), ConfigError> {
    // The id is embedded in an HTML comment.
    if unique_id.contains("-->") {
        return Err(ConfigError::InvalidValue(format!(
            "unique_id_for_comment must not contain \"-->\", got {unique_id:?}"
        )));
    }
    Ok(())
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(badge_title) = &config.badge_title {
        validate_badge_title(badge_title)?;
    }
    if let Some(unique_id) = &config.unique_id_for_comment {
        validate_unique_id(unique_id)?;
    }
    Ok(())
}

/// Validate a resolved configuration, including values that came from the CLI.
pub fn validate_effective(config: &EffectiveConfig) -> Result<(), ConfigError> {
    validate_badge_title(&config.badge_title)?;
    if let Some(unique_id) = &config.unique_id_for_comment {
        validate_unique_id(unique_id)?;
    }
    Ok(())
}

/// Try to find and load configuration from the standard location.
///
/// Searches for `covcomment.toml` in the current directory and parent directories.
pub fn discover_config() -> Option<(PathBuf, Config)> {
    let current = std::env::current_dir().ok()?;
    discover_config_from(&current)
}

/// Search for `covcomment.toml` starting at `start` and walking up.
///
/// A file that exists but fails to load is skipped and the search continues.
pub fn discover_config_from(start: &Path) -> Option<(PathBuf, Config)> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists()
            && let Ok(config) = load_config(&config_path)
        {
            return Some((config_path, config));
        }

        if !current.pop() {
            break;
        }
    }

    None
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub title: Option<String>,
    pub badge_title: Option<String>,
    pub summary_title: Option<String>,
    pub summary_file: Option<String>,
    pub junit_file: Option<String>,
    pub junit_title: Option<String>,
    pub jest_report_file: Option<String>,
    pub multiple_junit_files: Option<Vec<String>>,
    pub hide_summary: Option<bool>,
    pub hide_comment: Option<bool>,
    pub create_new_comment: Option<bool>,
    pub delete_old_comments: Option<bool>,
    pub remove_links_to_lines: Option<bool>,
    pub unique_id_for_comment: Option<String>,
}

/// Treat empty strings as unset.
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Resolve effective configuration from the config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults. Empty strings in either layer
/// count as unset, except `badge_title`, which is validated afterwards.
pub fn resolve_config(config: Option<&Config>, cli: &CliOverrides) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();

    // Apply config file values
    if let Some(config) = config {
        effective.title = non_empty(&config.title);
        if let Some(badge_title) = &config.badge_title {
            effective.badge_title = badge_title.clone();
        }
        effective.summary_title = non_empty(&config.summary_title);
        effective.summary_file = non_empty(&config.summary_file);
        effective.junit_file = non_empty(&config.junit_file);
        effective.junit_title = non_empty(&config.junit_title);
        effective.jest_report_file = non_empty(&config.jest_report_file);
        if let Some(lines) = &config.multiple_junit_files {
            effective.multiple_junit_files = lines.clone();
        }
        effective.hide_summary = config.hide_summary.unwrap_or(effective.hide_summary);
        effective.hide_comment = config.hide_comment.unwrap_or(effective.hide_comment);
        effective.create_new_comment = config
            .create_new_comment
            .unwrap_or(effective.create_new_comment);
        effective.delete_old_comments = config
            .delete_old_comments
            .unwrap_or(effective.delete_old_comments);
        effective.remove_links_to_lines = config
            .remove_links_to_lines
            .unwrap_or(effective.remove_links_to_lines);
        effective.unique_id_for_comment = non_empty(&config.unique_id_for_comment);
    }

    // Apply CLI overrides
    let overrides = [
        (&cli.title, &mut effective.title),
        (&cli.summary_title, &mut effective.summary_title),
        (&cli.summary_file, &mut effective.summary_file),
        (&cli.junit_file, &mut effective.junit_file),
        (&cli.junit_title, &mut effective.junit_title),
        (&cli.jest_report_file, &mut effective.jest_report_file),
        (&cli.unique_id_for_comment, &mut effective.unique_id_for_comment),
    ];
    for (cli_value, slot) in overrides {
        if let Some(value) = non_empty(cli_value) {
            *slot = Some(value);
        }
    }
    if let Some(badge_title) = &cli.badge_title {
        effective.badge_title = badge_title.clone();
    }
    if let Some(lines) = &cli.multiple_junit_files {
        effective.multiple_junit_files = lines.clone();
    }
    if let Some(hide) = cli.hide_summary {
        effective.hide_summary = hide;
    }
    if let Some(hide) = cli.hide_comment {
        effective.hide_comment = hide;
    }
    if let Some(create) = cli.create_new_comment {
        effective.create_new_comment = create;
    }
    if let Some(delete) = cli.delete_old_comments {
        effective.delete_old_comments = delete;
    }
    if let Some(remove) = cli.remove_links_to_lines {
        effective.remove_links_to_lines = remove;
    }

    effective
}

// ============================================================================
// Multi-file lines
// ============================================================================

/// Parse a `title, path` line.
///
/// The line is split on its first comma and both parts are trimmed. Returns
/// `None` when there is no comma or either part is empty.
///
/// # Examples
///
/// ```
/// use covcomment_config::parse_titled_file;
///
/// let entry = parse_titled_file("Unit, ./reports/unit.xml").unwrap();
/// assert_eq!(entry.title, "Unit");
/// assert_eq!(entry.file, "./reports/unit.xml");
/// assert!(parse_titled_file("./reports/unit.xml").is_none());
/// ```
pub fn parse_titled_file(line: &str) -> Option<TitledFile> {
    let (title, file) = line.split_once(',')?;
    let (title, file) = (title.trim(), file.trim());
    if title.is_empty() || file.is_empty() {
        return None;
    }
    Some(TitledFile {
        title: title.to_string(),
        file: file.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
