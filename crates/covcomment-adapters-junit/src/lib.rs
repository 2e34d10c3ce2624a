//! JUnit XML summary parser for covcomment.
//!
//! Only the counters are read: the attributes of the root element and, under
//! a `<testsuites>` root, of its direct `<testsuite>` children. Deeper
//! elements, text and CDATA sections are never inspected.

use std::collections::HashMap;

use covcomment_types::JunitSummary;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while parsing JUnit XML.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JunitError {
    /// The document root is neither `<testsuites>` nor `<testsuite>`.
    #[error("Invalid JUnit report: no <testsuites> or <testsuite> element")]
    MissingRoot,

    /// A counter attribute holds something other than a number.
    #[error("Invalid JUnit attribute {name}=\"{value}\"")]
    InvalidAttribute { name: String, value: String },

    /// The document is not well-formed XML.
    #[error("Invalid JUnit XML: {0}")]
    Xml(String),
}

// ============================================================================
// Parsing
// ============================================================================

type Attributes = HashMap<String, String>;

enum Root {
    Suites(Attributes),
    Suite(Attributes),
}

fn attributes(element: &BytesStart<'_>) -> Result<Attributes, JunitError> {
    let mut attrs = Attributes::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| JunitError::Xml(e.to_string()))?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| JunitError::Xml(e.to_string()))?
            .into_owned();
        attrs.insert(name, value);
    }
    Ok(attrs)
}

fn count(attrs: &Attributes, name: &str) -> Result<Option<u64>, JunitError> {
    attrs
        .get(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| JunitError::InvalidAttribute {
                name: name.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}

fn seconds(attrs: &Attributes) -> Result<Option<f64>, JunitError> {
    attrs
        .get("time")
        .map(|raw| {
            raw.trim()
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| JunitError::InvalidAttribute {
                    name: "time".to_string(),
                    value: raw.clone(),
                })
        })
        .transpose()
}

/// Read the root element and, for a `<testsuites>` root, its direct
/// `<testsuite>` children. Stops at the end of the root element.
fn read_suites(text: &str) -> Result<(Root, Vec<Attributes>), JunitError> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut root = None;
    let mut suites = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| JunitError::Xml(e.to_string()))?;
        match &event {
            Event::Start(element) | Event::Empty(element) => {
                let under_suites = matches!(root, Some(Root::Suites(_)));
                match depth {
                    0 => {
                        root = Some(match element.name().as_ref() {
                            b"testsuites" => Root::Suites(attributes(element)?),
                            b"testsuite" => Root::Suite(attributes(element)?),
                            _ => return Err(JunitError::MissingRoot),
                        });
                    }
                    1 if under_suites && element.name().as_ref() == b"testsuite" => {
                        suites.push(attributes(element)?);
                    }
                    _ => {}
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                } else if depth == 0 {
                    break;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match root {
        Some(Root::Suite(attrs)) => Ok((Root::Suite(Attributes::new()), vec![attrs])),
        Some(root) => Ok((root, suites)),
        None => Err(JunitError::MissingRoot),
    }
}

/// Parse the summary counters of a JUnit XML report.
///
/// The `<testsuites>` root attributes give `tests`, `failures`, `errors` and
/// `time`; any missing one is summed over the root's direct `<testsuite>`
/// children instead. `skipped` is always summed over those children. A
/// document whose root is a single `<testsuite>` is accepted as well; nested
/// suites inside it are not counted again.
///
/// `succeeded` is `tests - failures - errors - skipped`, clamped at zero.
///
/// # Examples
///
/// ```
/// use covcomment_adapters_junit::parse_junit_xml;
///
/// let xml = r#"<?xml version="1.0"?>
/// <testsuites tests="5" failures="1" errors="0" time="1.5">
///   <testsuite name="a" tests="5" failures="1" errors="0" skipped="1" time="1.5"/>
/// </testsuites>"#;
///
/// let summary = parse_junit_xml(xml).unwrap();
/// assert_eq!(summary.tests, 5);
/// assert_eq!(summary.skipped, 1);
/// assert_eq!(summary.succeeded, 3);
/// ```
pub fn parse_junit_xml(text: &str) -> Result<JunitSummary, JunitError> {
    let (root, suites) = read_suites(text)?;

    let mut summary = JunitSummary::default();
    for suite in &suites {
        summary.tests = summary.tests.saturating_add(count(suite, "tests")?.unwrap_or(0));
        summary.failures = summary.failures.saturating_add(count(suite, "failures")?.unwrap_or(0));
        summary.errors = summary.errors.saturating_add(count(suite, "errors")?.unwrap_or(0));
        summary.skipped = summary.skipped.saturating_add(count(suite, "skipped")?.unwrap_or(0));
        summary.time += seconds(suite)?.unwrap_or(0.0);
    }

    if let Root::Suites(root) = &root {
        if let Some(tests) = count(root, "tests")? {
            summary.tests = tests;
        }
        if let Some(failures) = count(root, "failures")? {
            summary.failures = failures;
        }
        if let Some(errors) = count(root, "errors")? {
            summary.errors = errors;
        }
        if let Some(time) = seconds(root)? {
            summary.time = time;
        }
    }

    summary.succeeded = summary
        .tests
        .saturating_sub(summary.failures)
        .saturating_sub(summary.errors)
        .saturating_sub(summary.skipped);

    Ok(summary)
}

// ============================================================================
// Tests
// ============================================================================
