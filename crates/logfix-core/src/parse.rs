//! Log scanning: typed error matches with line numbers, an overall
//! severity, and a one-line summary.
//!
//! The scan is independent of the pattern library. It runs on every
//! analysis and is reported next to the solution as an
//! [`IssueSummary`], so a caller can see what was found in the log even
//! when nothing in the library matched.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Matches kept in [`IssueSummary::errors`]; `total_issues` counts all.
const MAX_REPORTED_ERRORS: usize = 50;

/// Characters of the first line kept in the summary.
const SUMMARY_LINE_CHARS: usize = 100;

/// Kind of error line recognized by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Yaml,
    Docker,
    Kubernetes,
    ConfigMissing,
    Port,
    Permission,
    Network,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Yaml => "yaml",
            ErrorKind::Docker => "docker",
            ErrorKind::Kubernetes => "kubernetes",
            ErrorKind::ConfigMissing => "config_missing",
            ErrorKind::Port => "port",
            ErrorKind::Permission => "permission",
            ErrorKind::Network => "network",
        }
    }
}

/// Overall severity of a log, from the words it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Unknown,
}

/// One recognized error occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMatch {
    pub kind: ErrorKind,
    /// The matched text.
    pub text: String,
    /// 1-based line number.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueSummary {
    pub total_issues: usize,
    /// Kind of the earliest match in the log.
    pub primary_issue: Option<ErrorKind>,
    pub severity: Severity,
    pub lines: usize,
    pub summary: String,
    /// Matches in log order, capped.
    pub errors: Vec<ErrorMatch>,
}

fn error_rules() -> &'static [(ErrorKind, Regex)] {
    static RULES: OnceLock<Vec<(ErrorKind, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (
                ErrorKind::Yaml,
                r"yaml\.scanner\.ScannerError|yaml\.parser\.ParserError|error converting YAML",
            ),
            (
                ErrorKind::Docker,
                r"docker: Error|Cannot connect to the Docker daemon",
            ),
            (
                ErrorKind::Kubernetes,
                r"error validating|kubectl.*error|pod.*failed",
            ),
            (
                ErrorKind::ConfigMissing,
                r"could not find file|No such file|FileNotFoundError",
            ),
            (
                ErrorKind::Port,
                r"port.*already (?:in use|allocated)|bind.*address already in use",
            ),
            (ErrorKind::Permission, r"permission denied|access denied"),
            (
                ErrorKind::Network,
                r"connection refused|timed? ?out|network (?:is )?unreachable",
            ),
        ]
        .into_iter()
        .filter_map(|(kind, src)| match Regex::new(&format!("(?i){}", src)) {
            Ok(re) => Some((kind, re)),
            Err(e) => {
                tracing::error!(kind = kind.as_str(), error = %e, "invalid error rule");
                None
            }
        })
        .collect()
    })
}

/// Byte offsets at which each line starts.
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// 1-based line containing byte offset `pos`.
fn line_of(starts: &[usize], pos: usize) -> usize {
    starts.partition_point(|&s| s <= pos).max(1)
}

/// Every recognized error in the log, in log order.
pub fn extract_errors(text: &str) -> Vec<ErrorMatch> {
    let starts = line_starts(text);
    let mut found: Vec<(usize, ErrorMatch)> = Vec::new();
    for (kind, re) in error_rules() {
        for m in re.find_iter(text) {
            found.push((
                m.start(),
                ErrorMatch {
                    kind: *kind,
                    text: m.as_str().to_string(),
                    line: line_of(&starts, m.start()),
                },
            ));
        }
    }
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, m)| m).collect()
}

pub fn severity(text: &str) -> Severity {
    let lowered = text.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| lowered.contains(w));
    if any(&["error", "failed", "exception", "fatal", "panic"]) {
        Severity::Error
    } else if any(&["warning", "warn"]) {
        Severity::Warning
    } else if any(&["info", "success"]) {
        Severity::Info
    } else {
        Severity::Unknown
    }
}

fn summarize(text: &str, lines: usize) -> String {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let mut head: String = first.chars().take(SUMMARY_LINE_CHARS).collect();
    if first.chars().count() > SUMMARY_LINE_CHARS {
        head.push_str("...");
    }
    match lines {
        0 => "empty log".to_string(),
        1 => head,
        n => format!("{} lines, first: {}", n, head),
    }
}

/// Scan a log for known error lines and summarize it.
pub fn scan(text: &str) -> IssueSummary {
    let mut errors = extract_errors(text);
    let total_issues = errors.len();
    let primary_issue = errors.first().map(|e| e.kind);
    errors.truncate(MAX_REPORTED_ERRORS);

    let lines = text.trim_end().lines().count();
    let severity = if total_issues > 0 {
        Severity::Error
    } else {
        severity(text)
    };

    IssueSummary {
        total_issues,
        primary_issue,
        severity,
        lines,
        summary: summarize(text, lines),
        errors,
    }
}
