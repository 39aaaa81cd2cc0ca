use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Problems found while loading or validating task settings. Always fatal
/// and always raised before the first trial runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {}", join_issues(.issues))]
    Invalid { issues: Vec<ValidationIssue> },
}

impl ConfigError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            issues: vec![ValidationIssue::new(path, message)],
        }
    }

    /// Validation issues, empty for parse and I/O failures.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Invalid { issues } => issues,
            _ => &[],
        }
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path, e.g. `controller.max_ssd`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.path)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a whole session run.
///
/// Service errors are carried through untouched so callers see exactly
/// what the display or input backend reported.
#[derive(Debug, Error)]
pub enum SessionError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("presentation service failed: {0}")]
    Service(#[source] E),
}
