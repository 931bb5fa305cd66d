//! # Error Classifier
//!
//! Maps raw remote failures (status code plus message) onto a bounded set of
//! categories. The mapping lives in one ordered table so it can be reviewed in
//! a single place; the first matching rule wins and anything unmatched is
//! [`ErrorClass::Unknown`], which is always surfaced.

use crate::error::RemoteError;
use crate::gateway::RemoteFailure;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::LazyLock;

/// Category of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The payload was rejected, e.g. a field exceeding its length limit.
    ValidationRejected,
    /// A referenced identifier does not exist or may not be used here.
    ReferentialRejected,
    /// Another object already holds the same unique attributes.
    ConflictRejected,
    NotFound,
    /// The remote system could not reach an asset the payload points at.
    Unreachable,
    /// Server-side trouble worth retrying with backoff.
    TransientRemote,
    Unknown,
}

impl ErrorClass {
    /// Only transient failures are worth retrying without changing anything.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::TransientRemote)
    }
}

impl Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorClass::ValidationRejected => "ValidationRejected",
            ErrorClass::ReferentialRejected => "ReferentialRejected",
            ErrorClass::ConflictRejected => "ConflictRejected",
            ErrorClass::NotFound => "NotFound",
            ErrorClass::Unreachable => "Unreachable",
            ErrorClass::TransientRemote => "TransientRemote",
            ErrorClass::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusMatch {
    Any,
    Exact(u16),
    OneOf(&'static [u16]),
    Range(u16, u16),
}

impl StatusMatch {
    fn matches(self, status: u16) -> bool {
        match self {
            StatusMatch::Any => true,
            StatusMatch::Exact(s) => s == status,
            StatusMatch::OneOf(set) => set.contains(&status),
            StatusMatch::Range(lo, hi) => (lo..=hi).contains(&status),
        }
    }
}

struct Rule {
    status: StatusMatch,
    message: Option<Regex>,
    class: ErrorClass,
}

impl Rule {
    fn new(status: StatusMatch, pattern: Option<&str>, class: ErrorClass) -> Self {
        Self {
            status,
            // Patterns are literals below; a typo is a programming error.
            message: pattern.map(|p| Regex::new(p).expect("classification pattern must compile")),
            class,
        }
    }

    fn matches(&self, failure: &RemoteFailure) -> bool {
        self.status.matches(failure.status)
            && self
                .message
                .as_ref()
                .is_none_or(|re| re.is_match(&failure.message))
    }
}

/// Ordered classification table; message-specific rules precede the
/// status-only fallbacks.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use ErrorClass::*;
    use StatusMatch::*;
    vec![
        Rule::new(
            OneOf(&[400, 422]),
            Some(r"(?i)unreachable|could not (be )?(reached|resolved|fetch)|cannot (reach|access)"),
            Unreachable,
        ),
        Rule::new(
            OneOf(&[403, 409, 500]),
            Some(r"(?i)already exists|duplicate|same name"),
            ConflictRejected,
        ),
        Rule::new(Exact(409), None, ConflictRejected),
        Rule::new(
            Exact(403),
            Some(r"(?i)forbidden|not allowed|not permitted|does not exist"),
            ReferentialRejected,
        ),
        Rule::new(OneOf(&[400, 413, 422]), None, ValidationRejected),
        Rule::new(OneOf(&[404, 410]), None, NotFound),
        Rule::new(OneOf(&[408, 429]), None, TransientRemote),
        Rule::new(Range(500, 599), None, TransientRemote),
        Rule::new(Any, Some(r"(?i)timed? ?out|connection (reset|refused)"), TransientRemote),
    ]
});

/// Classifies a raw remote failure.
pub fn classify(failure: &RemoteFailure) -> ErrorClass {
    RULES
        .iter()
        .find(|rule| rule.matches(failure))
        .map(|rule| rule.class)
        .unwrap_or(ErrorClass::Unknown)
}

/// Classifies and wraps a raw failure, keeping the original status and message.
pub fn to_remote_error(failure: RemoteFailure) -> RemoteError {
    let class = classify(&failure);
    if class == ErrorClass::Unknown {
        tracing::warn!(status = failure.status, message = %failure.message, "Unclassified remote failure");
    }
    RemoteError {
        class,
        status: failure.status,
        message: failure.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(status: u16, message: &str) -> RemoteFailure {
        RemoteFailure::new(status, message)
    }

    #[test]
    fn test_length_violation_is_validation() {
        let class = classify(&failure(400, "Bad Request: name must be shorter than 100 characters"));
        assert_eq!(class, ErrorClass::ValidationRejected);
    }

    #[test]
    fn test_unreachable_asset_beats_plain_bad_request() {
        let class = classify(&failure(400, "Source URL is unreachable"));
        assert_eq!(class, ErrorClass::Unreachable);
    }

    #[test]
    fn test_duplicate_source_is_conflict() {
        assert_eq!(
            classify(&failure(403, "A source with the same name and url already exists")),
            ErrorClass::ConflictRejected
        );
        assert_eq!(
            classify(&failure(500, "duplicate key value violates unique constraint")),
            ErrorClass::ConflictRejected
        );
    }

    #[test]
    fn test_forbidden_reference_is_referential() {
        let class = classify(&failure(403, "Forbidden: source 999999999 is not allowed"));
        assert_eq!(class, ErrorClass::ReferentialRejected);
    }

    #[test]
    fn test_status_fallbacks() {
        assert_eq!(classify(&failure(404, "")), ErrorClass::NotFound);
        assert_eq!(classify(&failure(503, "Service Unavailable")), ErrorClass::TransientRemote);
        assert_eq!(classify(&failure(429, "slow down")), ErrorClass::TransientRemote);
        assert!(classify(&failure(502, "Bad Gateway")).is_retryable());
    }

    #[test]
    fn test_unmatched_failures_stay_unknown() {
        let err = to_remote_error(failure(418, "I'm a teapot"));
        assert_eq!(err.class, ErrorClass::Unknown);
        assert_eq!(err.status, 418);
        assert_eq!(err.message, "I'm a teapot");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_forbidden_without_reference_wording_is_unknown() {
        assert_eq!(classify(&failure(403, "quota exhausted")), ErrorClass::Unknown);
    }
}
