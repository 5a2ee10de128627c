use crate::model::SuiteMode;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// Script could not be split into statements. `line` is 1-based and points at
/// the construct that was left open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error near line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("no grading secret is compiled into this build; it cannot open or seal artifacts")]
    MissingSecret,
    #[error("not a sqlgrade artifact (header is missing or truncated)")]
    Malformed,
    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u8),
    #[error("artifact holds a {found}, expected a {expected}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("artifact failed authentication: it was modified after creation or sealed with a different secret")]
    Tampered,
    #[error("artifact payload is invalid: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, Error)]
#[error("cannot use the {target}: {message}")]
pub struct ConnectionError {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
#[error("evaluation is not open yet: allowed after {allowed_after}, current time is {now}")]
pub struct TimingViolation {
    pub allowed_after: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Failure while running one statement. Only `Connection` is fatal to a run.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("{0}")]
    Statement(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("solution for {id} violates its own constraints: {violations}")]
    SolutionViolates { id: String, violations: String },
    #[error("solution for {id} failed against the capture database: {message}")]
    Execution { id: String, message: String },
    #[error("solution for {id} produced a NaN or infinite value; round or cast it in the query")]
    NonFiniteValue { id: String },
    #[error("solution script has no statements")]
    Empty,
}

#[derive(Debug, Error)]
pub enum GradeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Timing(#[from] TimingViolation),
    #[error("this is a {found} suite but the run was started in {expected} mode")]
    ModeMismatch {
        expected: SuiteMode,
        found: SuiteMode,
    },
    #[error("a student identifier is required in grading mode (use --student-id)")]
    MissingStudentId,
    #[error("invalid student identifier '{0}': expected YYYY[A-Z][A-Z0-9][A-Z][A-Z0-9]NNNNG, e.g. 2021a7ps0001g")]
    InvalidStudentId(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
