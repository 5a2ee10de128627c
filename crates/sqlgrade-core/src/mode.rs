use crate::config::RunnerConfig;
use crate::errors::{GradeError, TimingViolation};
use crate::model::{SuiteMode, TestSuite};
use crate::providers::db::DbTarget;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Normalized (lowercase) student identifier, e.g. `2021a7ps0001g`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudentId(String);

impl StudentId {
    pub fn parse(raw: &str) -> Result<Self, GradeError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"(?i)^\d{4}[a-z][a-z0-9][a-z][a-z0-9]\d{4}g$").expect("static id pattern")
        });
        let trimmed = raw.trim();
        if !re.is_match(trimmed) {
            return Err(GradeError::InvalidStudentId(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that differs between a practice run and a graded run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub mode: SuiteMode,
    pub student_id: Option<StudentId>,
    pub target: DbTarget,
    pub suite_path: PathBuf,
    pub persist_report: bool,
    pub enforce_timing: bool,
}

impl ExecutionContext {
    pub fn sample(cfg: &RunnerConfig) -> Self {
        Self {
            mode: SuiteMode::Sample,
            student_id: None,
            target: DbTarget::practice(cfg.practice_db.clone()),
            suite_path: cfg.sample_suite.clone(),
            persist_report: false,
            enforce_timing: false,
        }
    }

    pub fn eval(cfg: &RunnerConfig, student_id: StudentId) -> Self {
        Self {
            mode: SuiteMode::Eval,
            student_id: Some(student_id),
            target: DbTarget::grading(cfg.grading_db.clone()),
            suite_path: cfg.eval_suite.clone(),
            persist_report: true,
            enforce_timing: true,
        }
    }

    /// Picks the context once per run. Grading requires a valid identifier.
    pub fn select(
        cfg: &RunnerConfig,
        grade: bool,
        student_id: Option<&str>,
    ) -> Result<Self, GradeError> {
        if !grade {
            return Ok(Self::sample(cfg));
        }
        let raw = student_id
            .filter(|s| !s.trim().is_empty())
            .ok_or(GradeError::MissingStudentId)?;
        Ok(Self::eval(cfg, StudentId::parse(raw)?))
    }

    /// Checks a decrypted suite against this run before any database contact.
    pub fn admit(&self, suite: &TestSuite, now: DateTime<Utc>) -> Result<(), GradeError> {
        if suite.mode != self.mode {
            return Err(GradeError::ModeMismatch {
                expected: self.mode,
                found: suite.mode,
            });
        }
        if self.enforce_timing {
            if let Some(allowed_after) = suite.allowed_after {
                if now < allowed_after {
                    return Err(TimingViolation { allowed_after, now }.into());
                }
            }
        }
        Ok(())
    }
}
