//! Lab manifest: per-question grading metadata that accompanies a solution script.
//!
//! ```yaml
//! lab: lab3
//! allowed_after: 2026-03-01T09:00:00Z
//! questions:
//!   q1: { score: 2, constraints: [require_join, forbid_nested_select] }
//!   q4: { function_arguments: [[1000], [2500.5]] }
//!   q6: { check_query: "SELECT * FROM audit ORDER BY id" }
//! ```
//!
//! Question `qN` describes the N-th statement of the script.

use super::load_yaml;
use crate::constraints::Constraint;
use crate::errors::ConfigError;
use crate::model::Value;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LabManifest {
    #[serde(default)]
    pub lab: String,
    #[serde(default)]
    pub allowed_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub questions: BTreeMap<String, QuestionSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionSpec {
    #[serde(default = "default_score")]
    pub score: f64,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub function_arguments: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    pub check_query: Option<String>,
}

fn default_score() -> f64 {
    1.0
}

impl Default for QuestionSpec {
    fn default() -> Self {
        Self {
            score: default_score(),
            constraints: Vec::new(),
            function_arguments: None,
            check_query: None,
        }
    }
}

impl QuestionSpec {
    /// Argument tuples as typed cells. Nested arrays or objects are rejected.
    pub fn typed_arguments(&self, id: &str) -> Result<Option<Vec<Vec<Value>>>, ConfigError> {
        let Some(tuples) = &self.function_arguments else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut args = Vec::with_capacity(tuple.len());
            for raw in tuple {
                let v = Value::from_json(raw).ok_or_else(|| {
                    ConfigError(format!(
                        "{}: function argument {} is not a scalar",
                        id, raw
                    ))
                })?;
                args.push(v);
            }
            out.push(args);
        }
        Ok(Some(out))
    }
}

/// Question id for the statement at `index` (0-based).
pub fn question_id(index: usize) -> String {
    format!("q{}", index + 1)
}

impl LabManifest {
    /// Checks that every question names an existing statement and carries sane values.
    pub fn validate(&self, statement_count: usize) -> Result<(), ConfigError> {
        for (id, q) in &self.questions {
            let n = id
                .strip_prefix('q')
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    ConfigError(format!("question key '{}' must look like q1, q2, ...", id))
                })?;
            if n > statement_count {
                return Err(ConfigError(format!(
                    "question {} has no matching statement (script has {})",
                    id, statement_count
                )));
            }
            if !q.score.is_finite() || q.score < 0.0 {
                return Err(ConfigError(format!("{}: score must be >= 0", id)));
            }
        }
        Ok(())
    }

    pub fn question(&self, index: usize) -> QuestionSpec {
        self.questions
            .get(&question_id(index))
            .cloned()
            .unwrap_or_default()
    }
}

/// Loads a manifest. Unknown keys are an error.
pub fn load_manifest(path: &Path) -> Result<LabManifest, ConfigError> {
    let (manifest, ignored) = load_yaml::<LabManifest>(path)?;
    if !ignored.is_empty() {
        let keys: Vec<_> = ignored.into_iter().collect();
        return Err(ConfigError(format!(
            "unknown fields in lab manifest {}: {}",
            path.display(),
            keys.join(", ")
        )));
    }
    Ok(manifest)
}
