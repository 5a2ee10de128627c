use crate::constraints::Constraint;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Select,
    Function,
    View,
    DdlDml,
    Dml,
    #[default]
    Unknown,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "select",
            QueryType::Function => "function",
            QueryType::View => "view",
            QueryType::DdlDml => "ddl_dml",
            QueryType::Dml => "dml",
            QueryType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteMode {
    Sample,
    Eval,
}

impl fmt::Display for SuiteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteMode::Sample => f.write_str("sample"),
            SuiteMode::Eval => f.write_str("eval"),
        }
    }
}

/// One typed cell of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Blob(Vec<u8>),
}

impl Value {
    /// Converts a plain JSON scalar (as written in a lab manifest) into a cell.
    pub fn from_json(v: &serde_json::Value) -> Option<Value> {
        match v {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Renders the value as a SQL literal, for building routine calls.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".into(),
            Value::Bool(true) => "TRUE".into(),
            Value::Bool(false) => "FALSE".into(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Blob(b) => format!("X'{}'", hex::encode(b)),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// NaN and infinities have no JSON form and cannot be sealed.
    pub fn is_non_finite(&self) -> bool {
        matches!(self, Value::Float(f) if !f.is_finite())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Blob(b) => write!(f, "x'{}'", hex::encode(b)),
        }
    }
}

pub type Row = Vec<Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Single-column result set, one row per value.
    pub fn single_column(name: &str, values: Vec<Value>) -> Self {
        Self {
            columns: vec![name.to_string()],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    pub fn has_non_finite(&self) -> bool {
        self.rows.iter().flatten().any(Value::is_non_finite)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// A gradable question, captured from the instructor's solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(rename = "query")]
    pub statement_text: String,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    #[serde(default)]
    pub constraints: BTreeSet<Constraint>,
    #[serde(default)]
    pub expected_result: Option<ResultSet>,
    #[serde(rename = "score")]
    pub score_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_arguments: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_query: Option<String>,
    /// Compared statement has an output ordering clause; rows compare positionally.
    #[serde(default)]
    pub ordered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub lab: String,
    pub mode: SuiteMode,
    pub tests: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_after: Option<DateTime<Utc>>,
}

impl TestSuite {
    /// Structural checks applied to every suite entering or leaving the codec.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for tc in &self.tests {
            if tc.id.trim().is_empty() {
                return Err("test with empty id".into());
            }
            if !seen.insert(tc.id.as_str()) {
                return Err(format!("duplicate test id '{}'", tc.id));
            }
            if !tc.score_weight.is_finite() || tc.score_weight < 0.0 {
                return Err(format!(
                    "test '{}' has invalid score weight {}",
                    tc.id, tc.score_weight
                ));
            }
            let bad_expected = tc.expected_result.as_ref().is_some_and(ResultSet::has_non_finite);
            let bad_args = tc
                .function_arguments
                .iter()
                .flatten()
                .flatten()
                .any(Value::is_non_finite);
            if bad_expected || bad_args {
                return Err(format!(
                    "test '{}' holds a NaN or infinite value, which cannot be stored",
                    tc.id
                ));
            }
        }
        Ok(())
    }

    pub fn max_score(&self) -> f64 {
        self.tests.iter().map(|t| t.score_weight).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pass,
    ConstraintFail,
    Mismatch,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::ConstraintFail => "CONSTRAINT_FAIL",
            TestStatus::Mismatch => "MISMATCH",
            TestStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultRow {
    pub test_id: String,
    pub status: TestStatus,
    pub reason: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_violations: Vec<Constraint>,
    /// `None` when the statement never produced a comparable result.
    #[serde(default)]
    pub output_matched: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingReport {
    pub lab: String,
    pub mode: SuiteMode,
    pub results: Vec<TestResultRow>,
    pub total_score: f64,
    pub max_score: f64,
}

impl GradingReport {
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == TestStatus::Pass)
            .count()
    }

    pub fn percentage(&self) -> f64 {
        if self.max_score > 0.0 {
            self.total_score / self.max_score * 100.0
        } else {
            0.0
        }
    }
}

/// Eval-mode envelope that gets encrypted and submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedReport {
    pub student_id: String,
    pub submitted_at: DateTime<Utc>,
    pub suite_fingerprint: String,
    pub script_sha256: String,
    pub report: GradingReport,
}
