use crate::compare::Comparison;
use crate::constraints::Constraint;
use crate::errors::ExecError;
use crate::model::{GradingReport, ResultSet, SuiteMode, TestCase, TestResultRow, TestStatus};

/// What happened when one test's statement was checked and run.
#[derive(Debug, Clone)]
pub enum Observation {
    Missing,
    Ran {
        violations: Vec<Constraint>,
        outcome: Result<Comparison, String>,
    },
}

impl Observation {
    pub fn ran(
        violations: Vec<Constraint>,
        executed: Result<Option<ResultSet>, ExecError>,
        compare: impl FnOnce(Option<&ResultSet>) -> Comparison,
    ) -> Self {
        let outcome = executed.map(|rs| compare(rs.as_ref())).map_err(|e| e.to_string());
        Observation::Ran {
            violations,
            outcome,
        }
    }
}

/// Turns one observation into a scored row.
///
/// Violated constraints always win and score zero; output correctness is still
/// recorded in `output_matched`.
pub fn decide(tc: &TestCase, obs: Observation) -> TestResultRow {
    let mut row = TestResultRow {
        test_id: tc.id.clone(),
        status: TestStatus::Error,
        reason: String::new(),
        score: 0.0,
        max_score: tc.score_weight,
        constraint_violations: Vec::new(),
        output_matched: None,
    };

    let (violations, outcome) = match obs {
        Observation::Missing => {
            row.reason = "no statement submitted".into();
            return row;
        }
        Observation::Ran {
            violations,
            outcome,
        } => (violations, outcome),
    };

    row.output_matched = outcome.as_ref().ok().map(Comparison::is_equal);

    if !violations.is_empty() {
        let names: Vec<String> = violations.iter().map(|c| c.to_string()).collect();
        let output = match &outcome {
            Ok(Comparison::Equal) => "output matched".to_string(),
            Ok(Comparison::Mismatch(r)) => format!("output also wrong: {}", r),
            Err(e) => format!("statement failed: {}", e),
        };
        row.status = TestStatus::ConstraintFail;
        row.reason = format!("violates {} ({})", names.join(", "), output);
        row.constraint_violations = violations;
        return row;
    }

    match outcome {
        Err(e) => {
            row.status = TestStatus::Error;
            row.reason = e;
        }
        Ok(Comparison::Mismatch(r)) => {
            row.status = TestStatus::Mismatch;
            row.reason = r;
        }
        Ok(Comparison::Equal) => {
            row.status = TestStatus::Pass;
            row.reason = "output matched".into();
            row.score = tc.score_weight;
        }
    }
    row
}

/// Accumulates rows in suite order.
#[derive(Debug, Default)]
pub struct ScoreCard {
    rows: Vec<TestResultRow>,
}

impl ScoreCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, row: TestResultRow) {
        self.rows.push(row);
    }

    pub fn finish(self, lab: &str, mode: SuiteMode) -> GradingReport {
        let total_score = self.rows.iter().map(|r| r.score).sum();
        let max_score = self.rows.iter().map(|r| r.max_score).sum();
        GradingReport {
            lab: lab.to_string(),
            mode,
            results: self.rows,
            total_score,
            max_score,
        }
    }
}
