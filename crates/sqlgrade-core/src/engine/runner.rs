use crate::codec::Codec;
use crate::compare::{compare, OrderingMode};
use crate::constraints::{self, analyze};
use crate::errors::{ExecError, GradeError};
use crate::executor::{self, ExecutionPlan};
use crate::fingerprint;
use crate::mode::ExecutionContext;
use crate::model::{GradingReport, SealedReport, TestSuite};
use crate::parser::{parse_script, Statement};
use crate::providers::db::{Connector, DbTarget};
use crate::scoring::{decide, Observation, ScoreCard};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub report: GradingReport,
    pub suite_fingerprint: String,
    /// Encrypted `SealedReport`, only for runs that persist their report.
    pub sealed: Option<Vec<u8>>,
}

pub struct Runner {
    pub connector: Arc<dyn Connector>,
    pub codec: Codec,
}

impl Runner {
    pub fn new(connector: Arc<dyn Connector>, codec: Codec) -> Self {
        Self { connector, codec }
    }

    /// Full student-side run: open suite, admit, parse, grade, seal.
    ///
    /// Every fatal check that needs no database happens before connecting.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        suite_bytes: &[u8],
        script: &str,
        now: DateTime<Utc>,
    ) -> Result<RunArtifacts, GradeError> {
        let suite = self.codec.open_suite(suite_bytes)?;
        ctx.admit(&suite, now)?;
        let statements = parse_script(script)?;

        let fp = fingerprint::suite(&suite);
        tracing::info!(
            event = "sqlgrade.run.start",
            lab = %suite.lab,
            mode = %ctx.mode,
            target = %ctx.target,
            tests = suite.tests.len(),
            statements = statements.len(),
            suite_fingerprint = %fp.hex,
        );

        let report = self.grade(&ctx.target, &suite, &statements).await?;

        let sealed = match (ctx.persist_report, &ctx.student_id) {
            (true, Some(student_id)) => {
                let envelope = SealedReport {
                    student_id: student_id.to_string(),
                    submitted_at: now,
                    suite_fingerprint: fp.hex.clone(),
                    script_sha256: fingerprint::sha256_hex(script),
                    report: report.clone(),
                };
                Some(self.codec.seal_report(&envelope)?)
            }
            (true, None) => return Err(GradeError::MissingStudentId),
            (false, _) => None,
        };

        tracing::info!(
            event = "sqlgrade.run.finished",
            total_score = report.total_score,
            max_score = report.max_score,
            passed = report.passed(),
        );
        Ok(RunArtifacts {
            report,
            suite_fingerprint: fp.hex,
            sealed,
        })
    }

    /// Grades statements against `suite` in order on one connection.
    ///
    /// Statement `i` answers test `i`. A connection failure aborts with no report.
    pub async fn grade(
        &self,
        target: &DbTarget,
        suite: &TestSuite,
        statements: &[Statement],
    ) -> Result<GradingReport, GradeError> {
        let mut conn = self.connector.connect(target).await?;
        let mut card = ScoreCard::new();

        for (i, tc) in suite.tests.iter().enumerate() {
            let obs = match statements.get(i) {
                None => Observation::Missing,
                Some(stmt) => {
                    let violations = constraints::violations(&tc.constraints, &analyze(&stmt.text));
                    let plan = ExecutionPlan::for_case(tc);
                    let executed = executor::execute(&mut *conn, &plan, &stmt.text).await;
                    if let Err(ExecError::Connection(e)) = executed {
                        return Err(e.into());
                    }
                    let mode = OrderingMode::for_case(tc);
                    Observation::ran(violations, executed, |actual| {
                        compare(actual, tc.expected_result.as_ref(), mode)
                    })
                }
            };

            let row = decide(tc, obs);
            tracing::debug!(
                event = "sqlgrade.test.graded",
                test_id = %row.test_id,
                status = row.status.as_str(),
                score = row.score,
            );
            card.record(row);
        }

        if statements.len() > suite.tests.len() {
            tracing::warn!(
                extra = statements.len() - suite.tests.len(),
                "script has more statements than the suite has tests; extras were not run"
            );
        }

        Ok(card.finish(&suite.lab, suite.mode))
    }
}
