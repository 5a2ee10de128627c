use crate::config::manifest::{question_id, LabManifest};
use crate::constraints::{self, analyze};
use crate::errors::{CaptureError, ExecError, GradeError};
use crate::executor::{self, ExecutionPlan};
use crate::model::{QueryType, SuiteMode, TestCase, TestSuite};
use crate::parser::{self, parse_script};
use crate::providers::db::{Connection, Connector, DbTarget};
use chrono::{DateTime, Utc};

/// Builds a suite by running the solution script against `target` and
/// recording each statement's output as the expectation.
pub async fn capture_suite(
    connector: &dyn Connector,
    target: &DbTarget,
    script: &str,
    manifest: &LabManifest,
    mode: SuiteMode,
    allowed_after: Option<DateTime<Utc>>,
) -> Result<TestSuite, GradeError> {
    let statements = parse_script(script)?;
    if statements.is_empty() {
        return Err(CaptureError::Empty.into());
    }
    manifest.validate(statements.len())?;

    let mut conn = connector.connect(target).await?;
    let mut tests = Vec::with_capacity(statements.len());

    for (i, stmt) in statements.iter().enumerate() {
        let id = question_id(i);
        let q = manifest.question(i);

        let violations = constraints::violations(&q.constraints, &analyze(&stmt.text));
        if !violations.is_empty() {
            let names: Vec<String> = violations.iter().map(|c| c.to_string()).collect();
            return Err(CaptureError::SolutionViolates {
                id,
                violations: names.join(", "),
            }
            .into());
        }

        let function_arguments = q.typed_arguments(&id)?;
        if stmt.query_type == QueryType::Function && function_arguments.is_none() {
            tracing::warn!(test_id = %id, "function question has no function_arguments; nothing will be compared");
        }

        let check_query = q
            .check_query
            .clone()
            .or_else(|| infer_check_query(conn.as_ref(), stmt.query_type, &stmt.text));
        let ordered = match stmt.query_type {
            QueryType::Function => true,
            _ => analyze(check_query.as_deref().unwrap_or(&stmt.text)).ordered_output,
        };

        let mut tc = TestCase {
            id,
            statement_text: stmt.text.clone(),
            query_type: stmt.query_type,
            constraints: q.constraints.iter().copied().collect(),
            expected_result: None,
            score_weight: q.score,
            function_arguments,
            check_query,
            ordered,
        };

        let plan = ExecutionPlan::for_case(&tc);
        let executed = executor::execute(&mut *conn, &plan, &tc.statement_text).await;
        tc.expected_result = match executed {
            Ok(rs) => rs,
            Err(ExecError::Connection(e)) => return Err(e.into()),
            Err(ExecError::Statement(message)) => {
                return Err(CaptureError::Execution { id: tc.id, message }.into())
            }
        };
        if tc.expected_result.as_ref().is_some_and(|rs| rs.has_non_finite()) {
            return Err(CaptureError::NonFiniteValue { id: tc.id }.into());
        }

        tracing::debug!(
            event = "sqlgrade.capture.test",
            test_id = %tc.id,
            query_type = tc.query_type.as_str(),
            rows = tc.expected_result.as_ref().map(|r| r.rows.len()),
        );
        tests.push(tc);
    }

    let suite = TestSuite {
        lab: manifest.lab.clone(),
        mode,
        tests,
        allowed_after,
    };
    tracing::info!(
        event = "sqlgrade.suite.captured",
        lab = %suite.lab,
        mode = %mode,
        target = %target,
        tests = suite.tests.len(),
    );
    Ok(suite)
}

/// Follow-up query showing the effect of a statement that returns no rows.
pub fn infer_check_query(
    conn: &dyn Connection,
    query_type: QueryType,
    statement: &str,
) -> Option<String> {
    match query_type {
        QueryType::View => parser::view_name(statement).map(|v| format!("SELECT * FROM {}", v)),
        QueryType::Dml => parser::dml_target(statement).map(|t| format!("SELECT * FROM {}", t)),
        QueryType::DdlDml => match parser::leading_keyword(statement).as_deref() {
            Some("CREATE" | "ALTER") => {
                parser::table_name(statement).map(|t| conn.describe_table_sql(&t))
            }
            _ => None,
        },
        _ => None,
    }
}
