use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlgrade_core::codec::{Codec, Secret};
use sqlgrade_core::config::manifest::{LabManifest, QuestionSpec};
use sqlgrade_core::config::RunnerConfig;
use sqlgrade_core::engine::capture::capture_suite;
use sqlgrade_core::engine::runner::Runner;
use sqlgrade_core::errors::{ConnectionError, ExecError, GradeError};
use sqlgrade_core::mode::{ExecutionContext, StudentId};
use sqlgrade_core::model::{QueryType, ResultSet, SuiteMode, TestStatus, Value};
use sqlgrade_core::providers::db::{Connection, Connector, DbTarget};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend that understands `CREATE FUNCTION name(x) RETURNS x * <k>` and
/// `SELECT name(<int>)`, counting every connect.
#[derive(Default)]
struct FakeConnector {
    connects: AtomicUsize,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _target: &DbTarget) -> Result<Box<dyn Connection>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection::default()))
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
struct FakeConnection {
    functions: Vec<(String, i64)>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, ExecError> {
        let upper = sql.to_ascii_uppercase();
        if upper.starts_with("DROP FUNCTION") {
            return Ok(None);
        }
        if upper.starts_with("CREATE FUNCTION") {
            let name = sql["CREATE FUNCTION ".len()..]
                .split('(')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            let factor = sql
                .rsplit('*')
                .next()
                .and_then(|k| k.trim().trim_end_matches(';').parse().ok())
                .ok_or_else(|| ExecError::Statement("bad function body".into()))?;
            self.functions.retain(|(n, _)| *n != name);
            self.functions.push((name, factor));
            return Ok(None);
        }
        if let Some(call) = sql.strip_prefix("SELECT ") {
            let (name, rest) = call
                .split_once('(')
                .ok_or_else(|| ExecError::Statement(format!("syntax error: {}", sql)))?;
            let arg: i64 = rest
                .trim_end_matches(')')
                .parse()
                .map_err(|_| ExecError::Statement("bad argument".into()))?;
            let (_, k) = self
                .functions
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| ExecError::Statement(format!("FUNCTION {} does not exist", name)))?;
            return Ok(Some(ResultSet::single_column("r", vec![Value::Int(arg * k)])));
        }
        Err(ExecError::Statement(format!("unsupported: {}", sql)))
    }
}

fn codec() -> Codec {
    Codec::new(Secret::from_build(Some("fake-secret")))
}

fn manifest() -> LabManifest {
    let mut m = LabManifest::default();
    m.questions.insert(
        "q1".into(),
        QuestionSpec {
            function_arguments: Some(vec![
                vec![serde_json::json!(1)],
                vec![serde_json::json!(4)],
                vec![serde_json::json!(-2)],
            ]),
            ..Default::default()
        },
    );
    m
}

async fn eval_suite(allowed_after: chrono::DateTime<Utc>) -> anyhow::Result<Vec<u8>> {
    let capture = FakeConnector::default();
    let suite = capture_suite(
        &capture,
        &DbTarget::grading("fake"),
        "CREATE FUNCTION triple(x INT) RETURNS x * 3;",
        &manifest(),
        SuiteMode::Eval,
        Some(allowed_after),
    )
    .await?;
    assert_eq!(suite.tests[0].query_type, QueryType::Function);
    assert_eq!(
        suite.tests[0].expected_result,
        Some(ResultSet::single_column(
            "result",
            vec![Value::Int(3), Value::Int(12), Value::Int(-6)]
        ))
    );
    Ok(codec().seal_suite(&suite)?)
}

fn eval_ctx() -> anyhow::Result<ExecutionContext> {
    Ok(ExecutionContext::eval(
        &RunnerConfig::default(),
        StudentId::parse("2021a7ps0001g")?,
    ))
}

#[tokio::test]
async fn test_timing_gate_blocks_before_any_connection() -> anyhow::Result<()> {
    let now = Utc::now();
    let suite = eval_suite(now + Duration::minutes(30)).await?;

    let connector = Arc::new(FakeConnector::default());
    let runner = Runner::new(connector.clone(), codec());
    let err = runner
        .run(&eval_ctx()?, &suite, "CREATE FUNCTION triple(x INT) RETURNS x * 3;", now)
        .await
        .unwrap_err();

    assert!(matches!(err, GradeError::Timing(_)), "{}", err);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_function_tests_compare_per_argument() -> anyhow::Result<()> {
    let now = Utc::now();
    let suite = eval_suite(now - Duration::minutes(1)).await?;
    let connector = Arc::new(FakeConnector::default());
    let runner = Runner::new(connector.clone(), codec());
    let ctx = eval_ctx()?;

    let right = runner
        .run(&ctx, &suite, "CREATE FUNCTION triple(x INT) RETURNS x * 3", now)
        .await?;
    assert_eq!(right.report.results[0].status, TestStatus::Pass);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    let wrong = runner
        .run(&ctx, &suite, "CREATE FUNCTION triple(x INT) RETURNS x * 2", now)
        .await?;
    assert_eq!(wrong.report.results[0].status, TestStatus::Mismatch);
    assert!(wrong.report.results[0].reason.contains("row 1"));

    // The expected routine is called even when the submission names another one.
    let renamed = runner
        .run(&ctx, &suite, "CREATE FUNCTION thrice(x INT) RETURNS x * 3", now)
        .await?;
    assert_eq!(renamed.report.results[0].status, TestStatus::Error);
    assert!(renamed.report.results[0].reason.contains("triple"));
    Ok(())
}
