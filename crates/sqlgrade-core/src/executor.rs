use crate::errors::ExecError;
use crate::model::{QueryType, ResultSet, TestCase, Value};
use crate::parser;
use crate::providers::db::{Connection, DbObject};

/// How a statement is turned into a comparable result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub query_type: QueryType,
    pub check_query: Option<String>,
    pub function_arguments: Vec<Vec<Value>>,
    /// Routine to call for function tests, taken from the captured solution.
    pub routine: Option<String>,
    /// Object dropped before the statement runs, when the solution creates one.
    pub replaces: Option<(DbObject, String)>,
}

impl ExecutionPlan {
    pub fn for_case(tc: &TestCase) -> Self {
        let routine = match tc.query_type {
            QueryType::Function => parser::routine_name(&tc.statement_text),
            _ => None,
        };
        Self {
            query_type: tc.query_type,
            check_query: tc.check_query.clone(),
            function_arguments: tc.function_arguments.clone().unwrap_or_default(),
            replaces: created_object(tc.query_type, &tc.statement_text),
            routine,
        }
    }
}

/// The schema object `statement` creates, if any.
pub fn created_object(query_type: QueryType, statement: &str) -> Option<(DbObject, String)> {
    match query_type {
        QueryType::Function => parser::routine_name(statement).map(|n| (DbObject::Function, n)),
        QueryType::View => parser::view_name(statement).map(|n| (DbObject::View, n)),
        QueryType::DdlDml if parser::leading_keyword(statement).as_deref() == Some("CREATE") => {
            parser::table_name(statement).map(|n| (DbObject::Table, n))
        }
        _ => None,
    }
}

/// Runs `statement` under `plan` and returns the comparison input.
///
/// A `check_query`, when present, replaces the statement's own output.
pub async fn execute(
    conn: &mut dyn Connection,
    plan: &ExecutionPlan,
    statement: &str,
) -> Result<Option<ResultSet>, ExecError> {
    if let Some((object, name)) = &plan.replaces {
        if let Some(drop) = conn.drop_if_exists_sql(*object, name) {
            conn.execute(&drop).await?;
        }
    }

    if plan.query_type == QueryType::Function {
        return execute_function(conn, plan, statement).await;
    }

    let output = conn.execute(statement).await?;
    match &plan.check_query {
        Some(check) => conn.execute(check).await,
        None => Ok(output),
    }
}

async fn execute_function(
    conn: &mut dyn Connection,
    plan: &ExecutionPlan,
    statement: &str,
) -> Result<Option<ResultSet>, ExecError> {
    conn.execute(statement).await?;

    // Call the routine the test expects, even if the submission renamed it.
    let name = plan
        .routine
        .clone()
        .or_else(|| parser::routine_name(statement))
        .ok_or_else(|| {
            ExecError::Statement("cannot determine the function name to call".into())
        })?;

    let mut values = Vec::with_capacity(plan.function_arguments.len());
    for args in &plan.function_arguments {
        values.push(conn.call_function(&name, args).await?);
    }
    Ok(Some(ResultSet::single_column("result", values)))
}
