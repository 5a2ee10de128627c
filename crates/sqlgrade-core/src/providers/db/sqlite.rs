use super::{Connection, Connector, DbObject, DbTarget};
use crate::errors::{ConnectionError, ExecError};
use crate::model::{ResultSet, Value};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection as RawConnection, ErrorCode, OpenFlags};
use std::path::Path;

pub const MEMORY: &str = ":memory:";

pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self, target: &DbTarget) -> Result<Box<dyn Connection>, ConnectionError> {
        let fail = |message: String| ConnectionError {
            target: target.to_string(),
            message,
        };

        let conn = if target.location == MEMORY {
            RawConnection::open_in_memory()
        } else {
            // Never create a fresh empty database in place of a missing one.
            if !target.location.starts_with("file:") && !Path::new(&target.location).exists() {
                return Err(fail("database file does not exist".into()));
            }
            RawConnection::open_with_flags(
                &target.location,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| fail(e.to_string()))?;

        // Opening is lazy in sqlite; touch the schema so a bad file fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
            .map_err(|e| fail(e.to_string()))?;

        tracing::info!(
            event = "sqlgrade.db.connected",
            backend = "sqlite",
            target = %target,
        );
        Ok(Box::new(SqliteConnection::new(conn, target.to_string())))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

pub struct SqliteConnection {
    conn: RawConnection,
    target: String,
}

impl SqliteConnection {
    pub fn new(conn: RawConnection, target: impl Into<String>) -> Self {
        Self {
            conn,
            target: target.into(),
        }
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, ExecError> {
        let target = self.target.as_str();
        let mut stmt = self.conn.prepare(sql).map_err(|e| classify(target, e))?;

        let column_count = stmt.column_count();
        if column_count == 0 {
            stmt.execute([]).map_err(|e| classify(target, e))?;
            return Ok(None);
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut out = Vec::new();
        let mut rows = stmt.query([]).map_err(|e| classify(target, e))?;
        while let Some(row) = rows.next().map_err(|e| classify(target, e))? {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let cell = row.get_ref(i).map_err(|e| classify(target, e))?;
                cells.push(to_value(cell));
            }
            out.push(cells);
        }
        Ok(Some(ResultSet::new(columns, out)))
    }

    fn describe_table_sql(&self, table: &str) -> String {
        format!(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info('{}') ORDER BY cid",
            table.replace('\'', "''")
        )
    }

    fn drop_if_exists_sql(&self, object: DbObject, name: &str) -> Option<String> {
        match object {
            DbObject::Function => None,
            _ => Some(format!(
                "DROP {} IF EXISTS \"{}\"",
                object.keyword(),
                name.replace('"', "\"\"")
            )),
        }
    }
}

fn to_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn classify(target: &str, e: rusqlite::Error) -> ExecError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
        if matches!(
            failure.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
        ) {
            return ExecError::Connection(ConnectionError {
                target: target.to_string(),
                message: e.to_string(),
            });
        }
    }
    ExecError::Statement(e.to_string())
}
