// SQLite-backed implementation of the executor seam.
use crate::domain::error::SqlCacheError;
use crate::domain::model::{Column, Query, QueryKind, QueryValue, Row};
use crate::domain::traits::{ConnectionHandle, StatementExecutor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;

/// Opens one SQLite connection per `open` call; the connection lives for as
/// long as the returned handle and is released when the handle drops.
pub struct SqliteExecutor {
    path: PathBuf,
}

impl SqliteExecutor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StatementExecutor for SqliteExecutor {
    async fn open(&self) -> Result<Box<dyn ConnectionHandle>, SqlCacheError> {
        let conn = Connection::open(self.path.clone()).await.map_err(|e| {
            SqlCacheError::Connection(format!(
                "failed to open database {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Box::new(SqliteHandle { conn }))
    }
}

struct SqliteHandle {
    conn: Connection,
}

#[async_trait]
impl ConnectionHandle for SqliteHandle {
    async fn execute(&mut self, query: &Query) -> Result<QueryValue, SqlCacheError> {
        let text = query.text.clone();
        let kind = query.kind;
        let params: Vec<rusqlite::types::Value> =
            query.parameters.iter().map(to_sql_value).collect();

        // The closure's error type must be spelled out; nothing else pins
        // the `call` error parameter here.
        let result = self
            .conn
            .call(move |conn| -> Result<QueryValue, rusqlite::Error> {
                match kind {
                    QueryKind::NonQuery => {
                        let affected =
                            conn.execute(&text, rusqlite::params_from_iter(params))?;
                        Ok(QueryValue::NonQuery(affected as i64))
                    }
                    QueryKind::Scalar => {
                        use rusqlite::OptionalExtension;

                        let value = conn
                            .query_row(&text, rusqlite::params_from_iter(params), |row| {
                                Ok(from_sql_value(row.get_ref(0)?))
                            })
                            .optional()?;

                        // No rows means a null scalar, not an error.
                        Ok(QueryValue::Scalar(value.unwrap_or(serde_json::Value::Null)))
                    }
                    QueryKind::Reader => {
                        let mut stmt = conn.prepare(&text)?;
                        let names: Vec<String> = stmt
                            .column_names()
                            .iter()
                            .map(|name| name.to_string())
                            .collect();

                        let mut raw_rows = stmt.query(rusqlite::params_from_iter(params))?;
                        let mut rows = Vec::new();
                        while let Some(row) = raw_rows.next()? {
                            let mut columns = Vec::with_capacity(names.len());
                            for (i, name) in names.iter().enumerate() {
                                columns.push(Column {
                                    name: name.clone(),
                                    value: from_sql_value(row.get_ref(i)?),
                                });
                            }
                            rows.push(Row::new(columns));
                        }

                        Ok(QueryValue::Rows(rows))
                    }
                }
            })
            .await;

        result.map_err(|e| {
            SqlCacheError::Execution(format!("query \"{}\" failed: {}", query.text, e))
        })
    }

    async fn begin(&mut self) -> Result<(), SqlCacheError> {
        self.conn
            .call(|conn| conn.execute_batch("BEGIN IMMEDIATE"))
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlCacheError> {
        self.conn.call(|conn| conn.execute_batch("COMMIT")).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlCacheError> {
        self.conn
            .call(|conn| conn.execute_batch("ROLLBACK"))
            .await?;
        Ok(())
    }
}

fn to_sql_value(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        serde_json::Value::Null => Sql::Null,
        serde_json::Value::Bool(b) => Sql::Integer(*b as i64),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => Sql::Text(s.clone()),
        // Arrays and objects are bound as their JSON text.
        other => Sql::Text(other.to_string()),
    }
}

fn from_sql_value(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(text) => {
            serde_json::Value::String(String::from_utf8_lossy(text).into_owned())
        }
        ValueRef::Blob(bytes) => serde_json::Value::Array(
            bytes.iter().map(|&b| serde_json::Value::from(b)).collect(),
        ),
    }
}
