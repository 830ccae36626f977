//! SQLite mirror of the warehouse gold views.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::{Dialect, RetrievalError, Warehouse};
use crate::analytics::types::{ResultTable, Value};

/// Read-only warehouse backed by a SQLite file.
///
/// No pooling: every [`Warehouse::execute`] opens its own connection, which
/// is closed when it goes out of scope, including on error paths.
#[derive(Debug, Clone)]
pub struct SqliteWarehouse {
    path: PathBuf,
}

impl SqliteWarehouse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, RetrievalError> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RetrievalError::Connect {
            target: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str) -> Result<ResultTable, RetrievalError> {
        let started = Instant::now();
        let conn = self.connect()?;

        let mut stmt = conn.prepare(sql).map_err(|e| RetrievalError::Query {
            message: e.to_string(),
        })?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt.query([]).map_err(|e| RetrievalError::Query {
            message: e.to_string(),
        })?;

        let mut table = ResultTable::new(columns);
        let mut blobs = 0usize;
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    return Err(RetrievalError::Decode {
                        message: e.to_string(),
                    });
                }
            };
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let cell = row.get_ref(idx).map_err(|e| RetrievalError::Decode {
                    message: e.to_string(),
                })?;
                values.push(match cell {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(i) => Value::Number(i as f64),
                    ValueRef::Real(r) => Value::number(r),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => {
                        blobs += 1;
                        Value::Null
                    }
                });
            }
            table.push_row(values);
        }

        if blobs > 0 {
            tracing::warn!(
                target: "staffing::warehouse",
                blobs,
                "binary cells have no tabular representation; read as null"
            );
        }
        tracing::debug!(
            target: "staffing::warehouse",
            rows = table.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query executed"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SqliteWarehouse) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gold.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE t (name TEXT, n INTEGER, r REAL, b BLOB);
             INSERT INTO t VALUES ('a', 1, 1.5, NULL);
             INSERT INTO t VALUES (NULL, NULL, NULL, x'00');",
        )
        .unwrap();
        (dir, SqliteWarehouse::new(path))
    }

    #[test]
    fn execute_maps_sqlite_types() {
        let (_dir, wh) = fixture();
        let t = wh.execute("SELECT name, n, r, b FROM t ORDER BY rowid").unwrap();
        assert_eq!(t.columns, vec!["name", "n", "r", "b"]);
        assert_eq!(
            t.rows[0],
            vec![Value::from("a"), Value::Number(1.0), Value::Number(1.5), Value::Null]
        );
        assert!(t.rows[1].iter().all(Value::is_null));
    }

    #[test]
    fn malformed_sql_is_a_query_error() {
        let (_dir, wh) = fixture();
        let err = wh.execute("SELEC nope").unwrap_err();
        assert!(matches!(err, RetrievalError::Query { .. }));
    }

    #[test]
    fn missing_file_is_a_connect_error() {
        let dir = TempDir::new().unwrap();
        let wh = SqliteWarehouse::new(dir.path().join("absent.db"));
        let err = wh.execute("SELECT 1").unwrap_err();
        assert!(matches!(err, RetrievalError::Connect { .. }));
    }

    #[test]
    fn connection_is_read_only() {
        let (_dir, wh) = fixture();
        let err = wh.execute("DELETE FROM t").unwrap_err();
        assert!(matches!(err, RetrievalError::Query { .. } | RetrievalError::Decode { .. }));
    }
}
