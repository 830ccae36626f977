//! Data-source adapter for the gold views.
//!
//! The analytics layer only ever talks to a [`Warehouse`]: hand it SQL text,
//! get back a typed [`ResultTable`]. Dialect differences between the hosted
//! warehouse (ANSI/Trino date literals, DECIMAL casts) and the local SQLite
//! mirror are confined to [`Dialect`].

pub mod sqlite;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::analytics::types::ResultTable;

pub use sqlite::SqliteWarehouse;

/// The data source could not be reached or rejected a query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("could not connect to warehouse at {target}: {message}")]
    Connect { target: String, message: String },

    #[error("warehouse rejected query: {message}")]
    Query { message: String },

    #[error("failed to read query results: {message}")]
    Decode { message: String },
}

/// A SQL-queryable source of pre-aggregated views.
pub trait Warehouse: Send + Sync {
    /// SQL flavour templates must render for.
    fn dialect(&self) -> Dialect;

    /// Run one read-only query. Implementations acquire a connection for the
    /// duration of this call only.
    fn execute(&self, sql: &str) -> Result<ResultTable, RetrievalError>;
}

impl<W: Warehouse + ?Sized> Warehouse for std::sync::Arc<W> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute(&self, sql: &str) -> Result<ResultTable, RetrievalError> {
        (**self).execute(sql)
    }
}

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// SQL flavour of the warehouse.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Athena / Trino.
    Ansi,
    /// SQLite mirror of the gold views (dates stored as ISO text).
    #[default]
    Sqlite,
}

impl Dialect {
    /// Unambiguous date literal (`YYYY-MM-DD`).
    pub fn date_literal(&self, date: NaiveDate) -> String {
        match self {
            Self::Ansi => format!("DATE '{}'", date.format("%Y-%m-%d")),
            Self::Sqlite => format!("date('{}')", date.format("%Y-%m-%d")),
        }
    }

    /// Interpret a column expression as a date.
    pub fn as_date(&self, expr: &str) -> String {
        match self {
            Self::Ansi => format!("CAST({expr} AS DATE)"),
            Self::Sqlite => format!("date({expr})"),
        }
    }

    /// `YYYY-MM` label of a date expression.
    pub fn month_label(&self, expr: &str) -> String {
        match self {
            Self::Ansi => format!("date_format({expr}, '%Y-%m')"),
            Self::Sqlite => format!("strftime('%Y-%m', {expr})"),
        }
    }

    /// Floating division with a NULL result on a zero denominator.
    pub fn divide(&self, numerator: &str, denominator: &str) -> String {
        match self {
            Self::Ansi => format!("({numerator}) / NULLIF({denominator}, 0)"),
            Self::Sqlite => format!("CAST(({numerator}) AS REAL) / NULLIF({denominator}, 0)"),
        }
    }

    /// Fixed-precision (4 places) ratio, NULL on a zero denominator.
    pub fn decimal_ratio(&self, numerator: &str, denominator: &str) -> String {
        match self {
            Self::Ansi => format!(
                "CAST({numerator} / NULLIF(CAST({denominator} AS DECIMAL(18,4)), 0) AS DECIMAL(18,4))"
            ),
            Self::Sqlite => {
                format!("ROUND(CAST({numerator} AS REAL) / NULLIF({denominator}, 0), 4)")
            }
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ansi => write!(f, "ansi"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ansi" | "athena" | "trino" => Ok(Self::Ansi),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown SQL dialect '{other}'")),
        }
    }
}
