//! Shared types for the analytics library.
//!
//! Every report section and transform works on the same small vocabulary:
//! a typed [`Value`], a column-ordered [`ResultTable`], and the immutable
//! [`FilterState`] captured from the current UI selection.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::warehouse::RetrievalError;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Analytics-specific error.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A transform referenced a column the table does not carry.
    #[error("column '{0}' is not present in the result table")]
    UnknownColumn(String),

    /// A caller supplied an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The data source could not be reached or rejected the query.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Writing an export failed.
    #[error("export failed: {0}")]
    Export(String),
}

/// Convenience alias.
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell of a result table.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the cell. NaN is treated as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Build a number cell, mapping NaN and infinities to null.
    pub fn number(n: f64) -> Self {
        if n.is_finite() { Self::Number(n) } else { Self::Null }
    }

    pub fn from_option(n: Option<f64>) -> Self {
        n.map_or(Self::Null, Self::number)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Number(_) => 1,
            Self::Date(_) => 2,
            Self::Text(_) => 3,
        }
    }

    /// Total order used for grouping and tie-breaks:
    /// null < numbers < dates < text, numbers compared with `total_cmp`.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<Option<f64>> for Value {
    fn from(n: Option<f64>) -> Self {
        Self::from_option(n)
    }
}

// ---------------------------------------------------------------------------
// ResultTable
// ---------------------------------------------------------------------------

/// Ordered rows sharing a fixed column set.
///
/// Rows are stored positionally; `rows[i][j]` is the value of `columns[j]`.
/// Transforms never mutate a table in place, they build a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with nulls and long rows are
    /// truncated so the column set stays fixed.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        for row in rows {
            self.push_row(row);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Like [`Self::column_index`], but a missing column is an error.
    pub fn require_column(&self, name: &str) -> AnalyticsResult<usize> {
        self.column_index(name)
            .ok_or_else(|| AnalyticsError::UnknownColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> AnalyticsResult<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Non-null numeric values of one column, in row order.
    pub fn numeric_values(&self, name: &str) -> AnalyticsResult<Vec<f64>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().filter_map(|r| r[idx].as_f64()).collect())
    }

    /// Distinct non-null values of a column, sorted.
    pub fn distinct(&self, name: &str) -> AnalyticsResult<Vec<Value>> {
        let mut values: Vec<Value> = self
            .column_values(name)?
            .into_iter()
            .filter(|v| !v.is_null())
            .cloned()
            .collect();
        values.sort_by(Value::total_cmp);
        values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        Ok(values)
    }

    /// Keep rows for which `keep` returns true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&RowRef<'_>) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|r| {
                keep(&RowRef {
                    columns: &self.columns,
                    values: r,
                })
            })
            .cloned()
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Drop rows whose value in `column` is not a usable number.
    pub fn drop_null(&self, column: &str) -> AnalyticsResult<Self> {
        let idx = self.require_column(column)?;
        Ok(self.filter_rows(|r| r.values[idx].as_f64().is_some()))
    }

    /// Append (or replace) a column computed from each row.
    pub fn with_column<F>(&self, name: &str, mut compute: F) -> Self
    where
        F: FnMut(&RowRef<'_>) -> Value,
    {
        let existing = self.column_index(name);
        let mut columns = self.columns.clone();
        if existing.is_none() {
            columns.push(name.to_string());
        }
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let computed = compute(&RowRef {
                    columns: &self.columns,
                    values: r,
                });
                let mut row = r.clone();
                match existing {
                    Some(idx) => row[idx] = computed,
                    None => row.push(computed),
                }
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Project onto the given columns, in the given order.
    pub fn select(&self, columns: &[&str]) -> AnalyticsResult<Self> {
        let idxs = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<AnalyticsResult<Vec<_>>>()?;
        Ok(Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| idxs.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Remove columns; unknown names are ignored.
    pub fn drop_columns(&self, columns: &[&str]) -> Self {
        let keep: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !columns.contains(c))
            .collect();
        self.select(&keep).unwrap_or_default()
    }

    pub fn rename(&self, from: &str, to: &str) -> Self {
        let mut out = self.clone();
        if let Some(idx) = out.column_index(from) {
            out.columns[idx] = to.to_string();
        }
        out
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|r| RowRef {
            columns: &self.columns,
            values: r,
        })
    }
}

/// Borrowed view of one row with by-name access.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    pub columns: &'a [String],
    pub values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn text(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// The global selection every report section is derived from.
///
/// Empty sets mean "no filter". Built once per interaction and threaded by
/// reference into every query builder; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterState {
    pub selected_states: BTreeSet<String>,
    pub selected_facility_ids: BTreeSet<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl FilterState {
    /// Build a fully-formed filter. An inverted range is rejected; a
    /// single-month range (`start == end`) is valid.
    pub fn new<S, F>(
        states: S,
        facility_ids: F,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> AnalyticsResult<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        if period_start > period_end {
            return Err(AnalyticsError::InvalidArgument(format!(
                "period start {period_start} is after period end {period_end}"
            )));
        }
        Ok(Self {
            selected_states: states.into_iter().map(Into::into).collect(),
            selected_facility_ids: facility_ids.into_iter().map(Into::into).collect(),
            period_start,
            period_end,
        })
    }

    /// Same selection with a different state set (used by sections that
    /// carry a local state override).
    pub fn with_states<S>(&self, states: S) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            selected_states: states.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }
}

/// A value in a named column failed to parse into its semantic type and
/// was replaced with null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercionWarning {
    pub column: String,
    pub failures: usize,
    /// True when coercion left the column with no usable value at all.
    pub emptied: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> ResultTable {
        ResultTable::new(["ccn", "hprd"]).with_rows(vec![
            vec!["A".into(), 4.0.into()],
            vec!["B".into(), Value::Null],
            vec!["C".into()],
        ])
    }

    #[test]
    fn push_row_pads_short_rows() {
        let t = sample();
        assert_eq!(t.rows[2], vec![Value::from("C"), Value::Null]);
    }

    #[test]
    fn numeric_values_skip_nulls() {
        assert_eq!(sample().numeric_values("hprd").unwrap(), vec![4.0]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let err = sample().column_values("nope").unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownColumn(c) if c == "nope"));
    }

    #[test]
    fn with_column_does_not_touch_input() {
        let t = sample();
        let derived = t.with_column("double", |r| Value::from_option(r.number("hprd").map(|v| v * 2.0)));
        assert_eq!(t.columns.len(), 2);
        assert_eq!(derived.columns, vec!["ccn", "hprd", "double"]);
        assert_eq!(derived.rows[0][2], Value::Number(8.0));
        assert_eq!(derived.rows[1][2], Value::Null);
    }

    #[test]
    fn number_constructor_rejects_non_finite() {
        assert_eq!(Value::number(f64::NAN), Value::Null);
        assert_eq!(Value::number(f64::INFINITY), Value::Null);
    }

    #[test]
    fn total_cmp_orders_kinds() {
        let mut v = vec![
            Value::from("b"),
            Value::Number(2.0),
            Value::Null,
            Value::Date(date(2024, 1, 1)),
            Value::Number(-1.0),
        ];
        v.sort_by(Value::total_cmp);
        assert_eq!(
            v,
            vec![
                Value::Null,
                Value::Number(-1.0),
                Value::Number(2.0),
                Value::Date(date(2024, 1, 1)),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn display_prints_integral_numbers_without_fraction() {
        assert_eq!(Value::Number(12000.0).to_string(), "12000");
        assert_eq!(Value::Number(4.25).to_string(), "4.25");
        assert_eq!(Value::Date(date(2024, 3, 1)).to_string(), "2024-03-01");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn filter_state_rejects_inverted_range() {
        let err = FilterState::new(
            Vec::<String>::new(),
            Vec::<String>::new(),
            date(2024, 5, 1),
            date(2024, 1, 1),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
    }

    #[test]
    fn filter_state_accepts_single_point_range() {
        let f = FilterState::new(["CA"], Vec::<String>::new(), date(2024, 1, 1), date(2024, 1, 1))
            .unwrap();
        assert_eq!(f.period_start, f.period_end);
    }

    #[test]
    fn distinct_sorts_and_dedups() {
        let t = ResultTable::new(["s"]).with_rows(vec![
            vec!["TX".into()],
            vec!["CA".into()],
            vec![Value::Null],
            vec!["TX".into()],
        ]);
        assert_eq!(t.distinct("s").unwrap(), vec![Value::from("CA"), Value::from("TX")]);
    }
}
