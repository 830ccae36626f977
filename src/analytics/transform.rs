//! Reusable operations over query results.
//!
//! Every function here takes its input tables by reference and returns a new
//! table. Null handling and tie-breaks are explicit:
//!
//! - reducers see only non-null numeric values; a group with none is dropped
//! - sorts are stable (`slice::sort_by`), nulls last for descending measures
//! - percent change is null unless the first value is positive

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use super::bucketing::parse_warehouse_date;
use super::derive::{self, PercentileMethod};
use super::types::{AnalyticsError, AnalyticsResult, CoercionWarning, ResultTable, Value};

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

fn coerce_with<F>(
    table: &ResultTable,
    columns: &[&str],
    convert: F,
) -> (ResultTable, Vec<CoercionWarning>)
where
    F: Fn(&Value) -> Option<Value>,
{
    let mut out = table.clone();
    let mut warnings = Vec::new();
    for name in columns {
        let Some(idx) = out.column_index(name) else {
            continue;
        };
        let mut failures = 0usize;
        let mut usable = 0usize;
        for row in &mut out.rows {
            let cell = &mut row[idx];
            if cell.is_null() {
                continue;
            }
            match convert(&*cell) {
                Some(v) => {
                    usable += 1;
                    *cell = v;
                }
                None => {
                    failures += 1;
                    *cell = Value::Null;
                }
            }
        }
        if failures > 0 {
            let warning = CoercionWarning {
                column: name.to_string(),
                failures,
                emptied: usable == 0,
            };
            tracing::warn!(
                target: "staffing::coerce",
                column = %warning.column,
                failures,
                emptied = warning.emptied,
                "values could not be coerced and were set to null"
            );
            warnings.push(warning);
        }
    }
    (out, warnings)
}

/// Parse the named columns as numbers. Unparseable values become null.
/// Columns the table does not carry are skipped.
pub fn coerce_numeric(table: &ResultTable, columns: &[&str]) -> (ResultTable, Vec<CoercionWarning>) {
    coerce_with(table, columns, |v| match v {
        Value::Number(n) => Some(Value::number(*n)).filter(|v| !v.is_null()),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).map(Value::Number),
        Value::Date(_) | Value::Null => None,
    })
}

/// Parse the named columns as dates. Unparseable values become null.
pub fn coerce_temporal(table: &ResultTable, columns: &[&str]) -> (ResultTable, Vec<CoercionWarning>) {
    coerce_with(table, columns, |v| match v {
        Value::Date(d) => Some(Value::Date(*d)),
        Value::Text(s) => parse_warehouse_date(s).map(Value::Date),
        Value::Number(_) | Value::Null => None,
    })
}

// ---------------------------------------------------------------------------
// Group-wise aggregation
// ---------------------------------------------------------------------------

/// A reduction over the non-null values of one measure within a group.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Reducer {
    Mean,
    Min,
    Max,
    Sum,
    /// Non-null values.
    Count,
    /// Rows in the group, null measures included.
    Size,
    /// Sample standard deviation.
    StdDev,
    Percentile(f64),
}

impl Reducer {
    fn apply(&self, values: &[f64], rows: usize, method: PercentileMethod) -> Value {
        match self {
            Self::Mean => derive::mean(values).into(),
            Self::Min => derive::min(values).into(),
            Self::Max => derive::max(values).into(),
            Self::Sum => Value::number(values.iter().sum()),
            Self::Count => Value::Number(values.len() as f64),
            Self::Size => Value::Number(rows as f64),
            Self::StdDev => derive::std_dev(values).into(),
            Self::Percentile(q) => derive::percentile(values, *q, method).into(),
        }
    }
}

/// Ordering wrapper so group keys can live in a `BTreeMap`.
#[derive(Debug, Clone)]
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// Group rows by `group_keys` and reduce `measure` with each
/// `(output_column, reducer)` pair.
///
/// Output columns are the group keys followed by the reducer outputs; groups
/// come out sorted by key. Groups whose measure is null on every row are
/// excluded.
pub fn aggregate_by_group(
    table: &ResultTable,
    group_keys: &[&str],
    measure: &str,
    reducers: &[(&str, Reducer)],
    method: PercentileMethod,
) -> AnalyticsResult<ResultTable> {
    let key_idx = group_keys
        .iter()
        .map(|k| table.require_column(k))
        .collect::<AnalyticsResult<Vec<_>>>()?;
    let measure_idx = table.require_column(measure)?;

    let mut groups: BTreeMap<GroupKey, (Vec<f64>, usize)> = BTreeMap::new();
    for row in &table.rows {
        let key = GroupKey(key_idx.iter().map(|&i| row[i].clone()).collect());
        let entry = groups.entry(key).or_default();
        entry.1 += 1;
        if let Some(v) = row[measure_idx].as_f64() {
            entry.0.push(v);
        }
    }

    let mut out = ResultTable::new(
        group_keys
            .iter()
            .copied()
            .chain(reducers.iter().map(|(name, _)| *name)),
    );
    for (key, (values, rows)) in groups {
        if values.is_empty() {
            continue;
        }
        let mut row = key.0;
        row.extend(reducers.iter().map(|(_, r)| r.apply(&values, rows, method)));
        out.push_row(row);
    }
    Ok(out)
}

/// Sum of `measure` per group, nulls skipped; groups with no value get null.
pub fn sum_by_group(
    table: &ResultTable,
    group_keys: &[&str],
    measure: &str,
    output: &str,
) -> AnalyticsResult<ResultTable> {
    let key_idx = group_keys
        .iter()
        .map(|k| table.require_column(k))
        .collect::<AnalyticsResult<Vec<_>>>()?;
    let measure_idx = table.require_column(measure)?;
    let mut sums: BTreeMap<GroupKey, Option<f64>> = BTreeMap::new();
    for row in &table.rows {
        let key = GroupKey(key_idx.iter().map(|&i| row[i].clone()).collect());
        let slot = sums.entry(key).or_default();
        if let Some(v) = row[measure_idx].as_f64() {
            *slot = Some(slot.unwrap_or(0.0) + v);
        }
    }
    let mut out = ResultTable::new(group_keys.iter().copied().chain([output]));
    for (key, sum) in sums {
        let mut row = key.0;
        row.push(sum.into());
        out.push_row(row);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Sorting and ranking
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One key of a composite sort.
#[derive(Copy, Clone, Debug)]
pub struct SortKey<'a> {
    pub column: &'a str,
    pub direction: Direction,
}

impl<'a> SortKey<'a> {
    pub fn asc(column: &'a str) -> Self {
        Self {
            column,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: &'a str) -> Self {
        Self {
            column,
            direction: Direction::Descending,
        }
    }
}

/// Compare two cells; nulls sort last in either direction.
fn compare_cells(a: &Value, b: &Value, direction: Direction) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            Direction::Ascending => a.total_cmp(b),
            Direction::Descending => b.total_cmp(a),
        },
    }
}

/// Stable multi-key sort. Rows equal on every key keep their input order.
pub fn stable_sort(table: &ResultTable, keys: &[SortKey<'_>]) -> AnalyticsResult<ResultTable> {
    let idx = keys
        .iter()
        .map(|k| table.require_column(k.column).map(|i| (i, k.direction)))
        .collect::<AnalyticsResult<Vec<_>>>()?;
    let mut rows = table.rows.clone();
    rows.sort_by(|a, b| {
        idx.iter()
            .map(|&(i, dir)| compare_cells(&a[i], &b[i], dir))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(ResultTable {
        columns: table.columns.clone(),
        rows,
    })
}

/// Top `n` rows by `measure` descending, ties broken by `tie_break`
/// ascending. With `n` at or above the row count every row is returned,
/// sorted.
pub fn stable_top_n(
    table: &ResultTable,
    measure: &str,
    n: usize,
    tie_break: &str,
) -> AnalyticsResult<ResultTable> {
    let sorted = stable_sort(table, &[SortKey::desc(measure), SortKey::asc(tie_break)])?;
    Ok(sorted.head(n))
}

// ---------------------------------------------------------------------------
// First-vs-last comparison
// ---------------------------------------------------------------------------

/// Column names produced by [`pivot_first_last`].
pub const FIRST_VALUE: &str = "first_value";
pub const LAST_VALUE: &str = "last_value";
pub const DELTA: &str = "delta";
pub const PCT_CHANGE: &str = "pct_change";

/// One row per entity with the measure at `first_period` and `last_period`.
///
/// Several rows for the same entity and period are averaged (nulls
/// skipped). A period with no value yields null; `delta` is null unless both
/// ends are present, and `pct_change` is null unless the first value is
/// positive. Entities come out sorted by key.
pub fn pivot_first_last(
    table: &ResultTable,
    entity_keys: &[&str],
    period: &str,
    measure: &str,
    first_period: &Value,
    last_period: &Value,
) -> AnalyticsResult<ResultTable> {
    let key_idx = entity_keys
        .iter()
        .map(|k| table.require_column(k))
        .collect::<AnalyticsResult<Vec<_>>>()?;
    let period_idx = table.require_column(period)?;
    let measure_idx = table.require_column(measure)?;

    let mut entities: BTreeMap<GroupKey, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in &table.rows {
        let at = &row[period_idx];
        let is_first = at.total_cmp(first_period) == Ordering::Equal;
        let is_last = at.total_cmp(last_period) == Ordering::Equal;
        if !is_first && !is_last {
            continue;
        }
        let key = GroupKey(key_idx.iter().map(|&i| row[i].clone()).collect());
        let slot = entities.entry(key).or_default();
        if let Some(v) = row[measure_idx].as_f64() {
            if is_first {
                slot.0.push(v);
            }
            if is_last {
                slot.1.push(v);
            }
        }
    }

    let mut out = ResultTable::new(
        entity_keys
            .iter()
            .copied()
            .chain([FIRST_VALUE, LAST_VALUE, DELTA, PCT_CHANGE]),
    );
    for (key, (firsts, lasts)) in entities {
        let first = derive::mean(&firsts);
        let last = derive::mean(&lasts);
        let delta = first.zip(last).map(|(f, l)| l - f);
        let mut row = key.0;
        row.extend([
            first.into(),
            last.into(),
            delta.into(),
            derive::pct_change(first, last).into(),
        ]);
        out.push_row(row);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub table: ResultTable,
    /// 0-based.
    pub page_number: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub total_rows: usize,
    /// False when the whole table fits on one page; pager controls can be
    /// skipped.
    pub paginated: bool,
}

/// Rows `[page_number * page_size, (page_number + 1) * page_size)`.
/// A page past the end is clamped to the last page.
pub fn paginate(table: &ResultTable, page_size: usize, page_number: usize) -> AnalyticsResult<Page> {
    if page_size == 0 {
        return Err(AnalyticsError::InvalidArgument(
            "page size must be positive".into(),
        ));
    }
    let total_rows = table.len();
    if total_rows <= page_size {
        return Ok(Page {
            table: table.clone(),
            page_number: 0,
            page_size,
            page_count: 1,
            total_rows,
            paginated: false,
        });
    }
    let page_count = total_rows.div_ceil(page_size);
    let page_number = page_number.min(page_count - 1);
    let start = page_number * page_size;
    let end = (start + page_size).min(total_rows);
    Ok(Page {
        table: ResultTable {
            columns: table.columns.clone(),
            rows: table.rows[start..end].to_vec(),
        },
        page_number,
        page_size,
        page_count,
        total_rows,
        paginated: true,
    })
}

// ---------------------------------------------------------------------------
// KPI summary and distribution
// ---------------------------------------------------------------------------

/// Headline statistics for one measure column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    /// Section-specific extras, in display order.
    pub extras: Vec<(String, Value)>,
}

impl KpiSummary {
    pub fn with_extra(mut self, label: &str, value: impl Into<Value>) -> Self {
        self.extras.push((label.to_string(), value.into()));
        self
    }
}

/// Count, mean, median, min, max and P90 of the non-null values of `column`
/// (coerced to numbers first).
pub fn kpi_summary(
    table: &ResultTable,
    column: &str,
    method: PercentileMethod,
) -> AnalyticsResult<KpiSummary> {
    table.require_column(column)?;
    let (coerced, _) = coerce_numeric(table, &[column]);
    let values = coerced.numeric_values(column)?;
    let summary = derive::summarize(&values, method);
    Ok(KpiSummary {
        column: column.to_string(),
        count: summary.count,
        mean: summary.mean,
        median: derive::median(&values, method),
        min: summary.min,
        max: summary.max,
        p90: summary.p90,
        extras: Vec::new(),
    })
}

/// One equal-width histogram bin, `[lower, upper)` (last bin closed).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram of the non-null values of `column`.
pub fn histogram(table: &ResultTable, column: &str, bins: usize) -> AnalyticsResult<Vec<HistogramBin>> {
    if bins == 0 {
        return Err(AnalyticsError::InvalidArgument("bin count must be positive".into()));
    }
    let values = table.numeric_values(column)?;
    let (Some(lo), Some(hi)) = (derive::min(&values), derive::max(&values)) else {
        return Ok(Vec::new());
    };
    if hi == lo {
        return Ok(vec![HistogramBin {
            lower: lo,
            upper: hi,
            count: values.len(),
        }]);
    }
    let width = (hi - lo) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins { hi } else { lo + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();
    for v in values {
        let slot = (((v - lo) / width) as usize).min(bins - 1);
        out[slot].count += 1;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn named(rows: &[(&str, Option<f64>)]) -> ResultTable {
        ResultTable::new(["name", "m"]).with_rows(
            rows.iter()
                .map(|(n, v)| vec![Value::from(*n), Value::from(*v)])
                .collect(),
        )
    }

    fn names(t: &ResultTable) -> Vec<String> {
        t.column_values("name")
            .unwrap()
            .into_iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn coerce_numeric_nulls_garbage_and_keeps_rows() {
        let t = ResultTable::new(["x"]).with_rows(vec![
            vec!["1.5".into()],
            vec!["n/a".into()],
            vec![Value::Number(2.0)],
            vec![Value::Null],
        ]);
        let (out, warnings) = coerce_numeric(&t, &["x", "absent"]);
        assert_eq!(out.len(), 4);
        assert_eq!(
            out.column_values("x").unwrap(),
            vec![&Value::Number(1.5), &Value::Null, &Value::Number(2.0), &Value::Null]
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].failures, 1);
        assert!(!warnings[0].emptied);
        // input untouched
        assert_eq!(t.rows[0][0], Value::from("1.5"));
    }

    #[test]
    fn coerce_numeric_flags_emptied_column() {
        let t = ResultTable::new(["x"]).with_rows(vec![vec!["bad".into()]]);
        let (_, warnings) = coerce_numeric(&t, &["x"]);
        assert!(warnings[0].emptied);
    }

    #[test]
    fn coerce_temporal_parses_dates() {
        let t = ResultTable::new(["month"]).with_rows(vec![
            vec!["2024-01-01".into()],
            vec!["garbage".into()],
        ]);
        let (out, warnings) = coerce_temporal(&t, &["month"]);
        assert_eq!(
            out.rows[0][0],
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(out.rows[1][0], Value::Null);
        assert_eq!(warnings[0].failures, 1);
    }

    #[test]
    fn aggregate_ignores_nulls() {
        let t = named(&[("g", Some(10.0)), ("g", None), ("g", Some(20.0))]);
        let out = aggregate_by_group(
            &t,
            &["name"],
            "m",
            &[
                ("count", Reducer::Count),
                ("mean", Reducer::Mean),
                ("min", Reducer::Min),
                ("max", Reducer::Max),
                ("size", Reducer::Size),
            ],
            PercentileMethod::Linear,
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row[1], Value::Number(2.0));
        assert_eq!(row[2], Value::Number(15.0));
        assert_eq!(row[3], Value::Number(10.0));
        assert_eq!(row[4], Value::Number(20.0));
        assert_eq!(row[5], Value::Number(3.0));
    }

    #[test]
    fn aggregate_drops_all_null_groups() {
        let t = named(&[("a", None), ("b", Some(1.0))]);
        let out = aggregate_by_group(
            &t,
            &["name"],
            "m",
            &[("mean", Reducer::Mean)],
            PercentileMethod::Linear,
        )
        .unwrap();
        assert_eq!(names(&out), vec!["b"]);
    }

    #[test]
    fn aggregate_is_order_independent() {
        let a = named(&[("x", Some(1.0)), ("y", Some(5.0)), ("x", Some(3.0))]);
        let b = named(&[("y", Some(5.0)), ("x", Some(3.0)), ("x", Some(1.0))]);
        let reducers = [("mean", Reducer::Mean), ("p90", Reducer::Percentile(0.9))];
        let out_a = aggregate_by_group(&a, &["name"], "m", &reducers, PercentileMethod::Linear).unwrap();
        let out_b = aggregate_by_group(&b, &["name"], "m", &reducers, PercentileMethod::Linear).unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn top_n_breaks_ties_by_name() {
        let t = named(&[("B", Some(5.0)), ("A", Some(5.0)), ("C", Some(7.0))]);
        let out = stable_top_n(&t, "m", 3, "name").unwrap();
        assert_eq!(names(&out), vec!["C", "A", "B"]);
    }

    #[test]
    fn top_n_larger_than_table_returns_all_sorted() {
        let t = named(&[("A", Some(1.0)), ("B", Some(3.0))]);
        let out = stable_top_n(&t, "m", 10, "name").unwrap();
        assert_eq!(names(&out), vec!["B", "A"]);
    }

    #[test]
    fn top_n_puts_nulls_last() {
        let t = named(&[("A", None), ("B", Some(1.0))]);
        let out = stable_top_n(&t, "m", 2, "name").unwrap();
        assert_eq!(names(&out), vec!["B", "A"]);
    }

    #[test]
    fn stable_sort_keeps_input_order_on_full_ties() {
        let t = ResultTable::new(["name", "m", "tag"]).with_rows(vec![
            vec!["A".into(), 1.0.into(), "first".into()],
            vec!["A".into(), 1.0.into(), "second".into()],
        ]);
        let out = stable_sort(&t, &[SortKey::desc("m"), SortKey::asc("name")]).unwrap();
        assert_eq!(out.rows[0][2], Value::from("first"));
        assert_eq!(out.rows[1][2], Value::from("second"));
    }

    #[test]
    fn pivot_reports_delta_and_pct() {
        let t = ResultTable::new(["state", "month", "h"]).with_rows(vec![
            vec!["CA".into(), "2024-01".into(), 100.0.into()],
            vec!["CA".into(), "2024-03".into(), 150.0.into()],
            vec!["TX".into(), "2024-01".into(), 0.0.into()],
            vec!["TX".into(), "2024-03".into(), 10.0.into()],
            vec!["NV".into(), "2024-03".into(), 5.0.into()],
        ]);
        let out = pivot_first_last(
            &t,
            &["state"],
            "month",
            "h",
            &Value::from("2024-01"),
            &Value::from("2024-03"),
        )
        .unwrap();
        assert_eq!(out.columns, vec!["state", FIRST_VALUE, LAST_VALUE, DELTA, PCT_CHANGE]);
        // sorted by key: CA, NV, TX
        assert_eq!(
            out.rows[0],
            vec![
                Value::from("CA"),
                Value::Number(100.0),
                Value::Number(150.0),
                Value::Number(50.0),
                Value::Number(0.5)
            ]
        );
        assert_eq!(
            out.rows[1],
            vec![Value::from("NV"), Value::Null, Value::Number(5.0), Value::Null, Value::Null]
        );
        assert_eq!(
            out.rows[2],
            vec![
                Value::from("TX"),
                Value::Number(0.0),
                Value::Number(10.0),
                Value::Number(10.0),
                Value::Null
            ]
        );
    }

    #[test]
    fn paginate_splits_into_pages() {
        let t = ResultTable::new(["i"])
            .with_rows((0..60).map(|i| vec![Value::from(i as i64)]).collect());
        let sizes: Vec<usize> = (0..3)
            .map(|p| paginate(&t, 25, p).unwrap().table.len())
            .collect();
        assert_eq!(sizes, vec![25, 25, 10]);
        let page = paginate(&t, 25, 1).unwrap();
        assert!(page.paginated);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.table.rows[0][0], Value::Number(25.0));
    }

    #[test]
    fn paginate_small_table_is_unpaginated() {
        let t = ResultTable::new(["i"])
            .with_rows((0..10).map(|i| vec![Value::from(i as i64)]).collect());
        let page = paginate(&t, 25, 0).unwrap();
        assert!(!page.paginated);
        assert_eq!(page.table.len(), 10);
    }

    #[test]
    fn paginate_past_the_end_shows_last_page() {
        let t = ResultTable::new(["i"])
            .with_rows((0..30).map(|i| vec![Value::from(i as i64)]).collect());
        let page = paginate(&t, 25, 7).unwrap();
        assert_eq!(page.page_number, 1);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.table.len(), 5);
        assert_eq!(page.table.rows[0][0], Value::Number(25.0));
        assert!(paginate(&t, 0, 0).is_err());
    }

    #[test]
    fn kpi_summary_reports_headline_stats() {
        let t = named(&[("a", Some(1.0)), ("b", None), ("c", Some(3.0))]);
        let k = kpi_summary(&t, "m", PercentileMethod::Linear)
            .unwrap()
            .with_extra("Facilities", 3i64);
        assert_eq!(k.count, 2);
        assert_eq!(k.mean, Some(2.0));
        assert_eq!(k.median, Some(2.0));
        assert_eq!(k.extras[0], ("Facilities".to_string(), Value::Number(3.0)));
    }

    #[test]
    fn histogram_counts_every_value() {
        let t = ResultTable::new(["u"])
            .with_rows([0.0, 0.5, 1.0, 1.0].iter().map(|v| vec![Value::from(*v)]).collect());
        let bins = histogram(&t, "u", 4).unwrap();
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 4);
        assert_eq!(bins[3].count, 2);
    }
}
