//! Report sections of the staffing dashboard.
//!
//! Each section is a pure function of the catalog, the global [`FilterState`]
//! and its [`ReportOptions`]. A section that fails to retrieve its data
//! reports [`SectionOutcome::Failed`] without affecting the others; a section
//! with nothing to show reports [`SectionOutcome::Empty`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::bucketing::month_label;
use super::catalog::{self, Catalog};
use super::derive;
use super::encoding::{self, MapLayer};
use super::transform::{
    self, HistogramBin, KpiSummary, Page, Reducer, SortKey, aggregate_by_group, coerce_numeric,
    coerce_temporal, kpi_summary, paginate, pivot_first_last, stable_sort, stable_top_n,
    sum_by_group,
};
use super::types::{
    AnalyticsError, AnalyticsResult, CoercionWarning, FilterState, ResultTable, RowRef, Value,
};

/// Equal-width bins in the utilization distribution.
pub const HISTOGRAM_BINS: usize = 40;

// ---------------------------------------------------------------------------
// Sections and options
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    FacilityHprd,
    StateHprd,
    TotalHours,
    PermContract,
    BedUtilization,
    StaffingOccupancy,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Self::FacilityHprd,
        Self::StateHprd,
        Self::TotalHours,
        Self::PermContract,
        Self::BedUtilization,
        Self::StaffingOccupancy,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::FacilityHprd => "facility_hprd",
            Self::StateHprd => "state_hprd",
            Self::TotalHours => "total_hours",
            Self::PermContract => "perm_contract",
            Self::BedUtilization => "bed_utilization",
            Self::StaffingOccupancy => "staffing_occupancy",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::FacilityHprd => "Facility HPRD (resident-weighted, overall)",
            Self::StateHprd => "State HPRD (resident-weighted, overall)",
            Self::TotalHours => "Total Nurse Hours",
            Self::PermContract => "Permanent vs Contract",
            Self::BedUtilization => "Bed Utilization by Facility / Month",
            Self::StaffingOccupancy => "Staffing vs Occupancy (Monthly HPRD vs Utilization)",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|sec| sec.id() == wanted)
            .ok_or_else(|| format!("unknown report section '{s}'"))
    }
}

/// View modes of the total nurse hours section.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoursView {
    #[default]
    FacilitySummary,
    StateRanked,
    StateDumbbell,
}

/// View modes of the bed utilization section.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BedView {
    #[default]
    Ranked,
    Variability,
    Dumbbell,
}

impl BedView {
    fn export_key(self) -> &'static str {
        match self {
            Self::Ranked => "bed_util_ranked",
            Self::Variability => "bed_util_scatter",
            Self::Dumbbell => "bed_util_dumbbell",
        }
    }
}

/// Ordering of the permanent-vs-contract ranking.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    #[default]
    ContractShare,
    TotalHours,
}

/// How facility utilization variability is measured.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariabilityMetric {
    #[default]
    StdDev,
    /// P90 − P10.
    Spread,
}

macro_rules! parse_choice {
    ($ty:ty, $what:literal, { $($name:literal $(| $alias:literal)* => $variant:expr),+ $(,)? }) => {
        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($name $(| $alias)* => Ok($variant),)+
                    other => Err(format!(concat!("unknown ", $what, " '{}'"), other)),
                }
            }
        }
    };
}

parse_choice!(HoursView, "hours view", {
    "facility_summary" | "facility" => HoursView::FacilitySummary,
    "state_ranked" | "ranked" => HoursView::StateRanked,
    "state_dumbbell" | "dumbbell" => HoursView::StateDumbbell,
});

parse_choice!(BedView, "bed utilization view", {
    "ranked" => BedView::Ranked,
    "variability" | "scatter" => BedView::Variability,
    "dumbbell" => BedView::Dumbbell,
});

parse_choice!(RankBy, "ranking", {
    "contract_share" | "share" => RankBy::ContractShare,
    "total_hours" | "hours" => RankBy::TotalHours,
});

parse_choice!(VariabilityMetric, "variability metric", {
    "std_dev" | "std" => VariabilityMetric::StdDev,
    "spread" | "p90_p10" => VariabilityMetric::Spread,
});

/// Per-section controls. Unset values fall back to the dashboard defaults.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub top_n: Option<usize>,
    /// Month for single-month views; the latest available when unset.
    pub month: Option<NaiveDate>,
    pub hours_view: HoursView,
    pub bed_view: BedView,
    pub rank_by: RankBy,
    pub variability: VariabilityMetric,
    /// 0-based page of the display table.
    pub page: usize,
    /// State override for state-grain views; empty means every state.
    pub local_states: BTreeSet<String>,
}

impl ReportOptions {
    fn top_n_or(&self, default: usize) -> usize {
        self.top_n.unwrap_or(default)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A rendered section.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub section: Section,
    pub title: String,
    /// Base name of the CSV export.
    pub export_key: &'static str,
    /// Month the view was computed for, when it is a single-month view.
    pub month: Option<NaiveDate>,
    /// Full table in display order; this is what gets exported.
    pub table: ResultTable,
    /// Current page of the displayed columns.
    pub page: Page,
    /// Data behind the chart when it differs from `table`.
    pub chart: Option<ResultTable>,
    pub kpis: Vec<KpiSummary>,
    pub map: Option<MapLayer>,
    pub histogram: Vec<HistogramBin>,
    pub warnings: Vec<CoercionWarning>,
    /// Why the selected view has no rows while the rest of the section
    /// still renders.
    pub notice: Option<String>,
}

impl Report {
    fn new(
        section: Section,
        export_key: &'static str,
        table: ResultTable,
        display: &ResultTable,
        page_size: usize,
        options: &ReportOptions,
    ) -> AnalyticsResult<Self> {
        let page = paginate(display, page_size, options.page)?;
        Ok(Self {
            section,
            title: section.title().to_string(),
            export_key,
            month: None,
            table,
            page,
            chart: None,
            kpis: Vec::new(),
            map: None,
            histogram: Vec::new(),
            warnings: Vec::new(),
            notice: None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The warehouse was unreachable or rejected the query.
    Retrieval,
    /// The result could not be shaped (e.g. a view lost a column).
    Data,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    Ready(Box<Report>),
    /// Nothing to show for this selection; not an error.
    Empty { message: String },
    Failed { kind: FailureKind, message: String },
}

impl SectionOutcome {
    fn empty(message: impl Into<String>) -> Self {
        Self::Empty {
            message: message.into(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Empty { .. } => "empty",
            Self::Failed { .. } => "failed",
        }
    }
}

const NO_DATA: &str = "No data for the selected filters.";
const NO_MONTHS: &str = "No monthly data for the selected filters.";

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Build one section. Errors are folded into [`SectionOutcome::Failed`].
pub fn run_section(
    catalog: &Catalog,
    section: Section,
    filter: &FilterState,
    options: &ReportOptions,
) -> SectionOutcome {
    let result = match section {
        Section::FacilityHprd => facility_hprd(catalog, filter, options),
        Section::StateHprd => state_hprd(catalog, options),
        Section::TotalHours => match options.hours_view {
            HoursView::FacilitySummary => hours_facility_summary(catalog, filter, options),
            HoursView::StateRanked => hours_state_ranked(catalog, filter, options),
            HoursView::StateDumbbell => hours_state_dumbbell(catalog, filter, options),
        },
        Section::PermContract => perm_contract(catalog, filter, options),
        Section::BedUtilization => bed_utilization(catalog, filter, options),
        Section::StaffingOccupancy => staffing_occupancy(catalog, filter, options),
    };
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let kind = match e {
                AnalyticsError::Retrieval(_) => FailureKind::Retrieval,
                _ => FailureKind::Data,
            };
            tracing::warn!(
                target: "staffing::report",
                section = section.id(),
                ?kind,
                error = %e,
                "section failed"
            );
            SectionOutcome::Failed {
                kind,
                message: e.to_string(),
            }
        }
    }
}

/// Build every section concurrently; results come back in [`Section::ALL`]
/// order. Overlapping lookups are shared through the catalog's cache.
pub fn run_dashboard(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> Vec<(Section, SectionOutcome)> {
    let outcomes = std::thread::scope(|scope| {
        let handles: Vec<_> = Section::ALL
            .into_iter()
            .map(|section| scope.spawn(move || run_section(catalog, section, filter, options)))
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| SectionOutcome::Failed {
                    kind: FailureKind::Data,
                    message: "section panicked".to_string(),
                })
            })
            .collect::<Vec<_>>()
    });
    catalog.cache().log_stats();
    Section::ALL.into_iter().zip(outcomes).collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn coerce(
    table: &ResultTable,
    numeric: &[&str],
    temporal: &[&str],
    warnings: &mut Vec<CoercionWarning>,
) -> ResultTable {
    let (table, w) = coerce_numeric(table, numeric);
    warnings.extend(w);
    let (table, w) = coerce_temporal(&table, temporal);
    warnings.extend(w);
    table
}

fn distinct_count(table: &ResultTable, column: &str) -> AnalyticsResult<usize> {
    Ok(table.distinct(column)?.len())
}

/// Sorted distinct months of a coerced `month` column.
fn months_of(table: &ResultTable) -> AnalyticsResult<Vec<NaiveDate>> {
    Ok(table
        .distinct("month")?
        .into_iter()
        .filter_map(|v| v.as_date())
        .collect())
}

fn rows_in_month(table: &ResultTable, month: NaiveDate) -> ResultTable {
    table.filter_rows(|r| r.get("month").and_then(Value::as_date) == Some(month))
}

/// Join key built from several columns.
fn row_key(row: &RowRef<'_>, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| row.get(c).map(Value::to_string).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Left-join `column` of `right` onto `left` by `keys`.
fn lookup_join(
    left: &ResultTable,
    right: &ResultTable,
    keys: &[&str],
    column: &str,
) -> AnalyticsResult<ResultTable> {
    right.require_column(column)?;
    let index: HashMap<String, Value> = right
        .iter()
        .filter_map(|r| r.get(column).map(|v| (row_key(&r, keys), v.clone())))
        .collect();
    Ok(left.with_column(column, |r| {
        index.get(&row_key(r, keys)).cloned().unwrap_or_default()
    }))
}

fn median_of(table: &ResultTable, column: &str, catalog: &Catalog) -> AnalyticsResult<Option<f64>> {
    Ok(derive::median(&table.numeric_values(column)?, catalog.percentile()))
}

fn chosen_month(options: &ReportOptions, months: &[NaiveDate]) -> Option<NaiveDate> {
    options.month.or_else(|| months.last().copied())
}

// ---------------------------------------------------------------------------
// 1) Facility HPRD
// ---------------------------------------------------------------------------

const HPRD_COLUMNS: [&str; 5] = [
    "hprd_weighted",
    "rn_hprd",
    "lpn_hprd",
    "cna_hprd",
    "days_with_residents",
];

fn facility_hprd(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let raw = catalog.run(&catalog::facility_hprd(filter))?;
    if raw.is_empty() {
        return Ok(SectionOutcome::empty(NO_DATA));
    }
    let mut warnings = Vec::new();
    let df = coerce(&raw, &HPRD_COLUMNS, &[], &mut warnings);
    let valid = df.drop_null("hprd_weighted")?;

    let top = stable_top_n(&valid, "hprd_weighted", options.top_n_or(50), "provider_name")?;
    let display = stable_sort(
        &df,
        &[SortKey::desc("hprd_weighted"), SortKey::asc("provider_name")],
    )?;

    let mut report = Report::new(
        Section::FacilityHprd,
        "facility_hprd_overall",
        display.clone(),
        &display,
        25,
        options,
    )?;
    report.kpis.push(kpi_summary(&valid, "hprd_weighted", catalog.percentile())?);
    report.chart = Some(top);
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

// ---------------------------------------------------------------------------
// 2) State HPRD
// ---------------------------------------------------------------------------

fn state_hprd(catalog: &Catalog, options: &ReportOptions) -> AnalyticsResult<SectionOutcome> {
    let raw = catalog.run(&catalog::state_hprd(&options.local_states))?;
    if raw.is_empty() {
        return Ok(SectionOutcome::empty(NO_DATA));
    }
    let mut warnings = Vec::new();
    let df = coerce(&raw, &["hprd_weighted"], &[], &mut warnings);

    let mut report = Report::new(Section::StateHprd, "state_hprd_overall", df.clone(), &df, 50, options)?;
    report.kpis.push(kpi_summary(&df, "hprd_weighted", catalog.percentile())?);
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

// ---------------------------------------------------------------------------
// 3) Total nurse hours
// ---------------------------------------------------------------------------

const FACILITY_KEYS: [&str; 3] = ["ccn", "provider_name", "state"];

fn hours_facility_summary(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let raw = catalog.run(&catalog::facility_monthly_hours(filter, catalog.dialect()))?;
    if raw.is_empty() {
        return Ok(SectionOutcome::empty(NO_DATA));
    }
    let mut warnings = Vec::new();
    let df = coerce(&raw, &["total_hours_direct"], &["month"], &mut warnings);

    let agg = aggregate_by_group(
        &df,
        &FACILITY_KEYS,
        "total_hours_direct",
        &[
            ("avg_hours", Reducer::Mean),
            ("min_hours", Reducer::Min),
            ("max_hours", Reducer::Max),
            ("p10", Reducer::Percentile(0.10)),
            ("p90", Reducer::Percentile(0.90)),
            ("months", Reducer::Size),
        ],
        catalog.percentile(),
    )?;
    let keep = stable_top_n(&agg, "avg_hours", options.top_n_or(50), "provider_name")?;

    let mut report = Report::new(
        Section::TotalHours,
        "total_hours_facility_summary",
        keep.clone(),
        &keep,
        50,
        options,
    )?;
    report.kpis.push(
        kpi_summary(&keep, "avg_hours", catalog.percentile())?
            .with_extra("Facilities", keep.len() as i64),
    );
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

/// State-month rows with `avg_per_fac`, coerced.
fn state_months(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
    warnings: &mut Vec<CoercionWarning>,
) -> AnalyticsResult<ResultTable> {
    let raw = catalog.run(&catalog::state_monthly_hours(
        filter,
        &options.local_states,
        catalog.dialect(),
    ))?;
    let df = coerce(
        &raw,
        &["total_hours_direct", "n_facilities", "mom_change"],
        &["month"],
        warnings,
    );
    Ok(df.with_column("avg_per_fac", |r| {
        let n = r.number("n_facilities").filter(|n| *n > 0.0);
        derive::safe_div(r.number("total_hours_direct"), n).into()
    }))
}

fn hours_state_ranked(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let mut warnings = Vec::new();
    let df = state_months(catalog, filter, options, &mut warnings)?;
    if df.is_empty() {
        return Ok(SectionOutcome::empty("No data for the selected window."));
    }
    let months = months_of(&df)?;
    let Some(month) = chosen_month(options, &months) else {
        return Ok(SectionOutcome::empty(NO_MONTHS));
    };
    let dfm = rows_in_month(&df, month);
    if dfm.is_empty() {
        return Ok(SectionOutcome::empty(format!("No data for {}.", month_label(month))));
    }
    let ranked = stable_sort(&dfm, &[SortKey::desc("total_hours_direct"), SortKey::asc("state")])?;

    let avg_per_fac = derive::mean(&dfm.numeric_values("avg_per_fac")?);
    let mut report = Report::new(
        Section::TotalHours,
        "total_hours_state_ranked",
        ranked.clone(),
        &ranked,
        100,
        options,
    )?;
    report.month = Some(month);
    report.kpis.push(
        kpi_summary(&dfm, "total_hours_direct", catalog.percentile())?
            .with_extra("States", distinct_count(&dfm, "state")? as i64)
            .with_extra("Avg / facility", avg_per_fac),
    );
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

fn hours_state_dumbbell(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let mut warnings = Vec::new();
    let df = state_months(catalog, filter, options, &mut warnings)?;
    let months = months_of(&df)?;
    let (Some(&first), Some(&last)) = (months.first(), months.last()) else {
        return Ok(SectionOutcome::empty("No data for the selected window."));
    };

    let facility_counts: HashMap<(String, NaiveDate), Value> = df
        .iter()
        .filter_map(|r| {
            let state = r.get("state")?.to_string();
            let month = r.get("month")?.as_date()?;
            Some(((state, month), r.get("n_facilities")?.clone()))
        })
        .collect();
    let count_at = |r: &RowRef<'_>, month: NaiveDate| {
        let state = r.get("state").map(Value::to_string).unwrap_or_default();
        facility_counts.get(&(state, month)).cloned().unwrap_or_default()
    };

    let piv = pivot_first_last(
        &df,
        &["state"],
        "month",
        "total_hours_direct",
        &Value::Date(first),
        &Value::Date(last),
    )?
    .rename(transform::FIRST_VALUE, "first_hours")
    .rename(transform::LAST_VALUE, "last_hours")
    .rename(transform::PCT_CHANGE, "pct")
    .with_column("n_fac_first", |r| count_at(r, first))
    .with_column("n_fac_last", |r| count_at(r, last))
    .with_column("rank_key", |r| {
        Value::from_option(match (r.number("first_hours"), r.number("last_hours")) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        })
    });

    let delta_total: f64 = piv.numeric_values(transform::DELTA)?.iter().sum();
    let kpis = kpi_summary(&piv, "last_hours", catalog.percentile())?
        .with_extra("Δ total", delta_total)
        .with_extra("Median %Δ", median_of(&piv, "pct", catalog)?);

    let n = options.top_n_or(20.min(piv.len()));
    let keep = stable_top_n(&piv, "rank_key", n, "state")?.drop_columns(&["rank_key"]);

    let mut report = Report::new(
        Section::TotalHours,
        "total_hours_state_dumbbell",
        keep.clone(),
        &keep,
        100,
        options,
    )?;
    report.kpis.push(kpis);
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

// ---------------------------------------------------------------------------
// 4) Permanent vs contract
// ---------------------------------------------------------------------------

fn perm_contract(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let mut warnings = Vec::new();
    let month_list = catalog.run(&catalog::perm_contract_months(filter, catalog.dialect()))?;
    let months = months_of(&coerce(&month_list, &[], &["month"], &mut warnings))?;
    let Some(month) = chosen_month(options, &months) else {
        return Ok(SectionOutcome::empty(NO_MONTHS));
    };

    let raw = catalog.run(&catalog::perm_contract_month(filter, month, catalog.dialect()))?;
    if raw.is_empty() {
        return Ok(SectionOutcome::empty(format!("No data for {}.", month_label(month))));
    }
    let names = catalog.facilities(&filter.selected_states)?;
    let joined = lookup_join(&raw, &names, &["ccn", "state"], "provider_name")?;
    let df = coerce(&joined, &["emp_hours", "ctr_hours"], &["month"], &mut warnings)
        .with_column("total_hours", |r| {
            Value::number(r.number("emp_hours").unwrap_or(0.0) + r.number("ctr_hours").unwrap_or(0.0))
        })
        .with_column("pct_contract", |r| {
            let total = r.number("total_hours").filter(|t| *t > 0.0);
            derive::safe_div(Some(r.number("ctr_hours").unwrap_or(0.0)), total).into()
        });

    let total_hours: f64 = df.numeric_values("total_hours")?.iter().sum();
    let overall = kpi_summary(&df, "pct_contract", catalog.percentile())?
        .with_extra("Total hours", total_hours);

    let keys = match options.rank_by {
        RankBy::ContractShare => [
            SortKey::desc("pct_contract"),
            SortKey::desc("total_hours"),
            SortKey::asc("provider_name"),
        ],
        RankBy::TotalHours => [
            SortKey::desc("total_hours"),
            SortKey::desc("pct_contract"),
            SortKey::asc("provider_name"),
        ],
    };
    let keep = stable_sort(&df, &keys)?.head(options.top_n_or(50));
    let keep_hours: f64 = keep.numeric_values("total_hours")?.iter().sum();
    let selection = kpi_summary(&keep, "pct_contract", catalog.percentile())?
        .with_extra("Facilities", keep.len() as i64)
        .with_extra("Total hours", keep_hours)
        .with_extra("Median % contract", median_of(&keep, "pct_contract", catalog)?);

    let display = keep.select(&[
        "provider_name",
        "state",
        "pct_contract",
        "total_hours",
        "emp_hours",
        "ctr_hours",
    ])?;
    let mut report = Report::new(
        Section::PermContract,
        "perm_contract_topn_bubbles",
        keep,
        &display,
        50,
        options,
    )?;
    report.month = Some(month);
    report.kpis = vec![overall, selection];
    report.chart = Some(df);
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

// ---------------------------------------------------------------------------
// 5) Bed utilization
// ---------------------------------------------------------------------------

const BED_NUMERIC: [&str; 6] = [
    "utilization",
    "resident_days",
    "observed_days",
    "certified_beds_reported",
    "lat",
    "lon",
];

fn bed_utilization(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let raw = catalog.run(&catalog::bed_utilization(filter, catalog.dialect()))?;
    if raw.is_empty() {
        return Ok(SectionOutcome::empty(NO_DATA));
    }
    let mut warnings = Vec::new();
    let df = coerce(&raw, &BED_NUMERIC, &["month"], &mut warnings);
    let months = months_of(&df)?;

    let overview = kpi_summary(&df, "utilization", catalog.percentile())?
        .with_extra("Facilities", distinct_count(&df, "ccn")? as i64)
        .with_extra("Months", months.len() as i64);

    let built = match options.bed_view {
        BedView::Ranked => bed_ranked(&df, &months, options)?,
        BedView::Variability => bed_variability(&df, catalog, options)?,
        BedView::Dumbbell => bed_dumbbell(&df, &months, options)?,
    };
    let mut report = match built {
        Ok(report) => report,
        Err(notice) => {
            let empty = ResultTable::default();
            let mut report = Report::new(
                Section::BedUtilization,
                options.bed_view.export_key(),
                empty.clone(),
                &empty,
                50,
                options,
            )?;
            report.notice = Some(notice);
            report
        }
    };
    report.kpis.insert(0, overview);
    report.map = encoding::map_layer(&df)?;
    report.histogram = transform::histogram(&df, "utilization", HISTOGRAM_BINS)?;
    report.warnings = warnings;
    report.chart = Some(df);
    Ok(SectionOutcome::Ready(Box::new(report)))
}

/// A view either renders or explains why it has nothing to show.
type ViewResult = AnalyticsResult<Result<Report, String>>;

fn bed_ranked(df: &ResultTable, months: &[NaiveDate], options: &ReportOptions) -> ViewResult {
    let Some(month) = chosen_month(options, months) else {
        return Ok(Err(NO_MONTHS.to_string()));
    };
    let dfm = rows_in_month(df, month).drop_null("utilization")?;
    if dfm.is_empty() {
        return Ok(Err(format!("No utilization data for {}.", month_label(month))));
    }
    let keep = stable_top_n(&dfm, "utilization", options.top_n_or(50), "provider_name")?;
    let mut report = Report::new(
        Section::BedUtilization,
        BedView::Ranked.export_key(),
        keep.clone(),
        &keep,
        50,
        options,
    )?;
    report.month = Some(month);
    Ok(Ok(report))
}

fn bed_variability(df: &ResultTable, catalog: &Catalog, options: &ReportOptions) -> ViewResult {
    let agg = aggregate_by_group(
        df,
        &FACILITY_KEYS,
        "utilization",
        &[
            ("avg_util", Reducer::Mean),
            ("std_util", Reducer::StdDev),
            ("p10", Reducer::Percentile(0.10)),
            ("p90", Reducer::Percentile(0.90)),
            ("months", Reducer::Size),
        ],
        catalog.percentile(),
    )?;
    let exposure = sum_by_group(df, &FACILITY_KEYS, "resident_days", "res_days")?;
    let metric = options.variability;
    let agg = lookup_join(&agg, &exposure, &FACILITY_KEYS, "res_days")?.with_column(
        "var_util",
        |r| match metric {
            VariabilityMetric::StdDev => r.number("std_util").into(),
            VariabilityMetric::Spread => r
                .number("p90")
                .zip(r.number("p10"))
                .map(|(hi, lo)| hi - lo)
                .into(),
        },
    );

    let keep = stable_top_n(&agg, "res_days", options.top_n_or(100), "provider_name")?;
    let display = keep.drop_columns(&["std_util", "p10", "p90"]);
    let mut report = Report::new(
        Section::BedUtilization,
        BedView::Variability.export_key(),
        keep.clone(),
        &display,
        50,
        options,
    )?;
    report.kpis.push(
        kpi_summary(&keep, "avg_util", catalog.percentile())?
            .with_extra("Median variability", median_of(&keep, "var_util", catalog)?),
    );
    Ok(Ok(report))
}

fn bed_dumbbell(df: &ResultTable, months: &[NaiveDate], options: &ReportOptions) -> ViewResult {
    let (Some(&first), Some(&last)) = (months.first(), months.last()) else {
        return Ok(Err(NO_MONTHS.to_string()));
    };
    if months.len() < 2 {
        return Ok(Err("Need at least two months for a dumbbell view.".to_string()));
    }
    let piv = pivot_first_last(
        df,
        &FACILITY_KEYS,
        "month",
        "utilization",
        &Value::Date(first),
        &Value::Date(last),
    )?
    .rename(transform::FIRST_VALUE, "first_util")
    .rename(transform::LAST_VALUE, "last_util")
    .drop_columns(&[transform::PCT_CHANGE]);
    let exposure = sum_by_group(df, &["ccn"], "resident_days", "res_days")?;
    let piv = lookup_join(&piv, &exposure, &["ccn"], "res_days")?;

    let keep = stable_top_n(&piv, "res_days", options.top_n_or(50), "provider_name")?;
    let report = Report::new(
        Section::BedUtilization,
        BedView::Dumbbell.export_key(),
        keep.clone(),
        &keep,
        50,
        options,
    )?;
    Ok(Ok(report))
}

// ---------------------------------------------------------------------------
// 6) Staffing vs occupancy
// ---------------------------------------------------------------------------

fn staffing_occupancy(
    catalog: &Catalog,
    filter: &FilterState,
    options: &ReportOptions,
) -> AnalyticsResult<SectionOutcome> {
    let mut warnings = Vec::new();
    let month_list = catalog.run(&catalog::occupancy_months(filter, catalog.dialect()))?;
    let months = months_of(&coerce(&month_list, &[], &["month"], &mut warnings))?;
    let Some(month) = chosen_month(options, &months) else {
        return Ok(SectionOutcome::empty(NO_MONTHS));
    };

    let raw = catalog.run(&catalog::staffing_vs_occupancy(filter, month, catalog.dialect()))?;
    if raw.is_empty() {
        return Ok(SectionOutcome::empty(format!("No data for {}.", month_label(month))));
    }
    let df = coerce(
        &raw,
        &[
            "utilization",
            "resident_days",
            "observed_days",
            "total_hours_direct",
            "hprd_monthly",
            "monthly_avg_residents",
        ],
        &["month"],
        &mut warnings,
    );

    let mut report = Report::new(
        Section::StaffingOccupancy,
        "staffing_vs_occupancy_hprd_vs_utilization",
        df.clone(),
        &df,
        100,
        options,
    )?;
    report.month = Some(month);
    report.warnings = warnings;
    Ok(SectionOutcome::Ready(Box::new(report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_ids_parse() {
        for s in Section::ALL {
            assert_eq!(s.id().parse::<Section>().unwrap(), s);
        }
        assert!("tab7".parse::<Section>().is_err());
    }

    #[test]
    fn view_choices_parse_with_aliases() {
        assert_eq!("dumbbell".parse::<HoursView>().unwrap(), HoursView::StateDumbbell);
        assert_eq!("state-ranked".parse::<HoursView>().unwrap(), HoursView::StateRanked);
        assert_eq!("scatter".parse::<BedView>().unwrap(), BedView::Variability);
        assert_eq!("hours".parse::<RankBy>().unwrap(), RankBy::TotalHours);
        assert_eq!("p90-p10".parse::<VariabilityMetric>().unwrap(), VariabilityMetric::Spread);
        assert!("sideways".parse::<BedView>().is_err());
    }

    #[test]
    fn lookup_join_fills_missing_with_null() {
        let left = ResultTable::new(["ccn", "state"]).with_rows(vec![
            vec!["1".into(), "CA".into()],
            vec!["2".into(), "CA".into()],
        ]);
        let right = ResultTable::new(["ccn", "state", "provider_name"])
            .with_rows(vec![vec!["1".into(), "CA".into(), "Oak".into()]]);
        let joined = lookup_join(&left, &right, &["ccn", "state"], "provider_name").unwrap();
        assert_eq!(joined.rows[0][2], Value::from("Oak"));
        assert_eq!(joined.rows[1][2], Value::Null);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(SectionOutcome::empty("nothing")).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["message"], "nothing");
    }
}
