//! Query catalog: the fixed set of report queries over the gold views.
//!
//! Each [`QueryTemplate`] knows the columns it returns and the grain of the
//! view it reads. Rendering a template against a [`FilterState`] yields a
//! [`QuerySpec`] whose SQL text is also its cache identity. Filter values only
//! reach the SQL through [`predicate`](super::predicate).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use super::bucketing::{self, MonthBounds};
use super::cache::ResultCache;
use super::derive::PercentileMethod;
use super::predicate::{self, ColumnRef, Predicate};
use super::types::{AnalyticsError, AnalyticsResult, FilterState, ResultTable};
use crate::warehouse::{Dialect, RetrievalError, Warehouse};

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

pub const VIEW_HPRD_BY_FACILITY: &str = "gold_vw_hprd_by_facility";
pub const VIEW_HPRD_BY_STATE: &str = "gold_vw_hprd_by_state";
pub const VIEW_HOURS_FACILITY_MONTHLY: &str = "gold_vw_total_nurse_hours_facility_monthly";
pub const VIEW_HOURS_STATE_MONTHLY: &str = "gold_vw_total_nurse_hours_state_monthly";
pub const VIEW_PERM_CONTRACT_MONTHLY: &str = "gold_vw_perm_vs_contract_facility_monthly";
pub const VIEW_BED_UTILIZATION_MONTHLY: &str = "gold_vw_bed_utilization_facility_monthly";
pub const VIEW_FACILITY_DIM: &str = "gold_facility_dim";

/// Number of states selected by default on first load.
pub const DEFAULT_STATE_COUNT: usize = 6;

/// Row granularity of the view a template reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    State,
    Facility,
    StateMonth,
    FacilityMonth,
    /// One row per distinct month.
    Month,
    /// A single summary row.
    Summary,
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTemplate {
    DistinctStates,
    FacilityDirectory,
    MonthBounds,
    FacilityHprd,
    StateHprd,
    FacilityMonthlyHours,
    StateMonthlyHours,
    PermContractMonths,
    PermContractMonth,
    BedUtilization,
    OccupancyMonths,
    StaffingVsOccupancy,
}

impl QueryTemplate {
    pub const ALL: [QueryTemplate; 12] = [
        Self::DistinctStates,
        Self::FacilityDirectory,
        Self::MonthBounds,
        Self::FacilityHprd,
        Self::StateHprd,
        Self::FacilityMonthlyHours,
        Self::StateMonthlyHours,
        Self::PermContractMonths,
        Self::PermContractMonth,
        Self::BedUtilization,
        Self::OccupancyMonths,
        Self::StaffingVsOccupancy,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::DistinctStates => "distinct_states",
            Self::FacilityDirectory => "facility_directory",
            Self::MonthBounds => "month_bounds",
            Self::FacilityHprd => "facility_hprd",
            Self::StateHprd => "state_hprd",
            Self::FacilityMonthlyHours => "facility_monthly_hours",
            Self::StateMonthlyHours => "state_monthly_hours",
            Self::PermContractMonths => "perm_contract_months",
            Self::PermContractMonth => "perm_contract_month",
            Self::BedUtilization => "bed_utilization",
            Self::OccupancyMonths => "occupancy_months",
            Self::StaffingVsOccupancy => "staffing_vs_occupancy",
        }
    }

    /// Columns the rendered query returns, in order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::DistinctStates => &["state"],
            Self::FacilityDirectory => &["ccn", "provider_name", "state"],
            Self::MonthBounds => &["min_m", "max_m"],
            Self::FacilityHprd => &[
                "ccn",
                "provider_name",
                "state",
                "days_with_residents",
                "start_date",
                "end_date",
                "hprd_weighted",
                "rn_hprd",
                "lpn_hprd",
                "cna_hprd",
            ],
            Self::StateHprd => &["state", "start_date", "end_date", "hprd_weighted"],
            Self::FacilityMonthlyHours => {
                &["state", "provider_name", "ccn", "month", "total_hours_direct"]
            }
            Self::StateMonthlyHours => &[
                "state",
                "month",
                "month_label",
                "total_hours_direct",
                "n_facilities",
                "mom_change",
            ],
            Self::PermContractMonths | Self::OccupancyMonths => &["month"],
            Self::PermContractMonth => &["state", "ccn", "month", "emp_hours", "ctr_hours"],
            Self::BedUtilization => &[
                "state",
                "provider_name",
                "ccn",
                "month",
                "utilization",
                "resident_days",
                "observed_days",
                "certified_beds_reported",
                "lat",
                "lon",
            ],
            Self::StaffingVsOccupancy => &[
                "state",
                "provider_name",
                "ccn",
                "month",
                "utilization",
                "resident_days",
                "observed_days",
                "monthly_avg_residents",
                "total_hours_direct",
                "hprd_monthly",
            ],
        }
    }

    pub fn grain(&self) -> Grain {
        match self {
            Self::DistinctStates | Self::StateHprd => Grain::State,
            Self::FacilityDirectory
            | Self::FacilityHprd
            | Self::PermContractMonth
            | Self::StaffingVsOccupancy => Grain::Facility,
            Self::MonthBounds => Grain::Summary,
            Self::FacilityMonthlyHours | Self::BedUtilization => Grain::FacilityMonth,
            Self::StateMonthlyHours => Grain::StateMonth,
            Self::PermContractMonths | Self::OccupancyMonths => Grain::Month,
        }
    }

    /// Whether the template filters on one chosen month.
    pub fn needs_month(&self) -> bool {
        matches!(self, Self::PermContractMonth | Self::StaffingVsOccupancy)
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for QueryTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.id() == wanted)
            .ok_or_else(|| format!("unknown query template '{s}'"))
    }
}

/// A rendered query. Immutable; `sql` is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySpec {
    pub template: QueryTemplate,
    /// Row grain the template's view is keyed at.
    pub grain: Grain,
    #[serde(serialize_with = "serialize_predicate")]
    pub predicate: Predicate,
    pub params: BTreeMap<String, String>,
    pub sql: String,
}

fn serialize_predicate<S: serde::Serializer>(p: &Predicate, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(p.as_sql())
}

impl QuerySpec {
    fn new(template: QueryTemplate, predicate: Predicate, sql: String) -> Self {
        Self {
            template,
            grain: template.grain(),
            predicate,
            params: BTreeMap::new(),
            sql,
        }
    }

    fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn cache_key(&self) -> &str {
        &self.sql
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Template inputs beyond the global filter.
#[derive(Debug, Clone, Default)]
pub struct TemplateArgs {
    /// Section-local state selection (state-grain reports).
    pub local_states: BTreeSet<String>,
    /// Chosen month for single-month templates.
    pub month: Option<NaiveDate>,
}

/// Render any template. Single-month templates require `args.month`.
pub fn render(
    template: QueryTemplate,
    filter: &FilterState,
    args: &TemplateArgs,
    dialect: Dialect,
) -> AnalyticsResult<QuerySpec> {
    let month = match args.month {
        Some(month) => month,
        None if template.needs_month() => {
            return Err(AnalyticsError::InvalidArgument(format!(
                "template '{template}' needs a month"
            )));
        }
        // Unused by templates without a month slot.
        None => filter.period_end,
    };
    Ok(match template {
        QueryTemplate::DistinctStates => distinct_states(),
        QueryTemplate::FacilityDirectory => facility_directory(&filter.selected_states),
        QueryTemplate::MonthBounds => month_bounds(dialect),
        QueryTemplate::FacilityHprd => facility_hprd(filter),
        QueryTemplate::StateHprd => state_hprd(&args.local_states),
        QueryTemplate::FacilityMonthlyHours => facility_monthly_hours(filter, dialect),
        QueryTemplate::StateMonthlyHours => state_monthly_hours(filter, &args.local_states, dialect),
        QueryTemplate::PermContractMonths => perm_contract_months(filter, dialect),
        QueryTemplate::PermContractMonth => perm_contract_month(filter, month, dialect),
        QueryTemplate::BedUtilization => bed_utilization(filter, dialect),
        QueryTemplate::OccupancyMonths => occupancy_months(filter, dialect),
        QueryTemplate::StaffingVsOccupancy => staffing_vs_occupancy(filter, month, dialect),
    })
}

fn states_param(states: &BTreeSet<String>) -> String {
    states.iter().cloned().collect::<Vec<_>>().join(",")
}

fn period_params(spec: QuerySpec, filter: &FilterState) -> QuerySpec {
    spec.param("period_start", filter.period_start)
        .param("period_end", filter.period_end)
        .param("states", states_param(&filter.selected_states))
        .param("facilities", states_param(&filter.selected_facility_ids))
}

pub fn distinct_states() -> QuerySpec {
    let predicate = Predicate::not_null(ColumnRef::bare("state"));
    let sql = format!(
        "SELECT DISTINCT state FROM {VIEW_HPRD_BY_STATE} WHERE {predicate} ORDER BY state"
    );
    QuerySpec::new(QueryTemplate::DistinctStates, predicate, sql)
}

pub fn facility_directory(states: &BTreeSet<String>) -> QuerySpec {
    let predicate = Predicate::in_list(ColumnRef::bare("state"), states);
    let sql = format!(
        "SELECT DISTINCT ccn, provider_name, state FROM {VIEW_HPRD_BY_FACILITY} \
         WHERE {predicate} ORDER BY provider_name, ccn"
    );
    QuerySpec::new(QueryTemplate::FacilityDirectory, predicate, sql)
        .param("states", states_param(states))
}

pub fn month_bounds(dialect: Dialect) -> QuerySpec {
    let month = dialect.as_date("month");
    let sql = format!(
        "SELECT MIN({month}) AS min_m, MAX({month}) AS max_m FROM {VIEW_HOURS_FACILITY_MONTHLY}"
    );
    QuerySpec::new(QueryTemplate::MonthBounds, Predicate::always(), sql)
}

pub fn facility_hprd(filter: &FilterState) -> QuerySpec {
    let predicate = predicate::state_ccn(filter, Some("f"));
    let sql = format!(
        "SELECT f.ccn, f.provider_name, f.state, f.days_with_residents, f.start_date, \
         f.end_date, f.hprd_weighted, f.rn_hprd, f.lpn_hprd, f.cna_hprd \
         FROM {VIEW_HPRD_BY_FACILITY} f WHERE {predicate}"
    );
    QuerySpec::new(QueryTemplate::FacilityHprd, predicate, sql)
        .param("states", states_param(&filter.selected_states))
        .param("facilities", states_param(&filter.selected_facility_ids))
}

/// State HPRD ignores the global state filter; `local_states` empty means
/// every state.
pub fn state_hprd(local_states: &BTreeSet<String>) -> QuerySpec {
    let predicate = Predicate::in_list(ColumnRef::bare("state"), local_states);
    let sql = format!(
        "SELECT state, start_date, end_date, hprd_weighted FROM {VIEW_HPRD_BY_STATE} \
         WHERE {predicate} ORDER BY hprd_weighted DESC, state"
    );
    QuerySpec::new(QueryTemplate::StateHprd, predicate, sql)
        .param("local_states", states_param(local_states))
}

pub fn facility_monthly_hours(filter: &FilterState, dialect: Dialect) -> QuerySpec {
    let predicate = predicate::monthly(filter, Some("h"), "month", dialect);
    let sql = format!(
        "SELECT h.state, h.provider_name, h.ccn, h.month, h.total_hours_direct \
         FROM {VIEW_HOURS_FACILITY_MONTHLY} h WHERE {predicate} ORDER BY h.month, h.ccn"
    );
    period_params(
        QuerySpec::new(QueryTemplate::FacilityMonthlyHours, predicate, sql),
        filter,
    )
}

/// State-month totals with facility counts and month-over-month change.
///
/// Uses the section-local state selection instead of the global one; the
/// facility filter does not apply at state grain.
pub fn state_monthly_hours(
    filter: &FilterState,
    local_states: &BTreeSet<String>,
    dialect: Dialect,
) -> QuerySpec {
    let fac_pred = Predicate::in_list(ColumnRef::bare("state"), local_states).and(
        Predicate::date_between(
            ColumnRef::bare("month"),
            filter.period_start,
            filter.period_end,
            dialect,
        ),
    );
    let state_pred = Predicate::in_list(ColumnRef::qualified("s", "state"), local_states).and(
        Predicate::date_between(
            ColumnRef::qualified("s", "month"),
            filter.period_start,
            filter.period_end,
            dialect,
        ),
    );
    let lag = "LAG(j.total_hours_direct) OVER (PARTITION BY j.state ORDER BY j.month)";
    let mom = dialect.divide(&format!("j.total_hours_direct - {lag}"), lag);
    let label = dialect.month_label("s.month");
    let sql = format!(
        "WITH fac_counts AS (\
           SELECT state, month, COUNT(DISTINCT ccn) AS n_facilities \
           FROM {VIEW_HOURS_FACILITY_MONTHLY} WHERE {fac_pred} GROUP BY state, month\
         ), state_month AS (\
           SELECT s.state, s.month, s.total_hours_direct, {label} AS month_label \
           FROM {VIEW_HOURS_STATE_MONTHLY} s WHERE {state_pred}\
         ), joined AS (\
           SELECT sm.state, sm.month, sm.month_label, sm.total_hours_direct, \
                  COALESCE(fc.n_facilities, 0) AS n_facilities \
           FROM state_month sm \
           LEFT JOIN fac_counts fc ON fc.state = sm.state AND fc.month = sm.month\
         ) \
         SELECT j.state, j.month, j.month_label, j.total_hours_direct, j.n_facilities, \
                {mom} AS mom_change \
         FROM joined j ORDER BY j.month, j.state"
    );
    QuerySpec::new(QueryTemplate::StateMonthlyHours, state_pred, sql)
        .param("local_states", states_param(local_states))
        .param("period_start", filter.period_start)
        .param("period_end", filter.period_end)
}

pub fn perm_contract_months(filter: &FilterState, dialect: Dialect) -> QuerySpec {
    let predicate = Predicate::in_list(ColumnRef::bare("state"), &filter.selected_states).and(
        Predicate::date_between(
            ColumnRef::bare("month"),
            filter.period_start,
            filter.period_end,
            dialect,
        ),
    );
    let sql = format!(
        "SELECT DISTINCT month FROM {VIEW_PERM_CONTRACT_MONTHLY} WHERE {predicate} ORDER BY month"
    );
    QuerySpec::new(QueryTemplate::PermContractMonths, predicate, sql)
        .param("states", states_param(&filter.selected_states))
        .param("period_start", filter.period_start)
        .param("period_end", filter.period_end)
}

pub fn perm_contract_month(filter: &FilterState, month: NaiveDate, dialect: Dialect) -> QuerySpec {
    let predicate = predicate::state_ccn(filter, Some("p")).and(Predicate::date_equals(
        ColumnRef::qualified("p", "month"),
        month,
        dialect,
    ));
    let sql = format!(
        "SELECT p.state, p.ccn, p.month, p.emp_hours, p.ctr_hours \
         FROM {VIEW_PERM_CONTRACT_MONTHLY} p WHERE {predicate} ORDER BY p.ccn"
    );
    QuerySpec::new(QueryTemplate::PermContractMonth, predicate, sql)
        .param("states", states_param(&filter.selected_states))
        .param("facilities", states_param(&filter.selected_facility_ids))
        .param("month", month)
}

pub fn bed_utilization(filter: &FilterState, dialect: Dialect) -> QuerySpec {
    let predicate = predicate::monthly(filter, Some("v"), "month", dialect);
    let sql = format!(
        "SELECT v.state, v.provider_name, v.ccn, v.month, \
         v.bed_utilization_rate_monthly AS utilization, \
         v.resident_days, v.observed_days, v.certified_beds_reported, \
         d.latitude AS lat, d.longitude AS lon \
         FROM {VIEW_BED_UTILIZATION_MONTHLY} v \
         LEFT JOIN {VIEW_FACILITY_DIM} d ON d.ccn = v.ccn \
         WHERE {predicate} ORDER BY v.month, v.ccn"
    );
    period_params(
        QuerySpec::new(QueryTemplate::BedUtilization, predicate, sql),
        filter,
    )
}

pub fn occupancy_months(filter: &FilterState, dialect: Dialect) -> QuerySpec {
    let predicate = predicate::monthly(filter, None, "month", dialect);
    let sql = format!(
        "SELECT DISTINCT month FROM {VIEW_BED_UTILIZATION_MONTHLY} WHERE {predicate} ORDER BY month"
    );
    period_params(
        QuerySpec::new(QueryTemplate::OccupancyMonths, predicate, sql),
        filter,
    )
}

/// Bed utilization joined with facility hours for one month, with monthly
/// HPRD computed from resident-days.
pub fn staffing_vs_occupancy(
    filter: &FilterState,
    month: NaiveDate,
    dialect: Dialect,
) -> QuerySpec {
    let predicate = predicate::state_ccn(filter, Some("bu")).and(Predicate::date_equals(
        ColumnRef::qualified("bu", "month"),
        month,
        dialect,
    ));
    let avg_residents = dialect.decimal_ratio("bu.resident_days", "bu.observed_days");
    let hprd = dialect.decimal_ratio("th.total_hours_direct", "bu.resident_days");
    let sql = format!(
        "SELECT bu.state, bu.provider_name, bu.ccn, bu.month, \
         bu.bed_utilization_rate_monthly AS utilization, \
         bu.resident_days, bu.observed_days, \
         {avg_residents} AS monthly_avg_residents, \
         th.total_hours_direct, \
         {hprd} AS hprd_monthly \
         FROM {VIEW_BED_UTILIZATION_MONTHLY} bu \
         INNER JOIN {VIEW_HOURS_FACILITY_MONTHLY} th \
         ON th.ccn = bu.ccn AND th.month = bu.month \
         WHERE {predicate} ORDER BY bu.ccn"
    );
    QuerySpec::new(QueryTemplate::StaffingVsOccupancy, predicate, sql)
        .param("states", states_param(&filter.selected_states))
        .param("facilities", states_param(&filter.selected_facility_ids))
        .param("month", month)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Renders templates for a warehouse and runs them through the shared cache.
#[derive(Clone)]
pub struct Catalog {
    warehouse: Arc<dyn Warehouse>,
    cache: Arc<ResultCache>,
    percentile: PercentileMethod,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("dialect", &self.warehouse.dialect())
            .field("ttl", &self.cache.ttl())
            .field("percentile", &self.percentile)
            .finish()
    }
}

impl Catalog {
    pub fn new(warehouse: Arc<dyn Warehouse>, cache: Arc<ResultCache>) -> Self {
        Self {
            warehouse,
            cache,
            percentile: PercentileMethod::default(),
        }
    }

    pub fn with_percentile(mut self, method: PercentileMethod) -> Self {
        self.percentile = method;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.warehouse.dialect()
    }

    pub fn percentile(&self) -> PercentileMethod {
        self.percentile
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Execute a rendered query, served from the cache while fresh.
    pub fn run(&self, spec: &QuerySpec) -> Result<Arc<ResultTable>, RetrievalError> {
        let result = self.cache.get_or_fetch(spec.cache_key(), || {
            tracing::debug!(
                target: "staffing::catalog",
                template = spec.template.id(),
                "executing query"
            );
            self.warehouse.execute(&spec.sql)
        });
        if let Err(e) = &result {
            tracing::warn!(
                target: "staffing::catalog",
                template = spec.template.id(),
                error = %e,
                "query failed"
            );
        }
        result
    }

    /// Render `template` for this warehouse's dialect and run it.
    pub fn query(
        &self,
        template: QueryTemplate,
        filter: &FilterState,
        args: &TemplateArgs,
    ) -> AnalyticsResult<Arc<ResultTable>> {
        let spec = render(template, filter, args, self.dialect())?;
        Ok(self.run(&spec)?)
    }

    /// Every state present in the warehouse, sorted.
    pub fn states(&self) -> Result<Vec<String>, RetrievalError> {
        let table = self.run(&distinct_states())?;
        Ok(table
            .iter()
            .filter_map(|r| r.get("state").filter(|v| !v.is_null()).map(ToString::to_string))
            .collect())
    }

    /// Facility directory (ccn, provider_name, state) for the given states;
    /// every facility when `states` is empty.
    pub fn facilities(&self, states: &BTreeSet<String>) -> Result<Arc<ResultTable>, RetrievalError> {
        self.run(&facility_directory(states))
    }

    /// Earliest and latest month with data, or a bootstrap window ending at
    /// `today` when the warehouse has none.
    pub fn month_bounds(&self, today: NaiveDate) -> Result<MonthBounds, RetrievalError> {
        let table = self.run(&month_bounds(self.dialect()))?;
        let parse = |col: &str| {
            table
                .value(0, col)
                .filter(|v| !v.is_null())
                .and_then(|v| match v.as_date() {
                    Some(d) => Some(d),
                    None => bucketing::parse_warehouse_date(&v.to_string()),
                })
        };
        match (parse("min_m"), parse("max_m")) {
            (Some(min), Some(max)) if min <= max => Ok(MonthBounds {
                min,
                max,
                bootstrapped: false,
            }),
            _ => {
                tracing::info!(
                    target: "staffing::catalog",
                    %today,
                    "no monthly rows; using bootstrap window"
                );
                Ok(bucketing::bootstrap_bounds(today))
            }
        }
    }

    /// The filter the dashboard opens with.
    pub fn default_filter(&self, today: NaiveDate) -> AnalyticsResult<FilterState> {
        let states = self.states()?;
        let bounds = self.month_bounds(today)?;
        default_filter(&states, &bounds)
    }
}

/// Initial selection: the first [`DEFAULT_STATE_COUNT`] states (all of them
/// when there are no more than that), no facilities, and the default window.
pub fn default_filter(states_all: &[String], bounds: &MonthBounds) -> AnalyticsResult<FilterState> {
    let states = states_all.iter().take(DEFAULT_STATE_COUNT).cloned();
    let (start, end) = bucketing::default_window(bounds);
    FilterState::new(states, Vec::<String>::new(), start, end)
}

/// Display label used by facility pickers: `Name (CCN) – ST`.
pub fn facility_label(provider_name: &str, ccn: &str, state: &str) -> String {
    format!("{provider_name} ({ccn}) – {state}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn filter() -> FilterState {
        FilterState::new(["CA"], ["055001"], d(2024, 1, 1), d(2024, 3, 1)).unwrap()
    }

    #[test]
    fn template_ids_round_trip() {
        for t in QueryTemplate::ALL {
            assert_eq!(t.id().parse::<QueryTemplate>().unwrap(), t);
            assert!(!t.columns().is_empty());
        }
        assert!("nope".parse::<QueryTemplate>().is_err());
    }

    #[test]
    fn changing_a_filter_changes_the_cache_key() {
        let a = facility_hprd(&filter());
        let b = facility_hprd(&filter().with_states(["TX"]));
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), facility_hprd(&filter()).cache_key());
    }

    #[test]
    fn joins_qualify_every_filter_column() {
        let spec = staffing_vs_occupancy(&filter(), d(2024, 2, 1), Dialect::Ansi);
        assert!(spec.sql.contains("bu.state IN ('CA')"));
        assert!(spec.sql.contains("bu.ccn IN ('055001')"));
        assert!(spec.sql.contains("CAST(bu.month AS DATE) = DATE '2024-02-01'"));
        assert!(spec.sql.contains("DECIMAL(18,4)"));

        let spec = bed_utilization(&filter(), Dialect::Sqlite);
        assert!(spec.sql.contains("v.state IN ('CA')"));
        assert!(spec.sql.contains("LEFT JOIN gold_facility_dim d ON d.ccn = v.ccn"));
    }

    #[test]
    fn single_month_templates_need_a_month() {
        let err = render(
            QueryTemplate::PermContractMonth,
            &filter(),
            &TemplateArgs::default(),
            Dialect::Sqlite,
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
    }

    #[test]
    fn rendered_specs_carry_grain_and_month_requirement() {
        for template in QueryTemplate::ALL {
            let rendered = render(template, &filter(), &TemplateArgs::default(), Dialect::Sqlite);
            match rendered {
                Ok(spec) => {
                    assert!(!template.needs_month(), "{template}");
                    assert_eq!(spec.grain, template.grain());
                }
                Err(_) => assert!(template.needs_month(), "{template}"),
            }
        }
        let spec = render(
            QueryTemplate::StaffingVsOccupancy,
            &filter(),
            &TemplateArgs {
                month: Some(d(2024, 2, 1)),
                ..TemplateArgs::default()
            },
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(spec.grain, Grain::Facility);
    }

    #[test]
    fn state_monthly_ignores_global_states() {
        let spec = state_monthly_hours(&filter(), &BTreeSet::new(), Dialect::Ansi);
        assert!(!spec.sql.contains("'CA'"));
        assert!(spec.sql.contains("date_format(s.month, '%Y-%m')"));
        assert!(spec.sql.contains("NULLIF(LAG(j.total_hours_direct)"));
    }

    #[test]
    fn default_filter_takes_first_six_states() {
        let states: Vec<String> = ["AK", "AL", "AR", "AZ", "CA", "CO", "CT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let bounds = MonthBounds {
            min: d(2023, 1, 1),
            max: d(2024, 6, 1),
            bootstrapped: false,
        };
        let f = default_filter(&states, &bounds).unwrap();
        assert_eq!(f.selected_states.len(), 6);
        assert!(!f.selected_states.contains("CT"));
        assert!(f.selected_facility_ids.is_empty());
        assert_eq!((f.period_start, f.period_end), (d(2024, 3, 1), d(2024, 6, 1)));
    }

    #[test]
    fn facility_label_format() {
        assert_eq!(facility_label("Oak Manor", "055001", "CA"), "Oak Manor (055001) – CA");
    }
}
