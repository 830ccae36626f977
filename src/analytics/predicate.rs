//! SQL predicate fragments built from filter selections.
//!
//! User-selected values only ever reach SQL text through [`quote_literal`],
//! and column references are `'static` identifiers chosen by the query
//! catalog, so a [`Predicate`] cannot carry unescaped input.

use std::fmt;

use chrono::NaiveDate;

use super::types::FilterState;
use crate::warehouse::Dialect;

/// A column reference, optionally qualified by a table alias.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: Option<&'static str>,
    pub name: &'static str,
}

impl ColumnRef {
    pub const fn bare(name: &'static str) -> Self {
        Self { alias: None, name }
    }

    pub const fn qualified(alias: &'static str, name: &'static str) -> Self {
        Self {
            alias: Some(alias),
            name,
        }
    }

    /// Same column under another alias (`None` for unqualified).
    pub const fn with_alias(self, alias: Option<&'static str>) -> Self {
        Self {
            alias,
            name: self.name,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alias {
            Some(alias) => write!(f, "{alias}.{}", self.name),
            None => f.write_str(self.name),
        }
    }
}

/// Quote a string as a SQL literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// A boolean SQL fragment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Predicate(String);

impl Predicate {
    /// Matches every row.
    pub fn always() -> Self {
        Self("TRUE".to_string())
    }

    /// `col IN ('a', 'b')`, or `TRUE` when `values` is empty.
    pub fn in_list<I, S>(column: ColumnRef, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let quoted: Vec<String> = values
            .into_iter()
            .map(|v| quote_literal(v.as_ref()))
            .collect();
        if quoted.is_empty() {
            return Self::always();
        }
        Self(format!("{column} IN ({})", quoted.join(", ")))
    }

    /// Inclusive date range on a column interpreted as a date.
    pub fn date_between(
        column: ColumnRef,
        start: NaiveDate,
        end: NaiveDate,
        dialect: Dialect,
    ) -> Self {
        Self(format!(
            "{} BETWEEN {} AND {}",
            dialect.as_date(&column.to_string()),
            dialect.date_literal(start),
            dialect.date_literal(end)
        ))
    }

    /// Column interpreted as a date equals `date`.
    pub fn date_equals(column: ColumnRef, date: NaiveDate, dialect: Dialect) -> Self {
        Self(format!(
            "{} = {}",
            dialect.as_date(&column.to_string()),
            dialect.date_literal(date)
        ))
    }

    /// `column IS NOT NULL`.
    pub fn not_null(column: ColumnRef) -> Self {
        Self(format!("{column} IS NOT NULL"))
    }

    pub fn and(self, other: Predicate) -> Self {
        Self(format!("{} AND {}", self.0, other.0))
    }

    /// Conjunction of all parts; `TRUE` when there are none.
    pub fn all<I: IntoIterator<Item = Predicate>>(parts: I) -> Self {
        parts
            .into_iter()
            .reduce(Predicate::and)
            .unwrap_or_else(Self::always)
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FilterState → predicates
// ---------------------------------------------------------------------------

const STATE: ColumnRef = ColumnRef::bare("state");
const CCN: ColumnRef = ColumnRef::bare("ccn");

/// States and facility ids of the filter, on the given alias.
pub fn state_ccn(filter: &FilterState, alias: Option<&'static str>) -> Predicate {
    Predicate::in_list(STATE.with_alias(alias), &filter.selected_states).and(Predicate::in_list(
        CCN.with_alias(alias),
        &filter.selected_facility_ids,
    ))
}

/// States, facility ids, and the inclusive period on `month_col`.
pub fn monthly(
    filter: &FilterState,
    alias: Option<&'static str>,
    month_col: &'static str,
    dialect: Dialect,
) -> Predicate {
    state_ccn(filter, alias).and(Predicate::date_between(
        ColumnRef {
            alias,
            name: month_col,
        },
        filter.period_start,
        filter.period_end,
        dialect,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn empty_set_is_always_true() {
        let p = Predicate::in_list(ColumnRef::bare("state"), Vec::<String>::new());
        assert_eq!(p.as_sql(), "TRUE");
    }

    #[test]
    fn values_are_quoted_and_escaped() {
        let p = Predicate::in_list(ColumnRef::qualified("v", "provider_name"), ["O'Hare", "Plain"]);
        assert_eq!(p.as_sql(), "v.provider_name IN ('O''Hare', 'Plain')");
    }

    #[test]
    fn injection_attempt_stays_inside_literal() {
        let p = Predicate::in_list(ColumnRef::bare("ccn"), ["x') OR 1=1 --"]);
        assert_eq!(p.as_sql(), "ccn IN ('x'') OR 1=1 --')");
    }

    #[test]
    fn date_between_uses_explicit_literals() {
        let p = Predicate::date_between(
            ColumnRef::qualified("v", "month"),
            d(2024, 1, 1),
            d(2024, 3, 1),
            Dialect::Ansi,
        );
        assert_eq!(
            p.as_sql(),
            "CAST(v.month AS DATE) BETWEEN DATE '2024-01-01' AND DATE '2024-03-01'"
        );
    }

    #[test]
    fn monthly_predicate_composes_all_slots() {
        let f = FilterState::new(["TX", "CA"], ["015009"], d(2024, 1, 1), d(2024, 2, 1)).unwrap();
        let p = monthly(&f, Some("bu"), "month", Dialect::Sqlite);
        assert_eq!(
            p.as_sql(),
            "bu.state IN ('CA', 'TX') AND bu.ccn IN ('015009') AND \
             date(bu.month) BETWEEN date('2024-01-01') AND date('2024-02-01')"
        );
    }

    #[test]
    fn all_of_nothing_is_true() {
        assert_eq!(Predicate::all(Vec::new()).as_sql(), "TRUE");
    }
}
