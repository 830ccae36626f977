//! Derived statistics over measure columns.
//!
//! All reducers take already-filtered, non-null values. Every division is
//! safe against zero denominators and produces `None` (rendered as JSON
//! `null`) rather than NaN / Infinity.

use serde::Serialize;

/// How P10/P90-style percentiles are computed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentileMethod {
    /// Linear interpolation between closest ranks (`h = (n-1)q`).
    #[default]
    Linear,
    /// Smallest value whose cumulative share is at least `q`.
    NearestRank,
}

impl std::fmt::Display for PercentileMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::NearestRank => write!(f, "nearest_rank"),
        }
    }
}

impl std::str::FromStr for PercentileMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(Self::Linear),
            "nearest_rank" | "nearest" => Ok(Self::NearestRank),
            other => Err(format!("unknown percentile method '{other}'")),
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Sample standard deviation (n − 1 denominator); `None` below two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Percentile `q` in `[0, 1]` of `values` (order irrelevant).
pub fn percentile(values: &[f64], q: f64, method: PercentileMethod) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    match method {
        PercentileMethod::Linear => {
            let h = (n - 1) as f64 * q;
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
        }
        PercentileMethod::NearestRank => {
            let rank = (q * n as f64).ceil() as usize;
            Some(sorted[rank.clamp(1, n) - 1])
        }
    }
}

pub fn median(values: &[f64], method: PercentileMethod) -> Option<f64> {
    percentile(values, 0.5, method)
}

/// Safe division returning `None` when the denominator is zero or missing.
pub fn safe_div(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// `(last - first) / first`, only defined for a positive `first`.
pub fn pct_change(first: Option<f64>, last: Option<f64>) -> Option<f64> {
    match (first, last) {
        (Some(f), Some(l)) if f > 0.0 => Some((l - f) / f),
        _ => None,
    }
}

/// The fixed statistic set attached to an aggregate row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasureSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p10: Option<f64>,
    pub p90: Option<f64>,
}

pub fn summarize(values: &[f64], method: PercentileMethod) -> MeasureSummary {
    MeasureSummary {
        count: values.len(),
        mean: mean(values),
        min: min(values),
        max: max(values),
        p10: percentile(values, 0.10, method),
        p90: percentile(values, 0.90, method),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
