//! Per-point color and radius for the utilization map.
//!
//! The map renderer reads precomputed values only, so every point carries
//! its RGBA fill and radius in meters.

use chrono::NaiveDate;
use serde::Serialize;

use super::derive;
use super::types::{AnalyticsResult, ResultTable, Value};

/// Fill for points with no utilization value.
pub const NEUTRAL_GRAY: [u8; 4] = [160, 160, 160, 140];

pub const MIN_RADIUS: u32 = 2_000;
pub const MAX_RADIUS: u32 = 12_000;

/// Blue-to-red RGBA for a utilization rate; values outside `[0, 1]` are
/// clamped, null and NaN map to [`NEUTRAL_GRAY`]. Channels truncate toward
/// zero.
pub fn utilization_color(utilization: Option<f64>) -> [u8; 4] {
    let Some(u) = utilization.filter(|u| !u.is_nan()) else {
        return NEUTRAL_GRAY;
    };
    let v = u.clamp(0.0, 1.0);
    let r = (20.0 + 235.0 * v) as u8;
    let g = (60.0 + 40.0 * (1.0 - v)) as u8;
    let b = (210.0 - 190.0 * v) as u8;
    [r, g, b, 170]
}

/// `20 * sqrt(resident_days)` rounded and clamped to
/// `[MIN_RADIUS, MAX_RADIUS]`. Missing or negative magnitudes count as zero.
pub fn point_radius(resident_days: Option<f64>) -> u32 {
    let x = resident_days.filter(|x| x.is_finite()).unwrap_or(0.0).max(0.0);
    let r = (20.0 * x.sqrt()).round();
    r.clamp(MIN_RADIUS as f64, MAX_RADIUS as f64) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub ccn: String,
    pub provider_name: String,
    pub state: String,
    pub lat: f64,
    pub lon: f64,
    pub utilization: Option<f64>,
    pub resident_days: Option<f64>,
    pub color: [u8; 4],
    pub radius: u32,
}

/// Points for one month plus the initial view center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    pub month: NaiveDate,
    pub center_lat: f64,
    pub center_lon: f64,
    pub points: Vec<MapPoint>,
}

/// Build the map for the latest `month` present in a bed-utilization table
/// (month column already coerced to dates). Rows without both coordinates
/// are skipped; `None` when no row of that month has any.
pub fn map_layer(table: &ResultTable) -> AnalyticsResult<Option<MapLayer>> {
    let month_idx = table.require_column("month")?;
    let Some(month) = table.rows.iter().filter_map(|r| r[month_idx].as_date()).max() else {
        return Ok(None);
    };

    let text = |v: Option<&Value>| v.map(Value::to_string).unwrap_or_default();
    let points: Vec<MapPoint> = table
        .iter()
        .filter(|r| r.get("month").and_then(Value::as_date) == Some(month))
        .filter_map(|r| {
            let lat = r.number("lat")?;
            let lon = r.number("lon")?;
            let utilization = r.number("utilization");
            let resident_days = r.number("resident_days");
            Some(MapPoint {
                ccn: text(r.get("ccn")),
                provider_name: text(r.get("provider_name")),
                state: text(r.get("state")),
                lat,
                lon,
                utilization,
                resident_days,
                color: utilization_color(utilization),
                radius: point_radius(resident_days),
            })
        })
        .collect();

    let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.lon).collect();
    let (Some(center_lat), Some(center_lon)) = (derive::mean(&lats), derive::mean(&lons)) else {
        return Ok(None);
    };
    Ok(Some(MapLayer {
        month,
        center_lat,
        center_lon,
        points,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_endpoints() {
        assert_eq!(utilization_color(Some(0.0)), [20, 100, 210, 170]);
        assert_eq!(utilization_color(Some(1.0)), [255, 60, 20, 170]);
        assert_eq!(utilization_color(None), NEUTRAL_GRAY);
        assert_eq!(utilization_color(Some(f64::NAN)), NEUTRAL_GRAY);
    }

    #[test]
    fn color_clamps_out_of_range() {
        assert_eq!(utilization_color(Some(1.4)), utilization_color(Some(1.0)));
        assert_eq!(utilization_color(Some(-0.2)), utilization_color(Some(0.0)));
    }

    #[test]
    fn color_midpoint_truncates() {
        // 20 + 117.5, 60 + 20, 210 - 95
        assert_eq!(utilization_color(Some(0.5)), [137, 80, 115, 170]);
    }

    #[test]
    fn radius_clamps_both_ends() {
        assert_eq!(point_radius(Some(0.0)), 2_000);
        assert_eq!(point_radius(Some(100.0)), 2_000);
        assert_eq!(point_radius(Some(1_000_000.0)), 12_000);
        assert_eq!(point_radius(None), 2_000);
        assert_eq!(point_radius(Some(-50.0)), 2_000);
        assert_eq!(point_radius(Some(40_000.0)), 4_000);
    }

    #[test]
    fn map_layer_uses_latest_month_with_coordinates() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let t = ResultTable::new([
            "ccn",
            "provider_name",
            "state",
            "month",
            "utilization",
            "resident_days",
            "lat",
            "lon",
        ])
        .with_rows(vec![
            vec!["1".into(), "A".into(), "CA".into(), jan.into(), 0.5.into(), 100.0.into(), 30.0.into(), (-120.0).into()],
            vec!["1".into(), "A".into(), "CA".into(), feb.into(), 1.0.into(), 1e6.into(), 34.0.into(), (-118.0).into()],
            vec!["2".into(), "B".into(), "CA".into(), feb.into(), Value::Null, Value::Null, 36.0.into(), (-122.0).into()],
            vec!["3".into(), "C".into(), "CA".into(), feb.into(), 0.2.into(), 10.0.into(), Value::Null, Value::Null],
        ]);
        let layer = map_layer(&t).unwrap().unwrap();
        assert_eq!(layer.month, feb);
        assert_eq!(layer.points.len(), 2);
        assert_eq!(layer.center_lat, 35.0);
        assert_eq!(layer.center_lon, -120.0);
        assert_eq!(layer.points[0].color, [255, 60, 20, 170]);
        assert_eq!(layer.points[0].radius, 12_000);
        assert_eq!(layer.points[1].color, NEUTRAL_GRAY);
    }

    #[test]
    fn map_layer_without_coordinates_is_none() {
        let t = ResultTable::new(["month", "lat", "lon"]).with_rows(vec![vec![
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().into(),
            Value::Null,
            Value::Null,
        ]]);
        assert_eq!(map_layer(&t).unwrap(), None);
    }
}
