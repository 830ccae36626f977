//! Shared fixtures: a temporary SQLite mirror of the gold views and a
//! tracing capture helper.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::Connection;
use staffing_analytics::analytics::cache::ResultCache;
use staffing_analytics::analytics::catalog::Catalog;
use staffing_analytics::analytics::types::FilterState;
use staffing_analytics::warehouse::SqliteWarehouse;
use tempfile::TempDir;

const SCHEMA: &str = "
CREATE TABLE gold_vw_hprd_by_state (
    state TEXT, start_date TEXT, end_date TEXT, hprd_weighted REAL
);
CREATE TABLE gold_vw_hprd_by_facility (
    ccn TEXT, provider_name TEXT, state TEXT, days_with_residents INTEGER,
    start_date TEXT, end_date TEXT, hprd_weighted, rn_hprd REAL, lpn_hprd REAL, cna_hprd REAL
);
CREATE TABLE gold_vw_total_nurse_hours_facility_monthly (
    state TEXT, provider_name TEXT, ccn TEXT, month TEXT, total_hours_direct REAL
);
CREATE TABLE gold_vw_total_nurse_hours_state_monthly (
    state TEXT, month TEXT, total_hours_direct REAL
);
CREATE TABLE gold_vw_perm_vs_contract_facility_monthly (
    state TEXT, ccn TEXT, month TEXT, emp_hours REAL, ctr_hours REAL
);
CREATE TABLE gold_vw_bed_utilization_facility_monthly (
    state TEXT, provider_name TEXT, ccn TEXT, month TEXT,
    bed_utilization_rate_monthly REAL, resident_days REAL, observed_days REAL,
    certified_beds_reported REAL
);
CREATE TABLE gold_facility_dim (ccn TEXT, latitude REAL, longitude REAL);
";

/// Four reporting facilities across CA, TX and NV over Jan-Mar 2024, plus a
/// CA facility whose HPRD is unparseable.
const ROWS: &str = "
INSERT INTO gold_vw_hprd_by_state VALUES
    ('CA', '2024-01-01', '2024-03-31', 4.2),
    ('NV', '2024-01-01', '2024-03-31', 3.0),
    ('TX', '2024-01-01', '2024-03-31', 5.1),
    (NULL, '2024-01-01', '2024-03-31', 1.0);

INSERT INTO gold_vw_hprd_by_facility VALUES
    ('050001', 'Alder Care', 'CA', 90, '2024-01-01', '2024-03-31', 4.2, 1.0, 0.9, 2.3),
    ('050002', 'Birch Manor', 'CA', 90, '2024-01-01', '2024-03-31', 4.2, 0.8, 1.0, 2.4),
    ('050003', 'Dogwood Villa', 'CA', 90, '2024-01-01', '2024-03-31', 'n/a', NULL, NULL, NULL),
    ('450001', 'Cedar House', 'TX', 90, '2024-01-01', '2024-03-31', 5.1, 1.5, 1.1, 2.5),
    ('290001', 'O''Brien Care', 'NV', 90, '2024-01-01', '2024-03-31', 3.0, 0.7, 0.8, 1.5);

INSERT INTO gold_vw_total_nurse_hours_facility_monthly VALUES
    ('CA', 'Alder Care', '050001', '2024-01-01', 1000),
    ('CA', 'Alder Care', '050001', '2024-02-01', 1100),
    ('CA', 'Alder Care', '050001', '2024-03-01', 1200),
    ('CA', 'Birch Manor', '050002', '2024-01-01', 800),
    ('CA', 'Birch Manor', '050002', '2024-02-01', 800),
    ('CA', 'Birch Manor', '050002', '2024-03-01', 900),
    ('TX', 'Cedar House', '450001', '2024-01-01', 1500),
    ('TX', 'Cedar House', '450001', '2024-02-01', 1400),
    ('TX', 'Cedar House', '450001', '2024-03-01', 1600),
    ('NV', 'O''Brien Care', '290001', '2024-01-01', 500),
    ('NV', 'O''Brien Care', '290001', '2024-02-01', 600),
    ('NV', 'O''Brien Care', '290001', '2024-03-01', 700);

INSERT INTO gold_vw_total_nurse_hours_state_monthly VALUES
    ('CA', '2024-01-01', 1800), ('CA', '2024-02-01', 1900), ('CA', '2024-03-01', 2100),
    ('TX', '2024-01-01', 1500), ('TX', '2024-02-01', 1400), ('TX', '2024-03-01', 1600),
    ('NV', '2024-01-01', 500), ('NV', '2024-02-01', 600), ('NV', '2024-03-01', 700);

INSERT INTO gold_vw_perm_vs_contract_facility_monthly VALUES
    ('CA', '050001', '2024-02-01', 900, 200),
    ('CA', '050001', '2024-03-01', 900, 300),
    ('CA', '050002', '2024-03-01', 900, 0),
    ('TX', '450001', '2024-03-01', 1200, 400),
    ('NV', '290001', '2024-03-01', 700, NULL);

INSERT INTO gold_vw_bed_utilization_facility_monthly VALUES
    ('CA', 'Alder Care', '050001', '2024-01-01', 0.80, 2400, 31, 100),
    ('CA', 'Alder Care', '050001', '2024-02-01', 0.85, 2550, 29, 100),
    ('CA', 'Alder Care', '050001', '2024-03-01', 0.90, 2700, 31, 100),
    ('CA', 'Birch Manor', '050002', '2024-01-01', 0.60, 1800, 31, 100),
    ('CA', 'Birch Manor', '050002', '2024-02-01', 0.65, 1900, 29, 100),
    ('CA', 'Birch Manor', '050002', '2024-03-01', NULL, NULL, 31, 100),
    ('TX', 'Cedar House', '450001', '2024-01-01', 0.95, 85000, 31, 3000),
    ('TX', 'Cedar House', '450001', '2024-02-01', 0.97, 86000, 29, 3000),
    ('TX', 'Cedar House', '450001', '2024-03-01', 1.00, 90000, 31, 3000),
    ('NV', 'O''Brien Care', '290001', '2024-01-01', 0.50, 1500, 31, 100),
    ('NV', 'O''Brien Care', '290001', '2024-02-01', 0.50, 1450, 29, 100),
    ('NV', 'O''Brien Care', '290001', '2024-03-01', 0.50, 1550, 31, 100);

INSERT INTO gold_facility_dim VALUES
    ('050001', 34.0, -118.0),
    ('050002', NULL, NULL),
    ('450001', 30.0, -97.0),
    ('290001', 36.0, -115.0);
";

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Filter over Jan-Mar 2024 for the given states.
pub fn q1_filter(states: &[&str]) -> FilterState {
    FilterState::new(
        states.iter().copied(),
        Vec::<String>::new(),
        d(2024, 1, 1),
        d(2024, 3, 1),
    )
    .unwrap()
}

/// A gold-view mirror on disk; removed when dropped.
pub struct GoldFixture {
    root: TempDir,
    pub path: PathBuf,
}

impl GoldFixture {
    /// Schema and sample rows.
    pub fn new() -> Self {
        Self::build(&[SCHEMA, ROWS])
    }

    /// Schema only.
    pub fn empty() -> Self {
        Self::build(&[SCHEMA])
    }

    /// Sample rows with one view missing.
    pub fn without(view: &str) -> Self {
        let drop = format!("DROP TABLE {view};");
        Self::build(&[SCHEMA, ROWS, &drop])
    }

    fn build(batches: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gold.db");
        let conn = Connection::open(&path).unwrap();
        for batch in batches {
            conn.execute_batch(batch).unwrap();
        }
        Self { root: dir, path }
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            Arc::new(SqliteWarehouse::new(&self.path)),
            Arc::new(ResultCache::default()),
        )
    }

    /// Directory holding the database; usable as a scratch area.
    pub fn dir(&self) -> &std::path::Path {
        self.root.path()
    }
}

/// Captures tracing output for tests.
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
