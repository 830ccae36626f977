//! CSV export of result tables.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::{AnalyticsError, AnalyticsResult, ResultTable};

fn export_err(e: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::Export(e.to_string())
}

/// Write `table` as UTF-8 CSV: header row, then one record per row in the
/// table's current order. Null cells are empty fields.
pub fn write_csv<W: Write>(table: &ResultTable, writer: W) -> AnalyticsResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&table.columns).map_err(export_err)?;
    for row in &table.rows {
        let record: Vec<String> = row.iter().map(ToString::to_string).collect();
        wtr.write_record(&record).map_err(export_err)?;
    }
    wtr.flush().map_err(export_err)?;
    Ok(())
}

pub fn to_csv_string(table: &ResultTable) -> AnalyticsResult<String> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf)?;
    String::from_utf8(buf).map_err(export_err)
}

/// Default file name for an export key.
pub fn export_file_name(export_key: &str) -> String {
    format!("{export_key}.csv")
}

/// Write `table` to `path`, creating parent directories as needed.
pub fn export_to_path(table: &ResultTable, path: &Path) -> AnalyticsResult<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(export_err)?;
    }
    let file = fs::File::create(path).map_err(export_err)?;
    write_csv(table, file)?;
    tracing::info!(
        target: "staffing::export",
        path = %path.display(),
        rows = table.len(),
        "exported CSV"
    );
    Ok(path.to_path_buf())
}
