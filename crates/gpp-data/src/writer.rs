//! Delimited-text export of a [`ResultTable`].

use std::io::Write;
use std::path::Path;

use gpp_core::error::{GppError, Result};
use gpp_core::models::ChangeAnnotatedRecord;
use serde::Serialize;
use tracing::info;

use crate::table::ResultTable;

/// One exported row. Field order is the column order of the CSV.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    cnid: i64,
    common_name: &'a str,
    short_name: &'a str,
    region: u8,
    region_label: &'a str,
    year: i32,
    productivity_sum: f64,
    area_acres: f64,
    productivity_scaled: f64,
    area_km2: f64,
    productivity_per_km2: f64,
    change_from_prior: Option<f64>,
    change_from_prior_pct: Option<f64>,
    change_from_baseline: f64,
    change_from_baseline_pct: Option<f64>,
    final_change_pct: Option<f64>,
    is_last_in_series: bool,
}

impl<'a> From<&'a ChangeAnnotatedRecord> for ExportRow<'a> {
    fn from(row: &'a ChangeAnnotatedRecord) -> Self {
        let enriched = &row.record;
        let raw = &enriched.raw;
        Self {
            cnid: raw.cnid,
            common_name: &raw.common_name,
            short_name: &enriched.short_name,
            region: raw.region.number(),
            region_label: &enriched.region_label,
            year: raw.year,
            productivity_sum: raw.productivity_sum,
            area_acres: raw.area_acres,
            productivity_scaled: enriched.productivity_scaled,
            area_km2: enriched.area_km2,
            productivity_per_km2: enriched.productivity_per_km2,
            change_from_prior: row.change_from_prior,
            change_from_prior_pct: row.change_from_prior_pct,
            change_from_baseline: row.change_from_baseline,
            change_from_baseline_pct: row.change_from_baseline_pct,
            final_change_pct: row.final_change_pct,
            is_last_in_series: row.is_last_in_series,
        }
    }
}

/// Write every row of `table` as CSV with a header row. Undefined values
/// are written as empty cells.
pub fn write_csv(table: &ResultTable, out: impl Write) -> Result<()> {
    let csv_error = |error: csv::Error| GppError::Csv {
        source_name: "result table".to_string(),
        error,
    };

    let mut writer = csv::Writer::from_writer(out);
    for row in table.records() {
        writer.serialize(ExportRow::from(row)).map_err(csv_error)?;
    }
    // A header is still wanted for an empty table.
    if table.is_empty() {
        writer
            .write_record(COLUMNS)
            .map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `table` to a CSV file at `path`, creating parent directories.
pub fn write_csv_file(table: &ResultTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path).map_err(|source| GppError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(table, std::io::BufWriter::new(file))?;
    info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Column names, matching the field order of [`ExportRow`].
pub const COLUMNS: [&str; 17] = [
    "cnid",
    "common_name",
    "short_name",
    "region",
    "region_label",
    "year",
    "productivity_sum",
    "area_acres",
    "productivity_scaled",
    "area_km2",
    "productivity_per_km2",
    "change_from_prior",
    "change_from_prior_pct",
    "change_from_baseline",
    "change_from_baseline_pct",
    "final_change_pct",
    "is_last_in_series",
];

// ── Tests ─────────────────────────────────────────────────────────────────────
