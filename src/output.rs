//! Tabular output of screening results.
//!
//! Column order is fixed: `address, screenStatus, risk, riskReason,
//! category, name`, then per category (sorted) either `{cat}_direct,
//! {cat}_indirect` or `{cat}`. Absent values are written as empty cells.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::ScreenError;
use crate::models::{ExposureValue, ScreeningResult, ScreeningRow};

pub const BASE_COLUMNS: [&str; 6] = [
    "address",
    "screenStatus",
    "risk",
    "riskReason",
    "category",
    "name",
];

/// Header row for `taxonomy`.
pub fn header(taxonomy: &[String], include_indirect: bool) -> Vec<String> {
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut sorted: Vec<&String> = taxonomy.iter().collect();
    sorted.sort();
    for cat in sorted {
        if include_indirect {
            columns.push(format!("{}_direct", cat));
            columns.push(format!("{}_indirect", cat));
        } else {
            columns.push(cat.clone());
        }
    }
    columns
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl ScreeningRow {
    /// Cells of this row, aligned with [`header`] over the same taxonomy.
    pub fn to_record(&self, taxonomy: &[String], include_indirect: bool) -> Vec<String> {
        let mut record = vec![
            self.address.clone(),
            self.screen_status.clone(),
            self.risk.clone(),
            self.risk_reason.clone(),
            self.category.clone(),
            self.name.clone(),
        ];

        let mut sorted: Vec<&String> = taxonomy.iter().collect();
        sorted.sort();
        for cat in sorted {
            match (self.exposures.get(cat), include_indirect) {
                (Some(ExposureValue::Split { direct, indirect }), true) => {
                    record.push(cell(*direct));
                    record.push(cell(*indirect));
                }
                (Some(ExposureValue::Single(value)), false) => record.push(cell(*value)),
                (_, true) => record.extend([String::new(), String::new()]),
                (_, false) => record.push(String::new()),
            }
        }
        record
    }
}

/// Writes header and one row per result as CSV.
pub fn write_results<W: Write>(
    writer: W,
    results: &[ScreeningResult],
    taxonomy: &[String],
    include_indirect: bool,
) -> Result<(), ScreenError> {
    if taxonomy.is_empty() {
        return Err(ScreenError::Output(
            "No exposure categories found - cannot generate CSV output".to_string(),
        ));
    }

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(header(taxonomy, include_indirect))
        .map_err(output_error)?;
    for result in results {
        csv_writer
            .write_record(result.row.to_record(taxonomy, include_indirect))
            .map_err(output_error)?;
    }
    csv_writer
        .flush()
        .map_err(|e| ScreenError::Output(e.to_string()))?;
    Ok(())
}

/// Writes results to `path` as CSV, whatever its extension.
///
/// Data goes to a sibling temporary file that is renamed into place once
/// complete, so a failed or interrupted write never leaves a partial file.
pub fn write_results_to_path(
    path: &Path,
    results: &[ScreeningResult],
    taxonomy: &[String],
    include_indirect: bool,
) -> Result<(), ScreenError> {
    let tmp_path = temp_path(path);
    let file = std::fs::File::create(&tmp_path).map_err(|e| {
        ScreenError::Output(format!("Failed to create {}: {}", tmp_path.display(), e))
    })?;
    let writer = std::io::BufWriter::new(file);

    if let Err(e) = write_results(writer, results, taxonomy, include_indirect) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        ScreenError::Output(format!("Failed to write {}: {}", path.display(), e))
    })?;

    tracing::info!("Results written to {}", path.display());
    Ok(())
}

/// `{stem}_screened{.ext}` next to `input`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "addresses".to_string());
    let file_name = match input.extension() {
        Some(ext) => format!("{}_screened.{}", stem, ext.to_string_lossy()),
        None => format!("{}_screened", stem),
    };
    input.with_file_name(file_name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn output_error(err: csv::Error) -> ScreenError {
    ScreenError::Output(err.to_string())
}
