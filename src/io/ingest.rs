//! CSV ingest and validation for the benchmark datasets.
//!
//! Readers are strict about schema (missing columns are exit code 2) but
//! tolerant about rows: a malformed row is logged with its line number and
//! skipped. A file that yields no usable rows at all is a data error
//! (exit code 3).

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use log::warn;

use crate::data::ReturnRow;
use crate::domain::{Dataset, SourceKind};
use crate::error::AppError;

/// Parsed contents of a predictions CSV, used by the `plot` subcommand.
#[derive(Debug, Clone)]
pub struct PredictionsFile {
    pub y: Vec<u32>,
    pub probs: Vec<Vec<f64>>,
}

impl PredictionsFile {
    pub fn n_class(&self) -> usize {
        self.probs.first().map(Vec::len).unwrap_or(0)
    }
}

/// Load the ordered-outcome CSV (`y` plus feature columns `x1`, `x2`, ...).
pub fn load_odata(path: &Path) -> Result<Dataset, AppError> {
    let (mut reader, header_map) = open_csv(path)?;

    let y_idx = require_column(&header_map, "y", path)?;
    let features = feature_columns(&header_map, 'x');
    if features.is_empty() {
        return Err(AppError::new(
            2,
            format!(
                "No feature columns (x1, x2, ...) found in '{}'.",
                path.display()
            ),
        ));
    }

    let mut y = Vec::new();
    let mut x = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Header occupies line 1; records start at line 2.
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: line {line}: CSV parse error: {e}", path.display());
                continue;
            }
        };
        match parse_outcome_row(&record, y_idx, &features) {
            Ok((yi, xi)) => {
                y.push(yi);
                x.push(xi);
            }
            Err(e) => warn!("{}: line {line}: {e}", path.display()),
        }
    }

    if y.is_empty() {
        return Err(AppError::new(
            3,
            format!("No usable rows in '{}'.", path.display()),
        ));
    }

    Ok(Dataset {
        source: SourceKind::Odata,
        feature_names: features.iter().map(|(name, _)| name.clone()).collect(),
        x,
        y,
    })
}

/// Load the daily-return CSV (`date`, `ret`), sorted by date ascending.
pub fn load_returns(path: &Path) -> Result<Vec<ReturnRow>, AppError> {
    let (mut reader, header_map) = open_csv(path)?;

    let date_idx = require_column(&header_map, "date", path)?;
    let ret_idx = require_column(&header_map, "ret", path)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: line {line}: CSV parse error: {e}", path.display());
                continue;
            }
        };
        match parse_return_row(&record, date_idx, ret_idx) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("{}: line {line}: {e}", path.display()),
        }
    }

    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("No usable rows in '{}'.", path.display()),
        ));
    }

    // Lag construction downstream needs chronological order; do not trust
    // the file order.
    rows.sort_by_key(|r| r.date);
    Ok(rows)
}

/// Read a predictions CSV back (`y_true` plus probability columns `p1`, ...).
pub fn read_predictions_csv(path: &Path) -> Result<PredictionsFile, AppError> {
    let (mut reader, header_map) = open_csv(path)?;

    // Exported files carry `y_true`; accept plain `y` for hand-made inputs.
    let y_idx = header_map
        .get("y_true")
        .or_else(|| header_map.get("y"))
        .copied()
        .ok_or_else(|| {
            AppError::new(
                2,
                format!("Missing required column `y_true` in '{}'.", path.display()),
            )
        })?;
    let prob_cols = feature_columns(&header_map, 'p');
    if prob_cols.len() < 2 {
        return Err(AppError::new(
            2,
            format!(
                "Expected at least 2 probability columns (p1, p2, ...) in '{}', found {}.",
                path.display(),
                prob_cols.len()
            ),
        ));
    }

    let mut y = Vec::new();
    let mut probs = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: line {line}: CSV parse error: {e}", path.display());
                continue;
            }
        };
        match parse_outcome_row(&record, y_idx, &prob_cols) {
            Ok((yi, row)) => {
                y.push(yi);
                probs.push(row);
            }
            Err(e) => warn!("{}: line {line}: {e}", path.display()),
        }
    }

    if y.is_empty() {
        return Err(AppError::new(
            3,
            format!("No usable rows in '{}'.", path.display()),
        ));
    }

    Ok(PredictionsFile { y, probs })
}

fn open_csv(path: &Path) -> Result<(csv::Reader<File>, HashMap<String, usize>), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();

    Ok((reader, build_header_map(&headers)))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM;
    // strip it or schema validation reports the column as missing.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn require_column(
    header_map: &HashMap<String, usize>,
    name: &str,
    path: &Path,
) -> Result<usize, AppError> {
    header_map.get(name).copied().ok_or_else(|| {
        AppError::new(
            2,
            format!("Missing required column `{name}` in '{}'.", path.display()),
        )
    })
}

/// Columns named `<prefix>1`, `<prefix>2`, ... sorted by their number.
fn feature_columns(header_map: &HashMap<String, usize>, prefix: char) -> Vec<(String, usize)> {
    let mut cols: Vec<(usize, String, usize)> = header_map
        .iter()
        .filter_map(|(name, &idx)| {
            let num = name.strip_prefix(prefix)?.parse::<usize>().ok()?;
            if num >= 1 {
                Some((num, name.clone(), idx))
            } else {
                None
            }
        })
        .collect();
    cols.sort();
    cols.into_iter().map(|(_, name, idx)| (name, idx)).collect()
}

/// Parse one record as an outcome plus a fixed set of float columns.
fn parse_outcome_row(
    record: &StringRecord,
    y_idx: usize,
    features: &[(String, usize)],
) -> Result<(u32, Vec<f64>), String> {
    let y_cell = get_cell(record, y_idx).ok_or("Missing `y` value.")?;
    let y = y_cell
        .parse::<u32>()
        .map_err(|_| format!("Invalid outcome '{y_cell}' (expected a positive integer class)."))?;
    if y == 0 {
        return Err("Outcome class 0 is invalid (classes are 1-based).".to_string());
    }

    let mut row = Vec::with_capacity(features.len());
    for (name, idx) in features {
        let cell = get_cell(record, *idx).ok_or_else(|| format!("Missing `{name}` value."))?;
        let v = cell
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("Invalid `{name}` value '{cell}'."))?;
        row.push(v);
    }
    Ok((y, row))
}

fn parse_return_row(record: &StringRecord, date_idx: usize, ret_idx: usize) -> Result<ReturnRow, String> {
    let date_cell = get_cell(record, date_idx).ok_or("Missing `date` value.")?;
    let date = parse_date(date_cell)?;

    let ret_cell = get_cell(record, ret_idx).ok_or("Missing `ret` value.")?;
    let ret = ret_cell
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid `ret` value '{ret_cell}'."))?;

    Ok(ReturnRow { date, ret })
}

fn get_cell(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // ISO dates are what `orfbench gen` writes, but accept a few common export
    // formats so hand-edited files keep working.
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY, YYYY/MM/DD."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_columns_sort_numerically() {
        let headers = StringRecord::from(vec!["y", "x10", "x2", "x1", "note"]);
        let map = build_header_map(&headers);
        let cols = feature_columns(&map, 'x');
        let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x1", "x2", "x10"]);
    }

    #[test]
    fn header_normalization_strips_bom_and_case() {
        assert_eq!(normalize_header_name("\u{feff}Date"), "date");
        assert_eq!(normalize_header_name("  RET "), "ret");
    }

    #[test]
    fn outcome_row_rejects_bad_outcomes() {
        let features = vec![("x1".to_string(), 1)];
        let rec = StringRecord::from(vec!["0", "1.5"]);
        assert!(parse_outcome_row(&rec, 0, &features).is_err());
        let rec = StringRecord::from(vec!["2.5", "1.5"]);
        assert!(parse_outcome_row(&rec, 0, &features).is_err());
        let rec = StringRecord::from(vec!["2", "1.5"]);
        let (y, x) = parse_outcome_row(&rec, 0, &features).unwrap();
        assert_eq!(y, 2);
        assert_eq!(x, vec![1.5]);
    }

    #[test]
    fn dates_parse_in_common_formats() {
        let want = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("2024-03-05").unwrap(), want);
        assert_eq!(parse_date("05/03/2024").unwrap(), want);
        assert_eq!(parse_date("05-03-2024").unwrap(), want);
        assert_eq!(parse_date("2024/03/05").unwrap(), want);
        assert!(parse_date("March 5").is_err());
    }
}
