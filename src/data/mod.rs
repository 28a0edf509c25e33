//! Dataset acquisition and assembly.
//!
//! - `synth`: seeded generators for all three benchmark sources
//! - [`load_dataset`]: resolve a `SourceKind` into a ready `Dataset`,
//!   reading CSVs from the data directory where the source has one

pub mod synth;

pub use synth::*;

use std::path::Path;

use log::debug;

use crate::domain::{BenchConfig, Dataset, SourceKind};
use crate::error::AppError;
use crate::io::ingest;
use crate::math;

/// Number of lagged returns used as covariates for the `returns` source.
pub const RETURN_LAGS: usize = 4;

/// Minimum usable rows for any benchmark dataset. Below this the honest
/// split leaves too few rows per side to grow trees worth measuring.
pub const MIN_ROWS: usize = 30;

/// Load one benchmark dataset, generating or reading as the source demands.
pub fn load_dataset(source: SourceKind, config: &BenchConfig) -> Result<Dataset, AppError> {
    let dataset = match source {
        SourceKind::Sim => synth_sim(config.rows, config.seed)?,
        SourceKind::Odata => {
            let path = config.data_dir.join("odata.csv");
            ensure_exists(&path)?;
            ingest::load_odata(&path)?
        }
        SourceKind::Returns => {
            let path = config.data_dir.join("returns.csv");
            ensure_exists(&path)?;
            let series = ingest::load_returns(&path)?;
            returns_to_dataset(&series)?
        }
    };

    validate_dataset(&dataset)?;
    debug!(
        "loaded {}: {} rows, {} features, class counts {:?}",
        source.name(),
        dataset.n_rows(),
        dataset.n_features(),
        dataset.class_counts()
    );
    Ok(dataset)
}

fn ensure_exists(path: &Path) -> Result<(), AppError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AppError::new(
            2,
            format!(
                "Missing data file {}. Run `orfbench gen` to create it.",
                path.display()
            ),
        ))
    }
}

/// Assemble the lagged tercile problem from a raw return series.
///
/// Each usable day carries lags `1..=RETURN_LAGS` as covariates; the outcome
/// is the tercile class of the same-day return. The first `RETURN_LAGS` days
/// have incomplete lag windows and are dropped.
pub fn returns_to_dataset(series: &[ReturnRow]) -> Result<Dataset, AppError> {
    if series.len() <= RETURN_LAGS {
        return Err(AppError::new(
            3,
            format!(
                "Return series has {} rows; need more than {RETURN_LAGS} to build lags.",
                series.len()
            ),
        ));
    }

    let rets: Vec<f64> = series.iter().map(|r| r.ret).collect();
    let usable = &rets[RETURN_LAGS..];
    let y = math::tercile_classes(usable)
        .ok_or_else(|| AppError::new(3, "Return series has no usable rows after lagging."))?;

    let mut x = Vec::with_capacity(usable.len());
    for t in RETURN_LAGS..rets.len() {
        x.push((1..=RETURN_LAGS).map(|lag| rets[t - lag]).collect());
    }

    Ok(Dataset {
        source: SourceKind::Returns,
        x,
        y,
        feature_names: (1..=RETURN_LAGS).map(|lag| format!("lag{lag}")).collect(),
    })
}

fn validate_dataset(dataset: &Dataset) -> Result<(), AppError> {
    if dataset.n_rows() < MIN_ROWS {
        return Err(AppError::new(
            3,
            format!(
                "Dataset {} has {} usable rows; need at least {MIN_ROWS}.",
                dataset.source.name(),
                dataset.n_rows()
            ),
        ));
    }
    let populated = dataset.class_counts().iter().filter(|&&c| c > 0).count();
    if populated < 2 {
        return Err(AppError::new(
            3,
            format!(
                "Dataset {} has a single outcome class; nothing to estimate.",
                dataset.source.name()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_of(values: &[f64]) -> Vec<ReturnRow> {
        let start = chrono::NaiveDate::from_ymd_opt(2021, 3, 1).expect("valid date");
        values
            .iter()
            .enumerate()
            .map(|(i, &ret)| ReturnRow {
                date: start + chrono::Duration::days(i as i64),
                ret,
            })
            .collect()
    }

    #[test]
    fn lag_columns_are_ordered_most_recent_first() {
        let values: Vec<f64> = (1..=12).map(|v| v as f64 / 100.0).collect();
        let ds = returns_to_dataset(&series_of(&values)).expect("assembly succeeds");

        assert_eq!(ds.n_rows(), values.len() - RETURN_LAGS);
        assert_eq!(ds.feature_names, vec!["lag1", "lag2", "lag3", "lag4"]);
        // First usable day is t = 4: lag1 = r3, lag2 = r2, lag3 = r1, lag4 = r0.
        assert_eq!(ds.x[0], vec![values[3], values[2], values[1], values[0]]);
        assert_eq!(
            ds.x[1],
            vec![values[4], values[3], values[2], values[1]],
            "windows must slide one day at a time"
        );
    }

    #[test]
    fn outcome_is_the_tercile_of_the_same_day_return() {
        let values: Vec<f64> = (1..=13).map(f64::from).collect();
        let ds = returns_to_dataset(&series_of(&values)).expect("assembly succeeds");
        let expected =
            math::tercile_classes(&values[RETURN_LAGS..]).expect("non-empty usable window");
        assert_eq!(ds.y, expected);
    }

    #[test]
    fn short_series_is_a_data_error() {
        let err = returns_to_dataset(&series_of(&[0.01, 0.02])).expect_err("must fail");
        assert_eq!(err.exit_code(), 3);
    }
}
