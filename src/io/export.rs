//! Artifact CSV writers.
//!
//! Every writer produces a plain header-plus-rows CSV that is easy to consume
//! in spreadsheets or downstream scripts. Write failures are exit code 2.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::data::ReturnRow;
use crate::domain::{ConfigSummary, Dataset, RunParams};
use crate::error::AppError;
use crate::forest::MarginsResult;

/// Write per-row class probabilities: `row,y_true,p1..pK,y_pred`.
pub fn write_predictions_csv(
    path: &Path,
    y: &[u32],
    probs: &[Vec<f64>],
    y_pred: &[u32],
) -> Result<(), AppError> {
    let mut file = create(path)?;
    let n_class = probs.first().map(Vec::len).unwrap_or(0);

    let mut header = String::from("row,y_true");
    for k in 1..=n_class {
        header.push_str(&format!(",p{k}"));
    }
    header.push_str(",y_pred");
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;

    for (i, row) in probs.iter().enumerate() {
        let mut line = format!("{},{}", i + 1, y[i]);
        for p in row {
            line.push_str(&format!(",{p:.10}"));
        }
        line.push_str(&format!(",{}", y_pred[i]));
        writeln!(file, "{line}").map_err(|e| write_err(path, e))?;
    }

    Ok(())
}

/// Write per-row class variances: `row,var1..varK`.
pub fn write_variances_csv(path: &Path, variances: &[Vec<f64>]) -> Result<(), AppError> {
    let mut file = create(path)?;
    let n_class = variances.first().map(Vec::len).unwrap_or(0);

    let mut header = String::from("row");
    for k in 1..=n_class {
        header.push_str(&format!(",var{k}"));
    }
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;

    for (i, row) in variances.iter().enumerate() {
        let mut line = format!("{}", i + 1);
        for v in row {
            line.push_str(&format!(",{v:.10}"));
        }
        writeln!(file, "{line}").map_err(|e| write_err(path, e))?;
    }

    Ok(())
}

/// Write marginal effects, one row per covariate: `feature,kind,me1..meK`,
/// extended with `se*`, `t*` and `p*` columns when inference was on.
pub fn write_margins_csv(path: &Path, margins: &MarginsResult) -> Result<(), AppError> {
    let mut file = create(path)?;
    let n_class = margins.effects.first().map(Vec::len).unwrap_or(0);
    let with_inference = margins.std_errors.is_some();

    let mut header = String::from("feature,kind");
    for k in 1..=n_class {
        header.push_str(&format!(",me{k}"));
    }
    if with_inference {
        for prefix in ["se", "t", "p"] {
            for k in 1..=n_class {
                header.push_str(&format!(",{prefix}{k}"));
            }
        }
    }
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;

    for (i, name) in margins.feature_names.iter().enumerate() {
        let mut line = format!("{},{}", name, margins.kinds[i].label());
        for v in &margins.effects[i] {
            line.push_str(&format!(",{v:.10}"));
        }
        if with_inference {
            for block in [&margins.std_errors, &margins.t_values, &margins.p_values] {
                if let Some(rows) = block {
                    for v in &rows[i] {
                        line.push_str(&format!(",{v:.10}"));
                    }
                }
            }
        }
        writeln!(file, "{line}").map_err(|e| write_err(path, e))?;
    }

    Ok(())
}

/// Write the per-source metrics table, one row per configuration.
pub fn write_metrics_csv(
    path: &Path,
    params: &RunParams,
    configs: &[ConfigSummary],
) -> Result<(), AppError> {
    let mut file = create(path)?;

    writeln!(
        file,
        "config,replace,honesty,inference,trees,min_leaf,max_features,sample_fraction,honesty_fraction,mse1,mse2,accuracy,fit_ms,margins_ms"
    )
    .map_err(|e| write_err(path, e))?;

    for cfg in configs {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{:.10},{:.10},{:.10},{},{}",
            cfg.tag,
            cfg.replace as u8,
            cfg.honesty as u8,
            cfg.inference as u8,
            params.trees,
            params.min_leaf,
            params.max_features,
            params.sample_fraction,
            params.honesty_fraction,
            cfg.measures.mse1,
            cfg.measures.mse2,
            cfg.measures.accuracy,
            cfg.fit_ms,
            cfg.margins_ms,
        )
        .map_err(|e| write_err(path, e))?;
    }

    Ok(())
}

/// Write an ordered-outcome dataset: `y,x1..xP`.
pub fn write_odata_csv(path: &Path, data: &Dataset) -> Result<(), AppError> {
    let mut file = create(path)?;

    let mut header = String::from("y");
    for name in &data.feature_names {
        header.push_str(&format!(",{name}"));
    }
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;

    for (yi, row) in data.y.iter().zip(&data.x) {
        let mut line = format!("{yi}");
        for v in row {
            line.push_str(&format!(",{v:.10}"));
        }
        writeln!(file, "{line}").map_err(|e| write_err(path, e))?;
    }

    Ok(())
}

/// Write a daily-return series: `date,ret` with ISO dates.
pub fn write_returns_csv(path: &Path, rows: &[ReturnRow]) -> Result<(), AppError> {
    let mut file = create(path)?;

    writeln!(file, "date,ret").map_err(|e| write_err(path, e))?;
    for row in rows {
        writeln!(file, "{},{:.10}", row.date, row.ret).map_err(|e| write_err(path, e))?;
    }

    Ok(())
}

fn create(path: &Path) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))
}

fn write_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;
    use crate::io::ingest::{load_odata, load_returns, read_predictions_csv};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("orfbench-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn predictions_round_trip() {
        let path = temp_path("pred_rt.csv");
        let y = vec![1, 2, 3];
        let probs = vec![
            vec![0.7, 0.2, 0.1],
            vec![0.1, 0.6, 0.3],
            vec![0.2, 0.2, 0.6],
        ];
        let y_pred = vec![1, 2, 3];
        write_predictions_csv(&path, &y, &probs, &y_pred).unwrap();

        let read = read_predictions_csv(&path).unwrap();
        assert_eq!(read.y, y);
        assert_eq!(read.n_class(), 3);
        for (a, b) in read.probs.iter().zip(&probs) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-9, "probability drifted: {x} vs {y}");
            }
        }
    }

    #[test]
    fn odata_round_trip() {
        let path = temp_path("odata_rt.csv");
        let data = Dataset {
            source: SourceKind::Odata,
            feature_names: vec!["x1".to_string(), "x2".to_string()],
            x: vec![vec![0.5, -1.25], vec![1.5, 2.0], vec![-0.5, 0.0]],
            y: vec![1, 2, 2],
        };
        write_odata_csv(&path, &data).unwrap();

        let read = load_odata(&path).unwrap();
        assert_eq!(read.y, data.y);
        assert_eq!(read.feature_names, data.feature_names);
        for (a, b) in read.x.iter().zip(&data.x) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-9, "feature drifted: {x} vs {y}");
            }
        }
    }

    #[test]
    fn returns_round_trip_sorts_by_date() {
        let path = temp_path("returns_rt.csv");
        let rows = vec![
            ReturnRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                ret: 0.002,
            },
            ReturnRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                ret: -0.001,
            },
        ];
        write_returns_csv(&path, &rows).unwrap();

        let read = load_returns(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!((read[0].ret + 0.001).abs() < 1e-12);
        assert_eq!(read[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn margins_header_grows_with_inference() {
        use crate::domain::EvalPoint;
        use crate::forest::ColumnKind;

        let base = MarginsResult {
            eval_point: EvalPoint::Mean,
            window: 0.1,
            feature_names: vec!["x1".to_string()],
            kinds: vec![ColumnKind::Continuous],
            effects: vec![vec![0.1, -0.05, -0.05]],
            std_errors: Some(vec![vec![0.01, 0.01, 0.01]]),
            t_values: Some(vec![vec![10.0, -5.0, -5.0]]),
            p_values: Some(vec![vec![0.0, 0.0, 0.0]]),
        };

        let path = temp_path("margins_inf.csv");
        write_margins_csv(&path, &base).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.contains("me1") && header.contains("se1") && header.contains("p3"));
        assert_eq!(text.lines().count(), 2);

        let plain = MarginsResult {
            std_errors: None,
            t_values: None,
            p_values: None,
            ..base
        };
        let path = temp_path("margins_plain.csv");
        write_margins_csv(&path, &plain).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.ends_with("me3"), "unexpected header: {header}");
    }
}
