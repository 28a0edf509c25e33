//! Read/write per-source summary JSON files.
//!
//! The summary is the "portable" record of one dataset's benchmark results:
//! run parameters, per-configuration measures and timings, and the artifact
//! file names. The schema is defined by `domain::SummaryFile`.

use std::fs::File;
use std::path::Path;

use crate::domain::SummaryFile;
use crate::error::AppError;

/// Write a summary JSON file (pretty-printed).
pub fn write_summary_json(path: &Path, summary: &SummaryFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create summary JSON '{}': {e}", path.display()),
        )
    })?;

    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;

    Ok(())
}

/// Read a summary JSON file.
pub fn read_summary_json(path: &Path) -> Result<SummaryFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open summary JSON '{}': {e}", path.display()),
        )
    })?;
    let summary: SummaryFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid summary JSON: {e}")))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConfigSummary, EvalPoint, Measures, RunParams, SourceKind, SourceSummary,
    };

    fn sample_summary() -> SummaryFile {
        SummaryFile {
            tool: "orfbench".to_string(),
            params: RunParams {
                seed: 42,
                trees: 100,
                min_leaf: 5,
                max_features: 0.3,
                sample_fraction: 0.5,
                honesty_fraction: 0.5,
                eval_point: EvalPoint::Mean,
                window: 0.1,
            },
            source: SourceSummary {
                source: SourceKind::Sim,
                rows: 120,
                features: 6,
                class_counts: vec![40, 40, 40],
                configs: vec![ConfigSummary {
                    tag: "R0_H1_I1".to_string(),
                    replace: false,
                    honesty: true,
                    inference: true,
                    measures: Measures {
                        mse1: 0.41,
                        mse2: 0.22,
                        accuracy: 0.74,
                    },
                    fit_ms: 12,
                    margins_ms: 7,
                    files: vec!["sim_pred_R0_H1_I1.csv".to_string()],
                }],
            },
        }
    }

    #[test]
    fn summary_round_trip() {
        let dir = std::env::temp_dir().join(format!("orfbench-summary-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sim_summary.json");

        write_summary_json(&path, &sample_summary()).unwrap();
        let read = read_summary_json(&path).unwrap();

        assert_eq!(read.tool, "orfbench");
        assert_eq!(read.params.seed, 42);
        assert_eq!(read.params.eval_point, EvalPoint::Mean);
        assert_eq!(read.source.source, SourceKind::Sim);
        assert_eq!(read.source.class_counts, vec![40, 40, 40]);
        assert_eq!(read.source.configs.len(), 1);
        let cell = &read.source.configs[0];
        assert_eq!(cell.tag, "R0_H1_I1");
        assert!(cell.inference);
        assert!((cell.measures.accuracy - 0.74).abs() < 1e-12);
        assert_eq!(cell.files, vec!["sim_pred_R0_H1_I1.csv".to_string()]);
    }

    #[test]
    fn malformed_summary_is_rejected() {
        let dir = std::env::temp_dir().join(format!("orfbench-summary-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken_summary.json");
        std::fs::write(&path, "{\"tool\": \"orfbench\"").unwrap();

        let err = read_summary_json(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("Invalid summary JSON"));
    }
}
