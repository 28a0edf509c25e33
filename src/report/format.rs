//! Plain-text rendering of a benchmark run for terminal output.
//!
//! We keep formatting code in one place so:
//! - the estimator and pipeline code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::domain::{BenchConfig, RunSummary, SourceSummary};

/// Format the full run summary (parameter header + one section per source).
pub fn format_run_summary(config: &BenchConfig, summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("=== orfbench - Ordered Forest Benchmark ===\n");
    out.push_str(&format!(
        "Seed: {} | Trees: {} | Min leaf: {}\n",
        summary.params.seed, summary.params.trees, summary.params.min_leaf
    ));
    out.push_str(&format!(
        "Fractions: features={:.2} sample={:.2} honesty={:.2}\n",
        summary.params.max_features, summary.params.sample_fraction, summary.params.honesty_fraction
    ));
    out.push_str(&format!(
        "Margins: {} evaluation, window {:.2}\n",
        summary.params.eval_point.label(),
        summary.params.window
    ));
    out.push_str(&format!("Output dir: {}\n", config.out_dir.display()));

    for source in &summary.sources {
        out.push('\n');
        out.push_str(&format_source_section(source));
    }

    out
}

/// Format one data-source section: shape line plus the per-config table.
fn format_source_section(source: &SourceSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "--- {} ({}) ---\n",
        source.source.name(),
        source.source.display_name()
    ));
    out.push_str(&format!(
        "Rows: {} | Features: {} | Class counts: {}\n\n",
        source.rows,
        source.features,
        fmt_counts(&source.class_counts)
    ));

    out.push_str(
        format!(
            "{:<10} {:>9} {:>9} {:>9} {:>8} {:>8} {:>6}\n",
            "config", "mse1", "mse2", "accuracy", "fit", "margins", "files"
        )
        .trim_end(),
    );
    out.push('\n');

    out.push_str(
        format!(
            "{:-<10} {:-<9} {:-<9} {:-<9} {:-<8} {:-<8} {:-<6}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for cfg in &source.configs {
        out.push_str(
            format!(
                "{:<10} {:>9.4} {:>9.4} {:>9.3} {:>8} {:>8} {:>6}\n",
                cfg.tag,
                cfg.measures.mse1,
                cfg.measures.mse2,
                cfg.measures.accuracy,
                fmt_ms(cfg.fit_ms),
                fmt_ms(cfg.margins_ms),
                cfg.files.len()
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Class counts as a compact slash-separated list, e.g. `268/267/265`.
fn fmt_counts(counts: &[usize]) -> String {
    counts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Milliseconds as `412ms` below one second, `3.2s` from there up.
fn fmt_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfigSummary, EvalPoint, Measures, RunParams, SourceKind};
    use std::path::PathBuf;

    fn sample_summary() -> RunSummary {
        RunSummary {
            tool: "orfbench".to_string(),
            params: RunParams {
                trees: 1000,
                min_leaf: 5,
                max_features: 0.3,
                sample_fraction: 0.5,
                honesty_fraction: 0.5,
                eval_point: EvalPoint::Mean,
                window: 0.1,
                seed: 42,
            },
            sources: vec![SourceSummary {
                source: SourceKind::Sim,
                rows: 800,
                features: 6,
                class_counts: vec![268, 267, 265],
                configs: vec![
                    ConfigSummary {
                        tag: "R1_H0_I0".to_string(),
                        replace: true,
                        honesty: false,
                        inference: false,
                        measures: Measures {
                            mse1: 0.4831,
                            mse2: 0.5119,
                            accuracy: 0.5125,
                        },
                        fit_ms: 3214,
                        margins_ms: 412,
                        files: vec!["sim_pred_R1_H0_I0.csv".to_string()],
                    },
                    ConfigSummary {
                        tag: "R0_H1_I1".to_string(),
                        replace: false,
                        honesty: true,
                        inference: true,
                        measures: Measures {
                            mse1: 0.4910,
                            mse2: 0.5301,
                            accuracy: 0.5050,
                        },
                        fit_ms: 988,
                        margins_ms: 1730,
                        files: vec![
                            "sim_pred_R0_H1_I1.csv".to_string(),
                            "sim_var_R0_H1_I1.csv".to_string(),
                        ],
                    },
                ],
            }],
        }
    }

    fn sample_config() -> BenchConfig {
        BenchConfig {
            sources: vec![SourceKind::Sim],
            trees: 1000,
            min_leaf: 5,
            max_features: 0.3,
            sample_fraction: 0.5,
            honesty_fraction: 0.5,
            eval_point: EvalPoint::Mean,
            window: 0.1,
            seed: 42,
            rows: 800,
            data_dir: PathBuf::from("data"),
            out_dir: PathBuf::from("results"),
            plot: true,
            debug: false,
        }
    }

    #[test]
    fn summary_includes_header_and_source_section() {
        let text = format_run_summary(&sample_config(), &sample_summary());
        assert!(text.contains("=== orfbench - Ordered Forest Benchmark ==="));
        assert!(text.contains("Seed: 42 | Trees: 1000 | Min leaf: 5"));
        assert!(text.contains("--- sim (simulated ordered choice) ---"));
        assert!(text.contains("Class counts: 268/267/265"));
        assert!(text.contains("R1_H0_I0"));
        assert!(text.contains("R0_H1_I1"));
    }

    #[test]
    fn table_rows_have_no_trailing_spaces() {
        let text = format_run_summary(&sample_config(), &sample_summary());
        for line in text.lines() {
            assert_eq!(line, line.trim_end(), "trailing space in {line:?}");
        }
    }

    #[test]
    fn milliseconds_format_switches_at_one_second() {
        assert_eq!(fmt_ms(0), "0ms");
        assert_eq!(fmt_ms(999), "999ms");
        assert_eq!(fmt_ms(1000), "1.0s");
        assert_eq!(fmt_ms(3214), "3.2s");
    }

    #[test]
    fn counts_join_with_slashes() {
        assert_eq!(fmt_counts(&[268, 267, 265]), "268/267/265");
        assert_eq!(fmt_counts(&[800]), "800");
    }
}
