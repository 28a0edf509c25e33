//! Debug bundle writer for inspecting datasets, measures and margins.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

use crate::app::pipeline::BenchRun;
use crate::domain::{BenchConfig, ConfigSummary, SourceSummary};
use crate::error::AppError;
use crate::forest::MarginsResult;
use crate::report::Confusion;

pub fn write_debug_bundle(config: &BenchConfig, run: &BenchRun) -> Result<PathBuf, AppError> {
    let dir = PathBuf::from("debug");
    create_dir_all(&dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("orfbench_debug_{ts}.md"));

    let mut file = File::create(&path)
        .map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;

    writeln!(file, "# orfbench debug bundle")
        .map_err(|e| AppError::new(4, format!("Failed to write debug header: {e}")))?;
    writeln!(file, "- generated: {}", Local::now().to_rfc3339())
        .map_err(|e| AppError::new(4, format!("Failed to write debug header: {e}")))?;
    writeln!(file, "- seed: {}", config.seed)
        .map_err(|e| AppError::new(4, format!("Failed to write debug header: {e}")))?;
    writeln!(file, "- trees: {}, min_leaf: {}", config.trees, config.min_leaf)
        .map_err(|e| AppError::new(4, format!("Failed to write debug header: {e}")))?;
    writeln!(
        file,
        "- fractions: features={:.2}, sample={:.2}, honesty={:.2}",
        config.max_features, config.sample_fraction, config.honesty_fraction
    )
    .map_err(|e| AppError::new(4, format!("Failed to write debug header: {e}")))?;
    writeln!(
        file,
        "- margins: {} evaluation, window {:.2}",
        config.eval_point.label(),
        config.window
    )
    .map_err(|e| AppError::new(4, format!("Failed to write debug header: {e}")))?;

    for (source, details) in run.summary.sources.iter().zip(&run.details) {
        write_source_section(&mut file, source, details)?;
    }

    Ok(path)
}

fn write_source_section(
    file: &mut File,
    source: &SourceSummary,
    details: &[(MarginsResult, Confusion)],
) -> Result<(), AppError> {
    writeln!(
        file,
        "\n## Source: {} ({})",
        source.source.name(),
        source.source.display_name()
    )
    .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    writeln!(file, "- rows: {}, features: {}", source.rows, source.features)
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;

    writeln!(file, "\n| class | count |")
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    writeln!(file, "| - | - |")
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    for (c, count) in source.class_counts.iter().enumerate() {
        writeln!(file, "| {} | {count} |", c + 1)
            .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    }

    for (cfg, (margins, confusion)) in source.configs.iter().zip(details) {
        write_config_section(file, cfg, margins, confusion)?;
    }

    Ok(())
}

fn write_config_section(
    file: &mut File,
    cfg: &ConfigSummary,
    margins: &MarginsResult,
    confusion: &Confusion,
) -> Result<(), AppError> {
    writeln!(file, "\n### {}", cfg.tag)
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    writeln!(
        file,
        "- measures: mse1={:.6}, mse2={:.6}, accuracy={:.4}",
        cfg.measures.mse1, cfg.measures.mse2, cfg.measures.accuracy
    )
    .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    writeln!(file, "- timings: fit {}ms, margins {}ms", cfg.fit_ms, cfg.margins_ms)
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    if !cfg.files.is_empty() {
        writeln!(file, "- files: {}", cfg.files.join(", "))
            .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    }

    write_confusion_table(file, confusion)?;
    write_margins_table(file, margins)?;

    Ok(())
}

fn write_confusion_table(file: &mut File, confusion: &Confusion) -> Result<(), AppError> {
    let k = confusion.n_class;

    let header: Vec<String> = (1..=k).map(|c| c.to_string()).collect();
    writeln!(file, "\n| truth\\pred | {} |", header.join(" | "))
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    writeln!(file, "| - |{}", " - |".repeat(k))
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;

    for (t, row) in confusion.counts.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        writeln!(file, "| {} | {} |", t + 1, cells.join(" | "))
            .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    }

    Ok(())
}

fn write_margins_table(file: &mut File, margins: &MarginsResult) -> Result<(), AppError> {
    if margins.is_empty() {
        writeln!(file, "\n(no margins computed)")
            .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
        return Ok(());
    }

    let k = margins.effects.first().map(Vec::len).unwrap_or(0);
    let with_inference = margins.std_errors.is_some();

    let mut header = String::from("| feature | kind |");
    for c in 1..=k {
        header.push_str(&format!(" me{c} |"));
    }
    if with_inference {
        for c in 1..=k {
            header.push_str(&format!(" t{c} |"));
        }
    }
    writeln!(file, "\n{header}")
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    let cols = 2 + k + if with_inference { k } else { 0 };
    writeln!(file, "|{}", " - |".repeat(cols))
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;

    for (i, name) in margins.feature_names.iter().enumerate() {
        let mut line = format!("| {} | {} |", name, margins.kinds[i].label());
        for v in &margins.effects[i] {
            line.push_str(&format!(" {v:.4} |"));
        }
        if let Some(t_values) = &margins.t_values {
            for v in &t_values[i] {
                line.push_str(&format!(" {v:.2} |"));
            }
        }
        writeln!(file, "{line}")
            .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    }

    Ok(())
}
