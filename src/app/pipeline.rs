//! Benchmark pipeline shared by the CLI entry points.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load/synthesize data -> fit per flag configuration -> measures ->
//! marginal effects -> artifact writes -> per-source summaries
//!
//! The CLI front-end then focuses on presentation (text vs JSON).

use std::fs::create_dir_all;
use std::time::Instant;

use log::{debug, info};

use crate::cli::GenArgs;
use crate::data::{load_dataset, synth_odata, synth_returns};
use crate::domain::{
    ArtifactKind, BenchConfig, ConfigSummary, Dataset, ForestFlags, RunParams, RunSummary,
    SourceKind, SourceSummary, SummaryFile, admissible_grid, artifact_file_name,
    metrics_file_name, summary_file_name,
};
use crate::error::AppError;
use crate::forest::{self, MarginsResult, OrderedOptions, margins};
use crate::io::{export, summary};
use crate::plot::render_distribution_png;
use crate::report::{Confusion, compute_measures, confusion_matrix};

/// All computed outputs of a single `orfbench run`.
pub struct BenchRun {
    pub summary: RunSummary,
    /// Margins and confusion per configuration, aligned with
    /// `summary.sources[i].configs[j]`.
    pub details: Vec<Vec<(MarginsResult, Confusion)>>,
}

/// Execute the benchmark over every requested source and return the results.
pub fn run_bench(config: &BenchConfig) -> Result<BenchRun, AppError> {
    create_dir_all(&config.out_dir).map_err(|e| {
        AppError::new(
            2,
            format!(
                "Failed to create output dir '{}': {e}",
                config.out_dir.display()
            ),
        )
    })?;

    let params = RunParams::from_config(config);
    let mut sources = Vec::new();
    let mut details = Vec::new();

    for &source in &config.sources {
        let (source_summary, source_details) = bench_source(config, &params, source)?;
        sources.push(source_summary);
        details.push(source_details);
    }

    Ok(BenchRun {
        summary: RunSummary {
            tool: "orfbench".to_string(),
            params,
            sources,
        },
        details,
    })
}

/// Synthesize `odata.csv` and `returns.csv` for the `gen` subcommand.
pub fn run_gen(args: &GenArgs) -> Result<(), AppError> {
    let dir = super::resolve_dir(&args.data_dir, "ORFBENCH_DATA_DIR", "data");
    create_dir_all(&dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create data dir '{}': {e}", dir.display()),
        )
    })?;

    let odata_path = dir.join("odata.csv");
    let returns_path = dir.join("returns.csv");
    if !args.force {
        for path in [&odata_path, &returns_path] {
            if path.exists() {
                return Err(AppError::new(
                    2,
                    format!(
                        "{} already exists; pass --force to overwrite.",
                        path.display()
                    ),
                ));
            }
        }
    }

    let odata = synth_odata(args.rows, args.seed)?;
    export::write_odata_csv(&odata_path, &odata)?;
    println!("Wrote {} ({} rows)", odata_path.display(), odata.n_rows());

    let returns = synth_returns(args.rows, args.seed)?;
    export::write_returns_csv(&returns_path, &returns)?;
    println!("Wrote {} ({} rows)", returns_path.display(), returns.len());

    Ok(())
}

/// Run the admissible flag grid over one dataset and persist its artifacts.
fn bench_source(
    config: &BenchConfig,
    params: &RunParams,
    source: SourceKind,
) -> Result<(SourceSummary, Vec<(MarginsResult, Confusion)>), AppError> {
    let dataset = load_dataset(source, config)?;
    info!(
        "{}: {} rows, {} features, {} classes",
        source.name(),
        dataset.n_rows(),
        dataset.n_features(),
        dataset.n_class()
    );

    let mut configs = Vec::new();
    let mut details = Vec::new();
    for flags in admissible_grid() {
        let (cell, detail) = bench_cell(config, &dataset, flags)?;
        configs.push(cell);
        details.push(detail);
    }

    export::write_metrics_csv(&config.out_dir.join(metrics_file_name(source)), params, &configs)?;

    let source_summary = SourceSummary {
        source,
        rows: dataset.n_rows(),
        features: dataset.n_features(),
        class_counts: dataset.class_counts(),
        configs,
    };
    summary::write_summary_json(
        &config.out_dir.join(summary_file_name(source)),
        &SummaryFile {
            tool: "orfbench".to_string(),
            params: *params,
            source: source_summary.clone(),
        },
    )?;
    info!(
        "{}: wrote {} and {}",
        source.name(),
        metrics_file_name(source),
        summary_file_name(source)
    );

    Ok((source_summary, details))
}

/// Fit one flag configuration, compute its measures and margins, and write
/// the per-configuration artifacts.
fn bench_cell(
    config: &BenchConfig,
    dataset: &Dataset,
    flags: ForestFlags,
) -> Result<(ConfigSummary, (MarginsResult, Confusion)), AppError> {
    let tag = flags.tag();
    debug!("{}: fitting {}", dataset.source.name(), flags.display_name());

    let options = OrderedOptions::from_bench(config, flags);
    let fit_start = Instant::now();
    let fit = forest::fit(&dataset.x, &dataset.y, &options)?;
    let fit_ms = fit_start.elapsed().as_millis() as u64;

    let probs = fit.probs();
    let y_pred = fit.class_predictions();
    let measures = compute_measures(&dataset.y, probs)?;
    let confusion = confusion_matrix(&dataset.y, &y_pred, fit.n_class())?;

    let margins_start = Instant::now();
    let margins_result = margins(&fit, config.eval_point, config.window, &dataset.feature_names)?;
    let margins_ms = margins_start.elapsed().as_millis() as u64;

    let mut files = Vec::new();

    let name = artifact_file_name(dataset.source, ArtifactKind::Predictions, flags);
    export::write_predictions_csv(&config.out_dir.join(&name), &dataset.y, probs, &y_pred)?;
    files.push(name);

    match fit.variances() {
        Some(vars) if !vars.is_empty() => {
            let name = artifact_file_name(dataset.source, ArtifactKind::Variances, flags);
            export::write_variances_csv(&config.out_dir.join(&name), vars)?;
            files.push(name);
        }
        _ => debug!("{}: no variances for {tag}, artifact skipped", dataset.source.name()),
    }

    if margins_result.is_empty() {
        debug!("{}: no margins for {tag}, artifact skipped", dataset.source.name());
    } else {
        let name = artifact_file_name(dataset.source, ArtifactKind::Margins, flags);
        export::write_margins_csv(&config.out_dir.join(&name), &margins_result)?;
        files.push(name);
    }

    if config.plot {
        let name = artifact_file_name(dataset.source, ArtifactKind::Distribution, flags);
        render_distribution_png(&config.out_dir.join(&name), &dataset.y, probs)?;
        files.push(name);
    }

    info!(
        "{} {}: mse1={:.4} mse2={:.4} accuracy={:.3} (fit {fit_ms}ms, margins {margins_ms}ms)",
        dataset.source.name(),
        tag,
        measures.mse1,
        measures.mse2,
        measures.accuracy
    );

    let cell = ConfigSummary {
        tag,
        replace: flags.replace,
        honesty: flags.honesty,
        inference: flags.inference,
        measures,
        fit_ms,
        margins_ms,
        files,
    };
    Ok((cell, (margins_result, confusion)))
}
