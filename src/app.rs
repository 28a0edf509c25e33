//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads or synthesizes the benchmark datasets
//! - runs the estimator over the admissible flag grid per source
//! - prints the report and writes artifacts
//! - optionally writes a debug bundle

use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;

use crate::cli::{Command, RunArgs};
use crate::data::MIN_ROWS;
use crate::domain::{BenchConfig, OutputFormat};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `orfbench` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // We want `orfbench` and `orfbench --trees 500` to behave like
    // `orfbench run ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing. This preserves a clean clap structure while
    // retaining the requested UX.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Gen(args) => pipeline::run_gen(&args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = bench_config_from_args(&args)?;
    let run = pipeline::run_bench(&config)?;

    match args.output {
        OutputFormat::Text => {
            println!(
                "{}",
                crate::report::format_run_summary(&config, &run.summary)
            );
        }
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(&run.summary)
                .map_err(|e| AppError::new(4, format!("Failed to serialize summary: {e}")))?;
            println!("{text}");
        }
    }

    if config.debug {
        let path = crate::debug::write_debug_bundle(&config, &run)?;
        println!("Debug bundle: {}", path.display());
    }

    Ok(())
}

fn handle_plot(args: crate::cli::PlotArgs) -> Result<(), AppError> {
    let pred = crate::io::ingest::read_predictions_csv(&args.pred)?;
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| args.pred.with_extension("png"));
    crate::plot::render_distribution_png(&out, &pred.y, &pred.probs)?;
    println!("Wrote {}", out.display());
    Ok(())
}

pub fn bench_config_from_args(args: &RunArgs) -> Result<BenchConfig, AppError> {
    let config = BenchConfig {
        sources: args.source.kinds(),
        trees: args.trees,
        min_leaf: args.min_leaf,
        max_features: args.max_features,
        sample_fraction: args.sample_fraction,
        honesty_fraction: args.honesty_fraction,
        eval_point: args.eval_point,
        window: args.window,
        seed: args.seed,
        rows: args.rows,
        data_dir: resolve_dir(&args.data_dir, "ORFBENCH_DATA_DIR", "data"),
        out_dir: resolve_dir(&args.out_dir, "ORFBENCH_OUT_DIR", "results"),
        plot: !args.no_plot,
        debug: args.debug,
    };
    validate_config(&config)?;
    Ok(config)
}

/// Reject unusable hyperparameters before any data is touched.
fn validate_config(config: &BenchConfig) -> Result<(), AppError> {
    if config.trees == 0 {
        return Err(AppError::new(2, "--trees must be at least 1."));
    }
    if config.min_leaf == 0 {
        return Err(AppError::new(2, "--min-leaf must be at least 1."));
    }
    if !(config.max_features > 0.0 && config.max_features <= 1.0) {
        return Err(AppError::new(2, "--max-features must be in (0, 1]."));
    }
    if !(config.sample_fraction > 0.0 && config.sample_fraction <= 1.0) {
        return Err(AppError::new(2, "--sample-fraction must be in (0, 1]."));
    }
    if !(config.honesty_fraction > 0.0 && config.honesty_fraction < 1.0) {
        return Err(AppError::new(
            2,
            "--honesty-fraction must be strictly inside (0, 1).",
        ));
    }
    if !(config.window > 0.0 && config.window <= 1.0) {
        return Err(AppError::new(2, "--window must be in (0, 1]."));
    }
    if config.rows < MIN_ROWS {
        return Err(AppError::new(
            2,
            format!("--rows must be at least {MIN_ROWS}."),
        ));
    }
    Ok(())
}

/// Flag value, else a non-empty environment variable, else the default.
fn resolve_dir(flag: &Option<PathBuf>, env_key: &str, default: &str) -> PathBuf {
    if let Some(path) = flag {
        return path.clone();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    PathBuf::from(default)
}

/// Rewrite argv so `orfbench` defaults to `orfbench run`.
///
/// Rules:
/// - `orfbench`                      -> `orfbench run`
/// - `orfbench --trees 500 ...`      -> `orfbench run --trees 500 ...`
/// - `orfbench --help/--version/-h`  -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version =
        matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "run" | "gen" | "plot");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "run flags".
    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}
