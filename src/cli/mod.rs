//! Command-line parsing for the ordered forest benchmark.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the estimator/pipeline code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{EvalPoint, OutputFormat, SourceArg};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "orfbench", version, about = "Ordered Forest benchmark harness")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the benchmark grid over the selected data sources (the default).
    Run(RunArgs),
    /// Synthesize the `odata` and `returns` CSV files into the data directory.
    Gen(GenArgs),
    /// Re-render the distribution PNG from a previously exported predictions CSV.
    Plot(PlotArgs),
}

/// Options for a benchmark run.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Data source(s) to benchmark.
    #[arg(short = 's', long, value_enum, default_value_t = SourceArg::All)]
    pub source: SourceArg,

    /// Number of trees per cumulative threshold.
    #[arg(long, default_value_t = 1000)]
    pub trees: usize,

    /// Minimum observations per leaf.
    #[arg(long, default_value_t = 5)]
    pub min_leaf: usize,

    /// Share of features tried per split, in (0, 1].
    #[arg(long, default_value_t = 0.3)]
    pub max_features: f64,

    /// Share of rows drawn per tree, in (0, 1].
    #[arg(long, default_value_t = 0.5)]
    pub sample_fraction: f64,

    /// Share of rows held out for honest estimation, in (0, 1).
    #[arg(long, default_value_t = 0.5)]
    pub honesty_fraction: f64,

    /// Where marginal effects are evaluated.
    #[arg(long, value_enum, default_value_t = EvalPoint::Mean)]
    pub eval_point: EvalPoint,

    /// Shift window for marginal effects, in standard deviations.
    #[arg(long, default_value_t = 0.1)]
    pub window: f64,

    /// Master random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Rows for the synthesized `sim` dataset.
    #[arg(short = 'n', long, default_value_t = 800)]
    pub rows: usize,

    /// Directory holding `odata.csv` and `returns.csv` (default: `ORFBENCH_DATA_DIR` or `data`).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for result artifacts (default: `ORFBENCH_OUT_DIR` or `results`).
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Terminal output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Skip the diagnostic PNG plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Write a markdown debug bundle under `debug/`.
    #[arg(long)]
    pub debug: bool,
}

/// Options for dataset synthesis.
#[derive(Debug, Parser)]
pub struct GenArgs {
    /// Rows to synthesize per dataset.
    #[arg(short = 'n', long, default_value_t = 800)]
    pub rows: usize,

    /// Master random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Target directory (default: `ORFBENCH_DATA_DIR` or `data`).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Overwrite existing CSV files.
    #[arg(long)]
    pub force: bool,
}

/// Options for re-plotting saved predictions.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Predictions CSV produced by `orfbench run`.
    #[arg(long, value_name = "CSV")]
    pub pred: PathBuf,

    /// Output PNG path (default: the input path with a `.png` extension).
    #[arg(long)]
    pub out: Option<PathBuf>,
}
