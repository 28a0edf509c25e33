//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and prediction
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which dataset(s) to benchmark.
///
/// `All` means: run `sim`, `odata` and `returns` in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceArg {
    All,
    Sim,
    Odata,
    Returns,
}

impl SourceArg {
    /// Resolve to the concrete dataset list, preserving the canonical order.
    pub fn kinds(self) -> Vec<SourceKind> {
        match self {
            SourceArg::All => vec![SourceKind::Sim, SourceKind::Odata, SourceKind::Returns],
            SourceArg::Sim => vec![SourceKind::Sim],
            SourceArg::Odata => vec![SourceKind::Odata],
            SourceArg::Returns => vec![SourceKind::Returns],
        }
    }
}

/// Concrete dataset actually benchmarked after resolving `SourceArg::All`.
///
/// - `Sim`: synthetic ordered-choice data generated in-memory each run
/// - `Odata`: an observational CSV (`y, x1..x4`) read from the data directory
/// - `Returns`: a daily return series CSV turned into a lagged tercile problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sim,
    Odata,
    Returns,
}

impl SourceKind {
    /// Stable lowercase name used in file names and log lines.
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Sim => "sim",
            SourceKind::Odata => "odata",
            SourceKind::Returns => "returns",
        }
    }

    /// CSV file this source is read from, if any (`Sim` is generated in-memory).
    pub fn csv_file(self) -> Option<&'static str> {
        match self {
            SourceKind::Sim => None,
            SourceKind::Odata => Some("odata.csv"),
            SourceKind::Returns => Some("returns.csv"),
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            SourceKind::Sim => "simulated ordered choice",
            SourceKind::Odata => "observational CSV",
            SourceKind::Returns => "daily return terciles",
        }
    }
}

/// Where marginal effects are evaluated.
///
/// `Mean` perturbs every row and averages the effects (average marginal
/// effects). `Atmean` and `Atmedian` collapse the covariates to a single
/// representative row first, so the effect is local to that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvalPoint {
    Mean,
    Atmean,
    Atmedian,
}

impl EvalPoint {
    pub fn label(self) -> &'static str {
        match self {
            EvalPoint::Mean => "mean",
            EvalPoint::Atmean => "atmean",
            EvalPoint::Atmedian => "atmedian",
        }
    }
}

/// Terminal output format for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

/// One cell of the estimator configuration grid.
///
/// The three switches interact: honesty only makes sense on subsamples
/// (drawing without replacement), and weight-based inference only makes sense
/// on an honest fit. [`ForestFlags::admissible`] encodes those rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestFlags {
    /// Draw tree samples with replacement (bootstrap) instead of subsampling.
    pub replace: bool,
    /// Split the sample and estimate leaf means on rows the trees never saw.
    pub honesty: bool,
    /// Compute weight-based variances alongside predictions.
    pub inference: bool,
}

impl ForestFlags {
    pub fn new(replace: bool, honesty: bool, inference: bool) -> Self {
        Self {
            replace,
            honesty,
            inference,
        }
    }

    /// Whether this combination is statistically coherent.
    pub fn admissible(self) -> bool {
        if self.inference && !self.honesty {
            return false;
        }
        if self.honesty && self.replace {
            return false;
        }
        true
    }

    /// Short tag used in file names and report tables, e.g. `R1_H0_I0`.
    pub fn tag(self) -> String {
        format!(
            "R{}_H{}_I{}",
            u8::from(self.replace),
            u8::from(self.honesty),
            u8::from(self.inference)
        )
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.push(if self.replace {
            "bootstrap"
        } else {
            "subsample"
        });
        if self.honesty {
            parts.push("honest");
        }
        if self.inference {
            parts.push("inference");
        }
        parts.join("+")
    }
}

/// The admissible flag combinations, in a fixed, reproducible order.
///
/// The full `2^3` grid is walked with `replace` outermost and `inference`
/// innermost, then filtered through [`ForestFlags::admissible`]. The result
/// is always the same four cells:
///
/// `R1_H0_I0, R0_H0_I0, R0_H1_I0, R0_H1_I1`
pub fn admissible_grid() -> Vec<ForestFlags> {
    let mut grid = Vec::new();
    for replace in [true, false] {
        for honesty in [false, true] {
            for inference in [false, true] {
                let flags = ForestFlags::new(replace, honesty, inference);
                if flags.admissible() {
                    grid.push(flags);
                }
            }
        }
    }
    grid
}

/// Artifact families written per (source, flags) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Class probabilities plus predicted and observed classes.
    Predictions,
    /// Per-row prediction variances (inference cells only).
    Variances,
    /// Marginal effects, with standard errors under inference.
    Margins,
    /// Density plot of predicted probabilities, faceted by observed class.
    Distribution,
}

impl ArtifactKind {
    pub fn stem(self) -> &'static str {
        match self {
            ArtifactKind::Predictions => "pred",
            ArtifactKind::Variances => "var",
            ArtifactKind::Margins => "margins",
            ArtifactKind::Distribution => "dist",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Distribution => "png",
            _ => "csv",
        }
    }
}

/// File name for a per-cell artifact, e.g. `sim_pred_R0_H1_I1.csv`.
pub fn artifact_file_name(source: SourceKind, kind: ArtifactKind, flags: ForestFlags) -> String {
    format!(
        "{}_{}_{}.{}",
        source.name(),
        kind.stem(),
        flags.tag(),
        kind.extension()
    )
}

/// File name for the per-source accuracy table, e.g. `sim_metrics.csv`.
pub fn metrics_file_name(source: SourceKind) -> String {
    format!("{}_metrics.csv", source.name())
}

/// File name for the per-source machine-readable summary, e.g. `sim_summary.json`.
pub fn summary_file_name(source: SourceKind) -> String {
    format!("{}_summary.json", source.name())
}

/// A loaded benchmark dataset: covariate matrix plus ordered outcome.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: SourceKind,
    /// Row-major covariates (`rows × features`).
    pub x: Vec<Vec<f64>>,
    /// Ordered outcome classes, `1..=n_class` by construction.
    pub y: Vec<u32>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.first().map(Vec::len).unwrap_or(0)
    }

    /// Number of outcome classes (the largest label; labels start at 1).
    pub fn n_class(&self) -> usize {
        self.y.iter().copied().max().unwrap_or(0) as usize
    }

    /// Row counts per class `1..=n_class`.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_class()];
        for &label in &self.y {
            if label >= 1 {
                counts[(label - 1) as usize] += 1;
            }
        }
        counts
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults and environment fallbacks).
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub sources: Vec<SourceKind>,

    pub trees: usize,
    pub min_leaf: usize,
    /// Share of features considered per split, in `(0, 1]`.
    pub max_features: f64,
    /// Share of rows drawn per tree, in `(0, 1]`.
    pub sample_fraction: f64,
    /// Share of rows held out for honest leaf estimation, in `(0, 1)`.
    pub honesty_fraction: f64,

    pub eval_point: EvalPoint,
    /// Evaluation window for marginal effects, as a share of one standard
    /// deviation, in `(0, 1]`.
    pub window: f64,

    pub seed: u64,
    /// Row count for generated datasets (`sim`, and `gen` outputs).
    pub rows: usize,

    pub data_dir: PathBuf,
    pub out_dir: PathBuf,

    pub plot: bool,
    pub debug: bool,
}

/// Probability and classification accuracy measures for one grid cell.
///
/// - `mse1`: mean squared distance between the one-hot outcome and the
///   probability row, summed over classes
/// - `mse2`: mean squared error of the probability-weighted class number
/// - `accuracy`: share of rows whose most likely class matches the outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Measures {
    pub mse1: f64,
    pub mse2: f64,
    pub accuracy: f64,
}

/// Hyperparameters a run was performed with, as stored in summaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunParams {
    pub seed: u64,
    pub trees: usize,
    pub min_leaf: usize,
    pub max_features: f64,
    pub sample_fraction: f64,
    pub honesty_fraction: f64,
    pub eval_point: EvalPoint,
    pub window: f64,
}

impl RunParams {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            seed: config.seed,
            trees: config.trees,
            min_leaf: config.min_leaf,
            max_features: config.max_features,
            sample_fraction: config.sample_fraction,
            honesty_fraction: config.honesty_fraction,
            eval_point: config.eval_point,
            window: config.window,
        }
    }
}

/// One grid cell's results inside a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub tag: String,
    pub replace: bool,
    pub honesty: bool,
    pub inference: bool,
    pub measures: Measures,
    pub fit_ms: u64,
    pub margins_ms: u64,
    /// Artifact files this cell produced, relative to the output directory.
    pub files: Vec<String>,
}

/// One dataset's results across the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: SourceKind,
    pub rows: usize,
    pub features: usize,
    pub class_counts: Vec<usize>,
    pub configs: Vec<ConfigSummary>,
}

/// The whole run, as printed by `--output json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub tool: String,
    pub params: RunParams,
    pub sources: Vec<SourceSummary>,
}

/// A saved per-source summary file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryFile {
    pub tool: String,
    pub params: RunParams,
    pub source: SourceSummary,
}
