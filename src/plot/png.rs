//! Faceted PNG rendering of predicted-probability distributions.
//!
//! One panel per true class, stacked vertically. Each panel overlays the
//! density of every predicted-class probability across the rows of that
//! panel's true class, with a dashed line at the group mean.

use std::path::Path;

use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use crate::error::AppError;
use crate::math::mean;
use crate::plot::density::{gaussian_kde, probability_grid, scale_to_peak};

const PANEL_WIDTH: u32 = 900;
const PANEL_HEIGHT: u32 = 300;
const GRID_POINTS: usize = 201;

/// Fixed per-class palette, recycled past eight classes.
const CLASS_COLORS: [RGBColor; 8] = [
    RGBColor(31, 119, 180),  // blue
    RGBColor(255, 127, 14),  // orange
    RGBColor(44, 160, 44),   // green
    RGBColor(214, 39, 40),   // red
    RGBColor(148, 103, 189), // purple
    RGBColor(140, 86, 75),   // brown
    RGBColor(227, 119, 194), // pink
    RGBColor(127, 127, 127), // gray
];

fn class_color(k: usize) -> RGBColor {
    CLASS_COLORS[k % CLASS_COLORS.len()]
}

/// Render the distribution diagnostic for one configuration.
///
/// `y` holds true classes (1-based), `probs` one probability row per
/// observation. The PNG is `K` stacked panels, one per true class.
pub fn render_distribution_png(path: &Path, y: &[u32], probs: &[Vec<f64>]) -> Result<(), AppError> {
    let n_class = probs.first().map(Vec::len).unwrap_or(0);
    if probs.is_empty() || n_class < 2 {
        return Err(AppError::new(3, "Nothing to plot: no probability rows."));
    }
    let groups = group_rows_by_class(y, n_class)?;

    let height = PANEL_HEIGHT * n_class as u32;
    let root = BitMapBackend::new(path, (PANEL_WIDTH, height)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let panels = root.split_evenly((n_class, 1));

    let grid = probability_grid(GRID_POINTS);

    for (c, panel) in panels.iter().enumerate() {
        let mut chart = ChartBuilder::on(panel)
            .caption(format!("Class {}", c + 1), ("sans-serif", 18))
            .margin(8)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(0.0..1.0, 0.0..1.05)
            .map_err(draw_err)?;

        chart
            .configure_mesh()
            .x_desc("predicted probability")
            .y_desc("scaled density")
            .x_labels(6)
            .y_labels(4)
            .draw()
            .map_err(draw_err)?;

        for k in 0..n_class {
            let values: Vec<f64> = groups[c].iter().map(|&i| probs[i][k]).collect();
            if values.is_empty() {
                continue;
            }

            let mut dens = gaussian_kde(&values, &grid);
            scale_to_peak(&mut dens);

            let color = class_color(k);
            chart
                .draw_series(LineSeries::new(
                    grid.iter().copied().zip(dens.iter().copied()),
                    &color,
                ))
                .map_err(draw_err)?;

            let center = mean(&values);
            chart
                .draw_series(DashedLineSeries::new(
                    [(center, 0.0), (center, 1.05)],
                    4,
                    3,
                    color.stroke_width(1),
                ))
                .map_err(draw_err)?;
        }
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Row indices grouped by true class, `groups[c]` for class `c + 1`.
fn group_rows_by_class(y: &[u32], n_class: usize) -> Result<Vec<Vec<usize>>, AppError> {
    let mut groups = vec![Vec::new(); n_class];
    for (i, &yi) in y.iter().enumerate() {
        let c = yi as usize;
        if c < 1 || c > n_class {
            return Err(AppError::new(
                3,
                format!("Outcome class {yi} exceeds the {n_class} probability columns."),
            ));
        }
        groups[c - 1].push(i);
    }
    Ok(groups)
}

fn draw_err<E: std::fmt::Display>(e: E) -> AppError {
    AppError::new(4, format!("Failed to render plot: {e}"))
}
