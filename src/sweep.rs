//! Parameter sweep of passive learning.
//!
//! RPNI is run on random samples over a grid of sample sizes (multiples of
//! the mean L* query count) and trace lengths. Each point records the
//! conformance of the learned model on the coverage test suite.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::SweepConfig;
use crate::error::EvalError;
use crate::export::{write_atomic, write_rows};
use crate::learner::{Learner, ModelHandle, SampleRequest, TestSuite};
use crate::records::{conformance_percent, ModelName};
use crate::summary::NOT_AVAILABLE;

/// Random sample request for one grid point.
///
/// Trace lengths are drawn from `trace_len ± spread`, never below one.
pub fn sweep_request(
    learning_queries: u64,
    multiplier: u64,
    trace_len: u64,
    spread: u64,
) -> crate::error::Result<SampleRequest> {
    let num_sequences = learning_queries
        .checked_mul(multiplier)
        .ok_or(EvalError::CountOverflow {
            field: "sweep sample size",
        })?;
    let max_len = trace_len.checked_add(spread).ok_or(EvalError::CountOverflow {
        field: "sweep trace length",
    })?;
    Ok(SampleRequest::Random {
        num_sequences,
        min_len: trace_len.saturating_sub(spread).max(1),
        max_len,
    })
}

/// Conformance grid of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    learning_queries: u64,
    multipliers: Vec<u64>,
    trace_lengths: Vec<u64>,
    /// Row-major: one row per trace length, one column per multiplier.
    conformance: Vec<Option<f64>>,
}

impl SweepGrid {
    /// Mean L* query count the sample sizes are multiples of.
    pub const fn learning_queries(&self) -> u64 {
        self.learning_queries
    }

    pub fn multipliers(&self) -> &[u64] {
        &self.multipliers
    }

    pub fn trace_lengths(&self) -> &[u64] {
        &self.trace_lengths
    }

    /// Sample size of every column.
    pub fn sample_sizes(&self) -> impl Iterator<Item = u64> + '_ {
        self.multipliers
            .iter()
            .map(|m| self.learning_queries.saturating_mul(*m))
    }

    /// Conformance percentage at a grid point.
    ///
    /// `None` outside the grid or when the learned model could not be
    /// compared with the reference.
    pub fn conformance(&self, trace_len_index: usize, multiplier_index: usize) -> Option<f64> {
        if multiplier_index >= self.multipliers.len() {
            return None;
        }
        self.conformance
            .get(trace_len_index * self.multipliers.len() + multiplier_index)
            .copied()
            .flatten()
    }

    fn row_cells(&self, trace_len_index: usize) -> impl Iterator<Item = String> + '_ {
        (0..self.multipliers.len()).map(move |column| {
            self.conformance(trace_len_index, column)
                .map_or_else(|| NOT_AVAILABLE.to_string(), |c| format!("{c:.2}"))
        })
    }
}

/// Runs RPNI at every point of the configured grid.
pub fn run_sweep<L: Learner>(
    learner: &mut L,
    model: &ModelHandle,
    learning_queries: u64,
    suite: &TestSuite,
    config: &SweepConfig,
) -> Result<SweepGrid> {
    let columns = config.query_multipliers.len();
    let mut conformance = vec![None; config.trace_lengths.len() * columns];

    for (column, &multiplier) in config.query_multipliers.iter().enumerate() {
        for (row, &trace_len) in config.trace_lengths.iter().enumerate() {
            let point = || format!("sweep point {multiplier}x queries, trace length {trace_len}");
            let request =
                sweep_request(learning_queries, multiplier, trace_len, config.length_spread)?;
            let sample = learner.sample(model, &request).with_context(point)?;
            let learned = learner.rpni(&sample).with_context(point)?;
            let value = learner
                .disagreement(model, &learned, suite)
                .with_context(point)?
                .map(conformance_percent);

            if value.is_none() {
                warn!(
                    model = %model.name,
                    multiplier,
                    trace_len,
                    "sweep model and reference have different input alphabets"
                );
            }
            debug!(multiplier, trace_len, conformance = ?value, "sweep point");
            conformance[row * columns + column] = value;
        }
    }

    Ok(SweepGrid {
        learning_queries,
        multipliers: config.query_multipliers.clone(),
        trace_lengths: config.trace_lengths.clone(),
        conformance,
    })
}

/// Prints the grid, one line per trace length.
pub fn print_grid(grid: &SweepGrid) {
    println!();
    println!("----Parameter sweep----");
    let sizes: Vec<String> = grid.sample_sizes().map(|s| s.to_string()).collect();
    println!("Sample size: {}", sizes.join(" "));
    for (row, trace_len) in grid.trace_lengths().iter().enumerate() {
        let cells: Vec<String> = grid.row_cells(row).collect();
        println!("Length {trace_len}: {}", cells.join(" "));
    }
}

/// Sweep grids of all models.
///
/// Each model is a block of rows: its sample sizes, then one row of
/// conformance cells per trace length.
#[derive(Debug, Clone, Default)]
pub struct HeatmapTable {
    grids: Vec<(ModelName, SweepGrid)>,
}

impl HeatmapTable {
    #[must_use]
    pub const fn new() -> Self {
        Self { grids: Vec::new() }
    }

    pub fn add_grid(&mut self, model: ModelName, grid: SweepGrid) {
        if let Some(slot) = self.grids.iter_mut().find(|(m, _)| *m == model) {
            slot.1 = grid;
        } else {
            self.grids.push((model, grid));
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelName> {
        self.grids.iter().map(|(m, _)| m)
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for (model, grid) in &self.grids {
            let mut sizes = vec![model.to_string(), "Sample size".to_string()];
            sizes.extend(grid.sample_sizes().map(|s| s.to_string()));
            rows.push(sizes);

            for (index, trace_len) in grid.trace_lengths().iter().enumerate() {
                let mut row = vec![model.to_string(), trace_len.to_string()];
                row.extend(grid.row_cells(index));
                rows.push(row);
            }
        }
        rows
    }

    pub fn export(&self, path: &Path) -> crate::error::Result<()> {
        let rows = self.rows();
        write_atomic(path, |file| write_rows(file, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid() -> SweepGrid {
        SweepGrid {
            learning_queries: 100,
            multipliers: vec![1, 2],
            trace_lengths: vec![5, 7, 9],
            conformance: vec![
                Some(52.5),
                Some(70.0),
                None,
                Some(90.0),
                Some(100.0),
                Some(100.0),
            ],
        }
    }

    #[test]
    fn test_sweep_request_bounds() {
        assert_eq!(
            sweep_request(100, 3, 5, 2).unwrap(),
            SampleRequest::Random {
                num_sequences: 300,
                min_len: 3,
                max_len: 7,
            }
        );
        assert_eq!(
            sweep_request(10, 1, 2, 2).unwrap(),
            SampleRequest::Random {
                num_sequences: 10,
                min_len: 1,
                max_len: 4,
            }
        );
    }

    #[test]
    fn test_sweep_request_overflow() {
        assert!(matches!(
            sweep_request(u64::MAX, 2, 5, 2),
            Err(EvalError::CountOverflow { .. })
        ));
    }

    #[test]
    fn test_grid_lookup() {
        let grid = grid();
        assert_eq!(grid.conformance(0, 1), Some(70.0));
        assert_eq!(grid.conformance(1, 0), None);
        assert_eq!(grid.conformance(2, 1), Some(100.0));
        assert_eq!(grid.conformance(0, 2), None);
        assert_eq!(grid.sample_sizes().collect::<Vec<_>>(), vec![100, 200]);
    }

    #[test]
    fn test_heatmap_rows() {
        let mut table = HeatmapTable::new();
        table.add_grid(ModelName::new("m1"), grid());

        let rows = table.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["m1", "Sample size", "100", "200"]);
        assert_eq!(rows[1], vec!["m1", "5", "52.50", "70.00"]);
        assert_eq!(rows[2], vec!["m1", "7", "n/a", "90.00"]);
    }

    #[test]
    fn test_heatmap_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench_heatmap.csv");

        let mut table = HeatmapTable::new();
        table.add_grid(ModelName::new("m1"), grid());
        table.add_grid(ModelName::new("m2"), grid());
        table.export(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 8);
        assert_eq!(text.lines().next(), Some("m1,Sample size,100,200"));
    }
}
