//! Statistics over repeated trials.
//!
//! Every summary reduces one numeric field of a record collection to an
//! [`AggregateStat`]: the arithmetic mean and the sample standard deviation.

#![allow(clippy::cast_precision_loss)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Mean and sample standard deviation of one field across trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub mean: f64,
    pub stdev: f64,
}

impl AggregateStat {
    /// A value observed exactly once (or a count), reported without spread.
    #[must_use]
    pub const fn exact(value: f64) -> Self {
        Self {
            mean: value,
            stdev: 0.0,
        }
    }

    /// Table cell text, `"{mean:.2} ({stdev:.2})"`.
    #[must_use]
    pub fn cell(&self) -> String {
        format!("{:.2} ({:.2})", self.mean, self.stdev)
    }
}

impl fmt::Display for AggregateStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mean, self.stdev)
    }
}

/// Computes mean and sample standard deviation (divisor `n - 1`).
///
/// Fails on an empty sample and on a single-element sample, since the
/// sample stdev is undefined there. Use [`AggregateStat::exact`] for values
/// that are known to come from exactly one trial.
pub fn mean_stdev(field: &str, sample: &[f64]) -> Result<AggregateStat> {
    match sample.len() {
        0 => Err(EvalError::EmptyInput {
            field: field.to_string(),
        }),
        1 => Err(EvalError::SingleSample {
            field: field.to_string(),
        }),
        len => {
            let n = len as f64;
            let mean = sample.iter().sum::<f64>() / n;
            let variance = sample.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Ok(AggregateStat {
                mean,
                stdev: variance.sqrt(),
            })
        }
    }
}

/// Extracts `field` from every record through `accessor` and aggregates it.
pub fn aggregate<R, F>(field: &str, records: &[R], accessor: F) -> Result<AggregateStat>
where
    F: Fn(&R) -> f64,
{
    let sample: Vec<f64> = records.iter().map(accessor).collect();
    mean_stdev(field, &sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sample_stdev_uses_n_minus_one() {
        let stat = mean_stdev("x", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(close(stat.mean, 5.0));
        assert!(close(stat.stdev, (32.0_f64 / 7.0).sqrt()));
    }

    #[test]
    fn test_constant_sample_has_zero_stdev() {
        let stat = mean_stdev("model_size", &[5.0, 5.0]).unwrap();
        assert_eq!(stat, AggregateStat::exact(5.0));
    }

    #[test]
    fn test_empty_sample_is_rejected() {
        let err = mean_stdev("learning_rounds", &[]).unwrap_err();
        assert!(matches!(err, EvalError::EmptyInput { ref field } if field == "learning_rounds"));
    }

    #[test]
    fn test_single_sample_is_rejected() {
        let err = mean_stdev("data_size", &[3.0]).unwrap_err();
        assert!(matches!(err, EvalError::SingleSample { .. }));
    }

    #[test]
    fn test_aggregate_reads_field_through_accessor() {
        let records = [(1_u32, 3.0_f64), (2, 4.0)];
        let stat = aggregate("rounds", &records, |r| r.1).unwrap();
        assert!(close(stat.mean, 3.5));
        assert!(close(stat.stdev, 0.5_f64.sqrt()));
    }

    #[test]
    fn test_aggregation_is_repeatable() {
        let sample = [0.1, 0.7, 0.3, 0.9];
        assert_eq!(mean_stdev("x", &sample).unwrap(), mean_stdev("x", &sample).unwrap());
    }

    #[test]
    fn test_cell_rounds_to_two_places() {
        let stat = AggregateStat {
            mean: 7.333,
            stdev: 1.528,
        };
        assert_eq!(stat.cell(), "7.33 (1.53)");
        assert_eq!(AggregateStat::exact(5.0).cell(), "5.00 (0.00)");
    }
}
