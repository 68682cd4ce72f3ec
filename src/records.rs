//! Per-trial experiment records.
//!
//! One record is created for every finished learning run and never changes
//! afterwards. Derived quantities are computed once, at construction.

#![allow(clippy::cast_precision_loss)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Name of a target model, the stem of its `.dot` file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts a disagreement fraction in `[0, 1]` to a conformance percentage.
#[inline]
#[must_use]
pub fn conformance_percent(disagreement: f64) -> f64 {
    100.0 * (1.0 - disagreement)
}

/// Query statistics reported by one L* run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LStarCounts {
    /// States of the learned model.
    pub model_size: u64,
    /// Membership queries posed while learning.
    pub output_queries: u64,
    /// Input symbols executed by those queries.
    pub steps_output_queries: u64,
    /// Queries posed by the equivalence oracle.
    pub eq_oracle_queries: u64,
    /// Input symbols executed by the equivalence oracle.
    pub steps_eq_queries: u64,
    /// Hypothesis refinement rounds.
    pub learning_rounds: u64,
}

/// Outcome of one L* trial against one target model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LStarRecord {
    counts: LStarCounts,
    conformance_coverage: f64,
    conformance_random: f64,
    sum_queries: u64,
    sum_steps: u64,
    average_trace_len: f64,
}

impl LStarRecord {
    /// Builds the record and its derived sums.
    ///
    /// Fails with [`EvalError::NoQueries`] if the run posed no queries at all.
    /// Fails with [`EvalError::CountOverflow`] if a sum does not fit in a `u64`.
    pub fn new(counts: LStarCounts, conformance_coverage: f64, conformance_random: f64) -> Result<Self> {
        let sum_queries = counts
            .output_queries
            .checked_add(counts.eq_oracle_queries)
            .ok_or(EvalError::CountOverflow {
                field: "sum_queries",
            })?;
        let sum_steps = counts
            .steps_output_queries
            .checked_add(counts.steps_eq_queries)
            .ok_or(EvalError::CountOverflow { field: "sum_steps" })?;
        if sum_queries == 0 {
            return Err(EvalError::NoQueries);
        }
        Ok(Self {
            counts,
            conformance_coverage,
            conformance_random,
            sum_queries,
            sum_steps,
            average_trace_len: sum_steps as f64 / sum_queries as f64,
        })
    }

    /// Raw counts as reported by the learner.
    pub const fn counts(&self) -> &LStarCounts {
        &self.counts
    }

    /// States of the learned model.
    pub const fn model_size(&self) -> u64 {
        self.counts.model_size
    }

    pub const fn output_queries(&self) -> u64 {
        self.counts.output_queries
    }

    pub const fn steps_output_queries(&self) -> u64 {
        self.counts.steps_output_queries
    }

    pub const fn eq_oracle_queries(&self) -> u64 {
        self.counts.eq_oracle_queries
    }

    pub const fn steps_eq_queries(&self) -> u64 {
        self.counts.steps_eq_queries
    }

    /// Hypothesis refinement rounds.
    pub const fn learning_rounds(&self) -> u64 {
        self.counts.learning_rounds
    }

    /// Conformance percentage on the coverage test suite.
    pub const fn conformance_coverage(&self) -> f64 {
        self.conformance_coverage
    }

    pub const fn conformance_random(&self) -> f64 {
        self.conformance_random
    }

    /// Output queries plus equivalence oracle queries.
    pub const fn sum_queries(&self) -> u64 {
        self.sum_queries
    }

    /// Steps of output queries plus steps of equivalence oracle queries.
    pub const fn sum_steps(&self) -> u64 {
        self.sum_steps
    }

    /// Mean number of steps per query.
    pub const fn average_trace_len(&self) -> f64 {
        self.average_trace_len
    }
}

/// Outcome of one RPNI trial on one data strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpniRecord {
    model_size: u64,
    conformance_coverage: f64,
    conformance_random: f64,
    data_size: u64,
    average_len: f64,
    correctly_learned: bool,
}

impl RpniRecord {
    /// A model counts as correctly learned only at exactly 100% coverage conformance.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn new(
        model_size: u64,
        conformance_coverage: f64,
        conformance_random: f64,
        data_size: u64,
        average_len: f64,
    ) -> Self {
        Self {
            model_size,
            conformance_coverage,
            conformance_random,
            data_size,
            average_len,
            correctly_learned: conformance_coverage == 100.0,
        }
    }

    /// States of the RPNI model.
    pub const fn model_size(&self) -> u64 {
        self.model_size
    }

    pub const fn conformance_coverage(&self) -> f64 {
        self.conformance_coverage
    }

    pub const fn conformance_random(&self) -> f64 {
        self.conformance_random
    }

    /// Number of traces in the learning sample.
    pub const fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Mean trace length of the learning sample.
    pub const fn average_len(&self) -> f64 {
        self.average_len
    }

    pub const fn correctly_learned(&self) -> bool {
        self.correctly_learned
    }
}

/// Outcome of one L* trial whose cache was seeded with a random sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedLStarRecord {
    conformance_coverage: f64,
    random_sample_size: u64,
    performed_queries: u64,
    cache_hits: u64,
    learning_rounds: u64,
}

impl CachedLStarRecord {
    #[must_use]
    pub const fn new(
        conformance_coverage: f64,
        random_sample_size: u64,
        performed_queries: u64,
        cache_hits: u64,
        learning_rounds: u64,
    ) -> Self {
        Self {
            conformance_coverage,
            random_sample_size,
            performed_queries,
            cache_hits,
            learning_rounds,
        }
    }

    pub const fn conformance_coverage(&self) -> f64 {
        self.conformance_coverage
    }

    /// Traces used to seed the query cache.
    pub const fn random_sample_size(&self) -> u64 {
        self.random_sample_size
    }

    /// Queries that actually reached the system under learning.
    pub const fn performed_queries(&self) -> u64 {
        self.performed_queries
    }

    /// Queries answered from the seeded cache.
    pub const fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub const fn learning_rounds(&self) -> u64 {
        self.learning_rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTS: LStarCounts = LStarCounts {
        model_size: 5,
        output_queries: 10,
        steps_output_queries: 50,
        eq_oracle_queries: 5,
        steps_eq_queries: 20,
        learning_rounds: 3,
    };

    #[test]
    fn test_lstar_sums_are_exact() {
        let record = LStarRecord::new(COUNTS, 100.0, 98.0).unwrap();
        assert_eq!(record.sum_queries(), 15);
        assert_eq!(record.sum_steps(), 70);
        assert!((record.average_trace_len() - 70.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_lstar_without_queries_is_rejected() {
        let counts = LStarCounts {
            output_queries: 0,
            eq_oracle_queries: 0,
            ..COUNTS
        };
        assert!(matches!(
            LStarRecord::new(counts, 100.0, 100.0),
            Err(EvalError::NoQueries)
        ));
    }

    #[test]
    fn test_lstar_count_overflow_is_rejected() {
        let counts = LStarCounts {
            output_queries: u64::MAX,
            ..COUNTS
        };
        assert!(matches!(
            LStarRecord::new(counts, 100.0, 100.0),
            Err(EvalError::CountOverflow { field: "sum_queries" })
        ));

        let counts = LStarCounts {
            steps_eq_queries: u64::MAX,
            ..COUNTS
        };
        assert!(matches!(
            LStarRecord::new(counts, 100.0, 100.0),
            Err(EvalError::CountOverflow { field: "sum_steps" })
        ));
    }

    #[test]
    fn test_correctly_learned_requires_exact_hundred() {
        assert!(RpniRecord::new(4, 100.0, 97.0, 120, 3.5).correctly_learned());
        assert!(!RpniRecord::new(4, 99.999, 100.0, 120, 3.5).correctly_learned());
    }

    #[test]
    fn test_conformance_percent() {
        assert!((conformance_percent(0.0) - 100.0).abs() < f64::EPSILON);
        assert!((conformance_percent(0.25) - 75.0).abs() < 1e-12);
    }
}
