//! learning-eval: evaluation harness for automata learning experiments.
//!
//! Runs L*, RPNI and cache-seeded L* against the ground-truth models of a
//! benchmark, aggregates repeated trials into mean/stdev summaries and
//! exports them as CSV tables.

pub mod config;
pub mod driver;
pub mod error;
pub mod export;
pub mod learner;
pub mod records;
pub mod stats;
pub mod summary;
pub mod sweep;
