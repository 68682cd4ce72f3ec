//! Summary builders for the three experiment families.
//!
//! Each family declares an attribute enum: the fixed, ordered set of
//! table rows, their labels, and how each one is rolled up from the trial
//! records. [`summarize`] turns a record collection into an [`ExportEntry`]
//! for any such enum.

#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::config::DataStrategy;
use crate::error::{EvalError, Result};
use crate::records::{CachedLStarRecord, LStarRecord, RpniRecord};
use crate::stats::{aggregate, AggregateStat};

/// How one attribute is computed from a record collection.
pub enum Rollup<R> {
    /// Mean and sample stdev of a numeric field.
    Spread(fn(&R) -> f64),
    /// Number of records satisfying a predicate, reported as an exact value.
    Count(fn(&R) -> bool),
}

/// A labelled row of an export table.
pub trait Attribute: Copy + Eq + fmt::Debug + 'static {
    type Record;

    /// Rows computed from records, in table order.
    const ALL: &'static [Self];

    fn label(self) -> &'static str;

    /// `None` for rows the family builder fills in itself.
    fn rollup(self) -> Option<Rollup<Self::Record>>;
}

/// Aggregated statistics for one model (and strategy), keyed by attribute.
///
/// An attribute can be present but unavailable, when too few comparable
/// trials were left to compute it. Unavailable cells export as [`NOT_AVAILABLE`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportEntry<A> {
    stats: Vec<(A, Option<AggregateStat>)>,
}

/// Cell text for an attribute without a value.
pub const NOT_AVAILABLE: &str = "n/a";

impl<A: Attribute> ExportEntry<A> {
    #[must_use]
    pub const fn new() -> Self {
        Self { stats: Vec::new() }
    }

    fn set(&mut self, attribute: A, stat: Option<AggregateStat>) {
        if let Some(slot) = self.stats.iter_mut().find(|(a, _)| *a == attribute) {
            slot.1 = stat;
        } else {
            self.stats.push((attribute, stat));
        }
    }

    /// Sets `attribute`, replacing an earlier value.
    pub fn insert(&mut self, attribute: A, stat: AggregateStat) {
        self.set(attribute, Some(stat));
    }

    /// Records `attribute` as present without a value.
    pub fn insert_unavailable(&mut self, attribute: A) {
        self.set(attribute, None);
    }

    fn lookup(&self, attribute: A) -> Result<Option<AggregateStat>> {
        self.stats
            .iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, stat)| *stat)
            .ok_or(EvalError::MissingAttribute {
                label: attribute.label(),
            })
    }

    /// The value of `attribute`; an unavailable attribute is an error.
    pub fn get(&self, attribute: A) -> Result<AggregateStat> {
        self.lookup(attribute)?.ok_or(EvalError::Unavailable {
            label: attribute.label(),
        })
    }

    pub fn is_available(&self, attribute: A) -> bool {
        matches!(self.lookup(attribute), Ok(Some(_)))
    }

    /// Table cell text: `"{mean:.2} ({stdev:.2})"` or [`NOT_AVAILABLE`].
    pub fn cell(&self, attribute: A) -> Result<String> {
        Ok(self
            .lookup(attribute)?
            .map_or_else(|| NOT_AVAILABLE.to_string(), |stat| stat.cell()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (A, Option<AggregateStat>)> + '_ {
        self.stats.iter().copied()
    }

    /// Human-readable `"{label}: {mean} ({stdev})"` lines.
    pub fn lines(&self) -> Vec<String> {
        self.iter()
            .map(|(attribute, stat)| match stat {
                Some(stat) => format!("{}: {stat}", attribute.label()),
                None => format!("{}: {NOT_AVAILABLE}", attribute.label()),
            })
            .collect()
    }
}

impl<A: Attribute> Default for ExportEntry<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an entry by rolling up every attribute in `A::ALL` over `records`.
///
/// `scope` prefixes the field name in aggregation errors.
pub fn summarize<A: Attribute>(scope: &str, records: &[A::Record]) -> Result<ExportEntry<A>> {
    let mut entry = ExportEntry::new();
    for &attribute in A::ALL {
        let stat = match attribute.rollup() {
            Some(Rollup::Spread(accessor)) => {
                aggregate(&format!("{scope}: {}", attribute.label()), records, accessor)?
            }
            Some(Rollup::Count(predicate)) => {
                if records.is_empty() {
                    return Err(EvalError::EmptyInput {
                        field: format!("{scope}: {}", attribute.label()),
                    });
                }
                AggregateStat::exact(records.iter().filter(|r| predicate(r)).count() as f64)
            }
            None => continue,
        };
        entry.insert(attribute, stat);
    }
    Ok(entry)
}

/// Builds an entry from a single trial; every attribute is reported exactly.
pub fn summarize_single<A: Attribute>(record: &A::Record) -> ExportEntry<A> {
    let mut entry = ExportEntry::new();
    for &attribute in A::ALL {
        let value = match attribute.rollup() {
            Some(Rollup::Spread(accessor)) => accessor(record),
            Some(Rollup::Count(predicate)) => f64::from(u8::from(predicate(record))),
            None => continue,
        };
        entry.insert(attribute, AggregateStat::exact(value));
    }
    entry
}

/// Builds an entry from too few comparable trials to measure spread.
///
/// Spread attributes are unavailable; counts are still reported exactly.
pub fn summarize_incomplete<A: Attribute>(records: &[A::Record]) -> ExportEntry<A> {
    let mut entry = ExportEntry::new();
    for &attribute in A::ALL {
        match attribute.rollup() {
            Some(Rollup::Spread(_)) => entry.insert_unavailable(attribute),
            Some(Rollup::Count(predicate)) => entry.insert(
                attribute,
                AggregateStat::exact(records.iter().filter(|r| predicate(r)).count() as f64),
            ),
            None => {}
        }
    }
    entry
}

fn print_entry<A: Attribute>(title: &str, entry: &ExportEntry<A>) {
    println!();
    println!("{title}");
    for line in entry.lines() {
        println!("{line}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LStarAttribute {
    States,
    OutputQueries,
    StepsOutputQueries,
    EquivalenceQueries,
    StepsEquivalenceQueries,
    ConformanceCoverage,
    ConformanceRandom,
    LearningRounds,
    SumQueries,
    SumSteps,
    AverageTraceLength,
}

impl Attribute for LStarAttribute {
    type Record = LStarRecord;

    const ALL: &'static [Self] = &[
        Self::States,
        Self::OutputQueries,
        Self::StepsOutputQueries,
        Self::EquivalenceQueries,
        Self::StepsEquivalenceQueries,
        Self::ConformanceCoverage,
        Self::ConformanceRandom,
        Self::LearningRounds,
        Self::SumQueries,
        Self::SumSteps,
        Self::AverageTraceLength,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::States => "States",
            Self::OutputQueries => "Output queries",
            Self::StepsOutputQueries => "Steps output queries",
            Self::EquivalenceQueries => "Equivalence queries",
            Self::StepsEquivalenceQueries => "Steps equivalence queries",
            Self::ConformanceCoverage => "Conformance (coverage) %",
            Self::ConformanceRandom => "Conformance (random) %",
            Self::LearningRounds => "Learning rounds",
            Self::SumQueries => "Sum queries",
            Self::SumSteps => "Sum steps",
            Self::AverageTraceLength => "Average trace length",
        }
    }

    fn rollup(self) -> Option<Rollup<LStarRecord>> {
        let accessor: fn(&LStarRecord) -> f64 = match self {
            Self::States => |r: &LStarRecord| r.model_size() as f64,
            Self::OutputQueries => |r: &LStarRecord| r.output_queries() as f64,
            Self::StepsOutputQueries => |r: &LStarRecord| r.steps_output_queries() as f64,
            Self::EquivalenceQueries => |r: &LStarRecord| r.eq_oracle_queries() as f64,
            Self::StepsEquivalenceQueries => |r: &LStarRecord| r.steps_eq_queries() as f64,
            Self::ConformanceCoverage => LStarRecord::conformance_coverage,
            Self::ConformanceRandom => LStarRecord::conformance_random,
            Self::LearningRounds => |r: &LStarRecord| r.learning_rounds() as f64,
            Self::SumQueries => |r: &LStarRecord| r.sum_queries() as f64,
            Self::SumSteps => |r: &LStarRecord| r.sum_steps() as f64,
            Self::AverageTraceLength => LStarRecord::average_trace_len,
        };
        Some(Rollup::Spread(accessor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpniAttribute {
    States,
    ConformanceCoverage,
    ConformanceRandom,
    DataSize,
    AverageTraceLength,
    CorrectlyLearned,
    IncompleteTrials,
}

impl RpniAttribute {
    /// Table rows including the incomplete-trial count.
    pub const WITH_INCOMPLETE: &'static [Self] = &[
        Self::States,
        Self::ConformanceCoverage,
        Self::ConformanceRandom,
        Self::DataSize,
        Self::AverageTraceLength,
        Self::CorrectlyLearned,
        Self::IncompleteTrials,
    ];

    /// Table rows for the configured incomplete-trial policy.
    #[must_use]
    pub fn rows(report_incomplete: bool) -> &'static [Self] {
        if report_incomplete {
            Self::WITH_INCOMPLETE
        } else {
            Self::ALL
        }
    }
}

impl Attribute for RpniAttribute {
    type Record = RpniRecord;

    const ALL: &'static [Self] = &[
        Self::States,
        Self::ConformanceCoverage,
        Self::ConformanceRandom,
        Self::DataSize,
        Self::AverageTraceLength,
        Self::CorrectlyLearned,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::States => "States",
            Self::ConformanceCoverage => "Conformance (coverage) %",
            Self::ConformanceRandom => "Conformance (random) %",
            Self::DataSize => "Data size",
            Self::AverageTraceLength => "Average trace length",
            Self::CorrectlyLearned => "Correctly learned model",
            Self::IncompleteTrials => "Incomplete trials",
        }
    }

    fn rollup(self) -> Option<Rollup<RpniRecord>> {
        let rollup: Rollup<RpniRecord> = match self {
            Self::States => Rollup::Spread(|r: &RpniRecord| r.model_size() as f64),
            Self::ConformanceCoverage => Rollup::Spread(RpniRecord::conformance_coverage),
            Self::ConformanceRandom => Rollup::Spread(RpniRecord::conformance_random),
            Self::DataSize => Rollup::Spread(|r: &RpniRecord| r.data_size() as f64),
            Self::AverageTraceLength => Rollup::Spread(RpniRecord::average_len),
            Self::CorrectlyLearned => Rollup::Count(RpniRecord::correctly_learned),
            Self::IncompleteTrials => return None,
        };
        Some(rollup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedLStarAttribute {
    ConformanceCoverage,
    RandomSample,
    ActiveQueries,
    CacheHits,
    LearningRounds,
}

impl Attribute for CachedLStarAttribute {
    type Record = CachedLStarRecord;

    const ALL: &'static [Self] = &[
        Self::ConformanceCoverage,
        Self::RandomSample,
        Self::ActiveQueries,
        Self::CacheHits,
        Self::LearningRounds,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::ConformanceCoverage => "Conformance (coverage) %",
            Self::RandomSample => "Random sample",
            Self::ActiveQueries => "Active queries",
            Self::CacheHits => "Cache hits",
            Self::LearningRounds => "Learning rounds",
        }
    }

    fn rollup(self) -> Option<Rollup<CachedLStarRecord>> {
        let accessor: fn(&CachedLStarRecord) -> f64 = match self {
            Self::ConformanceCoverage => CachedLStarRecord::conformance_coverage,
            Self::RandomSample => |r: &CachedLStarRecord| r.random_sample_size() as f64,
            Self::ActiveQueries => |r: &CachedLStarRecord| r.performed_queries() as f64,
            Self::CacheHits => |r: &CachedLStarRecord| r.cache_hits() as f64,
            Self::LearningRounds => |r: &CachedLStarRecord| r.learning_rounds() as f64,
        };
        Some(Rollup::Spread(accessor))
    }
}

/// RPNI trials of one data strategy.
///
/// Trials whose learned model has a different input alphabet than the
/// reference cannot be compared; they are counted here and left out of
/// every aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyTrials {
    pub records: Vec<RpniRecord>,
    pub incomplete: usize,
}

impl StrategyTrials {
    pub fn total(&self) -> usize {
        self.records.len() + self.incomplete
    }
}

pub fn lstar_summary(records: &[LStarRecord], verbose: bool) -> Result<ExportEntry<LStarAttribute>> {
    let entry = summarize("L*", records)?;
    if verbose {
        print_entry("----L* summary----", &entry);
    }
    Ok(entry)
}

pub fn cached_lstar_summary(
    records: &[CachedLStarRecord],
    verbose: bool,
) -> Result<ExportEntry<CachedLStarAttribute>> {
    let entry = summarize("cached L*", records)?;
    if verbose {
        print_entry("----Cached L* summary----", &entry);
    }
    Ok(entry)
}

fn baseline_entry(
    baseline: DataStrategy,
    trials: &StrategyTrials,
) -> Result<ExportEntry<RpniAttribute>> {
    let mut entry: ExportEntry<RpniAttribute> = match trials.records.first() {
        Some(record) => {
            if trials.records.len() > 1 {
                warn!(
                    strategy = %baseline,
                    trials = trials.records.len(),
                    "baseline has more than one trial, using the first"
                );
            }
            summarize_single(record)
        }
        None if trials.incomplete > 0 => {
            warn!(strategy = %baseline, "baseline trial is incomplete");
            summarize_incomplete(&[])
        }
        None => {
            return Err(EvalError::EmptyInput {
                field: format!("{baseline}: baseline trial"),
            })
        }
    };
    entry.insert(
        RpniAttribute::IncompleteTrials,
        AggregateStat::exact(trials.incomplete as f64),
    );
    Ok(entry)
}

fn strategy_entry(
    strategy: DataStrategy,
    trials: &StrategyTrials,
) -> Result<ExportEntry<RpniAttribute>> {
    let starved = trials.incomplete > 0 && trials.records.len() < 2;
    let mut entry: ExportEntry<RpniAttribute> = if starved {
        warn!(
            %strategy,
            comparable = trials.records.len(),
            incomplete = trials.incomplete,
            "too few comparable trials, statistics unavailable"
        );
        summarize_incomplete(&trials.records)
    } else {
        summarize(&strategy.to_string(), &trials.records)?
    };
    entry.insert(
        RpniAttribute::IncompleteTrials,
        AggregateStat::exact(trials.incomplete as f64),
    );
    Ok(entry)
}

/// Summarizes the RPNI trials of one model.
///
/// `baseline` is expected to hold a single trial and is reported without
/// spread; every strategy in `strategies` is aggregated normally. The result
/// holds one entry per strategy, baseline first.
///
/// A strategy left with fewer than two comparable trials because of
/// incomplete ones gets unavailable statistics instead of failing the model.
pub fn rpni_summary(
    trials: &BTreeMap<DataStrategy, StrategyTrials>,
    strategies: &[DataStrategy],
    baseline: DataStrategy,
    verbose: bool,
) -> Result<Vec<(DataStrategy, ExportEntry<RpniAttribute>)>> {
    let empty = StrategyTrials::default();
    let trials_of = |strategy: &DataStrategy| trials.get(strategy).unwrap_or(&empty);

    if verbose {
        println!();
        println!("----RPNI summary----");
    }

    let entry = baseline_entry(baseline, trials_of(&baseline))?;
    if verbose {
        print_entry(&format!("--Experiment: {baseline}"), &entry);
    }
    let mut entries = vec![(baseline, entry)];

    for strategy in strategies.iter().filter(|s| **s != baseline) {
        let strategy_trials = trials_of(strategy);
        let entry = strategy_entry(*strategy, strategy_trials)?;

        if verbose {
            print_entry(&format!("--Experiment: {strategy}"), &entry);
            let correct = strategy_trials
                .records
                .iter()
                .filter(|r| r.correctly_learned())
                .count();
            println!(
                "Correctly learned models: {correct}/{}",
                strategy_trials.records.len()
            );
            if strategy_trials.incomplete > 0 {
                println!(
                    "Incomplete trials: {}/{}",
                    strategy_trials.incomplete,
                    strategy_trials.total()
                );
            }
        }
        entries.push((*strategy, entry));
    }

    Ok(entries)
}
