//! Experiment driver.
//!
//! For every model of the benchmark: run the L* trials, derive the passive
//! learning sample sizes from them, run the RPNI and cached L* trials and,
//! when configured, the parameter sweep; then summarize and add the results
//! to the export tables. Tables are rewritten
//! after every model, so results of finished models survive a later failure.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::{DataStrategy, EvalConfig, Family};
use crate::error::EvalError;
use crate::export::{ExportTable, StrategyExportTable};
use crate::learner::{
    Learner, LearnedModel, ModelHandle, OracleParams, Sample, SampleRequest, SamplingMethod,
    TestSuite,
};
use crate::records::{
    conformance_percent, CachedLStarRecord, LStarRecord, ModelName, RpniRecord,
};
use crate::stats::aggregate;
use crate::summary::{
    cached_lstar_summary, lstar_summary, rpni_summary, CachedLStarAttribute, ExportEntry,
    LStarAttribute, RpniAttribute, StrategyTrials,
};
use crate::sweep::{print_grid, run_sweep, HeatmapTable, SweepGrid};

/// Lists the `.dot` models of a benchmark directory, sorted by name.
pub fn discover_models(dir: &Path) -> Result<Vec<ModelHandle>> {
    if !dir.is_dir() {
        bail!("Benchmark directory not found: {}", dir.display());
    }

    let mut models = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "dot") {
            let Some(stem) = path.file_stem() else {
                continue;
            };
            models.push(ModelHandle {
                name: ModelName::new(stem.to_string_lossy()),
                path,
            });
        }
    }
    models.sort_by(|a, b| a.name.cmp(&b.name));

    if models.is_empty() {
        bail!("No .dot models in {}", dir.display());
    }
    Ok(models)
}

/// Conformance test suites of one model, shared by every compared automaton.
#[derive(Debug, Clone)]
pub struct Suites {
    pub coverage: TestSuite,
    pub random: TestSuite,
}

/// Passive learning sample parameters derived from the L* trials of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePlan {
    /// Mean number of L* queries.
    pub learning_queries: u64,
    /// Upper bound for random trace length, twice the mean L* query length.
    pub max_len: u64,
    /// States of the reference model.
    pub reference_size: u64,
}

impl SamplePlan {
    pub fn from_lstar(records: &[LStarRecord], reference_size: u64) -> Result<Self> {
        let sum_queries = aggregate("L*: sum_queries", records, |r| r.sum_queries() as f64)?;
        let trace_len =
            aggregate("L*: average_trace_len", records, LStarRecord::average_trace_len)?;

        let learning_queries = sum_queries.mean.round_ties_even().max(1.0) as u64;
        let max_len = ((trace_len.mean - 0.5) * 2.0).round_ties_even().max(1.0) as u64;

        Ok(Self {
            learning_queries,
            max_len,
            reference_size: reference_size.max(1),
        })
    }

    pub fn request(&self, strategy: DataStrategy) -> crate::error::Result<SampleRequest> {
        let doubled = |value: u64, field| {
            value
                .checked_mul(2)
                .ok_or(EvalError::CountOverflow { field })
        };
        Ok(match strategy {
            DataStrategy::RandomLStarLength => SampleRequest::Random {
                num_sequences: self.learning_queries,
                min_len: 1,
                max_len: self.max_len,
            },
            DataStrategy::RandomLargeSet => SampleRequest::Random {
                num_sequences: doubled(self.learning_queries, "sample size")?,
                min_len: 1,
                max_len: self.max_len,
            },
            DataStrategy::RandomLongTraces => SampleRequest::Random {
                num_sequences: self.learning_queries,
                min_len: self.reference_size,
                max_len: doubled(self.reference_size, "trace length")?,
            },
            DataStrategy::CharSet => SampleRequest::CharSet { minimized: false },
            DataStrategy::MinimizedCharSet => SampleRequest::CharSet { minimized: true },
        })
    }
}

/// Summaries of one model, ready for export.
#[derive(Debug, Clone)]
pub struct ModelResults {
    pub lstar: ExportEntry<LStarAttribute>,
    pub rpni: Vec<(DataStrategy, ExportEntry<RpniAttribute>)>,
    pub cached_lstar: ExportEntry<CachedLStarAttribute>,
    pub sweep: Option<SweepGrid>,
}

/// Accumulated export tables of a run.
#[derive(Debug, Clone)]
pub struct Tables {
    pub lstar: ExportTable<LStarAttribute>,
    pub rpni: StrategyExportTable<RpniAttribute>,
    pub cached_lstar: ExportTable<CachedLStarAttribute>,
    pub heatmap: HeatmapTable,
}

impl Tables {
    pub fn new(config: &EvalConfig) -> Self {
        Self {
            lstar: ExportTable::new(),
            rpni: StrategyExportTable::with_rows(RpniAttribute::rows(config.report_incomplete)),
            cached_lstar: ExportTable::new(),
            heatmap: HeatmapTable::new(),
        }
    }

    pub fn add(&mut self, model: &ModelName, results: ModelResults) {
        self.lstar.add_entry(model.clone(), results.lstar);
        for (strategy, entry) in results.rpni {
            self.rpni.add_entry(model, strategy, entry);
        }
        self.cached_lstar.add_entry(model.clone(), results.cached_lstar);
        if let Some(grid) = results.sweep {
            self.heatmap.add_grid(model.clone(), grid);
        }
    }

    /// Writes the tables and returns their paths; the heatmap only when a sweep is configured.
    pub fn export(&self, config: &EvalConfig) -> Result<Vec<PathBuf>> {
        let lstar = config.table_path(Family::LStar);
        self.lstar
            .export(&lstar)
            .with_context(|| format!("Failed to write {}", lstar.display()))?;

        let rpni = config.table_path(Family::Rpni);
        self.rpni
            .export(&rpni, &config.rpni_axis())
            .with_context(|| format!("Failed to write {}", rpni.display()))?;

        let cached = config.table_path(Family::CachedLStar);
        self.cached_lstar
            .export(&cached)
            .with_context(|| format!("Failed to write {}", cached.display()))?;

        let mut written = vec![lstar, rpni, cached];
        if config.sweep.is_some() {
            let heatmap = config.table_path(Family::Heatmap);
            self.heatmap
                .export(&heatmap)
                .with_context(|| format!("Failed to write {}", heatmap.display()))?;
            written.push(heatmap);
        }
        Ok(written)
    }
}

#[derive(Debug)]
pub struct ModelFailure {
    pub model: ModelName,
    pub error: anyhow::Error,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<ModelName>,
    pub failures: Vec<ModelFailure>,
    /// Table files as of the last completed model.
    pub written: Vec<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluates every model in order.
///
/// A failing model is recorded in the report; unless `keep_going` is set the
/// run stops there. Tables written for earlier models are left intact.
pub fn run<L: Learner>(
    config: &EvalConfig,
    learner: &mut L,
    models: &[ModelHandle],
) -> Result<(RunReport, Tables)> {
    config.validate()?;

    let mut tables = Tables::new(config);
    let mut report = RunReport::default();

    for model in models {
        info!(model = %model.name, "evaluating model");
        match evaluate_model(config, learner, model) {
            Ok(results) => {
                tables.add(&model.name, results);
                if config.export_csv {
                    report.written = tables.export(config)?;
                }
                report.completed.push(model.name.clone());
            }
            Err(error) => {
                error!(model = %model.name, "{error:#}");
                report.failures.push(ModelFailure {
                    model: model.name.clone(),
                    error,
                });
                if !config.keep_going {
                    break;
                }
            }
        }
    }

    Ok((report, tables))
}

/// Runs all trials for one model and summarizes them.
pub fn evaluate_model<L: Learner>(
    config: &EvalConfig,
    learner: &mut L,
    model: &ModelHandle,
) -> Result<ModelResults> {
    let verbose = config.verbosity.summaries();
    let oracle = OracleParams {
        walks_per_state: config.walks_per_state,
        walk_len: config.walk_len,
    };

    let suites = Suites {
        coverage: learner
            .test_suite(model, SamplingMethod::Coverage, config.num_tests)
            .context("generating coverage test suite")?,
        random: learner
            .test_suite(model, SamplingMethod::Random, config.num_tests)
            .context("generating random test suite")?,
    };
    debug!(
        coverage = suites.coverage.len,
        random = suites.random.len,
        "generated test suites"
    );

    let mut lstar_records = Vec::with_capacity(config.repeats);
    for trial in 0..config.repeats {
        let record = lstar_trial(learner, model, oracle, &suites)
            .with_context(|| format!("L* trial {}", trial + 1))?;
        lstar_records.push(record);
    }

    let plan = SamplePlan::from_lstar(&lstar_records, suites.coverage.reference_size)?;
    debug!(?plan, "derived passive learning sample plan");

    let strategies = config.trial_strategies();
    let mut rpni_trials: BTreeMap<DataStrategy, StrategyTrials> = BTreeMap::new();
    let mut cached_records = Vec::with_capacity(config.repeats);

    for trial in 0..config.repeats {
        let mut seed_sample = None;
        for &strategy in &strategies {
            let sample = generate_sample(learner, model, &plan, strategy)
                .with_context(|| format!("`{strategy}` sample, trial {}", trial + 1))?;
            let outcome = rpni_trial(learner, model, &sample, &suites)
                .with_context(|| format!("RPNI on `{strategy}`, trial {}", trial + 1))?;
            record_rpni(&mut rpni_trials, model, strategy, outcome);
            if strategy == DataStrategy::RandomLStarLength {
                seed_sample = Some(sample);
            }
        }

        let seed_sample = match seed_sample {
            Some(sample) => sample,
            None => generate_sample(learner, model, &plan, DataStrategy::RandomLStarLength)
                .with_context(|| format!("cached L* seed sample, trial {}", trial + 1))?,
        };
        let record = cached_lstar_trial(learner, model, &seed_sample, &suites)
            .with_context(|| format!("cached L* trial {}", trial + 1))?;
        cached_records.push(record);
    }

    let baseline = DataStrategy::BASELINE;
    let sample = generate_sample(learner, model, &plan, baseline)
        .with_context(|| format!("`{baseline}` sample"))?;
    let outcome = rpni_trial(learner, model, &sample, &suites)
        .with_context(|| format!("RPNI on `{baseline}`"))?;
    record_rpni(&mut rpni_trials, model, baseline, outcome);

    if verbose {
        println!();
        println!("------------------{}------------------", model.name);
    }
    let lstar = lstar_summary(&lstar_records, verbose)?;
    let rpni = rpni_summary(&rpni_trials, &strategies, baseline, verbose)?;
    let cached_lstar = cached_lstar_summary(&cached_records, verbose)?;

    let sweep = match config.sweep {
        Some(ref sweep) => {
            let grid = run_sweep(learner, model, plan.learning_queries, &suites.coverage, sweep)
                .context("parameter sweep")?;
            if verbose {
                print_grid(&grid);
            }
            Some(grid)
        }
        None => None,
    };

    Ok(ModelResults {
        lstar,
        rpni,
        cached_lstar,
        sweep,
    })
}

fn conformance<L: Learner>(
    learner: &mut L,
    model: &ModelHandle,
    learned: &LearnedModel,
    suite: &TestSuite,
) -> Result<Option<f64>> {
    Ok(learner
        .disagreement(model, learned, suite)
        .with_context(|| format!("comparing on {} test suite", suite.method.as_str()))?
        .map(conformance_percent))
}

fn lstar_trial<L: Learner>(
    learner: &mut L,
    model: &ModelHandle,
    oracle: OracleParams,
    suites: &Suites,
) -> Result<LStarRecord> {
    let run = learner.lstar(model, oracle)?;
    let alphabet_error = || anyhow!("L* model and reference have different input alphabets");
    let coverage =
        conformance(learner, model, &run.model, &suites.coverage)?.ok_or_else(alphabet_error)?;
    let random =
        conformance(learner, model, &run.model, &suites.random)?.ok_or_else(alphabet_error)?;
    Ok(LStarRecord::new(run.counts, coverage, random)?)
}

fn generate_sample<L: Learner>(
    learner: &mut L,
    model: &ModelHandle,
    plan: &SamplePlan,
    strategy: DataStrategy,
) -> Result<Sample> {
    let request = plan.request(strategy)?;
    let sample = learner.sample(model, &request)?;
    debug!(
        %strategy,
        ?request,
        size = sample.size,
        average_len = sample.average_len,
        "generated sample"
    );
    Ok(sample)
}

/// `None` when the learned model cannot be compared with the reference.
fn rpni_trial<L: Learner>(
    learner: &mut L,
    model: &ModelHandle,
    sample: &Sample,
    suites: &Suites,
) -> Result<Option<RpniRecord>> {
    let learned = learner.rpni(sample)?;
    debug!(size = learned.size, "RPNI learned model");

    let coverage = conformance(learner, model, &learned, &suites.coverage)?;
    let random = conformance(learner, model, &learned, &suites.random)?;
    Ok(coverage.zip(random).map(|(coverage, random)| {
        RpniRecord::new(learned.size, coverage, random, sample.size, sample.average_len)
    }))
}

fn record_rpni(
    trials: &mut BTreeMap<DataStrategy, StrategyTrials>,
    model: &ModelHandle,
    strategy: DataStrategy,
    outcome: Option<RpniRecord>,
) {
    let entry = trials.entry(strategy).or_default();
    match outcome {
        Some(record) => entry.records.push(record),
        None => {
            warn!(
                model = %model.name,
                %strategy,
                "RPNI model and reference have different input alphabets, trial excluded"
            );
            entry.incomplete += 1;
        }
    }
}

fn cached_lstar_trial<L: Learner>(
    learner: &mut L,
    model: &ModelHandle,
    sample: &Sample,
    suites: &Suites,
) -> Result<CachedLStarRecord> {
    let run = learner.cached_lstar(model, sample)?;
    let coverage = conformance(learner, model, &run.model, &suites.coverage)?
        .ok_or_else(|| anyhow!("cached L* model and reference have different input alphabets"))?;
    Ok(CachedLStarRecord::new(
        coverage,
        sample.size,
        run.performed_queries,
        run.cache_hits,
        run.learning_rounds,
    ))
}
