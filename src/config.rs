//! Run configuration.
//!
//! An [`EvalConfig`] is read from an optional YAML file, overridden by
//! command line flags, and passed explicitly to the driver.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// How the passive learner's training sample is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataStrategy {
    /// As many random traces as L* needed queries.
    RandomLStarLength,
    /// Twice as many random traces as L* needed queries.
    RandomLargeSet,
    /// Random traces between one and two times the model size long.
    RandomLongTraces,
    /// Traces from state prefixes (and their extensions) and the characterizing set.
    CharSet,
    /// `CharSet` data reduced to its unique maximal sequences. Run once, as baseline.
    MinimizedCharSet,
}

impl DataStrategy {
    /// The single-trial reference strategy every model is compared against.
    pub const BASELINE: Self = Self::MinimizedCharSet;

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RandomLStarLength => "random |l* data|",
            Self::RandomLargeSet => "random 2*|l* data|",
            Self::RandomLongTraces => "random long traces",
            Self::CharSet => "l* data",
            Self::MinimizedCharSet => "l* data (minimized)",
        }
    }
}

impl fmt::Display for DataStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Console output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Verbosity {
    /// No summaries.
    Silent,
    /// Per-model summaries.
    Summary,
    /// Summaries plus data generation diagnostics.
    Diagnostics,
}

impl Verbosity {
    pub fn summaries(self) -> bool {
        self >= Self::Summary
    }

    pub fn diagnostics(self) -> bool {
        self >= Self::Diagnostics
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Silent),
            1 => Ok(Self::Summary),
            2 => Ok(Self::Diagnostics),
            other => Err(format!("verbosity must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<Verbosity> for u8 {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Silent => 0,
            Verbosity::Summary => 1,
            Verbosity::Diagnostics => 2,
        }
    }
}

/// Experiment family, used for table file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    LStar,
    Rpni,
    CachedLStar,
    Heatmap,
}

impl Family {
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::LStar => "l_star",
            Self::Rpni => "rpni",
            Self::CachedLStar => "cached_l_star",
            Self::Heatmap => "heatmap",
        }
    }
}

/// Grid of the passive learning parameter sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Sample sizes, as multiples of the mean L* query count.
    pub query_multipliers: Vec<u64>,
    /// Centre of each trace length band.
    pub trace_lengths: Vec<u64>,
    /// Traces are drawn from `len - length_spread ..= len + length_spread`.
    pub length_spread: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            query_multipliers: (1..=10).collect(),
            trace_lengths: (5..=25).step_by(2).collect(),
            length_spread: 2,
        }
    }
}

impl SweepConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.query_multipliers.is_empty() || self.trace_lengths.is_empty() {
            bail!("sweep needs at least one query multiplier and one trace length");
        }
        if self.query_multipliers.contains(&0) || self.trace_lengths.contains(&0) {
            bail!("sweep query multipliers and trace lengths must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Subdirectory of `automata_dir` holding the benchmark's `.dot` models.
    pub benchmark: String,
    pub automata_dir: PathBuf,
    /// Directory the CSV tables are written to.
    pub output_dir: PathBuf,
    /// Trials per experiment family and model.
    pub repeats: usize,
    /// Test cases per conformance test suite.
    pub num_tests: usize,
    /// State-prefix equivalence oracle: random walks per state.
    pub walks_per_state: usize,
    /// State-prefix equivalence oracle: length of each walk.
    pub walk_len: usize,
    /// RPNI data strategies compared against the baseline.
    pub strategies: Vec<DataStrategy>,
    pub verbosity: Verbosity,
    /// Adds an "Incomplete trials" row to the RPNI table.
    pub report_incomplete: bool,
    /// Continue with the next model after a model fails.
    pub keep_going: bool,
    pub export_csv: bool,
    /// Per-invocation timeout for the learner, in seconds.
    pub timeout_secs: u64,
    /// Parameter sweep grid; no sweep when absent.
    pub sweep: Option<SweepConfig>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            benchmark: "MQTT".to_string(),
            automata_dir: PathBuf::from("automata"),
            output_dir: PathBuf::from("."),
            repeats: 2,
            num_tests: 10_000,
            walks_per_state: 30,
            walk_len: 30,
            strategies: vec![
                DataStrategy::RandomLStarLength,
                DataStrategy::RandomLargeSet,
                DataStrategy::RandomLongTraces,
            ],
            verbosity: Verbosity::Summary,
            report_incomplete: false,
            keep_going: false,
            export_csv: true,
            timeout_secs: 300,
            sweep: None,
        }
    }
}

impl EvalConfig {
    /// Parses a YAML configuration; missing keys take their defaults.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.repeats < 2 {
            bail!(
                "repeats must be at least 2 to compute a sample standard deviation, got {}",
                self.repeats
            );
        }
        if self.num_tests == 0 {
            bail!("num_tests must be positive");
        }
        if self.walks_per_state == 0 || self.walk_len == 0 {
            bail!("walks_per_state and walk_len must be positive");
        }
        if self.benchmark.is_empty() {
            bail!("benchmark name is empty");
        }
        if let Some(ref sweep) = self.sweep {
            sweep.validate()?;
        }
        Ok(())
    }

    /// Strategies run per trial, without the baseline and without duplicates.
    pub fn trial_strategies(&self) -> Vec<DataStrategy> {
        let mut strategies = Vec::new();
        for &strategy in &self.strategies {
            if strategy != DataStrategy::BASELINE && !strategies.contains(&strategy) {
                strategies.push(strategy);
            }
        }
        strategies
    }

    /// Table row order of the RPNI export: baseline, then trial strategies.
    pub fn rpni_axis(&self) -> Vec<DataStrategy> {
        let mut axis = vec![DataStrategy::BASELINE];
        axis.extend(self.trial_strategies());
        axis
    }

    pub fn benchmark_dir(&self) -> PathBuf {
        self.automata_dir.join(&self.benchmark)
    }

    /// `{output_dir}/{benchmark}_{family}.csv`
    pub fn table_path(&self, family: Family) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.csv", self.benchmark, family.file_stem()))
    }
}
