//! learning-eval: CLI entry point.
//!
//! Compares active and passive automata learning on a benchmark and writes
//! the summary tables.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use learning_eval::config::{EvalConfig, SweepConfig, Verbosity};
use learning_eval::driver::{discover_models, run};
use learning_eval::learner::{
    check_learner_available, find_learner_binary, LearnerConfig, ProcessLearner,
};

#[derive(Parser)]
#[command(name = "learning-eval")]
#[command(about = "Compare active and passive automata learning on a benchmark")]
#[command(version)]
struct Cli {
    /// Benchmark to evaluate (subdirectory of the automata directory).
    benchmark: Option<String>,

    /// YAML run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory containing one subdirectory of `.dot` models per benchmark.
    #[arg(long)]
    automata: Option<PathBuf>,

    /// Directory the CSV tables are written to.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Trials per experiment family and model.
    #[arg(short = 'n', long)]
    repeats: Option<usize>,

    /// Test cases per conformance test suite.
    #[arg(long)]
    num_tests: Option<usize>,

    /// 0: silent, 1: summaries, 2: summaries and data generation diagnostics.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbosity: Option<u8>,

    /// Path to learner binary (or set `LEARNER_BIN` env var).
    #[arg(short, long)]
    learner: Option<PathBuf>,

    /// Continue with the next model when one fails.
    #[arg(long)]
    keep_going: bool,

    /// Add an "Incomplete trials" row to the RPNI table.
    #[arg(long)]
    report_incomplete: bool,

    /// Do not write CSV tables.
    #[arg(long)]
    no_csv: bool,

    /// Run the RPNI parameter sweep (default grid unless set in the config file).
    #[arg(long)]
    sweep: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(EvalConfig, Option<PathBuf>)> {
        let mut config = match self.config {
            Some(ref path) => EvalConfig::load(path)?,
            None => EvalConfig::default(),
        };

        if let Some(benchmark) = self.benchmark {
            config.benchmark = benchmark;
        }
        if let Some(automata) = self.automata {
            config.automata_dir = automata;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(repeats) = self.repeats {
            config.repeats = repeats;
        }
        if let Some(num_tests) = self.num_tests {
            config.num_tests = num_tests;
        }
        if let Some(level) = self.verbosity {
            config.verbosity = Verbosity::try_from(level).map_err(anyhow::Error::msg)?;
        }
        config.keep_going |= self.keep_going;
        config.report_incomplete |= self.report_incomplete;
        if self.no_csv {
            config.export_csv = false;
        }
        if self.sweep && config.sweep.is_none() {
            config.sweep = Some(SweepConfig::default());
        }

        config.validate()?;
        Ok((config, self.learner))
    }
}

fn init_logging(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Silent => "warn",
        Verbosity::Summary => "info",
        Verbosity::Diagnostics => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, learner_bin) = cli.into_config()?;
    init_logging(config.verbosity);

    // Find learner binary
    let learner_bin = learner_bin
        .or_else(find_learner_binary)
        .ok_or_else(|| anyhow::anyhow!("Learner binary not found. Set LEARNER_BIN or use --learner"))?;

    let learner_config = LearnerConfig {
        learner_bin,
        timeout: Duration::from_secs(config.timeout_secs),
        ..Default::default()
    };
    let version = check_learner_available(&learner_config)?;

    let models = discover_models(&config.benchmark_dir())?;

    if config.verbosity.summaries() {
        println!("{}", "learning-eval".bold());
        println!("  Learner: {} ({version})", learner_config.learner_bin.display());
        println!("  Benchmark: {}", config.benchmark_dir().display());
        println!("  Models: {}", models.len());
        println!("  Repeats: {}", config.repeats);
        println!();
    }

    let start = Instant::now();
    let mut learner = ProcessLearner::new(learner_config)?;
    let (report, _) = run(&config, &mut learner, &models)?;
    let elapsed = start.elapsed();

    println!();
    println!("{}", "=".repeat(60));

    if report.is_success() {
        println!(
            "  {} {} models evaluated in {:.2}s",
            "DONE".green(),
            report.completed.len().to_string().green(),
            elapsed.as_secs_f64()
        );
    } else {
        println!(
            "  {} {} models evaluated, {} failed in {:.2}s",
            "FAIL".red(),
            report.completed.len(),
            report.failures.len().to_string().red(),
            elapsed.as_secs_f64()
        );
        for failure in &report.failures {
            println!("  {} {}", "✗".red(), failure.model.to_string().red());
            println!("      {:#}", failure.error);
        }
    }

    for path in &report.written {
        println!("  {} {}", "✓".green(), path.display());
    }

    println!("{}", "=".repeat(60));

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
