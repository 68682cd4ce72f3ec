//! Learning backend.
//!
//! Learning algorithms, equivalence oracles, data generation and model
//! comparison are provided by an external learner. [`Learner`] is the seam
//! the driver talks to; [`ProcessLearner`] runs an external learner
//! executable and reads one JSON object from its stdout per call.
//!
//! Wire protocol (`<learner> <subcommand> [flags]`):
//!
//! | subcommand     | flags                                                              | stdout JSON |
//! |----------------|--------------------------------------------------------------------|-------------|
//! | `test-suite`   | `--model P --method coverage\|random --num-tests N --output F`     | `{"test_cases", "model_size"}` |
//! | `lstar`        | `--model P --walks-per-state W --walk-len L --output F`            | `{"model_size", "output_queries", "steps_output_queries", "eq_oracle_queries", "steps_eq_queries", "learning_rounds"}` |
//! | `sample`       | `--model P --strategy random --num-sequences N --min-len A --max-len B --output F` or `--model P --strategy char-set [--minimized] --include-extended-s-set --output F` | `{"size", "average_len"}` |
//! | `rpni`         | `--data F --output G`                                              | `{"model_size"}` |
//! | `cached-lstar` | `--model P --data F --output G`                                    | `{"model_size", "performed_queries", "cache_hits", "learning_rounds"}` |
//! | `compare`      | `--reference P --candidate G --test-suite F`                       | `{"alphabets_match", "disagreement"}` |
//!
//! `model_size` in a `test-suite` reply is the size of the reference model.
//! `disagreement` may only be omitted when `alphabets_match` is false.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tempfile::TempDir;
use tracing::debug;

use crate::records::{LStarCounts, ModelName};

/// A ground-truth model of the benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub name: ModelName,
    pub path: PathBuf,
}

/// How conformance test cases are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMethod {
    /// Random walks from every state prefix.
    Coverage,
    /// Bounded random walks from the initial state.
    Random,
}

impl SamplingMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coverage => "coverage",
            Self::Random => "random",
        }
    }
}

/// Input sequences shared by every comparison against one model.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub method: SamplingMethod,
    /// Learner-side file holding the test cases.
    pub path: PathBuf,
    /// Number of test cases.
    pub len: usize,
    /// States of the reference model the suite was generated from.
    pub reference_size: u64,
}

/// An automaton produced by one of the learning algorithms.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedModel {
    /// Learner-side `.dot` file of the model.
    pub path: PathBuf,
    /// Number of states.
    pub size: u64,
}

/// Labelled input/output traces for the passive learner.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Learner-side file holding the traces.
    pub path: PathBuf,
    /// Number of traces.
    pub size: u64,
    /// Mean number of inputs per trace.
    pub average_len: f64,
}

/// How the learner should generate a [`Sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleRequest {
    /// Random walks with lengths drawn from `min_len..=max_len`.
    Random {
        num_sequences: u64,
        min_len: u64,
        max_len: u64,
    },
    /// State prefixes extended by the characterizing set.
    CharSet { minimized: bool },
}

/// State-prefix equivalence oracle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleParams {
    /// Random walks started from every state prefix.
    pub walks_per_state: usize,
    /// Inputs per random walk.
    pub walk_len: usize,
}

/// Result of one L* run.
#[derive(Debug, Clone, PartialEq)]
pub struct LStarRun {
    /// The learned hypothesis.
    pub model: LearnedModel,
    /// Query and round statistics of the run.
    pub counts: LStarCounts,
}

/// Result of one L* run with a pre-seeded query cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLStarRun {
    /// The learned hypothesis.
    pub model: LearnedModel,
    /// Queries not answered by the cache.
    pub performed_queries: u64,
    /// Queries answered by the cache.
    pub cache_hits: u64,
    /// Hypothesis refinement rounds.
    pub learning_rounds: u64,
}

/// Operations the evaluation needs from a learning library.
pub trait Learner {
    fn test_suite(
        &mut self,
        model: &ModelHandle,
        method: SamplingMethod,
        num_tests: usize,
    ) -> Result<TestSuite>;

    fn lstar(&mut self, model: &ModelHandle, oracle: OracleParams) -> Result<LStarRun>;

    fn sample(&mut self, model: &ModelHandle, request: &SampleRequest) -> Result<Sample>;

    fn rpni(&mut self, sample: &Sample) -> Result<LearnedModel>;

    /// L* whose query cache is pre-populated with `sample`.
    fn cached_lstar(&mut self, model: &ModelHandle, sample: &Sample) -> Result<CachedLStarRun>;

    /// Fraction of test cases on which `candidate` and `reference` disagree.
    ///
    /// `None` when the two input alphabets differ and comparison is meaningless.
    fn disagreement(
        &mut self,
        reference: &ModelHandle,
        candidate: &LearnedModel,
        suite: &TestSuite,
    ) -> Result<Option<f64>>;
}

/// Configuration for the process learner.
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Path to the learner binary.
    pub learner_bin: PathBuf,
    /// Timeout per invocation.
    pub timeout: Duration,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            learner_bin: PathBuf::from("learner"),
            timeout: Duration::from_secs(300),
            working_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestSuiteReply {
    test_cases: usize,
    model_size: u64,
}

#[derive(Debug, Deserialize)]
struct SampleReply {
    size: u64,
    average_len: f64,
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    model_size: u64,
}

#[derive(Debug, Deserialize)]
struct CachedLStarReply {
    model_size: u64,
    performed_queries: u64,
    cache_hits: u64,
    learning_rounds: u64,
}

#[derive(Debug, Deserialize)]
struct CompareReply {
    alphabets_match: bool,
    disagreement: Option<f64>,
}

impl CompareReply {
    fn into_disagreement(self) -> Result<Option<f64>> {
        if !self.alphabets_match {
            return Ok(None);
        }
        let Some(disagreement) = self.disagreement else {
            bail!("learner compare reply has matching alphabets but no disagreement");
        };
        if !(0.0..=1.0).contains(&disagreement) {
            bail!("learner reported disagreement {disagreement} outside [0, 1]");
        }
        Ok(Some(disagreement))
    }
}

/// Runs the external learner once per operation.
///
/// Artifacts (test suites, samples, learned models) are written to a
/// temporary directory that is removed when the learner is dropped.
pub struct ProcessLearner {
    config: LearnerConfig,
    artifacts: TempDir,
    next_artifact: usize,
}

impl ProcessLearner {
    pub fn new(config: LearnerConfig) -> Result<Self> {
        let artifacts = tempfile::Builder::new()
            .prefix("learning-eval-")
            .tempdir()
            .context("Failed to create artifact directory")?;
        Ok(Self {
            config,
            artifacts,
            next_artifact: 0,
        })
    }

    pub fn artifact_dir(&self) -> &Path {
        self.artifacts.path()
    }

    fn artifact(&mut self, stem: &str, extension: &str) -> PathBuf {
        self.next_artifact += 1;
        self.artifacts
            .path()
            .join(format!("{stem}-{:05}.{extension}", self.next_artifact))
    }

    fn run<T: DeserializeOwned>(&self, subcommand: &str, args: &[OsString]) -> Result<T> {
        let mut command = Command::new(&self.config.learner_bin);
        command.arg(subcommand);
        command.args(args);

        if let Some(ref dir) = self.config.working_dir {
            command.current_dir(dir);
        }

        debug!(subcommand, ?args, "invoking learner");
        let output = execute_with_timeout(&mut command, self.config.timeout)
            .with_context(|| format!("Failed to execute: learner {subcommand}"))?;
        parse_reply(subcommand, &output)
    }
}

fn flag(name: &str, value: impl Into<OsString>) -> [OsString; 2] {
    [OsString::from(name), value.into()]
}

impl Learner for ProcessLearner {
    fn test_suite(
        &mut self,
        model: &ModelHandle,
        method: SamplingMethod,
        num_tests: usize,
    ) -> Result<TestSuite> {
        let path = self.artifact(&format!("tests-{}", method.as_str()), "json");
        let args = [
            flag("--model", &model.path),
            flag("--method", method.as_str()),
            flag("--num-tests", num_tests.to_string()),
            flag("--output", &path),
        ]
        .concat();
        let reply: TestSuiteReply = self.run("test-suite", &args)?;
        Ok(TestSuite {
            method,
            path,
            len: reply.test_cases,
            reference_size: reply.model_size,
        })
    }

    fn lstar(&mut self, model: &ModelHandle, oracle: OracleParams) -> Result<LStarRun> {
        let path = self.artifact("lstar", "dot");
        let args = [
            flag("--model", &model.path),
            flag("--walks-per-state", oracle.walks_per_state.to_string()),
            flag("--walk-len", oracle.walk_len.to_string()),
            flag("--output", &path),
        ]
        .concat();
        let counts: LStarCounts = self.run("lstar", &args)?;
        Ok(LStarRun {
            model: LearnedModel {
                path,
                size: counts.model_size,
            },
            counts,
        })
    }

    fn sample(&mut self, model: &ModelHandle, request: &SampleRequest) -> Result<Sample> {
        let path = self.artifact("sample", "json");
        let mut args = flag("--model", &model.path).to_vec();
        match *request {
            SampleRequest::Random {
                num_sequences,
                min_len,
                max_len,
            } => {
                args.extend(flag("--strategy", "random"));
                args.extend(flag("--num-sequences", num_sequences.to_string()));
                args.extend(flag("--min-len", min_len.to_string()));
                args.extend(flag("--max-len", max_len.to_string()));
            }
            SampleRequest::CharSet { minimized } => {
                args.extend(flag("--strategy", "char-set"));
                if minimized {
                    args.push("--minimized".into());
                }
                args.push("--include-extended-s-set".into());
            }
        }
        args.extend(flag("--output", &path));

        let reply: SampleReply = self.run("sample", &args)?;
        Ok(Sample {
            path,
            size: reply.size,
            average_len: reply.average_len,
        })
    }

    fn rpni(&mut self, sample: &Sample) -> Result<LearnedModel> {
        let path = self.artifact("rpni", "dot");
        let args = [flag("--data", &sample.path), flag("--output", &path)].concat();
        let reply: ModelReply = self.run("rpni", &args)?;
        Ok(LearnedModel {
            path,
            size: reply.model_size,
        })
    }

    fn cached_lstar(&mut self, model: &ModelHandle, sample: &Sample) -> Result<CachedLStarRun> {
        let path = self.artifact("cached-lstar", "dot");
        let args = [
            flag("--model", &model.path),
            flag("--data", &sample.path),
            flag("--output", &path),
        ]
        .concat();
        let reply: CachedLStarReply = self.run("cached-lstar", &args)?;
        Ok(CachedLStarRun {
            model: LearnedModel {
                path,
                size: reply.model_size,
            },
            performed_queries: reply.performed_queries,
            cache_hits: reply.cache_hits,
            learning_rounds: reply.learning_rounds,
        })
    }

    fn disagreement(
        &mut self,
        reference: &ModelHandle,
        candidate: &LearnedModel,
        suite: &TestSuite,
    ) -> Result<Option<f64>> {
        let args = [
            flag("--reference", &reference.path),
            flag("--candidate", &candidate.path),
            flag("--test-suite", &suite.path),
        ]
        .concat();
        let reply: CompareReply = self.run("compare", &args)?;
        reply.into_disagreement()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn execute_with_timeout(command: &mut Command, timeout: Duration) -> Result<Output> {
    use std::io::Read;
    use std::thread;

    let mut child = command
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .context("Failed to spawn learner process")?;

    // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
    let stdout = child.stdout.take().map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = s.read_to_end(&mut buf);
            buf
        })
    });
    let stderr = child.stderr.take().map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = s.read_to_end(&mut buf);
            buf
        })
    });

    let timeout_ms = timeout.as_millis() as u64;
    let start = std::time::Instant::now();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(anyhow!("Command timed out after {timeout_ms}ms"));
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(anyhow!("Error waiting for process: {e}")),
        }
    };

    let collect = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn parse_reply<T: DeserializeOwned>(subcommand: &str, output: &Output) -> Result<T> {
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "learner {subcommand} exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }

    serde_json::from_str(stdout.trim()).with_context(|| {
        format!(
            "Failed to parse learner {subcommand} JSON: {}",
            stdout.chars().take(200).collect::<String>()
        )
    })
}

/// Checks that the learner runs and returns its version string.
pub fn check_learner_available(config: &LearnerConfig) -> Result<String> {
    let output = Command::new(&config.learner_bin)
        .arg("--version")
        .output()
        .context("Failed to run learner --version")?;

    if output.status.success() {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(version)
    } else {
        Err(anyhow!(
            "learner returned non-zero: {}",
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}

/// Finds the learner binary: `LEARNER_BIN`, then `learner` on `PATH`.
pub fn find_learner_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LEARNER_BIN") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    if Command::new("learner").arg("--version").output().is_ok() {
        return Some(PathBuf::from("learner"));
    }

    None
}
