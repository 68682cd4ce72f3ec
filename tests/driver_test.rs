//! End-to-end runs of the driver against a scripted learner.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use pretty_assertions::assert_eq;

use learning_eval::config::{EvalConfig, Family, SweepConfig, Verbosity};
use learning_eval::driver::run;
use learning_eval::learner::{
    CachedLStarRun, LStarRun, LearnedModel, Learner, ModelHandle, OracleParams, Sample,
    SampleRequest, SamplingMethod, TestSuite,
};
use learning_eval::records::{LStarCounts, ModelName};

const FIRST: LStarCounts = LStarCounts {
    model_size: 5,
    output_queries: 10,
    steps_output_queries: 50,
    eq_oracle_queries: 5,
    steps_eq_queries: 20,
    learning_rounds: 3,
};

const SECOND: LStarCounts = LStarCounts {
    model_size: 5,
    output_queries: 12,
    steps_output_queries: 55,
    eq_oracle_queries: 6,
    steps_eq_queries: 22,
    learning_rounds: 4,
};

/// Deterministic stand-in for the external learner.
///
/// L* alternates between two fixed outcomes; RPNI models always conform,
/// except for the RPNI calls listed in `mismatched_rpni_calls`, which get a
/// different input alphabet. With two repeats and three strategies, RPNI
/// calls 0..=5 are the strategy trials, call 6 is the baseline and later
/// calls belong to the parameter sweep.
#[derive(Default)]
struct ScriptedLearner {
    lstar_calls: usize,
    rpni_calls: usize,
    cached_calls: u64,
    requests: Vec<SampleRequest>,
    failing_model: Option<&'static str>,
    mismatched_rpni_calls: Vec<usize>,
    reference_size: Option<u64>,
}

impl Learner for ScriptedLearner {
    fn test_suite(
        &mut self,
        _model: &ModelHandle,
        method: SamplingMethod,
        num_tests: usize,
    ) -> Result<TestSuite> {
        Ok(TestSuite {
            method,
            path: PathBuf::from(format!("suite-{}", method.as_str())),
            len: num_tests,
            reference_size: self.reference_size.unwrap_or(5),
        })
    }

    fn lstar(&mut self, model: &ModelHandle, _oracle: OracleParams) -> Result<LStarRun> {
        if self.failing_model == Some(model.name.as_str()) {
            bail!("learner crashed on {}", model.name);
        }
        let counts = if self.lstar_calls % 2 == 0 { FIRST } else { SECOND };
        self.lstar_calls += 1;
        Ok(LStarRun {
            model: LearnedModel {
                path: PathBuf::from("lstar"),
                size: counts.model_size,
            },
            counts,
        })
    }

    fn sample(&mut self, _model: &ModelHandle, request: &SampleRequest) -> Result<Sample> {
        self.requests.push(request.clone());
        Ok(match *request {
            SampleRequest::Random { num_sequences, .. } => Sample {
                path: PathBuf::from(format!("random-{num_sequences}")),
                size: num_sequences,
                average_len: 3.0,
            },
            SampleRequest::CharSet { .. } => Sample {
                path: PathBuf::from("char-set"),
                size: 40,
                average_len: 2.5,
            },
        })
    }

    fn rpni(&mut self, _sample: &Sample) -> Result<LearnedModel> {
        let call = self.rpni_calls;
        self.rpni_calls += 1;
        Ok(LearnedModel {
            path: PathBuf::from(format!("rpni-{call}")),
            size: 4,
        })
    }

    fn cached_lstar(&mut self, _model: &ModelHandle, _sample: &Sample) -> Result<CachedLStarRun> {
        self.cached_calls += 1;
        Ok(CachedLStarRun {
            model: LearnedModel {
                path: PathBuf::from("cached"),
                size: 5,
            },
            performed_queries: 30,
            cache_hits: 10 + self.cached_calls,
            learning_rounds: 2,
        })
    }

    fn disagreement(
        &mut self,
        _reference: &ModelHandle,
        candidate: &LearnedModel,
        suite: &TestSuite,
    ) -> Result<Option<f64>> {
        let name = candidate.path.to_string_lossy();
        if let Some(call) = name.strip_prefix("rpni-") {
            let call: usize = call.parse()?;
            if self.mismatched_rpni_calls.contains(&call) {
                return Ok(None);
            }
            return Ok(Some(0.0));
        }
        Ok(Some(match (&*name, suite.method) {
            ("lstar", SamplingMethod::Random) => 0.02,
            _ => 0.0,
        }))
    }
}

fn models(names: &[&str]) -> Vec<ModelHandle> {
    names
        .iter()
        .map(|name| ModelHandle {
            name: ModelName::new(*name),
            path: PathBuf::from(format!("{name}.dot")),
        })
        .collect()
}

fn config(output_dir: &Path) -> EvalConfig {
    EvalConfig {
        benchmark: "bench".to_string(),
        output_dir: output_dir.to_path_buf(),
        verbosity: Verbosity::Silent,
        ..Default::default()
    }
}

fn read_table(path: &Path) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap()
        .records()
        .map(|r| r.unwrap().iter().map(ToString::to_string).collect())
        .collect()
}

fn find_row<'a>(table: &'a [Vec<String>], prefix: &[&str]) -> &'a [String] {
    table
        .iter()
        .find(|row| row.iter().zip(prefix).all(|(cell, p)| cell == p))
        .unwrap_or_else(|| panic!("no row starting with {prefix:?}"))
}

#[test]
fn test_full_run_writes_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut learner = ScriptedLearner::default();

    let (report, _) = run(&config, &mut learner, &models(&["m1", "m2"])).unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed, vec![ModelName::new("m1"), ModelName::new("m2")]);
    assert_eq!(report.written.len(), 3);

    let lstar = read_table(&config.table_path(Family::LStar));
    assert_eq!(lstar[0], vec!["", "m1", "m2"]);
    assert_eq!(lstar.len(), 12);
    assert_eq!(find_row(&lstar, &["States"]), ["States", "5.00 (0.00)", "5.00 (0.00)"]);
    assert_eq!(
        find_row(&lstar, &["Learning rounds"]),
        ["Learning rounds", "3.50 (0.71)", "3.50 (0.71)"]
    );
    assert_eq!(
        find_row(&lstar, &["Conformance (random) %"])[1],
        "98.00 (0.00)"
    );

    let rpni = read_table(&config.table_path(Family::Rpni));
    assert_eq!(rpni[0], vec!["", "", "m1", "m2"]);
    assert_eq!(rpni.len(), 1 + 4 * 6);
    assert_eq!(rpni[1][..2], ["l* data (minimized)", "States"]);
    assert_eq!(
        find_row(&rpni, &["l* data (minimized)", "Data size"])[2],
        "40.00 (0.00)"
    );
    assert_eq!(
        find_row(&rpni, &["random 2*|l* data|", "Data size"])[2],
        "32.00 (0.00)"
    );
    assert_eq!(
        find_row(&rpni, &["random |l* data|", "Correctly learned model"])[3],
        "2.00 (0.00)"
    );

    let cached = read_table(&config.table_path(Family::CachedLStar));
    assert_eq!(cached.len(), 6);
    assert_eq!(find_row(&cached, &["Random sample"])[1], "16.00 (0.00)");
    assert_eq!(find_row(&cached, &["Active queries"])[2], "30.00 (0.00)");
}

#[test]
fn test_sample_sizes_follow_lstar_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut learner = ScriptedLearner::default();

    run(&config, &mut learner, &models(&["m1"])).unwrap();

    // mean sum_queries = 16.5 -> 16; mean trace length 4.47 -> max_len 8
    let per_trial = [
        SampleRequest::Random {
            num_sequences: 16,
            min_len: 1,
            max_len: 8,
        },
        SampleRequest::Random {
            num_sequences: 32,
            min_len: 1,
            max_len: 8,
        },
        SampleRequest::Random {
            num_sequences: 16,
            min_len: 5,
            max_len: 10,
        },
    ];
    let mut expected = [per_trial.clone(), per_trial].concat();
    expected.push(SampleRequest::CharSet { minimized: true });
    assert_eq!(learner.requests, expected);
}

#[test]
fn test_incomplete_trials_are_excluded_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvalConfig {
        repeats: 3,
        report_incomplete: true,
        ..config(dir.path())
    };
    let mut learner = ScriptedLearner {
        mismatched_rpni_calls: vec![1],
        ..Default::default()
    };

    let (report, _) = run(&config, &mut learner, &models(&["m1"])).unwrap();
    assert!(report.is_success());

    let rpni = read_table(&config.table_path(Family::Rpni));
    assert_eq!(rpni.len(), 1 + 4 * 7);
    assert_eq!(
        find_row(&rpni, &["random 2*|l* data|", "Incomplete trials"])[2],
        "1.00 (0.00)"
    );
    assert_eq!(
        find_row(&rpni, &["random 2*|l* data|", "Correctly learned model"])[2],
        "2.00 (0.00)"
    );
    assert_eq!(
        find_row(&rpni, &["random |l* data|", "Incomplete trials"])[2],
        "0.00 (0.00)"
    );
}

#[test]
fn test_single_comparable_trial_marks_strategy_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut learner = ScriptedLearner {
        mismatched_rpni_calls: vec![1],
        ..Default::default()
    };

    let (report, _) = run(&config, &mut learner, &models(&["m1"])).unwrap();
    assert!(report.is_success());

    let rpni = read_table(&config.table_path(Family::Rpni));
    assert_eq!(rpni.len(), 1 + 4 * 6);
    assert_eq!(find_row(&rpni, &["random 2*|l* data|", "Data size"])[2], "n/a");
    assert_eq!(
        find_row(&rpni, &["random 2*|l* data|", "Correctly learned model"])[2],
        "1.00 (0.00)"
    );
    assert_eq!(
        find_row(&rpni, &["random |l* data|", "Data size"])[2],
        "16.00 (0.00)"
    );

    let lstar = read_table(&config.table_path(Family::LStar));
    assert_eq!(lstar[0], vec!["", "m1"]);
}

#[test]
fn test_incomplete_baseline_keeps_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvalConfig {
        report_incomplete: true,
        ..config(dir.path())
    };
    let mut learner = ScriptedLearner {
        mismatched_rpni_calls: vec![6],
        ..Default::default()
    };

    let (report, _) = run(&config, &mut learner, &models(&["m1"])).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    let rpni = read_table(&config.table_path(Family::Rpni));
    assert_eq!(find_row(&rpni, &["l* data (minimized)", "States"])[2], "n/a");
    assert_eq!(
        find_row(&rpni, &["l* data (minimized)", "Incomplete trials"])[2],
        "1.00 (0.00)"
    );
    assert_eq!(
        find_row(&rpni, &["l* data (minimized)", "Correctly learned model"])[2],
        "0.00 (0.00)"
    );

    let lstar = read_table(&config.table_path(Family::LStar));
    assert_eq!(lstar[0], vec!["", "m1"]);
    let cached = read_table(&config.table_path(Family::CachedLStar));
    assert_eq!(cached[0], vec!["", "m1"]);
}

#[test]
fn test_long_traces_use_reference_size() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut learner = ScriptedLearner {
        reference_size: Some(9),
        ..Default::default()
    };

    run(&config, &mut learner, &models(&["m1"])).unwrap();

    assert!(learner.requests.contains(&SampleRequest::Random {
        num_sequences: 16,
        min_len: 9,
        max_len: 18,
    }));
}

#[test]
fn test_sweep_writes_heatmap() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvalConfig {
        sweep: Some(SweepConfig {
            query_multipliers: vec![1, 2],
            trace_lengths: vec![5, 7],
            length_spread: 2,
        }),
        ..config(dir.path())
    };
    let mut learner = ScriptedLearner {
        // 2x queries at trace length 5
        mismatched_rpni_calls: vec![9],
        ..Default::default()
    };

    let (report, _) = run(&config, &mut learner, &models(&["m1"])).unwrap();
    assert!(report.is_success());
    assert_eq!(report.written.len(), 4);

    let sweep_requests = &learner.requests[learner.requests.len() - 4..];
    assert_eq!(
        sweep_requests[2],
        SampleRequest::Random {
            num_sequences: 32,
            min_len: 3,
            max_len: 7,
        }
    );

    let heatmap = read_table(&config.table_path(Family::Heatmap));
    assert_eq!(
        heatmap,
        vec![
            vec!["m1", "Sample size", "16", "32"],
            vec!["m1", "5", "100.00", "n/a"],
            vec!["m1", "7", "100.00", "100.00"],
        ]
    );
}

#[test]
fn test_failure_stops_run_but_keeps_earlier_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut learner = ScriptedLearner {
        failing_model: Some("m2"),
        ..Default::default()
    };

    let (report, _) = run(&config, &mut learner, &models(&["m1", "m2", "m3"])).unwrap();

    assert_eq!(report.completed, vec![ModelName::new("m1")]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].model, ModelName::new("m2"));
    assert!(format!("{:#}", report.failures[0].error).contains("learner crashed on m2"));

    let lstar = read_table(&config.table_path(Family::LStar));
    assert_eq!(lstar[0], vec!["", "m1"]);
}

#[test]
fn test_keep_going_skips_failed_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvalConfig {
        keep_going: true,
        ..config(dir.path())
    };
    let mut learner = ScriptedLearner {
        failing_model: Some("m2"),
        ..Default::default()
    };

    let (report, tables) = run(&config, &mut learner, &models(&["m1", "m2", "m3"])).unwrap();

    assert_eq!(report.completed, vec![ModelName::new("m1"), ModelName::new("m3")]);
    assert_eq!(report.failures.len(), 1);
    let columns: Vec<_> = tables.rpni.models().map(ModelName::as_str).collect();
    assert_eq!(columns, ["m1", "m3"]);

    let cached = read_table(&config.table_path(Family::CachedLStar));
    assert_eq!(cached[0], vec!["", "m1", "m3"]);
}

#[test]
fn test_no_csv_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvalConfig {
        export_csv: false,
        ..config(dir.path())
    };
    let mut learner = ScriptedLearner::default();

    let (report, tables) = run(&config, &mut learner, &models(&["m1"])).unwrap();

    assert!(report.written.is_empty());
    assert!(!tables.lstar.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
