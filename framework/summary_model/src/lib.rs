use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// One configured stage, as it was used for the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSummary {
    /// Stage duration in milliseconds
    pub duration_ms: u64,
    /// Target number of virtual users at the end of the stage
    pub target: u32,
}

/// The outcome of one threshold at the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub metric: String,
    pub expression: String,
    pub actual: f64,
    pub passed: bool,
}

/// Headline statistics for the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunStats {
    pub requests: u64,
    pub failed: u64,
    pub error_rate: f64,
    /// Requests per second over the run
    pub throughput: f64,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The total duration of the stage plan, in seconds
    ///
    /// The run may have finished sooner if it was stopped by the user.
    pub run_duration: u64,
    /// The stages that drove the run
    pub stages: Vec<StageSummary>,
    /// `linear` or `step`
    pub ramp_mode: String,
    /// The largest number of virtual users the stage plan asks for
    pub peak_concurrency: u32,
    /// The number of virtual users still running at the end of the run
    ///
    /// Less than [RunSummary::peak_concurrency] if some virtual users bailed.
    pub agent_end_count: usize,
    /// The behaviour configuration
    ///
    /// This is the number of virtual users that were assigned to each behaviour.
    pub assigned_behaviours: HashMap<String, usize>,
    /// Every threshold with its result
    pub thresholds: Vec<ThresholdSummary>,
    /// Statistics for the run, if any requests were made
    pub stats: Option<RunStats>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Surge that was used for this run
    pub surge_version: String,
}

impl RunSummary {
    /// Create a new run summary
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        run_duration: u64,
        stages: Vec<StageSummary>,
        ramp_mode: String,
        assigned_behaviours: HashMap<String, usize>,
        surge_version: String,
    ) -> Self {
        let peak_concurrency = stages
            .iter()
            .map(|stage| stage.target)
            .max()
            .unwrap_or_default();

        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration,
            stages,
            ramp_mode,
            peak_concurrency,
            agent_end_count: 0,
            assigned_behaviours,
            thresholds: Vec::with_capacity(0),
            stats: None,
            env: HashMap::with_capacity(0),
            surge_version,
        }
    }

    /// Set the agent end count
    pub fn set_agent_end_count(&mut self, agent_end_count: usize) {
        self.agent_end_count = agent_end_count;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    pub fn add_threshold(&mut self, threshold: ThresholdSummary) {
        self.thresholds.push(threshold);
    }

    pub fn set_stats(&mut self, stats: RunStats) {
        self.stats = Some(stats);
    }

    /// Whether every threshold passed. True when there were no thresholds.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|threshold| threshold.passed)
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Stages and ramp mode
    ///     - Assigned behaviours
    ///     - Threshold expressions
    ///     - Selected environment variables
    ///     - Surge version
    ///
    /// Results are not part of the fingerprint, so runs with the same configuration can be
    /// compared. The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        self.stages.iter().for_each(|stage| {
            Digest::update(&mut hasher, stage.duration_ms.to_le_bytes());
            Digest::update(&mut hasher, stage.target.to_le_bytes());
        });
        Digest::update(&mut hasher, self.ramp_mode.as_bytes());
        self.assigned_behaviours
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.to_le_bytes());
            });
        self.thresholds
            .iter()
            .map(|threshold| (threshold.metric.as_str(), threshold.expression.as_str()))
            .sorted()
            .for_each(|(metric, expression)| {
                Digest::update(&mut hasher, metric.as_bytes());
                Digest::update(&mut hasher, expression.as_bytes());
            });
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.surge_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(behaviours: &[(&str, usize)]) -> RunSummary {
        let mut summary = RunSummary::new(
            "run-1".to_string(),
            "expression_evaluation".to_string(),
            1_700_000_000,
            210,
            vec![
                StageSummary {
                    duration_ms: 30_000,
                    target: 50,
                },
                StageSummary {
                    duration_ms: 60_000,
                    target: 100,
                },
            ],
            "linear".to_string(),
            behaviours
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            "0.1.0".to_string(),
        );
        summary.add_threshold(ThresholdSummary {
            metric: "http_req_duration".to_string(),
            expression: "p(95)<300".to_string(),
            actual: 52.1,
            passed: true,
        });
        summary
    }

    #[test]
    fn peak_concurrency_from_stages() {
        assert_eq!(100, summary(&[]).peak_concurrency);
    }

    #[test]
    fn fingerprint_ignores_behaviour_order() {
        let a = summary(&[("default", 80), ("heavy", 20)]);
        let b = summary(&[("heavy", 20), ("default", 80)]);

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_results() {
        let a = summary(&[("default", 100)]);
        let mut b = a.clone();
        b.run_id = "run-2".to_string();
        b.thresholds[0].actual = 900.0;
        b.thresholds[0].passed = false;
        b.set_stats(RunStats {
            requests: 10,
            ..Default::default()
        });

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_configuration() {
        let a = summary(&[("default", 100)]);
        let mut b = a.clone();
        b.ramp_mode = "step".to_string();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn append_and_load_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");

        let first = summary(&[("default", 100)]);
        let mut second = first.clone();
        second.run_id = "run-2".to_string();
        second.set_agent_end_count(99);

        append_run_summary(first.clone(), path.clone()).unwrap();
        append_run_summary(second.clone(), path.clone()).unwrap();

        assert_eq!(vec![first, second], load_summary_runs(path).unwrap());
    }
}
