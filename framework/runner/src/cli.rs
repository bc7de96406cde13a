use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use surge_core::prelude::{RampMode, Stage};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct SurgeScenarioCli {
    /// The base URL of the service to put under load.
    #[clap(long)]
    pub base_url: Option<String>,

    /// Add a stage to the load profile, in the format `duration:target`. For example
    /// `--stage=30s:50` ramps to 50 virtual users over 30 seconds.
    ///
    /// Use the flag multiple times to build up a profile, the stages run in the order given. When any
    /// stage is given, the scenario's default stages are ignored.
    #[clap(long, value_parser = parse_stage, conflicts_with_all = ["agents", "duration"])]
    pub stage: Vec<Stage>,

    /// Hold a constant number of virtual users instead of following the staged profile.
    ///
    /// Defaults to the peak of the scenario's stages when only `--duration` is given.
    #[clap(long)]
    pub agents: Option<u32>,

    /// How long to hold a constant load for, for example `90s` or `5m`. A plain number is read as
    /// seconds.
    ///
    /// Defaults to the total duration of the scenario's stages when only `--agents` is given.
    #[clap(long, value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Assign a behaviour to a number of virtual users. Specify the behaviour and number of virtual
    /// users to assign it to in the format `behaviour:count`. For example `--behaviour=evaluate:5`.
    ///
    /// Specifying the count is optional and will default to 1.
    ///
    /// The total assigned must be less than or equal to the peak number of virtual users. Any
    /// remaining virtual users are assigned the default behaviour.
    #[clap(long, short, value_parser = parse_agent_behaviour)]
    pub behaviour: Vec<(String, usize)>,

    /// How the number of virtual users moves between stage targets.
    #[arg(long, value_enum)]
    pub ramp: Option<RampOpt>,

    /// Pause each virtual user for this long after every iteration.
    #[clap(long, value_parser = parse_duration_arg)]
    pub pacing: Option<Duration>,

    /// Give up on a request after this long. Defaults to 60s.
    #[clap(long, value_parser = parse_duration_arg)]
    pub request_timeout: Option<Duration>,

    /// How long requests that are in flight when the run ends may take to complete before they are
    /// cancelled.
    #[clap(long, value_parser = parse_duration_arg)]
    pub grace_period: Option<Duration>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// The reporter to use.
    #[arg(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// The directory that the outcome-file reporter writes to.
    #[arg(long, default_value = "outcomes")]
    pub outcome_dir: PathBuf,

    /// Set the ID of this run
    ///
    /// If not set, a random ID is used.
    #[arg(long, short)]
    pub run_id: Option<String>,

    /// Append a JSON summary of the run to this file.
    #[arg(long)]
    pub summary_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Only the threshold report and totals are printed.
    Noop,
    /// Also print tables of operations, checks and status codes at the end of the run.
    InMemory,
    /// Also write every outcome to a JSON lines file.
    OutcomeFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RampOpt {
    Linear,
    Step,
}

impl From<RampOpt> for RampMode {
    fn from(value: RampOpt) -> Self {
        match value {
            RampOpt::Linear => RampMode::Linear,
            RampOpt::Step => RampMode::Step,
        }
    }
}

pub fn parse_agent_behaviour(s: &str) -> anyhow::Result<(String, usize)> {
    let mut parts = s.split(':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or(anyhow::anyhow!("No name specified for behaviour"))?;

    let count = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);

    Ok((name, count))
}

/// Parse a `duration:target` stage. The target may be negative here so that the stage plan can
/// report it properly.
pub fn parse_stage(s: &str) -> anyhow::Result<Stage> {
    let (duration, target) = s
        .rsplit_once(':')
        .ok_or(anyhow::anyhow!("Expected a stage in the format `duration:target`"))?;

    let duration = parse_duration_arg(duration)?;
    let target = target
        .trim()
        .parse::<i64>()
        .map_err(|e| anyhow::anyhow!("Invalid stage target `{target}`: {e}"))?;

    Ok(Stage::new(duration, target))
}

pub fn parse_duration_arg(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s).map_err(|e| anyhow::anyhow!("Invalid duration `{s}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_stages() {
        assert_eq!(
            Stage::new(Duration::from_secs(30), 50),
            parse_stage("30s:50").unwrap()
        );
        assert_eq!(
            Stage::new(Duration::from_secs(90), 0),
            parse_stage("1m 30s:0").unwrap()
        );
        assert_eq!(
            Stage::new(Duration::from_secs(10), -5),
            parse_stage("10:-5").unwrap()
        );
        assert!(parse_stage("30s").is_err());
        assert!(parse_stage("soon:10").is_err());
        assert!(parse_stage("30s:many").is_err());
    }

    #[test]
    fn parse_behaviours() {
        assert_eq!(
            ("evaluate".to_string(), 5),
            parse_agent_behaviour("evaluate:5").unwrap()
        );
        assert_eq!(
            ("evaluate".to_string(), 1),
            parse_agent_behaviour("evaluate").unwrap()
        );
        assert!(parse_agent_behaviour("").is_err());
    }

    #[test]
    fn parse_cli_flags() {
        let cli = SurgeScenarioCli::try_parse_from([
            "scenario",
            "--base-url",
            "http://localhost:9000",
            "--stage",
            "30s:50",
            "--stage",
            "1m:100",
            "--ramp",
            "step",
            "--pacing",
            "250ms",
            "--reporter",
            "noop",
        ])
        .unwrap();

        assert_eq!(Some("http://localhost:9000".to_string()), cli.base_url);
        assert_eq!(2, cli.stage.len());
        assert_eq!(Some(RampOpt::Step), cli.ramp);
        assert_eq!(Some(Duration::from_millis(250)), cli.pacing);
        assert_eq!(ReporterOpt::Noop, cli.reporter);
    }

    #[test]
    fn stages_conflict_with_constant_load() {
        assert!(SurgeScenarioCli::try_parse_from([
            "scenario", "--stage", "30s:50", "--agents", "10"
        ])
        .is_err());
    }
}
