use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use surge_runner::prelude::{RampOpt, ReporterOpt, Stage, SurgeScenarioCli};
use surge_runner::{parse_agent_behaviour, parse_duration_arg, parse_stage};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct RuleEngineScenarioCli {
    /// The base URL of the rule engine API.
    #[clap(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Add a stage to the load profile, in the format `duration:target`. For example
    /// `--stage=30s:50` ramps to 50 virtual users over 30 seconds.
    ///
    /// When any stage is given, the scenario's default stages are ignored.
    #[clap(long, value_parser = parse_stage, conflicts_with_all = ["agents", "duration"])]
    pub stage: Vec<Stage>,

    /// Hold a constant number of virtual users instead of following the staged profile.
    #[clap(long)]
    pub agents: Option<u32>,

    /// How long to hold a constant load for, for example `90s` or `5m`.
    #[clap(long, value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Assign a behaviour to a number of virtual users in the format `behaviour:count`.
    ///
    /// Any virtual users that are not assigned are given the default behaviour.
    #[clap(long, short, value_parser = parse_agent_behaviour)]
    pub behaviour: Vec<(String, usize)>,

    /// How the number of virtual users moves between stage targets.
    #[arg(long, value_enum)]
    pub ramp: Option<RampOpt>,

    /// Pause each virtual user for this long after every request.
    #[clap(long, value_parser = parse_duration_arg)]
    pub pacing: Option<Duration>,

    /// Give up on a request after this long.
    #[clap(long, value_parser = parse_duration_arg)]
    pub request_timeout: Option<Duration>,

    /// How long requests that are in flight when the run ends may take to complete.
    #[clap(long, value_parser = parse_duration_arg)]
    pub grace_period: Option<Duration>,

    /// Do not show a progress bar on the CLI.
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

impl TryInto<SurgeScenarioCli> for RuleEngineScenarioCli {
    type Error = anyhow::Error;

    fn try_into(self) -> Result<SurgeScenarioCli, Self::Error> {
        let base_url = url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("The base URL must use http or https: {base_url}");
        }

        Ok(SurgeScenarioCli {
            base_url: Some(self.base_url),
            stage: self.stage,
            agents: self.agents,
            duration: self.duration,
            behaviour: self.behaviour,
            ramp: self.ramp,
            pacing: self.pacing,
            request_timeout: self.request_timeout,
            grace_period: self.grace_period,
            no_progress: self.no_progress,
            reporter: self.reporter,
            outcome_dir: self.outcome_dir,
            run_id: self.run_id,
            summary_file: self.summary_file,
        })
    }
}
