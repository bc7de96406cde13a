use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use surge_core::prelude::{RampMode, Stage, StagePlan};
use surge_instruments::Threshold;

use crate::cli::{ReporterOpt, SurgeScenarioCli};
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type AgentHookMut<RV, V> = fn(&mut AgentContext<RV, V>) -> HookResult;

/// Time each virtual user waits between iterations unless the scenario or CLI says otherwise.
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);
/// Time in-flight requests get to finish once the run has ended.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: SurgeScenarioCli,
    /// The stages used when none are given on the command line.
    default_stages: Vec<Stage>,
    default_ramp_mode: RampMode,
    default_pacing: Duration,
    default_grace_period: Duration,
    /// Thresholds as written by the scenario, as `(metric, expression)`. They are parsed by
    /// [ScenarioDefinitionBuilder::build] so that every problem is reported before the run starts.
    thresholds: Vec<(String, String)>,
    /// Environment variables to record in the run summary.
    capture_env: Vec<String>,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, which will be run once for each virtual user as it starts.
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    /// The behaviours for this scenario. There are two ways that this can be used:
    /// - Specify a single behaviour for all virtual users using [ScenarioDefinitionBuilder::use_agent_behaviour].
    /// - Specify multiple behaviours using [ScenarioDefinitionBuilder::use_named_agent_behaviour]. You then need to tell the runner how many virtual users you want to run each behaviour.
    agent_behaviour: HashMap<String, AgentHookMut<RV, V>>,
    /// Teardown hook for a virtual user, run once when it stops. Errors are logged and ignored.
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    /// Global teardown hook, run once after every virtual user has stopped. Errors are logged and ignored.
    teardown_fn: Option<GlobalHook<RV>>,
}

/// A validated scenario, ready to run.
pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) plan: Arc<StagePlan>,
    pub(crate) thresholds: Vec<Threshold>,
    pub(crate) assigned_behaviours: Vec<(String, usize)>,
    pub(crate) base_url: Option<String>,
    pub(crate) pacing: Duration,
    pub(crate) grace_period: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) no_progress: bool,
    pub(crate) reporter: ReporterOpt,
    pub(crate) outcome_dir: PathBuf,
    pub(crate) run_id: Option<String>,
    pub(crate) summary_file: Option<PathBuf>,
    pub(crate) capture_env: Vec<String>,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) agent_behaviour: HashMap<String, AgentHookMut<RV, V>>,
    pub(crate) teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and parsed command line
    /// arguments. See the [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: SurgeScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_stages: Vec::new(),
            default_ramp_mode: RampMode::default(),
            default_pacing: DEFAULT_PACING,
            default_grace_period: DEFAULT_GRACE_PERIOD,
            thresholds: Vec::new(),
            capture_env: Vec::new(),
            setup_fn: None,
            setup_agent_fn: None,
            agent_behaviour: HashMap::new(),
            teardown_agent_fn: None,
            teardown_fn: None,
        }
    }

    /// Initialise logging and parse the command line, then create the builder.
    ///
    /// Call this once, at the start of your scenario's `main` function.
    pub fn new_with_init(name: &str) -> anyhow::Result<Self> {
        env_logger::init();
        let cli = SurgeScenarioCli::parse();
        Ok(Self::new(name, cli))
    }

    /// Set the stages to run when none are given on the command line.
    pub fn with_default_stages(mut self, stages: Vec<Stage>) -> Self {
        self.default_stages = stages;
        self
    }

    /// Set how concurrency moves between stage targets when `--ramp` is not given.
    pub fn with_default_ramp_mode(mut self, ramp_mode: RampMode) -> Self {
        self.default_ramp_mode = ramp_mode;
        self
    }

    /// Set how long each virtual user waits between iterations when `--pacing` is not given.
    pub fn with_default_pacing(mut self, pacing: Duration) -> Self {
        self.default_pacing = pacing;
        self
    }

    pub fn with_default_grace_period(mut self, grace_period: Duration) -> Self {
        self.default_grace_period = grace_period;
        self
    }

    /// Add a threshold that the run must meet, for example
    /// `.with_threshold("http_req_duration", "p(95)<300")`.
    pub fn with_threshold(mut self, metric: &str, expression: &str) -> Self {
        self.thresholds
            .push((metric.to_string(), expression.to_string()));
        self
    }

    /// Record the value of this environment variable in the run summary, if it is set.
    pub fn add_capture_env(mut self, key: &str) -> Self {
        self.capture_env.push(key.to_string());
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_agent_fn] for this scenario.
    pub fn use_agent_setup(mut self, setup_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.setup_agent_fn = Some(setup_agent_fn);
        self
    }

    /// Set the default behaviour hook [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_agent_behaviour(self, behaviour: AgentHookMut<RV, V>) -> Self {
        self.use_named_agent_behaviour("default", behaviour)
    }

    /// Set a named behaviour hook [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_named_agent_behaviour(mut self, name: &str, behaviour: AgentHookMut<RV, V>) -> Self {
        let previous = self.agent_behaviour.insert(name.to_string(), behaviour);

        if previous.is_some() {
            panic!("Behaviour [{name}] is already defined");
        }

        self
    }

    pub fn use_agent_teardown(mut self, teardown_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.teardown_agent_fn = Some(teardown_agent_fn);
        self
    }

    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Apply the command line over the scenario defaults and validate the result.
    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let plan = self.stage_plan()?;

        let thresholds = self
            .thresholds
            .iter()
            .map(|(metric, expression)| Threshold::parse(metric, expression))
            .collect::<Result<Vec<_>, _>>()?;

        let assigned_behaviours =
            assign_behaviours(&self.cli.behaviour, &self.agent_behaviour, plan.peak_concurrency())?;

        Ok(ScenarioDefinition {
            name: self.name,
            plan: Arc::new(plan),
            thresholds,
            assigned_behaviours,
            base_url: self.cli.base_url,
            pacing: self.cli.pacing.unwrap_or(self.default_pacing),
            grace_period: self.cli.grace_period.unwrap_or(self.default_grace_period),
            request_timeout: self.cli.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            outcome_dir: self.cli.outcome_dir,
            run_id: self.cli.run_id,
            summary_file: self.cli.summary_file,
            capture_env: self.capture_env,
            setup_fn: self.setup_fn,
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour: self.agent_behaviour,
            teardown_agent_fn: self.teardown_agent_fn,
            teardown_fn: self.teardown_fn,
        })
    }

    fn stage_plan(&self) -> anyhow::Result<StagePlan> {
        let ramp_mode = self
            .cli
            .ramp
            .map(RampMode::from)
            .unwrap_or(self.default_ramp_mode);

        if !self.cli.stage.is_empty() {
            return Ok(StagePlan::new(self.cli.stage.clone(), ramp_mode)?);
        }

        if self.cli.agents.is_some() || self.cli.duration.is_some() {
            let defaults = StagePlan::new(self.default_stages.clone(), ramp_mode).ok();
            let agents = self
                .cli
                .agents
                .or(defaults.as_ref().map(|plan| plan.peak_concurrency()))
                .unwrap_or(1);
            let duration = self
                .cli
                .duration
                .or(defaults.as_ref().map(|plan| plan.total_duration()))
                .context("A duration is required to run a constant load without default stages")?;

            return Ok(StagePlan::constant(duration, agents)?);
        }

        Ok(StagePlan::new(self.default_stages.clone(), ramp_mode)?)
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinition<RV, V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> &Arc<StagePlan> {
        &self.plan
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// The behaviour name for each virtual user, indexed by virtual user index.
    ///
    /// Behaviours are spread across the indexes in proportion to their counts, so any number of
    /// active virtual users (the lowest indexes) runs close to the configured mix.
    pub(crate) fn assigned_behaviours_flat(&self) -> Vec<String> {
        interleave_behaviours(&self.assigned_behaviours)
    }

    pub(crate) fn assigned_behaviours_map(&self) -> HashMap<String, usize> {
        self.assigned_behaviours.iter().cloned().collect()
    }
}

/// Work out how many virtual users run each behaviour. Every virtual user without a named
/// assignment runs the default behaviour.
fn assign_behaviours<H>(
    requested: &[(String, usize)],
    available: &HashMap<String, H>,
    peak_concurrency: u32,
) -> anyhow::Result<Vec<(String, usize)>> {
    let peak_concurrency = peak_concurrency as usize;

    let mut assigned = Vec::new();
    let mut total = 0usize;
    for (name, count) in requested {
        if !available.contains_key(name) {
            anyhow::bail!("Behaviour [{name}] is not defined by this scenario");
        }
        total += count;
        assigned.push((name.clone(), *count));
    }

    if total > peak_concurrency {
        anyhow::bail!(
            "{total} virtual users were assigned behaviours but the stages never run more than {peak_concurrency}"
        );
    }

    if total < peak_concurrency {
        assigned.push(("default".to_string(), peak_concurrency - total));
    }

    Ok(assigned)
}

/// Each index goes to the behaviour that has used the smallest share of its count so far. Ties go
/// to the behaviour listed first.
fn interleave_behaviours(assigned: &[(String, usize)]) -> Vec<String> {
    let total: usize = assigned.iter().map(|(_, count)| count).sum();
    let mut used = vec![0usize; assigned.len()];

    let mut flat = Vec::with_capacity(total);
    for _ in 0..total {
        // used[a] / count[a] < used[b] / count[b], without dividing
        let next = assigned
            .iter()
            .enumerate()
            .filter(|(i, (_, count))| used[*i] < *count)
            .min_by(|(a, (_, a_count)), (b, (_, b_count))| {
                let a_share = used[*a] as u128 * *b_count as u128;
                let b_share = used[*b] as u128 * *a_count as u128;
                a_share.cmp(&b_share).then(a.cmp(b))
            })
            .map(|(i, _)| i);

        let Some(i) = next else {
            break;
        };
        used[i] += 1;
        flat.push(assigned[i].0.clone());
    }

    flat
}
