use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use surge_core::prelude::{AgentBailError, ScenarioClock, ShutdownSignalError};
use surge_instruments::{print_threshold_report, AggregateSnapshot, ReportConfig, ThresholdReport};
use surge_summary_model::{append_run_summary, RunStats, RunSummary, StageSummary, ThresholdSummary};

use crate::cli::ReporterOpt;
use crate::monitor::start_monitor;
use crate::phases::start_phase_driver;
use crate::progress::start_progress;
use crate::{
    context::{AgentContext, RunnerContext, UserValuesConstraint},
    definition::{ScenarioDefinition, ScenarioDefinitionBuilder},
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// How often a virtual user that is not needed yet checks whether it should start.
const INACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    agents_end_count: usize,
    snapshot: AggregateSnapshot,
    threshold_report: ThresholdReport,
}

impl RunOutcome {
    /// The number of virtual users that were still running when the run ended.
    pub fn agents_end_count(&self) -> usize {
        self.agents_end_count
    }

    pub fn snapshot(&self) -> &AggregateSnapshot {
        &self.snapshot
    }

    pub fn threshold_report(&self) -> &ThresholdReport {
        &self.threshold_report
    }

    pub fn passed(&self) -> bool {
        self.threshold_report.passed()
    }

    /// Turn failed thresholds into an error so that `main` exits with a non-zero status.
    pub fn ensure_passed(&self) -> anyhow::Result<()> {
        if self.passed() {
            return Ok(());
        }

        let violations = self
            .threshold_report
            .violations()
            .map(|violation| format!("  {violation}"))
            .collect::<Vec<_>>();

        Err(anyhow::anyhow!(
            "{} threshold(s) failed:\n{}",
            violations.len(),
            violations.join("\n")
        ))
    }
}

/// Run a scenario to completion.
///
/// Configuration errors and setup hook errors are returned before any virtual user starts. Failed
/// thresholds are not an error here, see [RunOutcome::ensure_passed].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario: {} with {} stage(s) over {:?}, peak {} virtual users, {} ramp",
        definition.name(),
        definition.plan().stages().len(),
        definition.plan().total_duration(),
        definition.plan().peak_concurrency(),
        definition.plan().ramp_mode(),
    );
    for threshold in definition.thresholds() {
        log::debug!("Threshold: {threshold}");
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();

    let report_config = ReportConfig::new(run_id.clone(), definition.name().to_string());
    let report_config = match definition.reporter {
        ReporterOpt::Noop => report_config,
        ReporterOpt::InMemory => report_config.enable_summary(),
        ReporterOpt::OutcomeFile => report_config.enable_outcome_file(definition.outcome_dir.clone()),
    };
    let reporter = Arc::new(report_config.init_reporter(runtime.handle())?);

    let executor = Arc::new(Executor::new(
        runtime,
        shutdown_handle.clone(),
        definition.grace_period,
    ));
    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        shutdown_handle.clone(),
        definition.base_url.clone(),
        run_id.clone(),
        definition.request_timeout,
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);

    // The clock starts once setup is done so that setup time does not eat into the first stage.
    let clock = ScenarioClock::start(definition.plan().clone());
    start_phase_driver(
        runner_context.executor().handle(),
        clock.clone(),
        shutdown_handle.clone(),
    );

    if !definition.no_progress {
        start_progress(clock.clone(), shutdown_handle.new_listener());
    }

    // Ready to start spawning virtual users so start the resource monitor to report high usage
    // which might lead to a misleading outcome.
    start_monitor(shutdown_handle.new_listener());

    let agents_end_count = run_agents(&definition, &runner_context, &clock, &shutdown_handle)?;

    let elapsed = clock.elapsed();

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {e:?}");
        }
    }

    let snapshot = reporter.finalize(elapsed);
    let threshold_report = snapshot.evaluate(definition.thresholds());
    print_threshold_report(&threshold_report);

    let latency = snapshot.latency();
    log::info!(
        "{} requests in {:.1}s: p95 {:.2}ms, p99 {:.2}ms, error rate {:.4}, throughput {:.2}/s",
        snapshot.requests(),
        elapsed.as_secs_f64(),
        latency.p95_ms,
        latency.p99_ms,
        snapshot.error_rate(),
        snapshot.throughput(),
    );

    if let Some(summary_file) = &definition.summary_file {
        let summary = build_run_summary(
            &definition,
            run_id,
            started_at,
            agents_end_count,
            &snapshot,
            &threshold_report,
        );
        append_run_summary(summary, summary_file.clone())
            .with_context(|| format!("Failed to write run summary to {summary_file:?}"))?;
    }

    Ok(RunOutcome {
        agents_end_count,
        snapshot,
        threshold_report,
    })
}

/// Start one thread per unit of peak concurrency and wait for all of them to stop. Returns how
/// many virtual users were still running at the end.
fn run_agents<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    runner_context: &Arc<RunnerContext<RV>>,
    clock: &ScenarioClock,
    shutdown_handle: &surge_core::prelude::ShutdownHandle,
) -> anyhow::Result<usize> {
    let assigned_behaviours = definition.assigned_behaviours_flat();
    let agents_end_count = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for (agent_index, assigned_behaviour) in assigned_behaviours.iter().enumerate() {
        // Read access to the runner context for each virtual user
        let runner_context = runner_context.clone();
        let clock = clock.clone();
        let agents_end_count = agents_end_count.clone();

        let setup_agent_fn = definition.setup_agent_fn;
        let agent_behaviour_fn = definition.agent_behaviour.get(assigned_behaviour).cloned();
        let teardown_agent_fn = definition.teardown_agent_fn;
        let pacing = definition.pacing;

        // For us to check if the virtual user should stop between iterations
        let mut cycle_shutdown_receiver = shutdown_handle.new_listener();
        // For the behaviour implementation to listen for shutdown and respond appropriately
        let delegated_shutdown_listener = shutdown_handle.new_listener();

        let agent_name = format!("agent-{agent_index}");

        handles.push(
            std::thread::Builder::new()
                .name(agent_name.clone())
                .spawn(move || {
                    let executor = runner_context.executor().clone();
                    let mut context = AgentContext::new(
                        agent_index,
                        agent_name.clone(),
                        runner_context,
                        clock.clone(),
                        delegated_shutdown_listener,
                    );
                    if let Some(setup_agent_fn) = setup_agent_fn {
                        if let Err(e) = setup_agent_fn(&mut context) {
                            log::error!("Agent setup failed for agent {agent_name}: {e:?}");
                            return;
                        }
                    }

                    let mut bailed = false;
                    let mut active = false;
                    if let Some(behaviour) = agent_behaviour_fn {
                        loop {
                            if cycle_shutdown_receiver.should_shutdown() {
                                log::debug!("Stopping agent {agent_name}");
                                break;
                            }

                            // Lower indexes are active first, so ramping up starts agents in
                            // order and ramping down stops them in reverse.
                            if agent_index >= clock.target_concurrency() as usize {
                                if active {
                                    log::debug!("Agent {agent_name} idle at {:?}", clock.elapsed());
                                    active = false;
                                }
                                executor.sleep_unless_shutdown(INACTIVE_POLL_INTERVAL);
                                continue;
                            }
                            if !active {
                                log::debug!("Agent {agent_name} active at {:?}", clock.elapsed());
                                active = true;
                            }

                            match behaviour(&mut context) {
                                Ok(()) => {}
                                Err(e) if e.is::<ShutdownSignalError>() => {
                                    // Do nothing, this is expected if the run is being shut down.
                                    // The check at the top of the loop will catch this and break out.
                                }
                                Err(e) if e.is::<AgentBailError>() => {
                                    log::warn!("Agent {agent_name} bailed: {e}");
                                    bailed = true;
                                    break;
                                }
                                Err(e) => {
                                    log::error!("Agent behaviour failed for agent {agent_name}: {e:?}");
                                }
                            }

                            executor.sleep_unless_shutdown(pacing);
                        }
                    }

                    if let Some(teardown_agent_fn) = teardown_agent_fn {
                        if let Err(e) = teardown_agent_fn(&mut context) {
                            log::error!("Agent teardown failed for agent {agent_name}: {e:?}");
                        }
                    }

                    if !bailed {
                        agents_end_count.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .with_context(|| format!("Failed to spawn thread for agent-{agent_index}"))?,
        );
    }

    for handle in handles {
        handle
            .join()
            .map_err(|e| anyhow::anyhow!("Error joining thread for test agent: {:?}", e))?;
    }

    Ok(agents_end_count.load(Ordering::Relaxed))
}

fn build_run_summary<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    run_id: String,
    started_at: i64,
    agents_end_count: usize,
    snapshot: &AggregateSnapshot,
    threshold_report: &ThresholdReport,
) -> RunSummary {
    let plan = definition.plan();
    let stages = plan
        .stages()
        .iter()
        .map(|stage| StageSummary {
            duration_ms: stage.duration.as_millis() as u64,
            target: stage.target.max(0) as u32,
        })
        .collect();

    let mut summary = RunSummary::new(
        run_id,
        definition.name().to_string(),
        started_at,
        plan.total_duration().as_secs(),
        stages,
        plan.ramp_mode().to_string(),
        definition.assigned_behaviours_map(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.set_agent_end_count(agents_end_count);

    for result in &threshold_report.results {
        summary.add_threshold(ThresholdSummary {
            metric: result.metric.to_string(),
            expression: result.expression.clone(),
            actual: result.actual,
            passed: result.passed,
        });
    }

    if snapshot.requests() > 0 {
        let latency = snapshot.latency();
        summary.set_stats(RunStats {
            requests: snapshot.requests(),
            failed: snapshot.failed(),
            error_rate: snapshot.error_rate(),
            throughput: snapshot.throughput(),
            avg_ms: latency.avg_ms,
            p95_ms: latency.p95_ms,
            p99_ms: latency.p99_ms,
        });
    }

    for key in &definition.capture_env {
        if let Ok(value) = std::env::var(key) {
            summary.add_env(key.clone(), value);
        }
    }

    summary
}
