use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use surge_core::prelude::{DelegatedShutdownListener, ScenarioClock, ShutdownHandle};
use surge_instruments::Reporter;

use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// The context shared by every virtual user in a run.
///
/// It is mutable during the setup hook and read-only once virtual users are running. Put anything
/// the virtual users share, such as a connection pool, in the `RV` value.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    base_url: Option<String>,
    run_id: String,
    request_timeout: Duration,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        base_url: Option<String>,
        run_id: String,
        request_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            base_url,
            run_id,
            request_timeout,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// The base URL of the service under load, if one was configured.
    pub fn get_base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn get_run_id(&self) -> &str {
        &self.run_id
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// End the run now, as if the stages had finished.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context of one virtual user.
pub struct AgentContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    agent_index: usize,
    agent_name: String,
    runner_context: Arc<RunnerContext<RV>>,
    clock: ScenarioClock,
    shutdown_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> AgentContext<RV, V> {
    pub(crate) fn new(
        agent_index: usize,
        agent_name: String,
        runner_context: Arc<RunnerContext<RV>>,
        clock: ScenarioClock,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            agent_index,
            agent_name,
            runner_context,
            clock,
            shutdown_listener,
            value: Default::default(),
        }
    }

    /// A value from 0 to the peak concurrency of the run. Virtual users with a lower index are
    /// started first when ramping up and stopped last when ramping down.
    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// The clock of the run, which gives the elapsed time, target concurrency and phase.
    pub fn clock(&self) -> &ScenarioClock {
        &self.clock
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Debug for AgentContext<RV, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("agent_name", &self.agent_name)
            .field("value", &self.value)
            .finish()
    }
}
