mod cli;
mod context;
mod definition;
mod executor;
mod monitor;
mod phases;
mod progress;
mod run;
mod shutdown;
mod types;

pub use cli::{parse_agent_behaviour, parse_duration_arg, parse_stage};

pub mod prelude {
    pub use crate::cli::{RampOpt, ReporterOpt, SurgeScenarioCli};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{AgentContext, RunnerContext};
    pub use crate::definition::{
        HookResult, ScenarioDefinitionBuilder, DEFAULT_GRACE_PERIOD, DEFAULT_PACING,
        DEFAULT_REQUEST_TIMEOUT,
    };
    pub use crate::executor::Executor;
    pub use crate::run::{run, RunOutcome};
    pub use crate::types::SurgeResult;

    pub use surge_core::prelude::*;
    pub use surge_instruments::{
        report_operation, CheckResult, Checks, OperationRecord, Reporter, Threshold,
    };
}
