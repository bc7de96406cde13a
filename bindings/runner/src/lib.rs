use prelude::{RuleEngineAgentContext, RuleEngineRunnerContext};

mod cli;
mod common;
mod context;
mod definition;
mod runner_context;

pub mod prelude {
    /// Common operations for rule engine scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::{
        configure_client, connect_client, evaluate_expression, run, sample_customer_context,
        standard_checks, standard_stages, validate_by_category, validate_rule,
    };

    pub use crate::cli::{RuleEngineScenarioCli, DEFAULT_BASE_URL};
    pub use crate::context::RuleEngineAgentContext;
    pub use crate::definition::RuleEngineScenarioDefinitionBuilder;
    pub use crate::runner_context::RuleEngineRunnerContext;

    /// Re-export of the `surge_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your scenarios.
    pub use surge_runner::prelude::*;

    /// Re-export of the instrumented client for convenience.
    pub use rule_engine_client_instrumented::prelude::*;
}
