use rule_engine_client_instrumented::prelude::RuleEngineClient;
use surge_runner::prelude::UserValuesConstraint;

/// Rule engine specific runner context values.
#[derive(Debug, Default)]
pub struct RuleEngineRunnerContext {
    pub(crate) client: Option<RuleEngineClient>,
}

impl UserValuesConstraint for RuleEngineRunnerContext {}
