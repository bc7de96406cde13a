use rule_engine_client_instrumented::prelude::RuleEngineClient;
use surge_runner::prelude::UserValuesConstraint;

/// Rule engine specific agent context values.
#[derive(Debug, Default)]
pub struct RuleEngineAgentContext {
    pub(crate) client: Option<RuleEngineClient>,
}

impl UserValuesConstraint for RuleEngineAgentContext {}

impl RuleEngineAgentContext {
    pub fn client(&self) -> anyhow::Result<RuleEngineClient> {
        self.client.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "client is not set, did you forget to call `connect_client` in your agent setup?"
            )
        })
    }
}
