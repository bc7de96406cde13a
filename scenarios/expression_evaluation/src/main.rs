use rule_engine_load_runner::prelude::*;
use std::time::Duration;

const EXPRESSION: &str = "customer.age >= 18 && order.total > 100";

fn agent_behaviour(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
) -> HookResult {
    let request = ExpressionEvaluationRequest {
        expression_id: None,
        expression_string: EXPRESSION.to_string(),
        context: sample_customer_context(),
    };

    let response = evaluate_expression(
        ctx,
        request,
        &standard_checks("value", Duration::from_millis(300)),
    )?;
    if let Some(error) = response.error {
        log::debug!("Expression evaluated with an error: {error}");
    }

    Ok(())
}

fn main() -> SurgeResult<()> {
    let builder = RuleEngineScenarioDefinitionBuilder::<
        RuleEngineRunnerContext,
        RuleEngineAgentContext,
    >::new_with_init(env!("CARGO_PKG_NAME"))?
    .into_std()
    .with_default_stages(standard_stages())
    .with_threshold("http_req_duration", "p(95)<300")
    .with_threshold("http_req_duration", "p(99)<600")
    .with_threshold("http_req_failed", "rate<0.01")
    .with_threshold("http_reqs", "rate>150")
    .use_setup(configure_client)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(agent_behaviour);

    run(builder)?.ensure_passed()
}
