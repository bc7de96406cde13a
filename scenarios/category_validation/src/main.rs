use rule_engine_load_runner::prelude::*;
use std::time::Duration;

/// Rule sets are looked up by this category on every request.
const RULE_CATEGORY: &str = "ELIGIBILITY";

fn agent_behaviour(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
) -> HookResult {
    let request = CategoryValidationRequest {
        rule_category: RULE_CATEGORY.to_string(),
        context_map: sample_customer_context(),
    };

    let response = validate_by_category(
        ctx,
        request,
        &standard_checks("passed", Duration::from_millis(500)),
    )?;
    log::debug!(
        "{} of {} rule sets passed for {RULE_CATEGORY}",
        response.passed_rule_sets,
        response.total_rule_sets
    );

    Ok(())
}

fn main() -> SurgeResult<()> {
    let builder = RuleEngineScenarioDefinitionBuilder::<
        RuleEngineRunnerContext,
        RuleEngineAgentContext,
    >::new_with_init(env!("CARGO_PKG_NAME"))?
    .into_std()
    .with_default_stages(standard_stages())
    .with_threshold("http_req_duration", "p(95)<500")
    .with_threshold("http_req_duration", "p(99)<1000")
    .with_threshold("http_req_failed", "rate<0.01")
    .use_setup(configure_client)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(agent_behaviour);

    run(builder)?.ensure_passed()
}
