use rule_engine_load_runner::prelude::*;
use serde_json::json;
use std::time::Duration;

fn adult_customer_rule() -> RuleValidationRequest {
    RuleValidationRequest {
        rule_id: "rule-1".to_string(),
        rule_name: "Test Rule".to_string(),
        conditions: vec![Condition {
            attribute_code: "customer.age".to_string(),
            attribute_type: AttributeType::Number,
            operator: ComparisonOperator::Gte,
            target_value: json!(18),
        }],
        context: sample_customer_context(),
    }
}

fn agent_behaviour(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
) -> HookResult {
    let response = validate_rule(
        ctx,
        adult_customer_rule(),
        &standard_checks("passed", Duration::from_millis(500)),
    )?;
    if !response.passed {
        log::debug!("Rule did not pass: {:?}", response.message);
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
    .with_threshold("http_req_duration", "p(95)<500")
    .with_threshold("http_req_duration", "p(99)<1000")
    .with_threshold("http_req_failed", "rate<0.01")
    .with_threshold("http_reqs", "rate>100")
    .use_setup(configure_client)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(agent_behaviour);

    run(builder)?.ensure_passed()
}
