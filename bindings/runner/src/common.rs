use std::time::Duration;

use anyhow::Context;
use rule_engine_client_instrumented::prelude::{
    CategoryValidationRequest, CategoryValidationResponse, EvaluationContext,
    ExpressionEvaluationRequest, ExpressionEvaluationResponse, ResponseView, RuleEngineClient,
    RuleValidationRequest, RuleValidationResponse,
};
use serde_json::json;
use surge_runner::prelude::{
    AgentContext, Checks, HookResult, RunOutcome, RunnerContext, ScenarioDefinitionBuilder, Stage,
    SurgeResult,
};

use crate::{RuleEngineAgentContext, RuleEngineRunnerContext};

/// The load profile shared by the rule engine scenarios: ramp to 50 virtual users, hold, ramp to
/// 100, hold, then ramp down to zero.
pub fn standard_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(30), 50),
        Stage::new(Duration::from_secs(60), 50),
        Stage::new(Duration::from_secs(30), 100),
        Stage::new(Duration::from_secs(60), 100),
        Stage::new(Duration::from_secs(30), 0),
    ]
}

/// The customer and order values that the sample expressions and rules are written against.
pub fn sample_customer_context() -> EvaluationContext {
    EvaluationContext::from([
        ("customer.age".to_string(), json!(25)),
        ("order.total".to_string(), json!(150.0)),
    ])
}

/// Checks that every rule engine response is expected to pass:
/// - the status is 200
/// - the JSON body has `field`, which may be `null`
/// - the response arrived within `max_response_time`
pub fn standard_checks(field: &str, max_response_time: Duration) -> Checks<ResponseView> {
    let field = field.to_string();
    Checks::new()
        .check("status is 200", |response: &ResponseView| {
            response.status() == 200
        })
        .check(
            format!("response has {field} field"),
            move |response: &ResponseView| response.has_field(&field),
        )
        .check(
            format!("response time < {}ms", max_response_time.as_millis()),
            move |response: &ResponseView| response.elapsed() < max_response_time,
        )
}

/// Create the HTTP client that all virtual users share, using the base URL and request timeout
/// from the command line.
///
/// Call this from the scenario `setup` hook:
/// ```rust
/// use rule_engine_load_runner::prelude::{configure_client, RuleEngineAgentContext, RuleEngineRunnerContext, ScenarioDefinitionBuilder};
///
/// fn configure(
///     builder: ScenarioDefinitionBuilder<RuleEngineRunnerContext, RuleEngineAgentContext>,
/// ) -> ScenarioDefinitionBuilder<RuleEngineRunnerContext, RuleEngineAgentContext> {
///     builder.use_setup(configure_client)
/// }
/// ```
pub fn configure_client(ctx: &mut RunnerContext<RuleEngineRunnerContext>) -> HookResult {
    let base_url = ctx
        .get_base_url()
        .context("No base URL was configured for the rule engine")?
        .to_string();
    let timeout = ctx.request_timeout();
    let reporter = ctx.reporter();

    log::info!("Using rule engine at {base_url} with a request timeout of {timeout:?}");

    // Built inside the runtime so that the connection pool belongs to it.
    let client = ctx.executor().execute_in_place(async move {
        RuleEngineClient::connect(&base_url, timeout, reporter)
    })?;
    ctx.get_mut().client = Some(client);

    Ok(())
}

/// Give this virtual user a handle to the shared client. Requires [configure_client] to have run
/// in the scenario setup.
pub fn connect_client(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
) -> HookResult {
    let client = ctx
        .runner_context()
        .get()
        .client
        .clone()
        .context("client is not configured, did you forget to call `configure_client` in your setup?")?;

    log::debug!("Agent {} connected to {}", ctx.agent_name(), client.base_url());
    ctx.get_mut().client = Some(client);

    Ok(())
}

pub fn evaluate_expression(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
    request: ExpressionEvaluationRequest,
    checks: &Checks<ResponseView>,
) -> anyhow::Result<ExpressionEvaluationResponse> {
    let client = ctx.get().client()?;
    let checks = checks.clone();
    ctx.runner_context().executor().execute_in_place(async move {
        let response = client.evaluate_expression(&request, &checks).await?;
        Ok(response)
    })
}

pub fn validate_rule(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
    request: RuleValidationRequest,
    checks: &Checks<ResponseView>,
) -> anyhow::Result<RuleValidationResponse> {
    let client = ctx.get().client()?;
    let checks = checks.clone();
    ctx.runner_context().executor().execute_in_place(async move {
        let response = client.validate_rule(&request, &checks).await?;
        Ok(response)
    })
}

pub fn validate_by_category(
    ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>,
    request: CategoryValidationRequest,
    checks: &Checks<ResponseView>,
) -> anyhow::Result<CategoryValidationResponse> {
    let client = ctx.get().client()?;
    let checks = checks.clone();
    ctx.runner_context().executor().execute_in_place(async move {
        let response = client.validate_by_category(&request, &checks).await?;
        Ok(response)
    })
}

/// Run a rule engine scenario with the surge runner.
pub fn run(
    definition: ScenarioDefinitionBuilder<RuleEngineRunnerContext, RuleEngineAgentContext>,
) -> SurgeResult<RunOutcome> {
    surge_runner::prelude::run(definition)
}
