use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use pretty_assertions::assert_eq;
use rule_engine_load_runner::prelude::{
    configure_client, connect_client, evaluate_expression, run, sample_customer_context,
    standard_checks, validate_rule, AgentContext, ExpressionEvaluationRequest, HookResult,
    RuleEngineAgentContext, RuleEngineRunnerContext, RuleEngineScenarioCli,
    RuleEngineScenarioDefinitionBuilder, RuleValidationRequest, ScenarioDefinitionBuilder,
    EVALUATE_EXPRESSION, VALIDATE_RULE,
};
use serde_json::json;

async fn respond(req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
    let (status, body) = match req.uri().path() {
        "/api/expressions/evaluate" => (
            StatusCode::OK,
            json!({"value": true, "type": "Boolean", "error": null}).to_string(),
        ),
        "/api/rules/validate" => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "rule store unavailable"}).to_string(),
        ),
        _ => (StatusCode::NOT_FOUND, String::new()),
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap())
}

static SLOW_REQUESTS: AtomicUsize = AtomicUsize::new(0);

/// Answers every evaluation after 50ms and fails every 20th one.
async fn respond_slowly_with_some_errors(
    _req: Request<Body>,
) -> Result<Response<Body>, hyper::Error> {
    tokio::time::sleep(Duration::from_millis(50)).await;

    let count = SLOW_REQUESTS.fetch_add(1, Ordering::SeqCst) + 1;
    let (status, body) = if count % 20 == 0 {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "evaluation failed"}).to_string(),
        )
    } else {
        (
            StatusCode::OK,
            json!({"value": true, "type": "Boolean", "error": null}).to_string(),
        )
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap())
}

/// The runner blocks on its own runtime, so the mocked endpoint is served from a separate one.
fn start_mock_rule_engine(runtime: &tokio::runtime::Runtime) -> SocketAddr {
    runtime.block_on(async {
        let make_svc =
            make_service_fn(|_conn| async { Ok::<_, hyper::Error>(service_fn(respond)) });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    })
}

fn start_slow_rule_engine(runtime: &tokio::runtime::Runtime) -> SocketAddr {
    runtime.block_on(async {
        let make_svc = make_service_fn(|_conn| async {
            Ok::<_, hyper::Error>(service_fn(respond_slowly_with_some_errors))
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    })
}

fn scenario(
    name: &str,
    addr: SocketAddr,
) -> ScenarioDefinitionBuilder<RuleEngineRunnerContext, RuleEngineAgentContext> {
    let base_url = format!("http://{addr}");
    let cli = RuleEngineScenarioCli::try_parse_from([
        "scenario",
        "--base-url",
        base_url.as_str(),
        "--stage",
        "300ms:2",
        "--stage",
        "300ms:2",
        "--pacing",
        "20ms",
        "--grace-period",
        "1s",
        "--no-progress",
        "--reporter",
        "noop",
    ])
    .unwrap();

    RuleEngineScenarioDefinitionBuilder::new(name, cli)
        .unwrap()
        .into_std()
        .use_setup(configure_client)
        .use_agent_setup(connect_client)
}

fn evaluate(ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>) -> HookResult {
    let request = ExpressionEvaluationRequest {
        expression_id: None,
        expression_string: "customer.age >= 18 && order.total > 100".to_string(),
        context: sample_customer_context(),
    };
    evaluate_expression(ctx, request, &standard_checks("value", Duration::from_secs(5)))?;

    Ok(())
}

fn validate(ctx: &mut AgentContext<RuleEngineRunnerContext, RuleEngineAgentContext>) -> HookResult {
    let request = RuleValidationRequest {
        rule_id: "rule-1".to_string(),
        rule_name: "Test Rule".to_string(),
        conditions: vec![],
        context: sample_customer_context(),
    };
    validate_rule(ctx, request, &standard_checks("passed", Duration::from_secs(5)))?;

    Ok(())
}

#[test]
fn healthy_endpoint_passes_thresholds() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_mock_rule_engine(&runtime);

    let outcome = run(scenario("mock_evaluate", addr)
        .with_threshold("http_reqs", "count>0")
        .with_threshold("http_req_failed", "rate<0.01")
        .with_threshold("checks", "rate>0.99")
        .with_threshold("http_req_duration", "p(95)<5000")
        .use_agent_behaviour(evaluate))
    .unwrap();

    assert!(outcome.passed(), "{:?}", outcome.threshold_report());
    assert_eq!(2, outcome.agents_end_count());
    assert_eq!(
        vec![EVALUATE_EXPRESSION],
        outcome.snapshot().operations().keys().collect::<Vec<_>>()
    );
    assert_eq!(
        Some(&outcome.snapshot().requests()),
        outcome.snapshot().status_counts().get("200")
    );
}

#[test]
fn failing_endpoint_violates_thresholds_but_agents_keep_going() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_mock_rule_engine(&runtime);

    let outcome = run(scenario("mock_validate", addr)
        .with_threshold("http_req_failed", "rate<0.01")
        .use_agent_behaviour(validate))
    .unwrap();

    assert!(!outcome.passed());
    assert_eq!(2, outcome.agents_end_count());

    let snapshot = outcome.snapshot();
    assert!(snapshot.requests() > 2, "{}", snapshot.requests());
    assert_eq!(snapshot.requests(), snapshot.failed());
    assert_eq!(snapshot.requests(), snapshot.operations()[VALIDATE_RULE].failed);
    assert_eq!(0.0, snapshot.checks()["status is 200"].rate());

    let err = outcome.ensure_passed().unwrap_err().to_string();
    assert!(err.contains("http_req_failed"), "{err}");
}

#[test]
fn occasional_server_errors_fail_the_error_rate_but_not_latency() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let addr = start_slow_rule_engine(&runtime);

    let base_url = format!("http://{addr}");
    let cli = RuleEngineScenarioCli::try_parse_from([
        "scenario",
        "--base-url",
        base_url.as_str(),
        "--agents",
        "5",
        "--duration",
        "3s",
        "--pacing",
        "10ms",
        "--grace-period",
        "1s",
        "--no-progress",
        "--reporter",
        "noop",
    ])
    .unwrap();

    let outcome = run(RuleEngineScenarioDefinitionBuilder::new("mock_slow_evaluate", cli)
        .unwrap()
        .into_std()
        .use_setup(configure_client)
        .use_agent_setup(connect_client)
        .with_threshold("http_req_failed", "rate<0.01")
        .with_threshold("http_req_duration", "p(95)<300")
        .with_threshold("http_req_duration", "p(99)<600")
        .use_agent_behaviour(evaluate))
    .unwrap();

    assert!(!outcome.passed());
    assert_eq!(5, outcome.agents_end_count());

    let snapshot = outcome.snapshot();
    assert!(snapshot.requests() >= 100, "{}", snapshot.requests());
    assert!(snapshot.failed() > 0);

    let report = outcome.threshold_report();
    let violations = report.violations().collect::<Vec<_>>();
    assert_eq!(1, violations.len(), "{report:?}");
    assert_eq!("rate<0.01", violations[0].expression);
    assert!(
        (0.03..=0.06).contains(&violations[0].actual),
        "{}",
        violations[0].actual
    );

    let latency = report
        .results
        .iter()
        .filter(|result| result.expression.starts_with("p("))
        .collect::<Vec<_>>();
    assert_eq!(2, latency.len());
    assert!(latency.iter().all(|result| result.passed), "{latency:?}");
    assert!(latency.iter().all(|result| result.actual >= 50.0), "{latency:?}");
}
