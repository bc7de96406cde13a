use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use pretty_assertions::assert_eq;
use rule_engine_client_instrumented::prelude::{
    CategoryValidationRequest, EvaluationContext, ExpressionEvaluationRequest, RequestError,
    ResponseView, RuleEngineClient, RuleValidationRequest, EVALUATE_EXPRESSION, VALIDATE_RULE,
};
use serde_json::json;
use surge_instruments::{Checks, ReportConfig, Reporter, NO_RESPONSE_STATUS};

async fn respond(req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
    let (status, body) = match req.uri().path() {
        "/api/expressions/evaluate" => (
            StatusCode::OK,
            json!({"value": true, "type": "Boolean", "error": null}).to_string(),
        ),
        "/api/rules/validate" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "rule store unavailable"}).to_string(),
        ),
        "/api/rule-sets/validate-by-category" => (StatusCode::OK, "not json".to_string()),
        _ => (StatusCode::NOT_FOUND, String::new()),
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap())
}

fn start_mock_endpoint() -> SocketAddr {
    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, hyper::Error>(service_fn(respond)) });
    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);

    addr
}

fn test_reporter() -> Arc<Reporter> {
    Arc::new(
        ReportConfig::new("run".to_string(), "mock_endpoint".to_string())
            .init_reporter(&tokio::runtime::Handle::current())
            .unwrap(),
    )
}

fn expression_checks() -> Checks<ResponseView> {
    Checks::new()
        .check("status is 200", |r: &ResponseView| r.status() == 200)
        .check("response has value field", |r: &ResponseView| r.has_field("value"))
}

fn expression_request() -> ExpressionEvaluationRequest {
    ExpressionEvaluationRequest {
        expression_id: None,
        expression_string: "customer.age >= 18 && order.total > 100".to_string(),
        context: EvaluationContext::from([
            ("customer.age".to_string(), json!(25)),
            ("order.total".to_string(), json!(150.0)),
        ]),
    }
}

#[tokio::test]
async fn successful_response_passes_checks() {
    let addr = start_mock_endpoint();
    let reporter = test_reporter();
    let client =
        RuleEngineClient::connect(&format!("http://{addr}"), Duration::from_secs(5), reporter.clone())
            .unwrap();

    let response = client
        .evaluate_expression(&expression_request(), &expression_checks())
        .await
        .unwrap();
    assert_eq!(json!(true), response.value);

    let snapshot = reporter.snapshot(Duration::from_secs(1));
    assert_eq!(1, snapshot.requests());
    assert_eq!(0, snapshot.failed());
    assert_eq!(1.0, snapshot.check_rate());
    assert_eq!(1, snapshot.checks()["response has value field"].passed);
    assert_eq!(Some(&1), snapshot.status_counts().get("200"));
    assert_eq!(1, snapshot.operations()[EVALUATE_EXPRESSION].count);
}

#[tokio::test]
async fn server_error_records_failed_outcome() {
    let addr = start_mock_endpoint();
    let reporter = test_reporter();
    let client =
        RuleEngineClient::connect(&format!("http://{addr}"), Duration::from_secs(5), reporter.clone())
            .unwrap();

    let request = RuleValidationRequest {
        rule_id: "rule-1".to_string(),
        rule_name: "Test Rule".to_string(),
        conditions: vec![],
        context: EvaluationContext::new(),
    };
    let checks = Checks::new()
        .check("status is 200", |r: &ResponseView| r.status() == 200)
        .check("response has passed field", |r: &ResponseView| r.has_field("passed"));

    let err = client.validate_rule(&request, &checks).await.unwrap_err();
    assert_eq!(Some(500), err.status());

    let snapshot = reporter.snapshot(Duration::from_secs(1));
    assert_eq!(1, snapshot.failed());
    assert_eq!(1.0, snapshot.error_rate());
    assert_eq!(0.0, snapshot.check_rate());
    assert_eq!(Some(&1), snapshot.status_counts().get("500"));
    assert_eq!(1, snapshot.operations()[VALIDATE_RULE].failed);
}

#[tokio::test]
async fn undecodable_body_records_failed_outcome() {
    let addr = start_mock_endpoint();
    let reporter = test_reporter();
    let client =
        RuleEngineClient::connect(&format!("http://{addr}"), Duration::from_secs(5), reporter.clone())
            .unwrap();

    let request = CategoryValidationRequest {
        rule_category: "ELIGIBILITY".to_string(),
        context_map: EvaluationContext::new(),
    };
    let checks = Checks::new().check("status is 200", |r: &ResponseView| r.status() == 200);

    let err = client
        .validate_by_category(&request, &checks)
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Decode { .. }), "{err:?}");

    // The status check still passes, only the outcome is failed.
    let snapshot = reporter.snapshot(Duration::from_secs(1));
    assert_eq!(1, snapshot.failed());
    assert_eq!(1.0, snapshot.check_rate());
}

#[tokio::test]
async fn refused_connection_records_failed_outcome_without_status() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let reporter = test_reporter();
    let client =
        RuleEngineClient::connect(&format!("http://{addr}"), Duration::from_secs(5), reporter.clone())
            .unwrap();

    let err = client
        .evaluate_expression(&expression_request(), &expression_checks())
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Transport { .. }), "{err:?}");
    assert_eq!(None, err.status());

    let snapshot = reporter.snapshot(Duration::from_secs(1));
    assert_eq!(1, snapshot.failed());
    assert_eq!(Some(&1), snapshot.status_counts().get(NO_RESPONSE_STATUS));
    assert_eq!(2, snapshot.checks().values().map(|tally| tally.failed).sum::<u64>());
}
