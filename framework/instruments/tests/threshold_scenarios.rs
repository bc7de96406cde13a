use std::time::Duration;

use pretty_assertions::assert_eq;
use surge_core::prelude::{RampMode, Stage, StagePlan};
use surge_instruments::{CheckResult, MetricName, MetricsAggregator, OperationRecord, Threshold};

/// Requests a single virtual user completes per second against an endpoint that answers in 50ms
/// when it does not pause between iterations.
const REQUESTS_PER_USER_PER_SECOND: u32 = 20;

fn standard_plan() -> StagePlan {
    StagePlan::new(
        vec![
            Stage::new(Duration::from_secs(30), 50),
            Stage::new(Duration::from_secs(60), 50),
            Stage::new(Duration::from_secs(30), 100),
            Stage::new(Duration::from_secs(60), 100),
            Stage::new(Duration::from_secs(30), 0),
        ],
        RampMode::Linear,
    )
    .unwrap()
}

fn standard_thresholds() -> Vec<Threshold> {
    vec![
        Threshold::parse("http_req_duration", "p(95)<300").unwrap(),
        Threshold::parse("http_req_duration", "p(99)<600").unwrap(),
        Threshold::parse("http_req_failed", "rate<0.01").unwrap(),
        Threshold::parse("http_reqs", "rate>150").unwrap(),
    ]
}

/// Replay a run second by second, with every active user completing its share of requests.
/// `fails` decides from the request number whether the endpoint answered with a 500.
fn simulate(plan: &StagePlan, fails: impl Fn(u64) -> bool) -> MetricsAggregator {
    let aggregator = MetricsAggregator::new();
    let mut request_number = 0u64;

    for second in 0..plan.total_duration().as_secs() {
        let active = plan.concurrency_at(Duration::from_secs(second));
        for _ in 0..active * REQUESTS_PER_USER_PER_SECOND {
            let failed = fails(request_number);
            let status = if failed { 500 } else { 200 };
            aggregator.record(
                &OperationRecord::completed(
                    "evaluate_expression",
                    Duration::from_micros(45_000 + (request_number % 11) * 1_000),
                    Some(status),
                    failed,
                )
                .with_checks(vec![CheckResult {
                    name: "status is 200".to_string(),
                    passed: !failed,
                }]),
            );
            request_number += 1;
        }
    }

    aggregator
}

#[test]
fn healthy_endpoint_passes_every_threshold() {
    let plan = standard_plan();
    let aggregator = simulate(&plan, |_| false);

    let report = aggregator
        .snapshot(plan.total_duration())
        .evaluate(&standard_thresholds());

    assert!(report.passed(), "{:?}", report.violations().collect::<Vec<_>>());
    assert_eq!(4, report.results.len());
}

#[test]
fn five_percent_server_errors_violate_the_error_rate() {
    let plan = standard_plan();
    let aggregator = simulate(&plan, |request_number| request_number % 20 == 0);

    let snapshot = aggregator.snapshot(plan.total_duration());
    let report = snapshot.evaluate(&standard_thresholds());

    assert!(!report.passed());
    let violations = report.violations().collect::<Vec<_>>();
    assert_eq!(1, violations.len());
    assert_eq!(MetricName::RequestFailed, violations[0].metric);
    assert!(
        (violations[0].actual - 0.05).abs() < 0.001,
        "error rate was {}",
        violations[0].actual
    );
    assert!((snapshot.check_rate() - 0.95).abs() < 0.001);
}

#[test]
fn same_snapshot_gives_same_report() {
    let plan = standard_plan();
    let snapshot = simulate(&plan, |request_number| request_number % 3 == 0)
        .snapshot(plan.total_duration());

    assert_eq!(
        snapshot.evaluate(&standard_thresholds()),
        snapshot.evaluate(&standard_thresholds())
    );
}
