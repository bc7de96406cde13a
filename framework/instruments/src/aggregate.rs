use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::OperationRecord;

/// Longest duration the histograms can tell apart, anything slower is clamped to this.
const HIGHEST_TRACKABLE_MICROS: u64 = 60 * 60 * 1_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;

/// Key used in the status breakdown for requests that never received a response.
pub const NO_RESPONSE_STATUS: &str = "no response";

fn new_duration_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, HIGHEST_TRACKABLE_MICROS, SIGNIFICANT_FIGURES)
        .expect("Duration histogram bounds are valid")
}

fn record_duration(histogram: &mut Histogram<u64>, duration: Duration) {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX).max(1);
    histogram.saturating_record(micros);
}

fn micros_to_ms(micros: f64) -> f64 {
    micros / 1000.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckTally {
    pub passed: u64,
    pub failed: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    pub fn rate(&self) -> f64 {
        ratio(self.passed, self.total())
    }
}

/// Latency figures in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub med_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        Self {
            avg_ms: micros_to_ms(histogram.mean()),
            min_ms: micros_to_ms(histogram.min() as f64),
            max_ms: micros_to_ms(histogram.max() as f64),
            med_ms: percentile_ms(histogram, 50.0),
            p95_ms: percentile_ms(histogram, 95.0),
            p99_ms: percentile_ms(histogram, 99.0),
        }
    }
}

fn percentile_ms(histogram: &Histogram<u64>, percentile: f64) -> f64 {
    micros_to_ms(histogram.value_at_quantile(percentile / 100.0) as f64)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone)]
pub struct OperationTally {
    pub count: u64,
    pub failed: u64,
    durations: Histogram<u64>,
}

impl OperationTally {
    fn new() -> Self {
        Self {
            count: 0,
            failed: 0,
            durations: new_duration_histogram(),
        }
    }

    pub fn latency(&self) -> LatencySummary {
        LatencySummary::from_histogram(&self.durations)
    }
}

#[derive(Debug, Clone)]
struct AggregateState {
    requests: u64,
    failed: u64,
    durations: Histogram<u64>,
    checks: BTreeMap<String, CheckTally>,
    status_counts: BTreeMap<String, u64>,
    operations: BTreeMap<String, OperationTally>,
}

impl AggregateState {
    fn new() -> Self {
        Self {
            requests: 0,
            failed: 0,
            durations: new_duration_histogram(),
            checks: BTreeMap::new(),
            status_counts: BTreeMap::new(),
            operations: BTreeMap::new(),
        }
    }
}

/// Folds operation records into running statistics.
///
/// Every statistic kept here is a sum or a histogram count, so the result does not depend on the
/// order that records arrive in. Individual records are not retained.
#[derive(Debug)]
pub struct MetricsAggregator {
    state: Mutex<AggregateState>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregateState::new()),
        }
    }

    pub fn record(&self, operation_record: &OperationRecord) {
        let duration = operation_record.duration();
        let mut state = self.state.lock();

        state.requests += 1;
        if operation_record.is_error() {
            state.failed += 1;
        }
        record_duration(&mut state.durations, duration);

        for check in operation_record.checks() {
            let tally = state.checks.entry(check.name.clone()).or_default();
            if check.passed {
                tally.passed += 1;
            } else {
                tally.failed += 1;
            }
        }

        let status_key = operation_record
            .status()
            .map(|status| status.to_string())
            .unwrap_or_else(|| NO_RESPONSE_STATUS.to_string());
        *state.status_counts.entry(status_key).or_insert(0) += 1;

        let operation = state
            .operations
            .entry(operation_record.operation_id().to_string())
            .or_insert_with(OperationTally::new);
        operation.count += 1;
        if operation_record.is_error() {
            operation.failed += 1;
        }
        record_duration(&mut operation.durations, duration);
    }

    /// Freeze the current statistics. `elapsed` is the wall clock time the run has been going for
    /// and is used for rates over time.
    pub fn snapshot(&self, elapsed: Duration) -> AggregateSnapshot {
        let state = self.state.lock().clone();

        AggregateSnapshot {
            elapsed,
            requests: state.requests,
            failed: state.failed,
            durations: state.durations,
            checks: state.checks,
            status_counts: state.status_counts,
            operations: state.operations,
        }
    }
}

/// Statistics for a run at a point in time. Nothing in here changes once it has been taken.
#[derive(Debug, Clone)]
pub struct AggregateSnapshot {
    elapsed: Duration,
    requests: u64,
    failed: u64,
    durations: Histogram<u64>,
    checks: BTreeMap<String, CheckTally>,
    status_counts: BTreeMap<String, u64>,
    operations: BTreeMap<String, OperationTally>,
}

impl AggregateSnapshot {
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn error_rate(&self) -> f64 {
        ratio(self.failed, self.requests)
    }

    /// Requests per second over the elapsed time of the run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.requests as f64 / secs
        } else {
            0.0
        }
    }

    pub fn percentile_ms(&self, percentile: f64) -> f64 {
        percentile_ms(&self.durations, percentile)
    }

    pub fn latency(&self) -> LatencySummary {
        LatencySummary::from_histogram(&self.durations)
    }

    /// The combined pass rate of every check evaluation in the run.
    pub fn check_rate(&self) -> f64 {
        let total = self
            .checks
            .values()
            .fold(CheckTally::default(), |acc, tally| CheckTally {
                passed: acc.passed + tally.passed,
                failed: acc.failed + tally.failed,
            });
        total.rate()
    }

    pub fn checks(&self) -> &BTreeMap<String, CheckTally> {
        &self.checks
    }

    pub fn status_counts(&self) -> &BTreeMap<String, u64> {
        &self.status_counts
    }

    pub fn operations(&self) -> &BTreeMap<String, OperationTally> {
        &self.operations
    }
}
