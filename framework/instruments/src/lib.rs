mod aggregate;
mod checks;
mod report;
mod threshold;

use std::time::{Duration, Instant};

pub use aggregate::{
    AggregateSnapshot, CheckTally, LatencySummary, MetricsAggregator, OperationTally,
    NO_RESPONSE_STATUS,
};
pub use checks::{CheckResult, Checks};
pub use report::{print_threshold_report, ReportCollector, ReportConfig, Reporter};
pub use threshold::{Aggregation, Comparison, MetricName, Threshold, ThresholdReport, ThresholdResult};

/// The outcome of one operation, usually one HTTP request made by a virtual user.
///
/// A record is started with [OperationRecord::new], filled in while the response is inspected and
/// then handed over with [report_operation]. Once reported it is only ever read.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    operation_id: String,
    started: Instant,
    elapsed: Option<Duration>,
    status: Option<u16>,
    is_error: bool,
    checks: Vec<CheckResult>,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
            elapsed: None,
            status: None,
            is_error: false,
            checks: Vec::new(),
        }
    }

    /// Build a record for an operation that was timed elsewhere.
    pub fn completed(
        operation_id: impl Into<String>,
        elapsed: Duration,
        status: Option<u16>,
        is_error: bool,
    ) -> Self {
        Self {
            elapsed: Some(elapsed),
            status,
            is_error,
            ..Self::new(operation_id)
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// The measured duration, or the time since the record was started if it has not been
    /// stopped yet.
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    /// Stop the timer. Calling this more than once keeps the first measurement.
    pub fn stop(&mut self) -> Duration {
        *self.elapsed.get_or_insert_with(|| self.started.elapsed())
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    pub fn mark_error(&mut self) {
        self.is_error = true;
    }

    pub fn with_checks(mut self, checks: Vec<CheckResult>) -> Self {
        self.checks.extend(checks);
        self
    }
}

/// Finish an operation and pass it to the reporter. The record is marked as an error if the
/// response is an error.
pub fn report_operation<T, E>(
    reporter: &Reporter,
    mut operation_record: OperationRecord,
    response: &Result<T, E>,
) {
    operation_record.stop();
    if response.is_err() {
        operation_record.mark_error();
    }

    log::trace!(
        "Operation {} took {}ms, status {:?}, failed? {}",
        operation_record.operation_id,
        operation_record.duration().as_millis(),
        operation_record.status,
        operation_record.is_error,
    );

    reporter.add_operation(&operation_record);
}
