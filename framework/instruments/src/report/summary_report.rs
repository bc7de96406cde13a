mod operations_table;

use tabled::settings::Style;
use tabled::Table;

use crate::report::summary_report::operations_table::{CheckRow, OperationRow, StatusRow};
use crate::report::ReportCollector;
use crate::{AggregateSnapshot, OperationRecord};

/// Prints the operations, checks and status codes of the run as tables when the run finishes.
///
/// Everything it prints comes from the aggregated snapshot so nothing is kept per operation.
#[derive(Debug)]
pub struct SummaryReportCollector;

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self
    }

    fn print_summary_of_operations(&self, snapshot: &AggregateSnapshot) {
        println!("\nSummary of operations");
        let rows = snapshot
            .operations()
            .iter()
            .map(|(operation_id, tally)| {
                let latency = tally.latency();
                OperationRow {
                    operation_id: operation_id.clone(),
                    total_operations: tally.count,
                    failed_operations: tally.failed,
                    avg_time_ms: latency.avg_ms,
                    min_time_ms: latency.min_ms,
                    max_time_ms: latency.max_ms,
                    p95_time_ms: latency.p95_ms,
                    p99_time_ms: latency.p99_ms,
                }
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());

        println!("{table}");
    }

    fn print_summary_of_checks(&self, snapshot: &AggregateSnapshot) {
        if snapshot.checks().is_empty() {
            return;
        }

        println!("\nSummary of checks");
        let rows = snapshot
            .checks()
            .iter()
            .map(|(check, tally)| CheckRow {
                check: check.clone(),
                passed: tally.passed,
                failed: tally.failed,
                pass_rate: tally.rate() * 100.0,
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());

        println!("{table}");
    }

    fn print_summary_of_statuses(&self, snapshot: &AggregateSnapshot) {
        println!("\nStatus codes");
        let rows = snapshot
            .status_counts()
            .iter()
            .map(|(status, count)| StatusRow {
                status: status.clone(),
                count: *count,
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());

        println!("{table}");
    }
}

impl Default for SummaryReportCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportCollector for SummaryReportCollector {
    fn add_operation(&mut self, _operation_record: &OperationRecord) {
        // no-op, the aggregator already counts it
    }

    fn finalize(&mut self, snapshot: &AggregateSnapshot) {
        self.print_summary_of_operations(snapshot);
        self.print_summary_of_checks(snapshot);
        self.print_summary_of_statuses(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckResult, MetricsAggregator};
    use std::time::Duration;

    #[test]
    fn finalize_prints_recorded_operations() {
        let aggregator = MetricsAggregator::new();
        let record = OperationRecord::completed(
            "evaluate_expression",
            Duration::from_millis(12),
            Some(200),
            false,
        )
        .with_checks(vec![CheckResult {
            name: "status is 200".to_string(),
            passed: true,
        }]);

        let mut collector = SummaryReportCollector::default();
        collector.add_operation(&record);
        aggregator.record(&record);

        collector.finalize(&aggregator.snapshot(Duration::from_secs(1)));
    }
}
