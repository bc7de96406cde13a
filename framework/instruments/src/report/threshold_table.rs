use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::ThresholdReport;

#[derive(Tabled)]
struct ThresholdRow {
    metric: String,
    threshold: String,
    #[tabled(display = "float4")]
    actual: f64,
    expected: String,
    #[tabled(display = "pass_fail")]
    passed: bool,
}

fn float4(n: &f64) -> String {
    format!("{n:.4}")
}

fn pass_fail(passed: &bool) -> String {
    let label = if *passed { "pass" } else { "FAIL" };
    label.to_string()
}

/// Print every threshold with the measured value and whether it held.
pub fn print_threshold_report(report: &ThresholdReport) {
    println!("\nThresholds");
    if report.results.is_empty() {
        println!("No thresholds configured");
        return;
    }

    let rows = report
        .results
        .iter()
        .map(|result| ThresholdRow {
            metric: result.metric.to_string(),
            threshold: result.expression.clone(),
            actual: result.actual,
            expected: result.expected.clone(),
            passed: result.passed,
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{table}");
}
