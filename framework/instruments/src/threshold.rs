use std::fmt::{Display, Formatter};
use std::str::FromStr;

use surge_core::prelude::ScenarioConfigError;

use crate::AggregateSnapshot;

/// The metrics that thresholds can be set on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricName {
    /// Request duration in milliseconds.
    RequestDuration,
    /// Whether a request failed. Transport errors, non-2xx responses and undecodable bodies count.
    RequestFailed,
    /// Requests made.
    Requests,
    /// Named checks evaluated against responses.
    Checks,
}

impl MetricName {
    pub const ALL: [MetricName; 4] = [
        MetricName::RequestDuration,
        MetricName::RequestFailed,
        MetricName::Requests,
        MetricName::Checks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RequestDuration => "http_req_duration",
            MetricName::RequestFailed => "http_req_failed",
            MetricName::Requests => "http_reqs",
            MetricName::Checks => "checks",
        }
    }

    fn supports(&self, aggregation: &Aggregation) -> bool {
        matches!(
            (self, aggregation),
            (
                MetricName::RequestDuration,
                Aggregation::Percentile(_)
                    | Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
            ) | (MetricName::RequestFailed, Aggregation::Rate)
                | (MetricName::Requests, Aggregation::Rate | Aggregation::Count)
                | (MetricName::Checks, Aggregation::Rate)
        )
    }
}

impl Display for MetricName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = ScenarioConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s.trim())
            .ok_or_else(|| ScenarioConfigError::UnknownMetric(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Rate,
    Count,
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two character operators first so that `<=` is not read as `<`.
    const SYMBOLS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    pub fn holds(&self, actual: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => actual < bound,
            Comparison::Le => actual <= bound,
            Comparison::Gt => actual > bound,
            Comparison::Ge => actual >= bound,
            Comparison::Eq => (actual - bound).abs() < f64::EPSILON,
            Comparison::Ne => (actual - bound).abs() >= f64::EPSILON,
        }
    }

    fn symbol(&self) -> &'static str {
        Self::SYMBOLS
            .iter()
            .find(|(_, comparison)| comparison == self)
            .map(|(symbol, _)| *symbol)
            .unwrap_or("?")
    }
}

/// A pass/fail predicate over the aggregated value of one metric for the whole run.
///
/// Thresholds are written the same way as the load scripts they replace: a metric name such as
/// `http_req_duration` with an expression such as `p(95)<300`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: MetricName,
    aggregation: Aggregation,
    comparison: Comparison,
    bound: f64,
    expression: String,
}

impl Threshold {
    /// Parse a threshold expression for a metric.
    ///
    /// Supported aggregations are `p(N)` (or `pN`), `avg`, `min`, `max` and `med` for
    /// `http_req_duration`, `rate` for `http_req_failed` and `checks` and `rate` or `count` for
    /// `http_reqs`. Duration bounds may carry an `ms` or `s` suffix and request rates a `/s`
    /// suffix.
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ScenarioConfigError> {
        let metric_name = metric.parse::<MetricName>()?;
        let invalid = |reason: &str| ScenarioConfigError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let (symbol, comparison) = Comparison::SYMBOLS
            .iter()
            .find(|(symbol, _)| compact.contains(symbol))
            .copied()
            .ok_or_else(|| invalid("expected one of <, <=, >, >=, ==, !="))?;
        let (lhs, rhs) = compact
            .split_once(symbol)
            .ok_or_else(|| invalid("missing comparison"))?;

        let aggregation = parse_aggregation(lhs).map_err(|reason| invalid(&reason))?;
        if !metric_name.supports(&aggregation) {
            return Err(invalid(&format!(
                "`{aggregation}` cannot be applied to `{metric_name}`"
            )));
        }

        let bound = parse_bound(metric_name, rhs).map_err(|reason| invalid(&reason))?;

        Ok(Self {
            metric: metric_name,
            aggregation,
            comparison,
            bound,
            expression: expression.trim().to_string(),
        })
    }

    pub fn metric(&self) -> MetricName {
        self.metric
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The value of this threshold's metric in the snapshot.
    pub fn actual(&self, snapshot: &AggregateSnapshot) -> f64 {
        match (self.metric, self.aggregation) {
            (MetricName::RequestDuration, Aggregation::Percentile(p)) => snapshot.percentile_ms(p),
            (MetricName::RequestDuration, Aggregation::Avg) => snapshot.latency().avg_ms,
            (MetricName::RequestDuration, Aggregation::Min) => snapshot.latency().min_ms,
            (MetricName::RequestDuration, Aggregation::Max) => snapshot.latency().max_ms,
            (MetricName::RequestDuration, Aggregation::Med) => snapshot.latency().med_ms,
            (MetricName::RequestFailed, _) => snapshot.error_rate(),
            (MetricName::Requests, Aggregation::Count) => snapshot.requests() as f64,
            (MetricName::Requests, _) => snapshot.throughput(),
            (MetricName::Checks, _) => snapshot.check_rate(),
            // Parsing only accepts supported combinations.
            (MetricName::RequestDuration, _) => snapshot.latency().avg_ms,
        }
    }

    pub fn evaluate(&self, snapshot: &AggregateSnapshot) -> ThresholdResult {
        let actual = self.actual(snapshot);
        ThresholdResult {
            metric: self.metric,
            expression: self.expression.clone(),
            actual,
            expected: format!("{} {}", self.comparison.symbol(), self.bound),
            passed: self.comparison.holds(actual, self.bound),
        }
    }
}

impl Display for Threshold {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.metric, self.expression)
    }
}

fn parse_aggregation(lhs: &str) -> Result<Aggregation, String> {
    let percentile = lhs
        .strip_prefix("p(")
        .and_then(|rest| rest.strip_suffix(')'))
        .or_else(|| lhs.strip_prefix('p').filter(|rest| !rest.is_empty()));

    if let Some(value) = percentile {
        let p = value
            .parse::<f64>()
            .map_err(|_| format!("`{lhs}` is not a valid percentile"))?;
        if !(p > 0.0 && p <= 100.0) {
            return Err(format!("percentile {p} is outside of (0, 100]"));
        }
        return Ok(Aggregation::Percentile(p));
    }

    match lhs {
        "avg" => Ok(Aggregation::Avg),
        "min" => Ok(Aggregation::Min),
        "max" => Ok(Aggregation::Max),
        "med" => Ok(Aggregation::Med),
        "rate" => Ok(Aggregation::Rate),
        "count" => Ok(Aggregation::Count),
        other => Err(format!("unknown aggregation `{other}`")),
    }
}

fn parse_bound(metric: MetricName, rhs: &str) -> Result<f64, String> {
    let (number, scale) = match metric {
        MetricName::RequestDuration => {
            if let Some(ms) = rhs.strip_suffix("ms") {
                (ms, 1.0)
            } else if let Some(s) = rhs.strip_suffix('s') {
                (s, 1000.0)
            } else {
                (rhs, 1.0)
            }
        }
        MetricName::Requests => (rhs.strip_suffix("/s").unwrap_or(rhs), 1.0),
        _ => (rhs, 1.0),
    };

    number
        .parse::<f64>()
        .map(|value| value * scale)
        .map_err(|_| format!("`{rhs}` is not a number"))
}

/// The outcome of one threshold, with the measured and the required value.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: MetricName,
    pub expression: String,
    pub actual: f64,
    pub expected: String,
    pub passed: bool,
}

impl Display for ThresholdResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: actual {:.4}, expected {}",
            self.metric, self.expression, self.actual, self.expected
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|result| result.passed)
    }

    pub fn violations(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|result| !result.passed)
    }
}

impl AggregateSnapshot {
    /// Judge every threshold against this snapshot. This only reads the snapshot so it gives the
    /// same report however many times it is called.
    pub fn evaluate(&self, thresholds: &[Threshold]) -> ThresholdReport {
        ThresholdReport {
            results: thresholds
                .iter()
                .map(|threshold| threshold.evaluate(self))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricsAggregator, OperationRecord};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn parse_script_thresholds() {
        let p95 = Threshold::parse("http_req_duration", "p(95)<300").unwrap();
        assert_eq!(MetricName::RequestDuration, p95.metric());
        assert_eq!(Aggregation::Percentile(95.0), p95.aggregation());
        assert_eq!(Comparison::Lt, p95.comparison());
        assert_eq!(300.0, p95.bound());

        let failed = Threshold::parse("http_req_failed", "rate<0.01").unwrap();
        assert_eq!(Aggregation::Rate, failed.aggregation());
        assert_eq!(0.01, failed.bound());

        let reqs = Threshold::parse("http_reqs", "rate>150").unwrap();
        assert_eq!(Comparison::Gt, reqs.comparison());
        assert_eq!(150.0, reqs.bound());
    }

    #[test]
    fn parse_shorthand_and_units() {
        let p99 = Threshold::parse("http_req_duration", "p99 < 0.6s").unwrap();
        assert_eq!(Aggregation::Percentile(99.0), p99.aggregation());
        assert_eq!(600.0, p99.bound());

        let avg = Threshold::parse("http_req_duration", "avg<=250ms").unwrap();
        assert_eq!(Comparison::Le, avg.comparison());
        assert_eq!(250.0, avg.bound());

        let rate = Threshold::parse("http_reqs", "rate>=100/s").unwrap();
        assert_eq!(Comparison::Ge, rate.comparison());
        assert_eq!(100.0, rate.bound());
    }

    #[test]
    fn reject_unknown_metric() {
        assert_eq!(
            ScenarioConfigError::UnknownMetric("http_req_latency".to_string()),
            Threshold::parse("http_req_latency", "p(95)<300").unwrap_err()
        );
    }

    #[test]
    fn reject_malformed_expressions() {
        for (metric, expression) in [
            ("http_req_duration", "p(95)"),
            ("http_req_duration", "p(0)<300"),
            ("http_req_duration", "p(101)<300"),
            ("http_req_duration", "rate<0.1"),
            ("http_req_failed", "p(95)<0.1"),
            ("http_req_failed", "rate<abc"),
            ("checks", "count>10"),
            ("http_reqs", "median>10"),
        ] {
            let err = Threshold::parse(metric, expression).unwrap_err();
            assert!(
                matches!(err, ScenarioConfigError::InvalidThreshold { .. }),
                "{metric} {expression} gave {err:?}"
            );
        }
    }

    #[test]
    fn comparisons() {
        assert!(Comparison::Lt.holds(1.0, 2.0));
        assert!(!Comparison::Lt.holds(2.0, 2.0));
        assert!(Comparison::Le.holds(2.0, 2.0));
        assert!(Comparison::Gt.holds(3.0, 2.0));
        assert!(Comparison::Ge.holds(2.0, 2.0));
        assert!(Comparison::Eq.holds(2.0, 2.0));
        assert!(Comparison::Ne.holds(2.5, 2.0));
    }

    #[test]
    fn evaluate_is_idempotent() {
        let aggregator = MetricsAggregator::new();
        for i in 0..200u64 {
            aggregator.record(&OperationRecord::completed(
                "op",
                Duration::from_millis(10 + i),
                Some(if i % 10 == 0 { 500 } else { 200 }),
                i % 10 == 0,
            ));
        }
        let snapshot = aggregator.snapshot(Duration::from_secs(2));
        let thresholds = vec![
            Threshold::parse("http_req_duration", "p(95)<300").unwrap(),
            Threshold::parse("http_req_failed", "rate<0.01").unwrap(),
            Threshold::parse("http_reqs", "rate>50").unwrap(),
        ];

        let first = snapshot.evaluate(&thresholds);
        let second = snapshot.evaluate(&thresholds);

        assert_eq!(first, second);
        assert!(!first.passed());
        let violations: Vec<_> = first.violations().collect();
        assert_eq!(1, violations.len());
        assert_eq!(MetricName::RequestFailed, violations[0].metric);
        assert_eq!(0.1, violations[0].actual);
    }
}
