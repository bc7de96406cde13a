mod outcome_file_reporter;
mod summary_report;
mod threshold_table;

use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{AggregateSnapshot, MetricsAggregator, OperationRecord};

pub use outcome_file_reporter::OutcomeFileReportCollector;
pub use summary_report::SummaryReportCollector;
pub use threshold_table::print_threshold_report;

/// Receives every operation of a run. Collectors are optional extras on top of the aggregator
/// which every [Reporter] has.
pub trait ReportCollector: Send {
    fn add_operation(&mut self, operation_record: &OperationRecord);

    /// Called once, after the last operation has been added.
    fn finalize(&mut self, snapshot: &AggregateSnapshot);
}

/// Chooses which collectors a [Reporter] is created with.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    run_id: String,
    scenario_name: String,
    enable_summary: bool,
    outcome_file_dir: Option<PathBuf>,
}

impl ReportConfig {
    pub fn new(run_id: String, scenario_name: String) -> Self {
        Self {
            run_id,
            scenario_name,
            enable_summary: false,
            outcome_file_dir: None,
        }
    }

    /// Print tables of operations, checks and status codes at the end of the run.
    pub fn enable_summary(mut self) -> Self {
        self.enable_summary = true;
        self
    }

    /// Write every operation as a line of JSON to a file in `dir`.
    pub fn enable_outcome_file(mut self, dir: PathBuf) -> Self {
        self.outcome_file_dir = Some(dir);
        self
    }

    pub fn init_reporter(self, runtime: &tokio::runtime::Handle) -> anyhow::Result<Reporter> {
        let mut collectors: Vec<Mutex<Box<dyn ReportCollector>>> = Vec::new();

        if self.enable_summary {
            collectors.push(Mutex::new(Box::new(SummaryReportCollector::new())));
        }

        if let Some(dir) = self.outcome_file_dir {
            let collector =
                OutcomeFileReportCollector::new(runtime, dir, &self.scenario_name, &self.run_id)?;
            log::info!("Writing operation outcomes to {:?}", collector.path());
            collectors.push(Mutex::new(Box::new(collector)));
        }

        Ok(Reporter {
            run_id: self.run_id,
            scenario_name: self.scenario_name,
            aggregator: MetricsAggregator::new(),
            collectors,
        })
    }
}

/// Shared by all agents. Every operation goes into the aggregator and then to each collector.
pub struct Reporter {
    run_id: String,
    scenario_name: String,
    aggregator: MetricsAggregator,
    collectors: Vec<Mutex<Box<dyn ReportCollector>>>,
}

impl Reporter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn add_operation(&self, operation_record: &OperationRecord) {
        self.aggregator.record(operation_record);

        for collector in &self.collectors {
            collector.lock().add_operation(operation_record);
        }
    }

    pub fn snapshot(&self, elapsed: Duration) -> AggregateSnapshot {
        self.aggregator.snapshot(elapsed)
    }

    /// Take the final snapshot and let each collector finish up with it.
    pub fn finalize(&self, elapsed: Duration) -> AggregateSnapshot {
        let snapshot = self.snapshot(elapsed);

        for collector in &self.collectors {
            collector.lock().finalize(&snapshot);
        }

        snapshot
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("run_id", &self.run_id)
            .field("scenario_name", &self.scenario_name)
            .field("collectors", &self.collectors.len())
            .finish()
    }
}
