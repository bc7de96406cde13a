use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::report::ReportCollector;
use crate::{AggregateSnapshot, CheckResult, OperationRecord};

/// One line of the outcome file.
#[derive(Debug, Serialize)]
struct OutcomeLine {
    timestamp_micros: u128,
    operation_id: String,
    elapsed_ms: f64,
    status: Option<u16>,
    is_error: bool,
    checks: Vec<OutcomeCheck>,
}

#[derive(Debug, Serialize)]
struct OutcomeCheck {
    name: String,
    passed: bool,
}

impl From<&CheckResult> for OutcomeCheck {
    fn from(value: &CheckResult) -> Self {
        Self {
            name: value.name.clone(),
            passed: value.passed,
        }
    }
}

impl From<&OperationRecord> for OutcomeLine {
    fn from(value: &OperationRecord) -> Self {
        Self {
            timestamp_micros: started_at_micros(value.started()),
            operation_id: value.operation_id().to_string(),
            elapsed_ms: value.duration().as_micros() as f64 / 1000.0,
            status: value.status(),
            is_error: value.is_error(),
            checks: value.checks().iter().map(OutcomeCheck::from).collect(),
        }
    }
}

/// Wall clock time, in microseconds since the Unix epoch, at which an operation started.
fn started_at_micros(started: Instant) -> u128 {
    SystemTime::now()
        .checked_sub(started.elapsed())
        .and_then(|started_at| started_at.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_micros())
        .unwrap_or_default()
}

/// Write every operation to disk as JSON lines so that a run can be analysed afterwards.
///
/// Lines are handed to a single write task. On finalize the channel is closed and the task drains
/// whatever is left before flushing.
pub struct OutcomeFileReportCollector {
    path: PathBuf,
    join_handle: JoinHandle<()>,
    writer: Option<UnboundedSender<OutcomeLine>>,
    flush_complete: Arc<AtomicBool>,
}

impl OutcomeFileReportCollector {
    pub fn new(
        runtime: &tokio::runtime::Handle,
        dir: PathBuf,
        scenario_name: &str,
        run_id: &str,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create outcome directory {dir:?}"))?;

        let path = dir.join(format!("{scenario_name}-{run_id}.jsonl"));
        let file = std::fs::File::options()
            .create_new(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to create outcome file {path:?}"))?;

        let flush_complete = Arc::new(AtomicBool::new(false));
        let (join_handle, writer) = start_outcome_write_task(
            runtime,
            File::from_std(file),
            path.clone(),
            flush_complete.clone(),
        );

        Ok(Self {
            path,
            join_handle,
            writer: Some(writer),
            flush_complete,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn wait_for_flush(&self) {
        let wait_started = std::time::Instant::now();
        let mut notify_timer = std::time::Instant::now();
        while !self.flush_complete.load(Ordering::Acquire) {
            if notify_timer.elapsed().as_secs() > 10 {
                log::warn!(
                    "Still waiting for outcomes to flush after {} seconds.",
                    wait_started.elapsed().as_secs()
                );
                notify_timer = std::time::Instant::now();
            }

            // The write task exited without flushing, there is nothing left to wait for.
            if self.join_handle.is_finished() {
                break;
            }

            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        log::debug!(
            "Outcomes flushed to {:?} after {}ms",
            self.path,
            wait_started.elapsed().as_millis()
        );
    }
}

impl ReportCollector for OutcomeFileReportCollector {
    fn add_operation(&mut self, operation_record: &OperationRecord) {
        let Some(writer) = &self.writer else {
            log::info!("Outcome file reporter already finalized, dropping operation");
            return;
        };

        if let Err(e) = writer.send(OutcomeLine::from(operation_record)) {
            log::warn!("Failed to record outcome: {e}");
        }
    }

    fn finalize(&mut self, _snapshot: &AggregateSnapshot) {
        // Closing the channel lets the write task finish once it has drained
        self.writer.take();
        self.wait_for_flush();
    }
}

fn start_outcome_write_task(
    runtime: &tokio::runtime::Handle,
    file: File,
    path: PathBuf,
    flush_complete: Arc<AtomicBool>,
) -> (JoinHandle<()>, UnboundedSender<OutcomeLine>) {
    let (writer, mut receiver) = tokio::sync::mpsc::unbounded_channel::<OutcomeLine>();
    let join_handle = runtime.spawn(async move {
        let mut file = BufWriter::new(file);
        let mut written = 0usize;

        // Runs until every sender has been dropped and the channel is drained
        while let Some(line) = receiver.recv().await {
            if let Err(e) = write_line(&mut file, &line).await {
                log::error!("Failed to write outcome to {path:?}: {e:?}");
                return;
            }
            written += 1;

            if written % 10_000 == 0 {
                log::debug!("Written {written} outcomes");
            }
        }

        if let Err(e) = file.flush().await {
            log::error!("Failed to flush outcomes to {path:?}: {e:?}");
            return;
        }

        log::debug!("Wrote {written} outcomes to {path:?}");
        flush_complete.store(true, Ordering::Release);
    });

    (join_handle, writer)
}

#[inline]
async fn write_line<W>(writer: &mut W, line: &OutcomeLine) -> anyhow::Result<()>
where
    W: AsyncWriteExt + Unpin + Debug,
{
    let mut bytes = serde_json::to_vec(line)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;

    Ok(())
}
