use std::fmt::Write;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use surge_core::prelude::{DelegatedShutdownListener, ScenarioClock};

/// Displays a progress bar while the run is going to show the user how long is left, along with
/// the current phase and target number of virtual users.
pub(crate) fn start_progress(clock: ScenarioClock, mut shutdown_listener: DelegatedShutdownListener) {
    let planned_runtime = clock.plan().total_duration();
    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let pb = ProgressBar::new(planned_runtime.as_secs());
            let style = match ProgressStyle::with_template(
                "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
            ) {
                Ok(style) => style,
                Err(e) => {
                    log::warn!("Failed to set progress style: {e}");
                    return;
                }
            };
            pb.set_style(
                style
                    .with_key("planned_runtime", {
                        let hours = planned_runtime.as_secs() / 3600;
                        let minutes = (planned_runtime.as_secs() % 3600) / 60;
                        let seconds = planned_runtime.as_secs() % 60;
                        move |_state: &ProgressState, w: &mut dyn Write| {
                            let _ = write!(w, "{hours:02}:{minutes:02}:{seconds:02}");
                        }
                    })
                    .progress_chars("#>-"),
            );

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let elapsed = clock.elapsed().min(planned_runtime);
                pb.set_position(elapsed.as_secs());
                pb.set_message(format!(
                    "{} ({} VUs)",
                    clock.phase(),
                    clock.target_concurrency()
                ));
                std::thread::sleep(Duration::from_millis(500));
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread: {e}");
    }
}
