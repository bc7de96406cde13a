use std::time::Duration;

use surge_core::prelude::{RunPhase, ScenarioClock, ShutdownHandle};

const PHASE_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Follow the run through its phases, logging each transition. Once the stage plan reports
/// [RunPhase::Finished] the run is shut down.
pub(crate) fn start_phase_driver(
    runtime: &tokio::runtime::Handle,
    clock: ScenarioClock,
    shutdown_handle: ShutdownHandle,
) {
    let mut shutdown_listener = shutdown_handle.new_listener();
    runtime.spawn(async move {
        log::info!("Run phase: {}", RunPhase::Idle);
        let mut current = RunPhase::Idle;
        let mut interval = tokio::time::interval(PHASE_CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_listener.wait_for_shutdown() => {
                    log::info!("Run stopped during phase: {current}");
                    break;
                }
            }

            let phase = clock.phase();
            if phase != current {
                log::info!(
                    "Run phase: {phase} at {:.1}s, target {} virtual users",
                    clock.elapsed().as_secs_f64(),
                    clock.target_concurrency()
                );
                current = phase;
            }

            if phase == RunPhase::Finished {
                shutdown_handle.shutdown();
                break;
            }
        }
    });
}
