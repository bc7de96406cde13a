use surge_core::prelude::ShutdownHandle;
use tokio::signal;

/// Listen for Ctrl-C and turn it into a shutdown of the run.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C, the run can only end when its stages do: {e}");
            return;
        }
        listener_handle.shutdown();
        println!("Received shutdown signal, shutting down...");
    });

    Ok(handle)
}
