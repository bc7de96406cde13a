use std::future::Future;
use std::time::Duration;

use surge_core::prelude::{ShutdownHandle, ShutdownSignalError};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
    grace_period: Duration,
}

impl Executor {
    pub(crate) fn new(
        runtime: tokio::runtime::Runtime,
        shutdown_handle: ShutdownHandle,
        grace_period: Duration,
    ) -> Self {
        Self {
            runtime,
            shutdown_handle,
            grace_period,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Work that is in progress when the run is shut down is given the grace period to complete.
    /// After that it is cancelled and a [ShutdownSignalError] is returned. You do not need to do
    /// anything special to handle this, but you should be aware that submitting a future which does
    /// not support cancelling may prevent the runner from shutting down.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        let grace_period = self.grace_period;
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = async {
                    shutdown_listener.wait_for_shutdown().await;
                    tokio::time::sleep(grace_period).await;
                } => {
                    log::debug!("Cancelling work still in progress {grace_period:?} after shutdown");
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Sleep for `duration`, waking early if the run is shut down.
    ///
    /// Returns `false` if the sleep was cut short by a shutdown.
    pub fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.shutdown_handle.is_shutdown();
        }

        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = shutdown_listener.wait_for_shutdown() => false,
            }
        })
    }

    /// Submit async code to be run in the background.
    ///
    /// Note that the future will not be cancelled if the runner is shutdown. It is also not guaranteed
    /// that the runner will wait for the future to complete before shutting down.
    ///
    /// In agent behaviour hooks, you should use [Executor::execute_in_place] instead of [Executor::spawn]
    /// to ensure that your future completes before the behaviour completes and is scheduled again.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}
