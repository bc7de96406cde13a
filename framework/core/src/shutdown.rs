use tokio::sync::watch::{Receiver, Sender};

/// Signals the end of a run, either because the stage plan finished or because the user asked
/// for the run to stop.
///
/// The signal is a latched flag. Listeners created after the shutdown still see it, and checking
/// it does not consume it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: std::sync::Arc<Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: std::sync::Arc::new(tokio::sync::watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        let changed = self.sender.send_if_modified(|stopped| {
            let changed = !*stopped;
            *stopped = true;
            changed
        });

        if !changed {
            log::trace!("Shutdown already requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been sent. If this returns true then no new
    /// work should be started so that the scenario can shut down.
    pub fn should_shutdown(&mut self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the shutdown signal. Returns immediately if the signal was already sent. It is safe
    /// to race this with another future so that the shutdown signal can be used to cancel other
    /// work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|stopped| *stopped).await.is_err() {
            // Every handle has been dropped so nothing can ever request work again.
            log::trace!("Shutdown handle dropped, treating as shutdown");
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
