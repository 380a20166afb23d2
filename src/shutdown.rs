//! Shutdown signal shared by the tasks of one connection generation.

use tokio::sync::watch;

/// Create a connected trigger/listener pair.
pub(crate) fn shutdown_channel() -> (ShutdownTrigger, ShutdownListener) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownListener(rx))
}

/// Fires the signal. Dropping the trigger also counts as firing it.
#[derive(Debug)]
pub(crate) struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub(crate) fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

/// Cloneable listener handed to each task.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownListener(watch::Receiver<bool>);

impl ShutdownListener {
    /// Resolve once the signal has fired.
    pub(crate) async fn wait(&mut self) {
        let _ = self.0.wait_for(|fired| *fired).await;
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}
