//! Cooperative cancellation for in-flight renders.

use tokio::sync::watch;

/// Sending half, held by whoever may abort the job.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// Receiving half, threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelHandle {
    /// Returns `false` if the signal was already raised.
    pub fn cancel(&self) -> bool {
        self.0.send_if_modified(|cancelled| !std::mem::replace(cancelled, true))
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once cancellation is requested; pends forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
