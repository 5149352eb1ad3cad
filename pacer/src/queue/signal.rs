//! Abort signal handed to async workers

use tokio::sync::watch;

/// Observed by a worker to learn that its caller gave up on the result
///
/// The queue never forcibly stops a running worker; honoring the signal is
/// up to the worker.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Check whether abort was requested
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once abort is requested
    ///
    /// Never resolves if the controller is dropped without aborting.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Owning side of an [`AbortSignal`]
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A new signal bound to this controller
    pub fn signal(&self) -> AbortSignal {
        AbortSignal { rx: self.tx.subscribe() }
    }

    /// Trip every signal handed out by this controller
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}
