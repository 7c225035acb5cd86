//! Explicit cancellation.
//!
//! The protocol carries no deadline or cancellation field, so cancellation
//! is purely local: a [`Cancellation`] is handed to accept loops and client
//! calls, and cancelling it makes them drop their connection and return.
//! The peer observes that as EOF or an I/O error.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation token. All clones observe the same state.
#[derive(Clone, Debug)]
pub struct Cancellation {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender: Arc::new(sender), receiver }
    }

    /// Cancels this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so this only returns on cancel.
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
