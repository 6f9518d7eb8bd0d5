//! Pipeline-wide cancellation.
//!
//! One [`CancelSignal`] is created per generate or rewrite invocation and
//! cloned into every task. The first task to hit a fatal error trips it;
//! producers observe it before each send through [`send_or_cancelled`].
//!
//! Errors travel the same channels as items but ignore the signal, see
//! [`send_error_and_cancel`]. Stages therefore keep draining their input
//! after cancellation so the first error always reaches the consumer.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::error::{DigestlockError, Result};

/// Shared, clonable cancellation flag backed by a `watch` channel.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    /// Creates a signal in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trips the signal. Idempotent.
    pub fn cancel(&self) {
        let was_cancelled = self.tx.send_replace(true);
        if !was_cancelled {
            tracing::debug!("pipeline cancelled");
        }
    }

    /// Returns whether the signal has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the signal is tripped.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends `item` unless the pipeline is cancelled first.
///
/// Returns `false` when the item was not delivered, either because the
/// signal tripped or because the receiver has gone away. Callers stop
/// producing on `false`.
pub async fn send_or_cancelled<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancelSignal) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Delivers a fatal error downstream, then trips the signal.
///
/// The send is not cancellation-aware. It only fails once the receiver is
/// gone, which means the consumer already stopped on an earlier error.
pub async fn send_error_and_cancel<T>(
    tx: &mpsc::Sender<Result<T>>,
    err: DigestlockError,
    cancel: &CancelSignal,
) {
    tracing::debug!(error = %err, "stage failed");
    let _ = tx.send(Err(err)).await;
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_not_cancelled() {
        assert!(!CancelSignal::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        signal.cancel();
        assert!(clone.is_cancelled());
        clone.cancel();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        signal.cancel();
        handle.await.expect("waiter task");
    }

    #[tokio::test]
    async fn send_delivers_when_not_cancelled() {
        let (tx, mut rx) = mpsc::channel(1);
        let signal = CancelSignal::new();
        assert!(send_or_cancelled(&tx, 7, &signal).await);
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn send_refuses_after_cancel() {
        let (tx, mut rx) = mpsc::channel(1);
        let signal = CancelSignal::new();
        signal.cancel();
        assert!(!send_or_cancelled(&tx, 7, &signal).await);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn blocked_send_unblocks_on_cancel() {
        let (tx, mut rx) = mpsc::channel(1);
        let signal = CancelSignal::new();
        assert!(send_or_cancelled(&tx, 1, &signal).await);
        let sender = signal.clone();
        let handle = tokio::spawn(async move { send_or_cancelled(&tx, 2, &sender).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "send should block on a full channel");

        signal.cancel();
        let delivered = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("blocked send returns promptly")
            .expect("sender task");
        assert!(!delivered);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!send_or_cancelled(&tx, 1, &CancelSignal::new()).await);
    }

    #[tokio::test]
    async fn errors_are_delivered_even_after_cancel() {
        let (tx, mut rx) = mpsc::channel::<Result<u8>>(1);
        let signal = CancelSignal::new();
        signal.cancel();
        send_error_and_cancel(&tx, DigestlockError::Cancelled, &signal).await;
        assert!(matches!(rx.recv().await, Some(Err(DigestlockError::Cancelled))));
        assert!(signal.is_cancelled());
    }
}
