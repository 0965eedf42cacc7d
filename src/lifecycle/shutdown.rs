//! Shutdown coordination.
//!
//! One [`Shutdown`] owns the trigger; the server's accept loop and its
//! maintenance task each hold a [`ShutdownSignal`]. Dropping the coordinator
//! without triggering also releases every signal, so a lost trigger can never
//! leave the server running unowned.

use tokio::sync::broadcast;

use crate::lifecycle::signals;

pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            fired: false,
        }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger once SIGINT or SIGTERM arrives.
    pub async fn trigger_on_os_signal(self) {
        signals::wait_for_signal().await;
        self.trigger();
    }

    /// Number of signals still held.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving side: resolves once shutdown is triggered.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
    fired: bool,
}

impl ShutdownSignal {
    /// Wait for the trigger. Returns immediately once it has fired.
    pub async fn wait(&mut self) {
        if self.fired {
            return;
        }
        // A closed channel means the coordinator is gone; treat it as a trigger.
        let _ = self.rx.recv().await;
        self.fired = true;
    }

    pub fn is_triggered(&self) -> bool {
        self.fired
    }

    /// A second signal for another task, carrying over whether this one fired.
    pub fn resubscribe(&self) -> Self {
        Self {
            rx: self.rx.resubscribe(),
            fired: self.fired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_every_signal() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = a.resubscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        a.wait().await;
        b.wait().await;
        assert!(a.is_triggered() && b.is_triggered());

        // Waiting again does not block.
        tokio::time::timeout(Duration::from_millis(50), a.wait())
            .await
            .expect("fired signal should resolve immediately");
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .expect("closed channel should release the waiter");
    }

    #[tokio::test]
    async fn test_untriggered_signal_keeps_waiting() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        let waited = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(waited.is_err());
        assert!(!signal.is_triggered());
    }
}
