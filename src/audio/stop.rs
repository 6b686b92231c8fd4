use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative stop request shared between the session and its engines
///
/// Clones observe the same signal. Engines poll `is_triggered` between chunks
/// and may await `triggered` while blocked on device I/O.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request a stop; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `trigger` has been called on any clone
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone, so this only returns on trigger
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_signal_is_clear() {
        let stop = StopSignal::new();
        assert!(!stop.is_triggered());
    }

    #[test]
    fn test_trigger_is_visible_to_clones() {
        let stop = StopSignal::new();
        let observer = stop.clone();
        stop.trigger();
        stop.trigger();
        assert!(observer.is_triggered());
    }

    #[tokio::test]
    async fn test_triggered_wakes_waiter() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.triggered().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }
}
