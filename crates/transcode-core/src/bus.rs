//! Payload-free publish/subscribe fan-out used to nudge websocket writers.
//!
//! A single global channel is shared across every output-name, matching
//! the source's single `PubSub[struct{}]`: a wakeup carries no
//! information about *which* operation changed, so subscribers always
//! re-read their own output-name's [`crate::progress::Progress`] from the
//! registry rather than trusting anything on the bus itself.

use tokio::sync::broadcast;

const CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<()>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Broadcasts a wakeup to every current subscriber. A slow subscriber
    /// whose buffer has no room simply has older wakeups dropped —
    /// `broadcast` guarantees they still observe *a* wakeup next time they
    /// poll (as `Lagged`), which is sufficient since subscribers re-read
    /// state rather than trusting the payload.
    pub fn publish(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts an [`EventBus`] handle into the narrow [`crate::progress::Notifier`]
/// capability an [`crate::progress::Operation`] holds — breaking the
/// transcoder/operation cycle described in the design notes: the
/// operation never holds a reference back to the registry, only this.
pub struct BusNotifier(pub EventBus);

impl crate::progress::Notifier for BusNotifier {
    fn notify(&self) {
        self.0.publish();
    }
}
