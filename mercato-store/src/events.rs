use mercato_shared::PurchaseCompletedEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out of committed sales to whoever is listening on a store.
#[derive(Clone)]
pub struct Publisher {
    tx: broadcast::Sender<PurchaseCompletedEvent>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PurchaseCompletedEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget. Returns how many subscribers received the event.
    pub fn notify_all(&self, event: PurchaseCompletedEvent) -> usize {
        debug!("{}", event.message());
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!("Purchase event delivered to {} subscribers", receivers);
                receivers
            }
            Err(_) => {
                debug!("Purchase event dropped, nobody is subscribed");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
