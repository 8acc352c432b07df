//! Chain event fan-out
//!
//! Each subscriber gets its own bounded channel. Events are published after
//! the state change they describe has been committed. A subscriber that
//! falls behind loses events rather than stalling block processing; one that
//! has dropped its receiver is forgotten.

use crate::block_index::BlockNode;
use crate::types::Transaction;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    BlockConnected(BlockNode),
    BlockDisconnected(BlockNode),
    TransactionAccepted(Transaction),
}

impl ChainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::BlockConnected(_) => "block_connected",
            ChainEvent::BlockDisconnected(_) => "block_disconnected",
            ChainEvent::TransactionAccepted(_) => "transaction_accepted",
        }
    }
}

pub struct Notifier {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<ChainEvent>>>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<ChainEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `events` in order to every live subscriber
    pub fn publish<I>(&self, events: I)
    where
        I: IntoIterator<Item = ChainEvent>,
    {
        let mut subscribers = self.lock();
        if subscribers.is_empty() {
            return;
        }
        for event in events {
            subscribers.retain(|sub| match sub.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(event = event.kind(), "subscriber queue full, dropping event");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<ChainEvent>>> {
        // A panic while holding the lock cannot leave the sender list inconsistent
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionOutput;

    fn tx(value: i64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TransactionOutput {
                value,
                script_pubkey: vec![],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn test_events_arrive_in_order() {
        let notifier = Notifier::new(8);
        let rx = notifier.subscribe();
        notifier.publish([
            ChainEvent::TransactionAccepted(tx(1)),
            ChainEvent::TransactionAccepted(tx(2)),
        ]);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                ChainEvent::TransactionAccepted(tx(1)),
                ChainEvent::TransactionAccepted(tx(2))
            ]
        );
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let notifier = Notifier::new(1);
        let rx = notifier.subscribe();
        notifier.publish([
            ChainEvent::TransactionAccepted(tx(1)),
            ChainEvent::TransactionAccepted(tx(2)),
        ]);
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let notifier = Notifier::new(4);
        let kept = notifier.subscribe();
        drop(notifier.subscribe());
        notifier.publish([ChainEvent::TransactionAccepted(tx(1))]);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }
}
