//! Cancellable push subscriptions.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

/// Ordered stream of events for a single consumer.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Waits for the next event. Returns `None` once the subscription is
    /// cancelled and drained, or the publisher is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stops delivery. Events queued before the call can still be drained,
    /// later ones are discarded.
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}

/// The publishing side of a set of subscriptions.
#[derive(Debug)]
pub struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription { rx }
    }

    /// Sends `event` to every live subscription and forgets cancelled ones.
    pub fn publish(&self, event: &T) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of subscriptions that were live at the last publish.
    pub fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_to_every_subscriber() {
        let subscribers = Subscribers::new();
        let mut first = subscribers.subscribe();
        let mut second = subscribers.subscribe();
        for event in 0..3u32 {
            subscribers.publish(&event);
        }
        for expected in 0..3u32 {
            assert_eq!(first.recv().await, Some(expected));
            assert_eq!(second.recv().await, Some(expected));
        }
        assert_eq!(first.try_recv(), None);
    }

    #[tokio::test]
    async fn cancelled_subscription_drains_then_ends() {
        let subscribers = Subscribers::new();
        let mut sub = subscribers.subscribe();
        subscribers.publish(&1u32);
        sub.cancel();
        subscribers.publish(&2u32);

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);
        assert!(subscribers.is_empty());
    }
}
