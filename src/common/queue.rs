//! Broadcast queue for one-to-many event distribution.

use std::sync::Arc;

use tokio::sync::broadcast;

/// Every subscriber receives every message.
///
/// Backed by tokio's broadcast channel. Messages sent while nobody listens are dropped.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// send a message, returning the number of subscribers that will see it
    pub fn send(
        &self,
        msg: T,
    ) -> usize {
        self.sender.send(msg).unwrap_or_default()
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}
