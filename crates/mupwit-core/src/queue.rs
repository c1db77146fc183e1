//! Bounded single-producer/single-consumer queues between the presentation
//! thread and the engine thread.
//!
//! Neither side ever blocks: `push` drops the item when the queue is full
//! and `pop` returns `None` when it is empty.

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

pub fn bounded<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender { tx, name },
        QueueReceiver {
            rx,
            disconnected: false,
        },
    )
}

pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    name: &'static str,
}

impl<T> QueueSender<T> {
    /// Returns false when the item was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("{} queue full, dropping item", self.name);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("{} queue closed, dropping item", self.name);
                false
            }
        }
    }
}

pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    disconnected: bool,
}

impl<T> QueueReceiver<T> {
    pub fn pop(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.disconnected = true;
                None
            }
        }
    }

    /// True once the queue is empty and every sender is gone.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}
