//! Bounded MPMC job queue.
//!
//! Built on a bounded tokio mpsc channel. Producers (admission) block in
//! `enqueue` while the queue is full; consumers (workers) share the receiving
//! end behind an async mutex and block in `dequeue` while it is empty.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// The queue was closed (or every receiver dropped); the item is returned.
#[derive(Debug, Error)]
#[error("job queue is closed")]
pub struct QueueClosed<T>(pub T);

#[derive(Debug, Error)]
pub enum TryEnqueueError<T> {
    #[error("job queue is full")]
    Full(T),

    #[error("job queue is closed")]
    Closed(T),
}

/// Producer side. Cheap to clone.
#[derive(Debug)]
pub struct JobQueue<T> {
    tx: mpsc::Sender<T>,
    capacity: usize,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

/// Consumer side, shared by all workers. Cheap to clone.
#[derive(Debug)]
pub struct JobReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    closing: CancellationToken,
}

impl<T> Clone for JobReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            closing: self.closing.clone(),
        }
    }
}

/// Create a queue holding at most `capacity` pending jobs (min 1).
pub fn bounded<T>(capacity: usize) -> (JobQueue<T>, JobReceiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        JobQueue { tx, capacity },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
            closing: CancellationToken::new(),
        },
    )
}

impl<T> JobQueue<T> {
    /// Enqueue, waiting for room while the queue is full (backpressure).
    pub async fn enqueue(&self, item: T) -> Result<(), QueueClosed<T>> {
        self.tx.send(item).await.map_err(|e| QueueClosed(e.0))
    }

    /// Enqueue without waiting.
    pub fn try_enqueue(&self, item: T) -> Result<(), TryEnqueueError<T>> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => TryEnqueueError::Full(item),
            mpsc::error::TrySendError::Closed(item) => TryEnqueueError::Closed(item),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> JobReceiver<T> {
    /// Next job in FIFO order; waits while empty. `None` once every producer
    /// is gone and the queue is drained.
    pub async fn dequeue(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        if !self.closing.is_cancelled() {
            tokio::select! {
                item = rx.recv() => return item,
                _ = self.closing.cancelled() => {}
            }
        }
        // closed while waiting: hand out what is left, then None
        rx.close();
        rx.recv().await
    }

    /// Stop accepting new jobs. Already queued jobs can still be dequeued.
    ///
    /// Never waits: if a consumer is parked in `dequeue` it holds the
    /// receiver, and closes it itself when it wakes up.
    pub fn close(&self) {
        self.closing.cancel();
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
        }
    }
}
