//! Ordered, thread-safe message queue
//!
//! A thin layer over an unbounded crossbeam channel that stamps every
//! message with a per-queue sequence number at enqueue time. Producers never
//! block; consumers may block until a message arrives.
//!
//! The sequence stamp and the channel send happen under one lock, so the
//! order in which messages come out of the queue is exactly the order of
//! their sequence numbers even with several producers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

/// A message together with its enqueue order
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    /// Position in the queue's enqueue order, starting at 0
    pub seq: u64,
    pub payload: T,
}

/// Multi-producer FIFO queue
///
/// Cloning yields another handle to the same queue.
#[derive(Debug)]
pub struct MessageQueue<T> {
    tx: Sender<Envelope<T>>,
    rx: Receiver<Envelope<T>>,
    next_seq: Arc<Mutex<u64>>,
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            next_seq: Arc::clone(&self.next_seq),
        }
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            tx,
            rx,
            next_seq: Arc::new(Mutex::new(0)),
        }
    }

    /// Enqueue a message (never blocks), returning its sequence number
    pub fn push(&self, payload: T) -> u64 {
        let mut next = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = *next;
        *next += 1;
        // The queue holds its own receiver, so the channel cannot be disconnected
        let _ = self.tx.send(Envelope { seq, payload });
        seq
    }

    /// Block until a message is available
    pub fn pop(&self) -> Envelope<T> {
        match self.rx.recv() {
            Ok(envelope) => envelope,
            Err(_) => unreachable!("queue handle holds a sender, channel cannot disconnect"),
        }
    }

    /// Block up to `timeout` for a message
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Envelope<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => Some(envelope),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take a message if one is ready
    pub fn try_pop(&self) -> Option<Envelope<T>> {
        self.rx.try_recv().ok()
    }

    /// Take every message currently queued, in order
    pub fn drain(&self) -> Vec<Envelope<T>> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Underlying receiver, for `crossbeam::select!` with other channels
    pub(crate) fn receiver(&self) -> &Receiver<Envelope<T>> {
        &self.rx
    }
}
