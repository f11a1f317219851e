//! Application-side queues connected to the bridges.
//!
//! A producer bridge drains an [`InputQueue`]; the application closes the
//! input by dropping every sender. A consumer bridge fills the unbounded
//! channel behind an [`OutputQueue`]; dropping the [`OutputQueue`] stops the
//! consumer.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Receiving half of the queue a producer bridge drains.
#[derive(Debug)]
pub enum InputQueue {
    /// Bounded channel; senders wait when it is full.
    Bounded(mpsc::Receiver<Bytes>),
    /// Unbounded channel.
    Unbounded(mpsc::UnboundedReceiver<Bytes>),
}

impl InputQueue {
    /// Create a bounded queue, returning the sender for the application.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn bounded(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::Bounded(rx))
    }

    /// Create an unbounded queue, returning the sender for the application.
    #[must_use]
    pub fn unbounded() -> (mpsc::UnboundedSender<Bytes>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::Unbounded(rx))
    }

    /// Receive the next message, or `None` once every sender is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Bytes> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Refuse further sends. Messages already queued stay receivable.
    pub fn close(&mut self) {
        match self {
            Self::Bounded(rx) => rx.close(),
            Self::Unbounded(rx) => rx.close(),
        }
    }

    /// Whether the queue refuses further sends.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(rx) => rx.is_closed(),
            Self::Unbounded(rx) => rx.is_closed(),
        }
    }

    /// Close the queue and drop every message still buffered, returning how
    /// many were discarded.
    pub fn close_and_discard(&mut self) -> u64 {
        self.close();
        let mut discarded = 0;
        while self.try_recv().is_some() {
            discarded += 1;
        }
        discarded
    }

    fn try_recv(&mut self) -> Option<Bytes> {
        match self {
            Self::Bounded(rx) => rx.try_recv().ok(),
            Self::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

impl From<mpsc::Receiver<Bytes>> for InputQueue {
    fn from(rx: mpsc::Receiver<Bytes>) -> Self { Self::Bounded(rx) }
}

impl From<mpsc::UnboundedReceiver<Bytes>> for InputQueue {
    fn from(rx: mpsc::UnboundedReceiver<Bytes>) -> Self { Self::Unbounded(rx) }
}

/// Receiving half of the queue a consumer bridge fills.
///
/// Yields messages in transport delivery order and ends once the consumer
/// bridge has stopped and every delivered message was taken.
#[derive(Debug)]
pub struct OutputQueue {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl OutputQueue {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<Bytes>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> Option<Bytes> { self.rx.recv().await }

    /// Take a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] when nothing is queued and
    /// [`TryRecvError::Disconnected`] once the bridge has stopped and the
    /// queue is drained.
    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> { self.rx.try_recv() }

    /// Number of messages waiting.
    #[must_use]
    pub fn len(&self) -> usize { self.rx.len() }

    /// Whether no messages are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }
}

impl Stream for OutputQueue {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
