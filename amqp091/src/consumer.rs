//! Consumers and their delivery queues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::message::Delivery;

pub(crate) type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Consumer state shared with the channel dispatcher, which owns the
/// producing side of the delivery queue.
pub(crate) struct ConsumerShared {
    tag: String,
    canceled: AtomicBool,
    on_cancel: parking_lot::Mutex<Option<CancelCallback>>,
}

impl ConsumerShared {
    pub(crate) fn new(tag: String) -> Self {
        Self {
            tag,
            canceled: AtomicBool::new(false),
            on_cancel: parking_lot::Mutex::new(None),
        }
    }

    /// Invoked by the dispatcher on an unsolicited basic.cancel.
    pub(crate) fn canceled_by_server(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        if let Some(callback) = self.on_cancel.lock().take() {
            callback(&self.tag);
        }
    }
}

#[derive(Clone)]
pub(crate) struct ConsumerEntry {
    pub(crate) tx: mpsc::Sender<Delivery>,
    pub(crate) shared: Arc<ConsumerShared>,
}

/// A subscription to a queue, created with
/// [`Channel::basic_consume`](crate::Channel::basic_consume).
///
/// Deliveries are read with [`recv`](Consumer::recv); the queue closes
/// when the consumer is canceled (locally or by the broker) or when the
/// channel goes away.
pub struct Consumer {
    tag: String,
    channel: Channel,
    deliveries: mpsc::Receiver<Delivery>,
    shared: Arc<ConsumerShared>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("tag", &self.tag)
            .field("channel", &self.channel.id())
            .finish()
    }
}

impl Consumer {
    pub(crate) fn new(
        tag: String,
        channel: Channel,
        deliveries: mpsc::Receiver<Delivery>,
        shared: Arc<ConsumerShared>,
    ) -> Self {
        Self {
            tag,
            channel,
            deliveries,
            shared,
        }
    }

    /// The consumer tag, broker-generated unless one was supplied.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The channel the consumer lives on.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Waits for the next delivery. `None` means the consumer was
    /// canceled or its channel closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Like [`recv`](Consumer::recv) with a deadline; `Err(Timeout)` when
    /// nothing arrives in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        tokio::time::timeout(timeout, self.deliveries.recv())
            .await
            .map_err(|_| Error::Timeout)
    }

    /// Whether the broker canceled this consumer out from under us.
    pub fn is_canceled(&self) -> bool {
        self.shared.canceled.load(Ordering::SeqCst)
    }

    /// Registers a callback invoked with the consumer tag when the broker
    /// cancels the consumer. Runs on the channel's dispatcher task.
    pub fn on_cancel(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.on_cancel.lock() = Some(Box::new(callback));
    }

    /// Cancels the consumer and waits for basic.cancel-ok. The delivery
    /// queue drains whatever was already in flight and then closes.
    pub async fn cancel(&self) -> Result<()> {
        self.channel.basic_cancel(&self.tag).await
    }
}
