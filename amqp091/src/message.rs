//! The messages handed to the application: consumer deliveries, basic.get
//! results and mandatory-publish returns.

use amqp091_types::Properties;
use bytes::Bytes;

use crate::channel::Channel;
use crate::error::Result;

/// A message pushed to a consumer by the broker.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Tag of the consumer the message was delivered to.
    pub consumer_tag: String,
    /// Channel-scoped tag used to ack or reject this delivery.
    pub delivery_tag: u64,
    /// Whether the message was delivered before and requeued.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Message properties.
    pub properties: Properties,
    /// Message body.
    pub body: Bytes,

    pub(crate) channel: Channel,
}

impl Delivery {
    /// Acknowledges this delivery.
    pub async fn ack(&self) -> Result<()> {
        self.channel.basic_ack(self.delivery_tag, false).await
    }

    /// Rejects this delivery, optionally asking the broker to requeue it.
    pub async fn reject(&self, requeue: bool) -> Result<()> {
        self.channel.basic_reject(self.delivery_tag, requeue).await
    }

    /// Negatively acknowledges this delivery, optionally requeueing it.
    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.channel
            .basic_nack(self.delivery_tag, false, requeue)
            .await
    }
}

/// A message pulled with [`Channel::basic_get`].
#[derive(Debug, Clone)]
pub struct GetMessage {
    /// Channel-scoped tag used to ack or reject this message.
    pub delivery_tag: u64,
    /// Whether the message was delivered before and requeued.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Messages remaining in the queue after this one.
    pub message_count: u32,
    /// Message properties.
    pub properties: Properties,
    /// Message body.
    pub body: Bytes,

    pub(crate) channel: Channel,
}

impl GetMessage {
    /// Acknowledges this message.
    pub async fn ack(&self) -> Result<()> {
        self.channel.basic_ack(self.delivery_tag, false).await
    }

    /// Rejects this message, optionally asking the broker to requeue it.
    pub async fn reject(&self, requeue: bool) -> Result<()> {
        self.channel.basic_reject(self.delivery_tag, requeue).await
    }
}

/// An unroutable mandatory publish handed back by the broker.
#[derive(Debug, Clone)]
pub struct ReturnedMessage {
    /// AMQP reply code, e.g. 312 no-route.
    pub reply_code: u16,
    /// Reply text, e.g. `NO_ROUTE`.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Message properties.
    pub properties: Properties,
    /// Message body.
    pub body: Bytes,
}
