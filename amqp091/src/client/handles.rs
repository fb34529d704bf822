//! Queue and exchange handles bound to a [`Client`].

use std::future::Future;

use amqp091_types::{FieldTable, Properties};
use bytes::Bytes;

use crate::client::subscription::{HandlerError, SubscribeOptions};
use crate::error::Result;
use crate::message::Delivery;
use crate::Client;

/// A declared queue, scoped to the client that declared it. All
/// operations go through the client's reserved channel and therefore
/// survive reconnects.
#[derive(Debug, Clone)]
pub struct Queue {
    pub(crate) client: Client,
    pub(crate) name: String,
}

impl Queue {
    /// The queue name; broker-generated for anonymous queues.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publishes to the queue through the default exchange, waiting for
    /// the broker's confirm.
    pub async fn publish(&self, body: impl Into<Bytes>, properties: Properties) -> Result<()> {
        self.client.publish(body, "", &self.name, properties).await
    }

    /// Publishes without waiting for the confirm.
    pub async fn publish_and_forget(
        &self,
        body: impl Into<Bytes>,
        properties: Properties,
    ) -> Result<()> {
        self.client
            .publish_and_forget(body, "", &self.name, properties)
            .await
    }

    /// Subscribes to the queue; re-established on every reconnect.
    pub async fn subscribe<F, Fut>(&self, options: SubscribeOptions, handler: F) -> Result<()>
    where
        F: Fn(Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.client.subscribe(&self.name, options, handler).await
    }

    /// Binds the queue to an exchange.
    pub async fn bind(
        &self,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.client
            .bind_queue(&self.name, exchange, routing_key, arguments)
            .await
    }

    /// Removes a binding from the queue.
    pub async fn unbind(
        &self,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.client
            .unbind_queue(&self.name, exchange, routing_key, arguments)
            .await
    }

    /// Removes all messages from the queue.
    pub async fn purge(&self) -> Result<u32> {
        self.client.purge_queue(&self.name).await
    }

    /// Deletes the queue; returns how many messages it still held.
    pub async fn delete(&self) -> Result<u32> {
        self.client.delete_queue(&self.name).await
    }

    /// Messages currently in the queue, via a passive declare.
    pub async fn message_count(&self) -> Result<u32> {
        let ok = self.client.queue_status(&self.name).await?;
        Ok(ok.message_count)
    }

    /// Consumers currently subscribed, via a passive declare.
    pub async fn consumer_count(&self) -> Result<u32> {
        let ok = self.client.queue_status(&self.name).await?;
        Ok(ok.consumer_count)
    }
}

/// A declared exchange, scoped to the client that declared it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub(crate) client: Client,
    pub(crate) name: String,
}

impl Exchange {
    /// The exchange name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publishes to the exchange, waiting for the broker's confirm.
    pub async fn publish(
        &self,
        body: impl Into<Bytes>,
        routing_key: &str,
        properties: Properties,
    ) -> Result<()> {
        self.client
            .publish(body, &self.name, routing_key, properties)
            .await
    }

    /// Publishes without waiting for the confirm.
    pub async fn publish_and_forget(
        &self,
        body: impl Into<Bytes>,
        routing_key: &str,
        properties: Properties,
    ) -> Result<()> {
        self.client
            .publish_and_forget(body, &self.name, routing_key, properties)
            .await
    }

    /// Binds this exchange to `source` so it receives matching messages.
    pub async fn bind(
        &self,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.client
            .bind_exchange(&self.name, source, routing_key, arguments)
            .await
    }

    /// Removes an exchange-to-exchange binding.
    pub async fn unbind(
        &self,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.client
            .unbind_exchange(&self.name, source, routing_key, arguments)
            .await
    }

    /// Deletes the exchange.
    pub async fn delete(&self) -> Result<()> {
        self.client.delete_exchange(&self.name).await
    }
}
