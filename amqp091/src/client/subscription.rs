//! Registered subscriptions and the worker pools that drain them.
//!
//! A subscription survives the connection that created it: the supervisor
//! re-issues basic.consume with the same arguments on every reconnect.

use std::sync::Arc;

use amqp091_types::FieldTable;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::channel::ConsumeOptions;
use crate::connection::Connection;
use crate::consumer::Consumer;
use crate::error::Result;
use crate::message::Delivery;

/// Error type a delivery handler may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The application callback invoked for every delivery.
pub(crate) type DeliveryHandler =
    Arc<dyn Fn(Delivery) -> BoxFuture<'static, std::result::Result<(), HandlerError>> + Send + Sync>;

/// Options for [`Client::subscribe`](crate::Client::subscribe).
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Deliveries need no acknowledgement; the workers then neither ack
    /// nor reject.
    pub no_ack: bool,
    /// Per-consumer prefetch applied with basic.qos before consuming.
    pub prefetch: u16,
    /// Number of worker tasks invoking the handler; 0 consumes inline in
    /// the calling task, carrying on with each replacement consumer after
    /// a reconnect, and returns only when the client stops.
    pub worker_threads: usize,
    /// Broker-specific consume arguments.
    pub arguments: FieldTable,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            no_ack: false,
            prefetch: 1,
            worker_threads: 1,
            arguments: FieldTable::new(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) queue: String,
    pub(crate) no_ack: bool,
    pub(crate) prefetch: u16,
    pub(crate) worker_threads: usize,
    pub(crate) arguments: FieldTable,
    pub(crate) handler: DeliveryHandler,
    /// For `worker_threads == 0`: hands each established consumer back
    /// to the caller blocked in subscribe.
    pub(crate) inline_tx: Option<mpsc::UnboundedSender<Consumer>>,
}

impl Subscription {
    /// Identity for deduplication: same consume arguments and the same
    /// handler instance.
    pub(crate) fn matches(&self, other: &Subscription) -> bool {
        self.queue == other.queue
            && self.no_ack == other.no_ack
            && self.prefetch == other.prefetch
            && self.worker_threads == other.worker_threads
            && self.arguments == other.arguments
            && Arc::ptr_eq(&self.handler, &other.handler)
    }

    /// Routes a consumer established for an inline subscription back to
    /// the caller blocked in subscribe. If that caller is gone, the
    /// deliveries are drained on a detached task instead of stranding
    /// the broker-side consumer.
    pub(crate) fn hand_off(&self, consumer: Consumer) {
        let consumer = match &self.inline_tx {
            Some(tx) => match tx.send(consumer) {
                Ok(()) => return,
                Err(rejected) => rejected.0,
            },
            None => consumer,
        };
        let handler = Arc::clone(&self.handler);
        let no_ack = self.no_ack;
        let _task = tokio::spawn(async move {
            let mut consumer = consumer;
            while let Some(delivery) = consumer.recv().await {
                handle_delivery(&handler, delivery, no_ack).await;
            }
        });
    }

    /// Opens a dedicated channel, applies QoS and starts the consumer.
    ///
    /// With `inline` the consumer is handed back to the caller instead of
    /// being wrapped in worker tasks.
    pub(crate) async fn establish(
        &self,
        connection: &Connection,
        inline: bool,
    ) -> Result<Option<Consumer>> {
        let channel = connection.channel().await?;
        channel.basic_qos(self.prefetch, false).await?;
        let consumer = channel
            .basic_consume(
                &self.queue,
                ConsumeOptions {
                    no_ack: self.no_ack,
                    arguments: self.arguments.clone(),
                    ..ConsumeOptions::default()
                },
            )
            .await?;
        debug!(queue = %self.queue, tag = consumer.tag(), "subscription established");

        if inline {
            return Ok(Some(consumer));
        }

        let workers = self.worker_threads.max(1);
        let shared = Arc::new(Mutex::new(consumer));
        for _ in 0..workers {
            let _worker = tokio::spawn(worker_loop(
                Arc::clone(&shared),
                Arc::clone(&self.handler),
                self.no_ack,
            ));
        }
        Ok(None)
    }
}

/// One worker: pop a delivery, run the handler, settle the message. The
/// queue is single-producer multi-consumer; workers take turns holding the
/// receiver while parked and release it to run the handler.
pub(crate) async fn worker_loop(
    consumer: Arc<Mutex<Consumer>>,
    handler: DeliveryHandler,
    no_ack: bool,
) {
    loop {
        let delivery = { consumer.lock().await.recv().await };
        let Some(delivery) = delivery else {
            debug!("consumer queue closed, worker exiting");
            return;
        };
        handle_delivery(&handler, delivery, no_ack).await;
    }
}

pub(crate) async fn handle_delivery(handler: &DeliveryHandler, delivery: Delivery, no_ack: bool) {
    match handler(delivery.clone()).await {
        Ok(()) => {
            if !no_ack {
                if let Err(err) = delivery.ack().await {
                    warn!(?err, delivery_tag = delivery.delivery_tag, "ack failed");
                }
            }
        }
        Err(err) => {
            warn!(?err, delivery_tag = delivery.delivery_tag, "handler failed, rejecting");
            if !no_ack {
                if let Err(err) = delivery.reject(false).await {
                    warn!(?err, delivery_tag = delivery.delivery_tag, "reject failed");
                }
            }
        }
    }
}
