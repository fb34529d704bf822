//! Channel: the request/reply engine for one multiplex slot.
//!
//! Every synchronous operation follows the same contract: frames are
//! written atomically, then the caller parks on a reply slot until the
//! matching reply arrives, the channel closes underneath it, or a reply of
//! the wrong type shows up. AMQP does not tag replies, so concurrent
//! synchronous calls on one channel are serialized behind a request mutex
//! to keep request/reply order aligned.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use amqp091_types::definitions::{reply_code, FRAME_OVERHEAD};
use amqp091_types::{ContentHeader, FieldTable, Frame, Method, Properties};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::connection::ConnectionStatus;
use crate::consumer::{Consumer, ConsumerEntry, ConsumerShared};
use crate::control::{connection_closed_error, ConnectionControl};
use crate::error::{CloseReason, Error, Result};
use crate::message::{Delivery, GetMessage, ReturnedMessage};

mod dispatcher;
mod options;

pub(crate) use dispatcher::spawn_dispatcher;
pub use options::{
    ConsumeOptions, ExchangeDeclareOptions, QueueDeclareOk, QueueDeclareOptions,
    QueueDeleteOptions,
};

pub(crate) type ReturnCallback = Arc<dyn Fn(ReturnedMessage) + Send + Sync>;

/// Whether a close was scoped to the channel or cascaded from the
/// connection; decides which error kind waiters observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseLevel {
    Channel,
    Connection,
}

#[derive(Debug, Clone)]
pub(crate) struct ClosedState {
    pub(crate) level: CloseLevel,
    pub(crate) reason: CloseReason,
}

pub(crate) struct MethodWaiter {
    pub(crate) expected: &'static str,
    pub(crate) matches: fn(&Method) -> bool,
    pub(crate) tx: oneshot::Sender<Result<Method>>,
}

/// One outstanding synchronous request. Replies arrive in request order
/// per channel, so a FIFO of these is the whole correlation state.
pub(crate) enum ReplyWaiter {
    Method(MethodWaiter),
    Get(oneshot::Sender<Result<Option<GetMessage>>>),
    Consume {
        delivery_tx: mpsc::Sender<Delivery>,
        tx: oneshot::Sender<Result<(String, Arc<ConsumerShared>)>>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct ConfirmState {
    pub(crate) enabled: bool,
    pub(crate) next_seq: u64,
    pub(crate) unconfirmed: BTreeSet<u64>,
    pub(crate) nacked: bool,
    pub(crate) waiters: Vec<oneshot::Sender<bool>>,
}

/// State shared between the user-facing [`Channel`] handles, the
/// per-channel dispatcher task and the connection engine.
pub(crate) struct ChannelShared {
    pub(crate) id: u16,
    pub(crate) frame_max: u32,
    pub(crate) rpc_timeout: Option<Duration>,
    pub(crate) status: Arc<ConnectionStatus>,
    pub(crate) closed: parking_lot::Mutex<Option<ClosedState>>,
    pub(crate) replies: parking_lot::Mutex<VecDeque<ReplyWaiter>>,
    pub(crate) confirms: parking_lot::Mutex<ConfirmState>,
    pub(crate) consumers: parking_lot::Mutex<HashMap<String, ConsumerEntry>>,
    pub(crate) on_return: parking_lot::Mutex<Option<ReturnCallback>>,
    rpc_lock: tokio::sync::Mutex<()>,
    publish_lock: tokio::sync::Mutex<()>,
}

impl ChannelShared {
    pub(crate) fn new(
        id: u16,
        frame_max: u32,
        rpc_timeout: Option<Duration>,
        status: Arc<ConnectionStatus>,
    ) -> Self {
        Self {
            id,
            frame_max,
            rpc_timeout,
            status,
            closed: parking_lot::Mutex::new(None),
            replies: parking_lot::Mutex::new(VecDeque::new()),
            confirms: parking_lot::Mutex::new(ConfirmState::default()),
            consumers: parking_lot::Mutex::new(HashMap::new()),
            on_return: parking_lot::Mutex::new(None),
            rpc_lock: tokio::sync::Mutex::new(()),
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The error a caller observes when using this channel after close.
    pub(crate) fn closed_error(&self) -> Error {
        match &*self.closed.lock() {
            Some(ClosedState {
                level: CloseLevel::Channel,
                reason,
            }) => Error::ChannelClosed(reason.clone()),
            Some(ClosedState {
                level: CloseLevel::Connection,
                reason,
            }) => Error::ConnectionClosed(reason.clone()),
            None => Error::ChannelClosed(CloseReason::abnormal("channel closed")),
        }
    }

    /// Marks the channel closed and wakes everything parked on it. The
    /// first close wins; later calls are no-ops.
    pub(crate) fn close_local(&self, level: CloseLevel, reason: CloseReason) {
        {
            let mut closed = self.closed.lock();
            if closed.is_some() {
                return;
            }
            *closed = Some(ClosedState { level, reason });
        }

        for waiter in self.replies.lock().drain(..) {
            match waiter {
                ReplyWaiter::Method(w) => {
                    let _ = w.tx.send(Err(self.closed_error()));
                }
                ReplyWaiter::Get(tx) => {
                    let _ = tx.send(Err(self.closed_error()));
                }
                ReplyWaiter::Consume { tx, .. } => {
                    let _ = tx.send(Err(self.closed_error()));
                }
            }
        }
        // Confirm waiters observe the close through their dropped senders.
        self.confirms.lock().waiters.clear();
        // Dropping the delivery senders closes every consumer queue.
        self.consumers.lock().clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.lock().is_some()
    }
}

/// A single AMQP channel multiplexed over the connection.
///
/// Cloning is cheap and clones refer to the same channel. A channel is
/// obtained from [`Connection::channel`](crate::Connection::channel) and
/// stays usable until closed locally, closed by the broker, or torn down
/// with the connection.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
    outgoing: mpsc::Sender<Vec<Frame>>,
    control: mpsc::Sender<ConnectionControl>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(
        shared: Arc<ChannelShared>,
        outgoing: mpsc::Sender<Vec<Frame>>,
        control: mpsc::Sender<ConnectionControl>,
    ) -> Self {
        Self {
            shared,
            outgoing,
            control,
        }
    }

    /// The channel id on the wire.
    pub fn id(&self) -> u16 {
        self.shared.id
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    fn check_open(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(self.shared.closed_error());
        }
        Ok(())
    }

    fn method(&self, method: Method) -> Vec<Frame> {
        vec![Frame::method(self.shared.id, method)]
    }

    async fn send(&self, frames: Vec<Frame>) -> Result<()> {
        self.outgoing
            .send(frames)
            .await
            .map_err(|_| connection_closed_error(&self.shared.status))
    }

    /// Parks on a reply slot until it is fulfilled, the channel closes,
    /// or the deadline passes. An expired slot is not removed from the
    /// reply queue: the broker always answers, replies are positional,
    /// and the late answer pops the slot and is dropped silently, so
    /// later replies keep lining up with their requests.
    async fn await_reply<T>(
        &self,
        rx: oneshot::Receiver<Result<T>>,
        wait: Option<Duration>,
    ) -> Result<T> {
        match wait {
            Some(wait) => match tokio::time::timeout(wait, rx).await {
                Ok(reply) => reply.map_err(|_| self.shared.closed_error())?,
                Err(_elapsed) => Err(Error::Timeout),
            },
            None => rx.await.map_err(|_| self.shared.closed_error())?,
        }
    }

    /// Writes a request and parks until the matching reply arrives.
    async fn rpc(
        &self,
        frames: Vec<Frame>,
        expected: &'static str,
        matches: fn(&Method) -> bool,
    ) -> Result<Method> {
        let _serial = self.shared.rpc_lock.lock().await;
        self.check_open()?;

        let (tx, rx) = oneshot::channel();
        self.shared
            .replies
            .lock()
            .push_back(ReplyWaiter::Method(MethodWaiter {
                expected,
                matches,
                tx,
            }));
        if let Err(err) = self.send(frames).await {
            self.shared.replies.lock().pop_back();
            return Err(err);
        }
        self.await_reply(rx, self.shared.rpc_timeout).await
    }

    pub(crate) async fn open(&self) -> Result<()> {
        self.rpc(self.method(Method::ChannelOpen), "channel.open-ok", |m| {
            matches!(m, Method::ChannelOpenOk)
        })
        .await?;
        Ok(())
    }

    /// Closes the channel with a `200` reply code and waits for the
    /// broker's close-ok. Closing an already-closed channel is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        self.rpc(
            self.method(Method::ChannelClose {
                reply_code: reply_code::REPLY_SUCCESS,
                reply_text: String::new(),
                class_id: 0,
                method_id: 0,
            }),
            "channel.close-ok",
            |m| matches!(m, Method::ChannelCloseOk),
        )
        .await?;
        self.shared.close_local(
            CloseLevel::Channel,
            CloseReason::new(reply_code::REPLY_SUCCESS, "closed"),
        );
        let _ = self
            .control
            .send(ConnectionControl::DeallocateChannel(self.shared.id))
            .await;
        Ok(())
    }

    /// Declares an exchange.
    pub async fn exchange_declare(
        &self,
        exchange: &str,
        exchange_type: &str,
        options: ExchangeDeclareOptions,
    ) -> Result<()> {
        self.rpc(
            self.method(Method::ExchangeDeclare {
                exchange: exchange.into(),
                exchange_type: exchange_type.into(),
                passive: options.passive,
                durable: options.durable,
                auto_delete: options.auto_delete,
                internal: options.internal,
                no_wait: false,
                arguments: options.arguments,
            }),
            "exchange.declare-ok",
            |m| matches!(m, Method::ExchangeDeclareOk),
        )
        .await?;
        Ok(())
    }

    /// Deletes an exchange.
    pub async fn exchange_delete(&self, exchange: &str, if_unused: bool) -> Result<()> {
        self.rpc(
            self.method(Method::ExchangeDelete {
                exchange: exchange.into(),
                if_unused,
                no_wait: false,
            }),
            "exchange.delete-ok",
            |m| matches!(m, Method::ExchangeDeleteOk),
        )
        .await?;
        Ok(())
    }

    /// Binds an exchange to another exchange.
    pub async fn exchange_bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.rpc(
            self.method(Method::ExchangeBind {
                destination: destination.into(),
                source: source.into(),
                routing_key: routing_key.into(),
                no_wait: false,
                arguments,
            }),
            "exchange.bind-ok",
            |m| matches!(m, Method::ExchangeBindOk),
        )
        .await?;
        Ok(())
    }

    /// Removes an exchange-to-exchange binding.
    pub async fn exchange_unbind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.rpc(
            self.method(Method::ExchangeUnbind {
                destination: destination.into(),
                source: source.into(),
                routing_key: routing_key.into(),
                no_wait: false,
                arguments,
            }),
            "exchange.unbind-ok",
            |m| matches!(m, Method::ExchangeUnbindOk),
        )
        .await?;
        Ok(())
    }

    /// Declares a queue. An empty name asks the broker to generate one;
    /// the generated name comes back in the result.
    pub async fn queue_declare(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
    ) -> Result<QueueDeclareOk> {
        let reply = self
            .rpc(
                self.method(Method::QueueDeclare {
                    queue: queue.into(),
                    passive: options.passive,
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    no_wait: false,
                    arguments: options.arguments,
                }),
                "queue.declare-ok",
                |m| matches!(m, Method::QueueDeclareOk { .. }),
            )
            .await?;
        match reply {
            Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            } => Ok(QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            }),
            _ => unreachable!("rpc matched queue.declare-ok"),
        }
    }

    /// Binds a queue to an exchange.
    pub async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.rpc(
            self.method(Method::QueueBind {
                queue: queue.into(),
                exchange: exchange.into(),
                routing_key: routing_key.into(),
                no_wait: false,
                arguments,
            }),
            "queue.bind-ok",
            |m| matches!(m, Method::QueueBindOk),
        )
        .await?;
        Ok(())
    }

    /// Removes a queue binding.
    pub async fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.rpc(
            self.method(Method::QueueUnbind {
                queue: queue.into(),
                exchange: exchange.into(),
                routing_key: routing_key.into(),
                arguments,
            }),
            "queue.unbind-ok",
            |m| matches!(m, Method::QueueUnbindOk),
        )
        .await?;
        Ok(())
    }

    /// Removes all messages from a queue; returns how many were purged.
    pub async fn queue_purge(&self, queue: &str) -> Result<u32> {
        let reply = self
            .rpc(
                self.method(Method::QueuePurge {
                    queue: queue.into(),
                    no_wait: false,
                }),
                "queue.purge-ok",
                |m| matches!(m, Method::QueuePurgeOk { .. }),
            )
            .await?;
        match reply {
            Method::QueuePurgeOk { message_count } => Ok(message_count),
            _ => unreachable!("rpc matched queue.purge-ok"),
        }
    }

    /// Deletes a queue; returns how many messages it still held.
    pub async fn queue_delete(&self, queue: &str, options: QueueDeleteOptions) -> Result<u32> {
        let reply = self
            .rpc(
                self.method(Method::QueueDelete {
                    queue: queue.into(),
                    if_unused: options.if_unused,
                    if_empty: options.if_empty,
                    no_wait: false,
                }),
                "queue.delete-ok",
                |m| matches!(m, Method::QueueDeleteOk { .. }),
            )
            .await?;
        match reply {
            Method::QueueDeleteOk { message_count } => Ok(message_count),
            _ => unreachable!("rpc matched queue.delete-ok"),
        }
    }

    /// Limits how many unacknowledged deliveries the broker pushes to
    /// consumers on this channel (or the whole connection with `global`).
    pub async fn basic_qos(&self, prefetch_count: u16, global: bool) -> Result<()> {
        self.rpc(
            self.method(Method::BasicQos {
                prefetch_size: 0,
                prefetch_count,
                global,
            }),
            "basic.qos-ok",
            |m| matches!(m, Method::BasicQosOk),
        )
        .await?;
        Ok(())
    }

    /// Starts a consumer on a queue and returns its delivery stream.
    pub async fn basic_consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer> {
        let _serial = self.shared.rpc_lock.lock().await;
        self.check_open()?;

        let (delivery_tx, delivery_rx) = mpsc::channel(options.buffer);
        let (tx, rx) = oneshot::channel();
        self.shared.replies.lock().push_back(ReplyWaiter::Consume {
            delivery_tx,
            tx,
        });
        let frames = self.method(Method::BasicConsume {
            queue: queue.into(),
            consumer_tag: options.consumer_tag.clone(),
            no_local: false,
            no_ack: options.no_ack,
            exclusive: options.exclusive,
            no_wait: false,
            arguments: options.arguments,
        });
        if let Err(err) = self.send(frames).await {
            self.shared.replies.lock().pop_back();
            return Err(err);
        }
        let (tag, shared) = self.await_reply(rx, self.shared.rpc_timeout).await?;
        Ok(Consumer::new(tag, self.clone(), delivery_rx, shared))
    }

    /// Cancels a consumer by tag and waits for the broker's cancel-ok.
    pub async fn basic_cancel(&self, consumer_tag: &str) -> Result<()> {
        self.rpc(
            self.method(Method::BasicCancel {
                consumer_tag: consumer_tag.into(),
                no_wait: false,
            }),
            "basic.cancel-ok",
            |m| matches!(m, Method::BasicCancelOk { .. }),
        )
        .await?;
        self.shared.consumers.lock().remove(consumer_tag);
        Ok(())
    }

    /// Publishes a message.
    ///
    /// The method, header and body frames are queued as one atomic batch;
    /// bodies larger than `frame_max - 8` are split across body frames. In
    /// confirm mode the allocated sequence number is recorded before any
    /// byte is written and returned to the caller.
    pub async fn basic_publish(
        &self,
        body: impl Into<Bytes>,
        exchange: &str,
        routing_key: &str,
        properties: Properties,
        mandatory: bool,
    ) -> Result<Option<u64>> {
        let mut body = body.into();
        let _serial = self.shared.publish_lock.lock().await;
        self.check_open()?;

        let chunk_size = self.shared.frame_max as usize - FRAME_OVERHEAD;
        let mut frames = Vec::with_capacity(2 + body.len().div_ceil(chunk_size.max(1)));
        frames.push(Frame::method(
            self.shared.id,
            Method::BasicPublish {
                exchange: exchange.into(),
                routing_key: routing_key.into(),
                mandatory,
                immediate: false,
            },
        ));
        frames.push(Frame::header(
            self.shared.id,
            ContentHeader {
                body_size: body.len() as u64,
                properties,
            },
        ));
        while !body.is_empty() {
            let take = body.len().min(chunk_size);
            frames.push(Frame::body(self.shared.id, body.split_to(take)));
        }

        let seq = {
            let mut confirms = self.shared.confirms.lock();
            if confirms.enabled {
                confirms.next_seq += 1;
                let seq = confirms.next_seq;
                confirms.unconfirmed.insert(seq);
                Some(seq)
            } else {
                None
            }
        };

        self.send(frames).await?;
        Ok(seq)
    }

    /// Publishes in confirm mode and waits until the broker settles every
    /// outstanding publish on the channel. Returns `false` when any of
    /// them was nacked.
    pub async fn basic_publish_confirm(
        &self,
        body: impl Into<Bytes>,
        exchange: &str,
        routing_key: &str,
        properties: Properties,
        mandatory: bool,
    ) -> Result<bool> {
        self.confirm_select().await?;
        self.basic_publish(body, exchange, routing_key, properties, mandatory)
            .await?;
        self.wait_for_confirms().await
    }

    /// Pulls a single message from a queue, or `None` when it is empty.
    pub async fn basic_get(&self, queue: &str, no_ack: bool) -> Result<Option<GetMessage>> {
        self.get(queue, no_ack, self.shared.rpc_timeout).await
    }

    /// [`basic_get`](Channel::basic_get) with an explicit deadline;
    /// fails with [`Error::Timeout`] once it passes. The broker's late
    /// answer is consumed silently, so the channel stays usable.
    pub async fn basic_consume_once(
        &self,
        queue: &str,
        no_ack: bool,
        timeout: Duration,
    ) -> Result<Option<GetMessage>> {
        self.get(queue, no_ack, Some(timeout)).await
    }

    async fn get(
        &self,
        queue: &str,
        no_ack: bool,
        wait: Option<Duration>,
    ) -> Result<Option<GetMessage>> {
        let _serial = self.shared.rpc_lock.lock().await;
        self.check_open()?;

        let (tx, rx) = oneshot::channel();
        self.shared.replies.lock().push_back(ReplyWaiter::Get(tx));
        let frames = self.method(Method::BasicGet {
            queue: queue.into(),
            no_ack,
        });
        if let Err(err) = self.send(frames).await {
            self.shared.replies.lock().pop_back();
            return Err(err);
        }
        self.await_reply(rx, wait).await
    }

    /// Acknowledges a delivery, or with `multiple` everything up to and
    /// including `delivery_tag`.
    pub async fn basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        self.check_open()?;
        self.send(self.method(Method::BasicAck {
            delivery_tag,
            multiple,
        }))
        .await
    }

    /// Negatively acknowledges one or more deliveries.
    pub async fn basic_nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<()> {
        self.check_open()?;
        self.send(self.method(Method::BasicNack {
            delivery_tag,
            multiple,
            requeue,
        }))
        .await
    }

    /// Rejects a single delivery.
    pub async fn basic_reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.check_open()?;
        self.send(self.method(Method::BasicReject {
            delivery_tag,
            requeue,
        }))
        .await
    }

    /// Asks the broker to redeliver all unacknowledged deliveries on this
    /// channel. Brokers that do not implement `requeue=false` answer with
    /// a 540 close, which surfaces as [`Error::ChannelClosed`].
    pub async fn basic_recover(&self, requeue: bool) -> Result<()> {
        self.rpc(
            self.method(Method::BasicRecover { requeue }),
            "basic.recover-ok",
            |m| matches!(m, Method::BasicRecoverOk),
        )
        .await?;
        Ok(())
    }

    /// Puts the channel in publisher-confirm mode. Calling it again after
    /// the first success is a no-op.
    pub async fn confirm_select(&self) -> Result<()> {
        if self.shared.confirms.lock().enabled {
            return Ok(());
        }
        self.rpc(
            self.method(Method::ConfirmSelect { no_wait: false }),
            "confirm.select-ok",
            |m| matches!(m, Method::ConfirmSelectOk),
        )
        .await?;
        self.shared.confirms.lock().enabled = true;
        Ok(())
    }

    /// Blocks until every outstanding publish is confirmed. Returns
    /// `false` when at least one was nacked since the last settle point.
    pub async fn wait_for_confirms(&self) -> Result<bool> {
        let rx = {
            let mut confirms = self.shared.confirms.lock();
            if !confirms.enabled || confirms.unconfirmed.is_empty() {
                let ok = !confirms.nacked;
                confirms.nacked = false;
                return Ok(ok);
            }
            let (tx, rx) = oneshot::channel();
            confirms.waiters.push(tx);
            rx
        };
        rx.await.map_err(|_| self.shared.closed_error())
    }

    /// Puts the channel in transaction mode.
    pub async fn tx_select(&self) -> Result<()> {
        self.rpc(self.method(Method::TxSelect), "tx.select-ok", |m| {
            matches!(m, Method::TxSelectOk)
        })
        .await?;
        Ok(())
    }

    /// Commits the current transaction.
    pub async fn tx_commit(&self) -> Result<()> {
        self.rpc(self.method(Method::TxCommit), "tx.commit-ok", |m| {
            matches!(m, Method::TxCommitOk)
        })
        .await?;
        Ok(())
    }

    /// Rolls back the current transaction.
    pub async fn tx_rollback(&self) -> Result<()> {
        self.rpc(self.method(Method::TxRollback), "tx.rollback-ok", |m| {
            matches!(m, Method::TxRollbackOk)
        })
        .await?;
        Ok(())
    }

    /// Registers the callback invoked when the broker returns an
    /// unroutable mandatory publish. The callback runs on the channel's
    /// dispatcher task; keep it short.
    pub fn on_return(&self, callback: impl Fn(ReturnedMessage) + Send + Sync + 'static) {
        *self.shared.on_return.lock() = Some(Arc::new(callback));
    }

    pub(crate) fn shared(&self) -> &Arc<ChannelShared> {
        &self.shared
    }

    pub(crate) fn outgoing_sender(&self) -> mpsc::Sender<Vec<Frame>> {
        self.outgoing.clone()
    }

    pub(crate) fn control_sender(&self) -> mpsc::Sender<ConnectionControl> {
        self.control.clone()
    }
}
