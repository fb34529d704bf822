//! The per-channel half of the read path. The connection engine forwards
//! every frame addressed to a channel here; this task correlates replies,
//! reassembles content, feeds consumers and tracks publisher confirms, so
//! the read loop itself never blocks on application code.

use std::sync::Arc;

use amqp091_types::{ContentHeader, Frame, FrameBody, Method};
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::channel::{Channel, ChannelShared, CloseLevel, ReplyWaiter};
use crate::consumer::{ConsumerEntry, ConsumerShared};
use crate::control::ConnectionControl;
use crate::error::{CloseReason, Error};
use crate::message::{Delivery, GetMessage, ReturnedMessage};

/// Spawns the dispatcher task for a freshly allocated channel.
pub(crate) fn spawn_dispatcher(
    shared: Arc<ChannelShared>,
    incoming: mpsc::Receiver<FrameBody>,
    outgoing: mpsc::Sender<Vec<Frame>>,
    control: mpsc::Sender<ConnectionControl>,
) {
    let channel = Channel::new(Arc::clone(&shared), outgoing, control);
    let dispatcher = Dispatcher {
        shared,
        channel,
        incoming,
        assembly: None,
    };
    let _task = tokio::spawn(dispatcher.run());
}

/// What a delivered message will become once its body is complete.
enum PendingContent {
    Deliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    Return {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
    Get {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
        tx: tokio::sync::oneshot::Sender<crate::error::Result<Option<GetMessage>>>,
    },
}

struct Assembly {
    content: PendingContent,
    header: Option<ContentHeader>,
    buf: BytesMut,
}

struct Dispatcher {
    shared: Arc<ChannelShared>,
    channel: Channel,
    incoming: mpsc::Receiver<FrameBody>,
    assembly: Option<Assembly>,
}

enum Flow {
    Continue,
    Stop,
}

impl Dispatcher {
    async fn run(mut self) {
        while let Some(body) = self.incoming.recv().await {
            let flow = match body {
                FrameBody::Method(method) => self.on_method(method).await,
                FrameBody::Header(header) => {
                    self.on_header(header).await;
                    Flow::Continue
                }
                FrameBody::Body(chunk) => {
                    self.on_body(chunk).await;
                    Flow::Continue
                }
                FrameBody::Heartbeat => Flow::Continue,
            };
            if let Flow::Stop = flow {
                return;
            }
        }

        // The engine dropped us: the connection is gone. Waiters observe
        // the connection-level close reason, not a channel error.
        let reason = self
            .shared
            .status
            .closed_reason()
            .unwrap_or_else(|| CloseReason::abnormal("connection closed"));
        self.shared.close_local(CloseLevel::Connection, reason);
    }

    async fn on_method(&mut self, method: Method) -> Flow {
        match method {
            Method::BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => {
                self.begin_content(PendingContent::Deliver {
                    consumer_tag,
                    delivery_tag,
                    redelivered,
                    exchange,
                    routing_key,
                });
            }
            Method::BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => {
                self.begin_content(PendingContent::Return {
                    reply_code,
                    reply_text,
                    exchange,
                    routing_key,
                });
            }
            Method::BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => {
                let waiter = self.shared.replies.lock().pop_front();
                match waiter {
                    Some(ReplyWaiter::Get(tx)) => {
                        self.begin_content(PendingContent::Get {
                            delivery_tag,
                            redelivered,
                            exchange,
                            routing_key,
                            message_count,
                            tx,
                        });
                    }
                    Some(other) => self.fail_waiter(other, "basic.get-ok"),
                    None => warn!(channel = self.shared.id, "get-ok with no outstanding get"),
                }
            }
            Method::BasicGetEmpty => match self.shared.replies.lock().pop_front() {
                Some(ReplyWaiter::Get(tx)) => {
                    let _ = tx.send(Ok(None));
                }
                Some(other) => self.fail_waiter(other, "basic.get-empty"),
                None => warn!(channel = self.shared.id, "get-empty with no outstanding get"),
            },
            Method::BasicAck {
                delivery_tag,
                multiple,
            } => self.on_confirm(delivery_tag, multiple, false),
            Method::BasicNack {
                delivery_tag,
                multiple,
                ..
            } => self.on_confirm(delivery_tag, multiple, true),
            Method::BasicCancel { consumer_tag, .. } => self.on_server_cancel(&consumer_tag),
            Method::ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                debug!(
                    channel = self.shared.id,
                    reply_code,
                    reply_text = %reply_text,
                    "channel closed by server"
                );
                self.send_detached(vec![Frame::method(self.shared.id, Method::ChannelCloseOk)]);
                self.shared.close_local(
                    CloseLevel::Channel,
                    CloseReason {
                        code: reply_code,
                        reason: reply_text,
                        class_id,
                        method_id,
                    },
                );
                let control = self.channel_control();
                let id = self.shared.id;
                let _task = tokio::spawn(async move {
                    let _ = control.send(ConnectionControl::DeallocateChannel(id)).await;
                });
                return Flow::Stop;
            }
            reply => self.on_reply(reply),
        }
        Flow::Continue
    }

    /// Fulfils the oldest reply slot; replies arrive in request order.
    fn on_reply(&self, method: Method) {
        match self.shared.replies.lock().pop_front() {
            Some(ReplyWaiter::Method(waiter)) => {
                if (waiter.matches)(&method) {
                    let _ = waiter.tx.send(Ok(method));
                } else {
                    let _ = waiter.tx.send(Err(unexpected(waiter.expected, &method)));
                }
            }
            Some(ReplyWaiter::Consume { delivery_tx, tx }) => {
                if let Method::BasicConsumeOk { consumer_tag } = method {
                    let consumer = Arc::new(ConsumerShared::new(consumer_tag.clone()));
                    self.shared.consumers.lock().insert(
                        consumer_tag.clone(),
                        ConsumerEntry {
                            tx: delivery_tx,
                            shared: Arc::clone(&consumer),
                        },
                    );
                    let _ = tx.send(Ok((consumer_tag, consumer)));
                } else {
                    let _ = tx.send(Err(unexpected("basic.consume-ok", &method)));
                }
            }
            Some(ReplyWaiter::Get(tx)) => {
                let _ = tx.send(Err(unexpected("basic.get-ok", &method)));
            }
            None => warn!(
                channel = self.shared.id,
                class_id = method.class_id(),
                method_id = method.method_id(),
                "reply with no outstanding request"
            ),
        }
    }

    fn fail_waiter(&self, waiter: ReplyWaiter, got: &'static str) {
        let err = || Error::UnexpectedFrame(format!("{got} did not match the outstanding request"));
        match waiter {
            ReplyWaiter::Method(w) => {
                let _ = w.tx.send(Err(err()));
            }
            ReplyWaiter::Get(tx) => {
                let _ = tx.send(Err(err()));
            }
            ReplyWaiter::Consume { tx, .. } => {
                let _ = tx.send(Err(err()));
            }
        }
    }

    fn begin_content(&mut self, content: PendingContent) {
        if self.assembly.is_some() {
            error!(
                channel = self.shared.id,
                "content method while a message was still being assembled"
            );
        }
        self.assembly = Some(Assembly {
            content,
            header: None,
            buf: BytesMut::new(),
        });
    }

    async fn on_header(&mut self, header: ContentHeader) {
        let Some(assembly) = self.assembly.as_mut() else {
            error!(channel = self.shared.id, "header frame without a content method");
            return;
        };
        let body_size = header.body_size;
        assembly.header = Some(header);
        if body_size == 0 {
            let assembly = self.assembly.take().expect("assembly present");
            self.complete(assembly).await;
        }
    }

    async fn on_body(&mut self, chunk: Bytes) {
        enum Outcome {
            Pending,
            Complete,
            Discard,
        }

        let outcome = match self.assembly.as_mut() {
            None => {
                error!(channel = self.shared.id, "body frame without a content method");
                return;
            }
            Some(assembly) => match assembly.header.as_ref().map(|h| h.body_size) {
                None => {
                    error!(channel = self.shared.id, "body frame before the content header");
                    Outcome::Discard
                }
                Some(expected) => {
                    assembly.buf.extend_from_slice(&chunk);
                    if (assembly.buf.len() as u64) > expected {
                        error!(
                            channel = self.shared.id,
                            expected, "body frames exceed the announced body size"
                        );
                        Outcome::Discard
                    } else if assembly.buf.len() as u64 == expected {
                        Outcome::Complete
                    } else {
                        Outcome::Pending
                    }
                }
            },
        };

        match outcome {
            Outcome::Pending => {}
            Outcome::Discard => self.assembly = None,
            Outcome::Complete => {
                let assembly = self.assembly.take().expect("assembly present");
                self.complete(assembly).await;
            }
        }
    }

    /// The body byte count now equals the announced size; hand the message
    /// to its single receiver.
    async fn complete(&mut self, assembly: Assembly) {
        let properties = assembly
            .header
            .map(|h| h.properties)
            .unwrap_or_default();
        let body = assembly.buf.freeze();

        match assembly.content {
            PendingContent::Deliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => {
                let entry = self.shared.consumers.lock().get(&consumer_tag).cloned();
                let Some(entry) = entry else {
                    warn!(
                        channel = self.shared.id,
                        consumer_tag = %consumer_tag,
                        "delivery for unknown consumer dropped"
                    );
                    return;
                };
                let delivery = Delivery {
                    consumer_tag,
                    delivery_tag,
                    redelivered,
                    exchange,
                    routing_key,
                    properties,
                    body,
                    channel: self.channel.clone(),
                };
                if entry.tx.send(delivery).await.is_err() {
                    debug!(channel = self.shared.id, "consumer queue closed, delivery dropped");
                }
            }
            PendingContent::Return {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => {
                let message = ReturnedMessage {
                    reply_code,
                    reply_text,
                    exchange,
                    routing_key,
                    properties,
                    body,
                };
                let callback = self.shared.on_return.lock().clone();
                match callback {
                    Some(callback) => callback(message),
                    None => warn!(
                        channel = self.shared.id,
                        reply_code = message.reply_code,
                        routing_key = %message.routing_key,
                        "mandatory publish returned but no on_return callback is set"
                    ),
                }
            }
            PendingContent::Get {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
                tx,
            } => {
                let message = GetMessage {
                    delivery_tag,
                    redelivered,
                    exchange,
                    routing_key,
                    message_count,
                    properties,
                    body,
                    channel: self.channel.clone(),
                };
                let _ = tx.send(Ok(Some(message)));
            }
        }
    }

    /// Publisher confirm bookkeeping. `multiple` settles every sequence
    /// number up to and including the reported tag.
    fn on_confirm(&self, delivery_tag: u64, multiple: bool, nack: bool) {
        let mut confirms = self.shared.confirms.lock();
        if !confirms.enabled {
            warn!(channel = self.shared.id, "confirm on a channel not in confirm mode");
            return;
        }
        let removed = if multiple {
            let keep = confirms.unconfirmed.split_off(&(delivery_tag + 1));
            let removed = !confirms.unconfirmed.is_empty();
            confirms.unconfirmed = keep;
            removed
        } else {
            confirms.unconfirmed.remove(&delivery_tag)
        };
        if !removed {
            error!(
                channel = self.shared.id,
                delivery_tag, "confirm for a sequence number that was never published"
            );
        }
        if nack {
            confirms.nacked = true;
        }
        if confirms.unconfirmed.is_empty() && !confirms.waiters.is_empty() {
            let ok = !confirms.nacked;
            confirms.nacked = false;
            for waiter in confirms.waiters.drain(..) {
                let _ = waiter.send(ok);
            }
        }
    }

    /// An unsolicited basic.cancel: the broker canceled the consumer, e.g.
    /// because its queue was deleted.
    fn on_server_cancel(&self, consumer_tag: &str) {
        let entry = self.shared.consumers.lock().remove(consumer_tag);
        match entry {
            Some(entry) => entry.shared.canceled_by_server(),
            None => warn!(
                channel = self.shared.id,
                consumer_tag, "cancel for unknown consumer"
            ),
        }
    }

    /// Writes without parking the dispatcher; if the outgoing queue is
    /// momentarily full the send finishes on a detached task.
    fn send_detached(&self, frames: Vec<Frame>) {
        if let Err(mpsc::error::TrySendError::Full(frames)) =
            self.channel_outgoing().try_send(frames)
        {
            let outgoing = self.channel_outgoing();
            let _task = tokio::spawn(async move {
                let _ = outgoing.send(frames).await;
            });
        }
    }

    fn channel_outgoing(&self) -> mpsc::Sender<Vec<Frame>> {
        self.channel.outgoing_sender()
    }

    fn channel_control(&self) -> mpsc::Sender<ConnectionControl> {
        self.channel.control_sender()
    }
}

fn unexpected(expected: &'static str, got: &Method) -> Error {
    Error::UnexpectedFrame(format!(
        "expected {expected}, got {}/{}",
        got.class_id(),
        got.method_id()
    ))
}
