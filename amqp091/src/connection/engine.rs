//! The connection engine: one task owning the socket, running the read
//! loop, the write queue and the heartbeat timer.
//!
//! Nothing here ever surfaces an error into an application task. Failures
//! are recorded in the shared status and every queue is closed, so any
//! waiter wakes up and observes the closed condition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use amqp091_types::definitions::reply_code;
use amqp091_types::{Frame, FrameBody, Method};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, trace, warn};

use crate::channel::{spawn_dispatcher, ChannelShared};
use crate::connection::builder::{BlockedCallback, ConnectionOptions, UnblockedCallback};
use crate::connection::heartbeat::Heartbeat;
use crate::connection::{ConnectionStatus, Negotiated};
use crate::control::{AllocatedChannel, ConnectionControl};
use crate::error::{CloseReason, Error, Result};
use crate::transport::{IoStream, Transport};

/// Heartbeat intervals the peer may miss before it is declared dead.
const MAX_MISSED_HEARTBEATS: u32 = 2;

struct ChannelEntry {
    tx: mpsc::Sender<FrameBody>,
    shared: Arc<ChannelShared>,
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct ConnectionEngine {
    transport: Transport<IoStream>,
    negotiated: Negotiated,
    status: Arc<ConnectionStatus>,

    control_rx: mpsc::Receiver<ConnectionControl>,
    control_tx: mpsc::Sender<ConnectionControl>,
    outgoing_rx: mpsc::Receiver<Vec<Frame>>,
    outgoing_tx: mpsc::Sender<Vec<Frame>>,

    channels: HashMap<u16, ChannelEntry>,
    channel_buffer: usize,
    rpc_timeout: Option<Duration>,

    heartbeat: Heartbeat,
    heartbeat_interval: Option<Duration>,
    last_sent: Instant,
    last_recv: Instant,

    pending_close: Option<(CloseReason, oneshot::Sender<Result<()>>)>,
    pending_update_secret: Option<oneshot::Sender<Result<()>>>,

    on_blocked: Option<BlockedCallback>,
    on_unblocked: Option<UnblockedCallback>,
}

impl ConnectionEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Transport<IoStream>,
        negotiated: Negotiated,
        status: Arc<ConnectionStatus>,
        control_rx: mpsc::Receiver<ConnectionControl>,
        control_tx: mpsc::Sender<ConnectionControl>,
        outgoing_rx: mpsc::Receiver<Vec<Frame>>,
        outgoing_tx: mpsc::Sender<Vec<Frame>>,
        options: &ConnectionOptions,
    ) -> Self {
        let (heartbeat, heartbeat_interval) = match negotiated.heartbeat {
            0 => (Heartbeat::never(), None),
            seconds => {
                let interval = Duration::from_secs(u64::from(seconds));
                (Heartbeat::new(interval), Some(interval))
            }
        };
        let now = Instant::now();
        Self {
            transport,
            negotiated,
            status,
            control_rx,
            control_tx,
            outgoing_rx,
            outgoing_tx,
            channels: HashMap::new(),
            channel_buffer: options.buffer_size,
            rpc_timeout: options.rpc_timeout,
            heartbeat,
            heartbeat_interval,
            last_sent: now,
            last_recv: now,
            pending_close: None,
            pending_update_secret: None,
            on_blocked: options.on_blocked.clone(),
            on_unblocked: options.on_unblocked.clone(),
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.event_loop())
    }

    #[instrument(name = "Connection::event_loop", skip_all)]
    async fn event_loop(mut self) {
        loop {
            let flow = tokio::select! {
                Some(()) = self.heartbeat.next() => self.on_heartbeat_tick().await,
                incoming = self.transport.next() => match incoming {
                    Some(Ok(frame)) => self.on_incoming(frame).await,
                    Some(Err(err)) => {
                        error!(?err, "read loop failed");
                        self.shutdown(CloseReason::new(
                            reply_code::FRAME_ERROR,
                            err.to_string(),
                        ));
                        Flow::Stop
                    }
                    None => {
                        self.shutdown(CloseReason::abnormal("socket closed by peer"));
                        Flow::Stop
                    }
                },
                Some(control) = self.control_rx.recv() => self.on_control(control).await,
                Some(frames) = self.outgoing_rx.recv() => self.on_outgoing(frames).await,
            };
            if let Flow::Stop = flow {
                break;
            }
        }
        debug!("stopped");
    }

    async fn on_incoming(&mut self, frame: Frame) -> Flow {
        self.last_recv = Instant::now();

        if frame.channel == 0 {
            return match frame.body {
                FrameBody::Heartbeat => Flow::Continue,
                FrameBody::Method(method) => self.on_connection_method(method).await,
                FrameBody::Header(_) | FrameBody::Body(_) => {
                    error!("content frame on channel 0");
                    self.shutdown(CloseReason::new(
                        reply_code::UNEXPECTED_FRAME,
                        "content frame on channel 0",
                    ));
                    Flow::Stop
                }
            };
        }

        match self.channels.get(&frame.channel) {
            Some(entry) => {
                // Hand-off only; the dispatcher does the application-facing
                // work so this loop cannot be blocked by a callback.
                if entry.tx.send(frame.body).await.is_err() {
                    trace!(channel = frame.channel, "dispatcher gone, frame dropped");
                }
            }
            None => warn!(channel = frame.channel, "frame for unallocated channel"),
        }
        Flow::Continue
    }

    async fn on_connection_method(&mut self, method: Method) -> Flow {
        match method {
            Method::ConnectionClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                debug!(reply_code, reply_text = %reply_text, "connection closed by server");
                let _ = self
                    .transport
                    .send(Frame::method(0, Method::ConnectionCloseOk))
                    .await;
                self.shutdown(CloseReason {
                    code: reply_code,
                    reason: reply_text,
                    class_id,
                    method_id,
                });
                Flow::Stop
            }
            Method::ConnectionCloseOk => {
                match self.pending_close.take() {
                    Some((reason, responder)) => {
                        self.shutdown(reason);
                        let _ = responder.send(Ok(()));
                    }
                    None => {
                        warn!("close-ok without a pending close");
                        self.shutdown(CloseReason::abnormal("unsolicited close-ok"));
                    }
                }
                Flow::Stop
            }
            Method::ConnectionBlocked { reason } => {
                debug!(reason = %reason, "connection blocked by server");
                self.status.set_blocked(Some(reason.clone()));
                if let Some(callback) = &self.on_blocked {
                    callback(&reason);
                }
                Flow::Continue
            }
            Method::ConnectionUnblocked => {
                debug!("connection unblocked by server");
                self.status.set_blocked(None);
                if let Some(callback) = &self.on_unblocked {
                    callback();
                }
                Flow::Continue
            }
            Method::ConnectionUpdateSecretOk => {
                match self.pending_update_secret.take() {
                    Some(responder) => {
                        let _ = responder.send(Ok(()));
                    }
                    None => warn!("update-secret-ok without a pending update"),
                }
                Flow::Continue
            }
            method => {
                warn!(
                    class_id = method.class_id(),
                    method_id = method.method_id(),
                    "unexpected connection-level method"
                );
                Flow::Continue
            }
        }
    }

    async fn on_control(&mut self, control: ConnectionControl) -> Flow {
        trace!(?control);
        match control {
            ConnectionControl::AllocateChannel { id, responder } => {
                let result = self.allocate_channel(id);
                let _ = responder.send(result);
                Flow::Continue
            }
            ConnectionControl::DeallocateChannel(id) => {
                self.channels.remove(&id);
                Flow::Continue
            }
            ConnectionControl::Close {
                code,
                reason,
                responder,
            } => {
                if self.status.is_closed() || self.pending_close.is_some() {
                    let _ = responder.send(Ok(()));
                    return Flow::Continue;
                }
                let frame = Frame::method(
                    0,
                    Method::ConnectionClose {
                        reply_code: code,
                        reply_text: reason.clone(),
                        class_id: 0,
                        method_id: 0,
                    },
                );
                if let Err(err) = self.write(vec![frame]).await {
                    self.shutdown(CloseReason::abnormal(err.to_string()));
                    let _ = responder.send(Ok(()));
                    return Flow::Stop;
                }
                self.pending_close = Some((CloseReason::new(code, reason), responder));
                Flow::Continue
            }
            ConnectionControl::UpdateSecret {
                new_secret,
                reason,
                responder,
            } => {
                if self.pending_update_secret.is_some() {
                    let _ = responder.send(Err(Error::Argument(
                        "an update-secret is already in flight".into(),
                    )));
                    return Flow::Continue;
                }
                let frame = Frame::method(
                    0,
                    Method::ConnectionUpdateSecret {
                        new_secret: new_secret.into_bytes().into(),
                        reason,
                    },
                );
                if let Err(err) = self.write(vec![frame]).await {
                    self.shutdown(CloseReason::abnormal(err.to_string()));
                    return Flow::Stop;
                }
                self.pending_update_secret = Some(responder);
                Flow::Continue
            }
        }
    }

    /// Lowest-free allocation from 1, or a specific id. Requesting an
    /// existing id hands back the live channel.
    fn allocate_channel(&mut self, id: Option<u16>) -> Result<AllocatedChannel> {
        let channel_max = self.negotiated.channel_max;
        let id = match id {
            Some(0) => {
                return Err(Error::Argument(
                    "channel 0 is reserved for the connection".into(),
                ))
            }
            Some(id) if id > channel_max => {
                return Err(Error::Argument(format!(
                    "channel id {id} exceeds the negotiated channel-max {channel_max}"
                )))
            }
            Some(id) => {
                if let Some(entry) = self.channels.get(&id) {
                    return Ok(AllocatedChannel {
                        shared: Arc::clone(&entry.shared),
                        existing: true,
                    });
                }
                id
            }
            None => (1..=channel_max)
                .find(|candidate| !self.channels.contains_key(candidate))
                .ok_or_else(|| Error::Argument("all channel ids are in use".into()))?,
        };

        let (tx, rx) = mpsc::channel(self.channel_buffer);
        let shared = Arc::new(ChannelShared::new(
            id,
            self.negotiated.frame_max,
            self.rpc_timeout,
            Arc::clone(&self.status),
        ));
        spawn_dispatcher(
            Arc::clone(&shared),
            rx,
            self.outgoing_tx.clone(),
            self.control_tx.clone(),
        );
        self.channels.insert(
            id,
            ChannelEntry {
                tx,
                shared: Arc::clone(&shared),
            },
        );
        Ok(AllocatedChannel {
            shared,
            existing: false,
        })
    }

    /// Writes one batch of frames as a single critical section; a publish
    /// (method + header + bodies) can never interleave with another
    /// writer's frames.
    async fn on_outgoing(&mut self, frames: Vec<Frame>) -> Flow {
        match self.write(frames).await {
            Ok(()) => Flow::Continue,
            Err(err) => {
                error!(?err, "write failed");
                self.shutdown(CloseReason::abnormal(err.to_string()));
                Flow::Stop
            }
        }
    }

    async fn write(&mut self, frames: Vec<Frame>) -> Result<(), amqp091_types::Error> {
        for frame in frames {
            self.transport.feed(frame).await?;
        }
        self.transport.flush().await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Fires at half the heartbeat interval: probe the peer when we have
    /// been quiet, declare it dead when it has.
    async fn on_heartbeat_tick(&mut self) -> Flow {
        let Some(interval) = self.heartbeat_interval else {
            return Flow::Continue;
        };
        let now = Instant::now();

        if now.duration_since(self.last_recv) > interval * MAX_MISSED_HEARTBEATS {
            error!("no frame from the server within two heartbeat intervals");
            self.shutdown(CloseReason::new(
                reply_code::FRAME_ERROR,
                "missed heartbeats from server",
            ));
            return Flow::Stop;
        }
        if now.duration_since(self.last_sent) >= interval {
            if let Err(err) = self.write(vec![Frame::heartbeat()]).await {
                self.shutdown(CloseReason::abnormal(err.to_string()));
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Records the close reason and drops every per-channel sender; the
    /// dispatchers observe the closed queues and cascade from there.
    fn shutdown(&mut self, reason: CloseReason) {
        self.status.set_closed(reason);
        self.status.set_blocked(None);
        self.channels.clear();
        if let Some((_, responder)) = self.pending_close.take() {
            let _ = responder.send(Ok(()));
        }
        self.pending_update_secret = None;
    }
}
