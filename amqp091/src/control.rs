//! Control messages from user-facing handles to the connection engine.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::channel::ChannelShared;
use crate::error::{Error, Result};

/// Result of a channel allocation request.
pub(crate) struct AllocatedChannel {
    pub(crate) shared: Arc<ChannelShared>,
    /// True when the id was already allocated and the existing channel is
    /// being handed back instead of a fresh one.
    pub(crate) existing: bool,
}

pub(crate) enum ConnectionControl {
    AllocateChannel {
        /// Requested id, or `None` for lowest-free.
        id: Option<u16>,
        responder: oneshot::Sender<Result<AllocatedChannel>>,
    },
    DeallocateChannel(u16),
    Close {
        code: u16,
        reason: String,
        responder: oneshot::Sender<Result<()>>,
    },
    UpdateSecret {
        new_secret: String,
        reason: String,
        responder: oneshot::Sender<Result<()>>,
    },
}

impl std::fmt::Debug for ConnectionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionControl::AllocateChannel { id, .. } => {
                f.debug_struct("AllocateChannel").field("id", id).finish()
            }
            ConnectionControl::DeallocateChannel(id) => {
                f.debug_tuple("DeallocateChannel").field(id).finish()
            }
            ConnectionControl::Close { code, reason, .. } => f
                .debug_struct("Close")
                .field("code", code)
                .field("reason", reason)
                .finish(),
            ConnectionControl::UpdateSecret { reason, .. } => f
                .debug_struct("UpdateSecret")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Maps a lost control/outgoing channel to the recorded close reason.
pub(crate) fn connection_closed_error(status: &crate::connection::ConnectionStatus) -> Error {
    Error::ConnectionClosed(
        status
            .closed_reason()
            .unwrap_or_else(|| crate::error::CloseReason::abnormal("connection closed")),
    )
}
