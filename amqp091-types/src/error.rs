//! Errors raised while encoding or decoding wire data.

use thiserror::Error;

/// Error raised by the frame and argument codecs.
#[derive(Debug, Error)]
pub enum Error {
    /// A frame did not terminate with the `0xCE` end octet.
    #[error("frame did not end with 0xCE (found 0x{0:02X})")]
    UnexpectedFrameEnd(u8),

    /// The decoder received a frame type octet it does not implement.
    #[error("unsupported frame type {0}")]
    UnsupportedFrameType(u8),

    /// The decoder received a class/method pair it does not implement.
    #[error("unsupported method {class_id}/{method_id}")]
    UnsupportedMethod {
        /// AMQP class id
        class_id: u16,
        /// AMQP method id within the class
        method_id: u16,
    },

    /// A heartbeat frame arrived on a channel other than 0.
    #[error("heartbeat frame on channel {0}")]
    HeartbeatOnNonZeroChannel(u16),

    /// The peer rejected the protocol version and answered the preamble
    /// with its own `AMQP` header.
    #[error("peer speaks protocol version {0}.{1}.{2}")]
    ProtocolVersionMismatch(u8, u8, u8),

    /// A frame announced a payload larger than the negotiated frame-max.
    #[error("frame of {size} bytes exceeds frame-max {frame_max}")]
    FrameTooLarge {
        /// Announced payload size plus envelope
        size: usize,
        /// Negotiated maximum
        frame_max: usize,
    },

    /// A field-table key exceeded the 255-byte short-string limit.
    #[error("table key of {0} bytes exceeds 255")]
    TableKeyTooLong(usize),

    /// A short string exceeded 255 bytes on encode.
    #[error("short string of {0} bytes exceeds 255")]
    ShortStringTooLong(usize),

    /// Malformed wire data.
    #[error("syntax error: {0}")]
    Syntax(&'static str),

    /// IO error bubbled up by the framed transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
