//! Errors surfaced to the caller, split into connect-time failures
//! ([`OpenError`]) and failures on an established connection ([`Error`]).

use std::io;

use thiserror::Error;

/// Why a connection or channel was closed.
///
/// For a peer-initiated close this carries the AMQP reply code and text
/// verbatim, plus the class/method that caused it (0/0 when none). A socket
/// that died without a close method is reported with code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// AMQP reply code, e.g. 406 precondition-failed.
    pub code: u16,
    /// Human-readable reply text from the peer.
    pub reason: String,
    /// Class id of the offending method, 0 if not applicable.
    pub class_id: u16,
    /// Method id of the offending method, 0 if not applicable.
    pub method_id: u16,
}

impl CloseReason {
    pub(crate) fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    pub(crate) fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(0, reason)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Error associated with opening a connection.
#[derive(Debug, Error)]
pub enum OpenError {
    /// IO error while connecting or during the handshake
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error parsing the URL
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Scheme is neither `amqp` nor `amqps`
    #[error(r#"invalid scheme {0:?}; only "amqp" and "amqps" are supported"#)]
    InvalidScheme(String),

    /// Host is missing or not a valid TLS server name
    #[error("invalid or missing host")]
    InvalidDomain,

    /// An option carried a value that does not parse
    #[error("invalid value for option {0:?}")]
    InvalidOption(&'static str),

    /// TLS handshake or configuration failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// The URL requested amqps but no TLS feature is compiled in
    #[error("amqps requested but TLS support is not compiled in")]
    TlsSupportDisabled,

    /// TCP connect exceeded the configured timeout
    #[error("connect timed out")]
    Timeout,

    /// The broker closed the connection during the handshake, e.g. on bad
    /// credentials (403) or an unknown vhost (402)
    #[error("broker refused connection: {0}")]
    Refused(CloseReason),

    /// The peer sent a method that has no place in the handshake
    #[error("unexpected method {class_id}/{method_id} during handshake")]
    UnexpectedMethod {
        /// Class id of the offending method
        class_id: u16,
        /// Method id of the offending method
        method_id: u16,
    },

    /// Malformed wire data, including a peer preamble announcing an
    /// unsupported protocol version
    #[error(transparent)]
    Codec(amqp091_types::Error),
}

impl From<amqp091_types::Error> for OpenError {
    fn from(err: amqp091_types::Error) -> Self {
        match err {
            amqp091_types::Error::Io(err) => OpenError::Io(err),
            other => OpenError::Codec(other),
        }
    }
}

/// Error on an established connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The socket closed or the peer sent connection.close
    #[error("connection closed: {0}")]
    ConnectionClosed(CloseReason),

    /// The peer sent channel.close, or the channel was used after closing
    #[error("channel closed: {0}")]
    ChannelClosed(CloseReason),

    /// A reply arrived that does not match the outstanding request
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// A publish in confirm mode was nacked by the broker
    #[error("publish was not confirmed by the broker")]
    PublishNotConfirmed,

    /// An operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    /// The caller passed an argument the protocol cannot express
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Encoding or decoding failed
    #[error(transparent)]
    Codec(amqp091_types::Error),

    /// IO error on the established socket
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<amqp091_types::Error> for Error {
    fn from(err: amqp091_types::Error) -> Self {
        match err {
            amqp091_types::Error::Io(err) => Error::Io(err),
            other => Error::Codec(other),
        }
    }
}

impl Error {
    /// The AMQP reply code carried by a close error, if any.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Error::ConnectionClosed(reason) | Error::ChannelClosed(reason) => Some(reason.code),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
