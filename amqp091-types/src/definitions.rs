//! Protocol constants as defined in the AMQP 0-9-1 specification and the
//! RabbitMQ errata.

/// the IANA assigned port number for AMQP.
pub const PORT: u16 = 5672;

/// the IANA assigned port number for secure AMQP (amqps).
pub const SECURE_PORT: u16 = 5671;

/// The 8-byte preamble opening every AMQP 0-9-1 connection.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

/// Frame type octet of a method frame.
pub const FRAME_METHOD: u8 = 1;

/// Frame type octet of a content header frame.
pub const FRAME_HEADER: u8 = 2;

/// Frame type octet of a content body frame.
pub const FRAME_BODY: u8 = 3;

/// Frame type octet of a heartbeat frame. The 0-9-1 document says 4; every
/// broker in the 0-9-1 family (RabbitMQ, LavinMQ) uses 8.
pub const FRAME_HEARTBEAT: u8 = 8;

/// Every frame terminates with this octet.
pub const FRAME_END: u8 = 0xCE;

/// Bytes of overhead per frame: type (1) + channel (2) + size (4) + end (1).
pub const FRAME_OVERHEAD: usize = 8;

/// The lower bound a peer may negotiate `frame-max` down to.
pub const FRAME_MIN_SIZE: u32 = 4096;

#[allow(missing_docs)]
pub mod class {
    //! Class ids of the method classes the client speaks.

    pub const CONNECTION: u16 = 10;
    pub const CHANNEL: u16 = 20;
    pub const EXCHANGE: u16 = 40;
    pub const QUEUE: u16 = 50;
    pub const BASIC: u16 = 60;
    pub const CONFIRM: u16 = 85;
    pub const TX: u16 = 90;
}

#[allow(missing_docs)]
pub mod reply_code {
    //! Standard AMQP reply codes, surfaced verbatim to the caller.

    pub const REPLY_SUCCESS: u16 = 200;
    pub const CONTENT_TOO_LARGE: u16 = 311;
    pub const NO_ROUTE: u16 = 312;
    pub const NO_CONSUMERS: u16 = 313;
    pub const CONNECTION_FORCED: u16 = 320;
    pub const INVALID_PATH: u16 = 402;
    pub const ACCESS_REFUSED: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const RESOURCE_LOCKED: u16 = 405;
    pub const PRECONDITION_FAILED: u16 = 406;
    pub const FRAME_ERROR: u16 = 501;
    pub const SYNTAX_ERROR: u16 = 502;
    pub const COMMAND_INVALID: u16 = 503;
    pub const CHANNEL_ERROR: u16 = 504;
    pub const UNEXPECTED_FRAME: u16 = 505;
    pub const RESOURCE_ERROR: u16 = 506;
    pub const NOT_ALLOWED: u16 = 530;
    pub const NOT_IMPLEMENTED: u16 = 540;
    pub const INTERNAL_ERROR: u16 = 541;
}
