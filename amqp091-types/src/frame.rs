//! Frame envelope and the corresponding encoder and decoder.
//!
//! Wire layout: `[u8 type][u16 channel][u32 size][payload][0xCE]`. The
//! codec plugs into `tokio_util::codec::Framed` on the client side.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{read_u16, read_u64};
use crate::definitions::{
    class, FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEARTBEAT, FRAME_METHOD, FRAME_MIN_SIZE,
    FRAME_OVERHEAD,
};
use crate::error::Error;
use crate::method::Method;
use crate::properties::Properties;

/// A single frame on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel the frame belongs to; 0 is the connection itself.
    pub channel: u16,
    /// Decoded payload.
    pub body: FrameBody,
}

impl Frame {
    /// Creates a method frame.
    pub fn method(channel: u16, method: Method) -> Self {
        Self {
            channel,
            body: FrameBody::Method(method),
        }
    }

    /// Creates a content header frame.
    pub fn header(channel: u16, header: ContentHeader) -> Self {
        Self {
            channel,
            body: FrameBody::Header(header),
        }
    }

    /// Creates a content body frame.
    pub fn body(channel: u16, chunk: Bytes) -> Self {
        Self {
            channel,
            body: FrameBody::Body(chunk),
        }
    }

    /// Creates a heartbeat frame. Heartbeats always travel on channel 0.
    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            body: FrameBody::Heartbeat,
        }
    }
}

/// Payload of a [`Frame`], one variant per frame type.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// A method with its arguments.
    Method(Method),
    /// The content header opening a message body.
    Header(ContentHeader),
    /// One chunk of message body.
    Body(Bytes),
    /// Liveness probe; carries no payload.
    Heartbeat,
}

/// Payload of a content header frame: the body size announcement plus the
/// message properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    /// Total size of the message body across all body frames.
    pub body_size: u64,
    /// Message properties.
    pub properties: Properties,
}

impl ContentHeader {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(class::BASIC);
        dst.put_u16(0); // weight, unused
        dst.put_u64(self.body_size);
        self.properties.encode(dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let class_id = read_u16(src)?;
        if class_id != class::BASIC {
            return Err(Error::Syntax("content header for a class other than basic"));
        }
        let _weight = read_u16(src)?;
        let body_size = read_u64(src)?;
        let properties = Properties::decode(src)?;
        Ok(Self {
            body_size,
            properties,
        })
    }
}

/// Encoder and decoder for AMQP 0-9-1 frames.
///
/// The decoder is streaming: it returns `None` until a whole frame,
/// including the end octet, is buffered. `max_frame_size` starts at the
/// protocol minimum and is raised once tune negotiation settles.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// A codec limited to the protocol-minimum frame size.
    pub fn new() -> Self {
        Self {
            max_frame_size: FRAME_MIN_SIZE as usize,
        }
    }

    /// Raises (or lowers) the accepted frame size after tune negotiation.
    pub fn set_max_frame_size(&mut self, frame_max: usize) {
        self.max_frame_size = frame_max.max(FRAME_MIN_SIZE as usize);
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let kind = match &item.body {
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        };
        dst.put_u8(kind);
        dst.put_u16(item.channel);

        // Reserve the size field, then backfill once the payload is known.
        let size_at = dst.len();
        dst.put_u32(0);
        let payload_at = dst.len();
        match &item.body {
            FrameBody::Method(method) => method.encode(dst)?,
            FrameBody::Header(header) => header.encode(dst)?,
            FrameBody::Body(chunk) => dst.put_slice(chunk),
            FrameBody::Heartbeat => {}
        }
        let payload_len = (dst.len() - payload_at) as u32;
        dst[size_at..payload_at].copy_from_slice(&payload_len.to_be_bytes());

        dst.put_u8(FRAME_END);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A peer that rejects our protocol version answers the preamble
        // with its own preamble instead of a frame.
        if src.len() >= 4 && src.starts_with(b"AMQP") {
            if src.len() < 8 {
                return Ok(None);
            }
            return Err(Error::ProtocolVersionMismatch(src[5], src[6], src[7]));
        }
        if src.len() < 7 {
            return Ok(None);
        }

        let kind = src[0];
        let channel = u16::from_be_bytes([src[1], src[2]]);
        let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;

        let total = 7 + size + 1;
        if size + FRAME_OVERHEAD > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: size + FRAME_OVERHEAD,
                frame_max: self.max_frame_size,
            });
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(7);
        let mut payload = src.split_to(size).freeze();
        let end = src.get_u8();
        if end != FRAME_END {
            return Err(Error::UnexpectedFrameEnd(end));
        }

        let body = match kind {
            FRAME_METHOD => FrameBody::Method(Method::decode(&mut payload)?),
            FRAME_HEADER => FrameBody::Header(ContentHeader::decode(&mut payload)?),
            FRAME_BODY => FrameBody::Body(payload),
            FRAME_HEARTBEAT => {
                if channel != 0 {
                    return Err(Error::HeartbeatOnNonZeroChannel(channel));
                }
                FrameBody::Heartbeat
            }
            other => return Err(Error::UnsupportedFrameType(other)),
        };
        Ok(Some(Frame { channel, body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: Frame) -> BytesMut {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn size_field_matches_payload_and_frame_ends_with_ce() {
        let frame = Frame::method(
            5,
            Method::QueuePurge {
                queue: "q1".into(),
                no_wait: false,
            },
        );
        let buf = encode(frame);

        let size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
        assert_eq!(size, buf.len() - FRAME_OVERHEAD);
        assert_eq!(buf[buf.len() - 1], FRAME_END);
        assert_eq!(buf[0], FRAME_METHOD);
        assert_eq!(u16::from_be_bytes([buf[1], buf[2]]), 5);
    }

    #[test]
    fn heartbeat_is_the_eight_byte_frame() {
        let buf = encode(Frame::heartbeat());
        assert_eq!(&buf[..], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
    }

    #[test]
    fn roundtrips_a_full_message_sequence() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let frames = vec![
            Frame::method(
                1,
                Method::BasicPublish {
                    exchange: "".into(),
                    routing_key: "q1".into(),
                    mandatory: false,
                    immediate: false,
                },
            ),
            Frame::header(
                1,
                ContentHeader {
                    body_size: 5,
                    properties: Properties {
                        delivery_mode: Some(2),
                        ..Properties::new()
                    },
                },
            ),
            Frame::body(1, Bytes::from_static(b"hello")),
        ];
        for frame in &frames {
            codec.encode(frame.clone(), &mut buf).unwrap();
        }

        for expected in frames {
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, expected);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn partial_input_yields_none_until_complete() {
        let mut codec = FrameCodec::new();
        let full = encode(Frame::method(
            1,
            Method::QueueBindOk,
        ));

        let mut partial = BytesMut::from(&full[..5]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&full[5..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&full[full.len() - 1..]);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn bad_end_octet_is_fatal() {
        let mut codec = FrameCodec::new();
        let mut buf = encode(Frame::heartbeat());
        let last = buf.len() - 1;
        buf[last] = 0x00;
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::UnexpectedFrameEnd(0x00))
        ));
    }

    #[test]
    fn heartbeat_on_nonzero_channel_is_fatal() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&[8, 0, 3, 0, 0, 0, 0, 0xCE]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::HeartbeatOnNonZeroChannel(3))
        ));
    }

    #[test]
    fn unknown_frame_type_is_fatal() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&[9, 0, 0, 0, 0, 0, 0, 0xCE]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::UnsupportedFrameType(9))
        ));
    }

    #[test]
    fn server_preamble_reply_reports_version_mismatch() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"AMQP\x00\x00\x09\x01"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::ProtocolVersionMismatch(0, 9, 1))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u8(FRAME_BODY);
        buf.put_u16(1);
        buf.put_u32(FRAME_MIN_SIZE + 1);
        buf.put_slice(&[0u8; 16]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::FrameTooLarge { .. })
        ));
    }
}
