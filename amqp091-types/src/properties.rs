//! The basic-class content properties carried by a content header frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{read_short_str, read_u16, read_u64, read_u8, write_short_str};
use crate::error::Error;
use crate::value::FieldTable;

const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;
const FLAG_CLUSTER_ID: u16 = 1 << 2;

/// Message metadata attached to every published and delivered message.
///
/// Only fields that are `Some` occupy wire bytes; a u16 presence mask,
/// highest bit first, announces which fields follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    /// MIME content type of the body.
    pub content_type: Option<String>,
    /// MIME content encoding of the body (e.g. `gzip`).
    pub content_encoding: Option<String>,
    /// Application headers.
    pub headers: Option<FieldTable>,
    /// 1 = transient, 2 = persistent.
    pub delivery_mode: Option<u8>,
    /// Priority 0..=9.
    pub priority: Option<u8>,
    /// Application correlation identifier, e.g. for RPC replies.
    pub correlation_id: Option<String>,
    /// Queue name to reply to.
    pub reply_to: Option<String>,
    /// Per-message TTL in milliseconds, carried as a string.
    pub expiration: Option<String>,
    /// Application message identifier.
    pub message_id: Option<String>,
    /// Message timestamp, seconds since the unix epoch.
    pub timestamp: Option<u64>,
    /// Application message type name.
    pub message_type: Option<String>,
    /// Publishing user id, validated by the broker.
    pub user_id: Option<String>,
    /// Publishing application id.
    pub app_id: Option<String>,
    /// Unused by current brokers.
    pub cluster_id: Option<String>,
}

impl Properties {
    /// Properties with every field absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-message TTL. Accepts an integer or a string, encoding
    /// either as the string the wire format requires.
    pub fn expiration(mut self, value: impl ToString) -> Self {
        self.expiration = Some(value.to_string());
        self
    }

    fn flags(&self) -> u16 {
        let mut flags = 0u16;
        let mut set = |present: bool, flag: u16| {
            if present {
                flags |= flag;
            }
        };
        set(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        set(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        set(self.headers.is_some(), FLAG_HEADERS);
        set(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        set(self.priority.is_some(), FLAG_PRIORITY);
        set(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        set(self.reply_to.is_some(), FLAG_REPLY_TO);
        set(self.expiration.is_some(), FLAG_EXPIRATION);
        set(self.message_id.is_some(), FLAG_MESSAGE_ID);
        set(self.timestamp.is_some(), FLAG_TIMESTAMP);
        set(self.message_type.is_some(), FLAG_TYPE);
        set(self.user_id.is_some(), FLAG_USER_ID);
        set(self.app_id.is_some(), FLAG_APP_ID);
        set(self.cluster_id.is_some(), FLAG_CLUSTER_ID);
        flags
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.flags());
        let mut put_str = |value: &Option<String>, dst: &mut BytesMut| match value {
            Some(v) => write_short_str(dst, v),
            None => Ok(()),
        };
        put_str(&self.content_type, dst)?;
        put_str(&self.content_encoding, dst)?;
        if let Some(headers) = &self.headers {
            headers.encode(dst)?;
        }
        if let Some(mode) = self.delivery_mode {
            dst.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            dst.put_u8(priority);
        }
        put_str(&self.correlation_id, dst)?;
        put_str(&self.reply_to, dst)?;
        put_str(&self.expiration, dst)?;
        put_str(&self.message_id, dst)?;
        if let Some(timestamp) = self.timestamp {
            dst.put_u64(timestamp);
        }
        put_str(&self.message_type, dst)?;
        put_str(&self.user_id, dst)?;
        put_str(&self.app_id, dst)?;
        put_str(&self.cluster_id, dst)?;
        Ok(())
    }

    pub(crate) fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let flags = read_u16(src)?;
        let mut props = Properties::new();
        let mut get_str = |flag: u16, src: &mut Bytes| -> Result<Option<String>, Error> {
            if flags & flag != 0 {
                read_short_str(src).map(Some)
            } else {
                Ok(None)
            }
        };
        props.content_type = get_str(FLAG_CONTENT_TYPE, src)?;
        props.content_encoding = get_str(FLAG_CONTENT_ENCODING, src)?;
        if flags & FLAG_HEADERS != 0 {
            props.headers = Some(FieldTable::decode(src)?);
        }
        if flags & FLAG_DELIVERY_MODE != 0 {
            props.delivery_mode = Some(read_u8(src)?);
        }
        if flags & FLAG_PRIORITY != 0 {
            props.priority = Some(read_u8(src)?);
        }
        props.correlation_id = get_str(FLAG_CORRELATION_ID, src)?;
        props.reply_to = get_str(FLAG_REPLY_TO, src)?;
        props.expiration = get_str(FLAG_EXPIRATION, src)?;
        props.message_id = get_str(FLAG_MESSAGE_ID, src)?;
        if flags & FLAG_TIMESTAMP != 0 {
            props.timestamp = Some(read_u64(src)?);
        }
        props.message_type = get_str(FLAG_TYPE, src)?;
        props.user_id = get_str(FLAG_USER_ID, src)?;
        props.app_id = get_str(FLAG_APP_ID, src)?;
        props.cluster_id = get_str(FLAG_CLUSTER_ID, src)?;
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(props: &Properties) -> Properties {
        let mut buf = BytesMut::new();
        props.encode(&mut buf).unwrap();
        let mut bytes = buf.freeze();
        let decoded = Properties::decode(&mut bytes).unwrap();
        assert!(bytes.is_empty());
        decoded
    }

    #[test]
    fn empty_properties_are_two_zero_bytes() {
        let mut buf = BytesMut::new();
        Properties::new().encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0]);
    }

    #[test]
    fn roundtrips_all_fields() {
        let mut headers = FieldTable::new();
        headers.insert("traceparent", "00-abc-def-01");

        let props = Properties {
            content_type: Some("application/json".into()),
            content_encoding: Some("gzip".into()),
            headers: Some(headers),
            delivery_mode: Some(2),
            priority: Some(5),
            correlation_id: Some("corr-1".into()),
            reply_to: Some("amq.rabbitmq.reply-to".into()),
            expiration: Some("60000".into()),
            message_id: Some("msg-9".into()),
            timestamp: Some(1_700_000_000),
            message_type: Some("order.created".into()),
            user_id: Some("guest".into()),
            app_id: Some("billing".into()),
            cluster_id: Some("c1".into()),
        };
        assert_eq!(roundtrip(&props), props);
    }

    #[test]
    fn roundtrips_sparse_fields() {
        let props = Properties {
            delivery_mode: Some(1),
            reply_to: Some("replies".into()),
            ..Properties::new()
        };
        assert_eq!(roundtrip(&props), props);
    }

    #[test]
    fn integer_expiration_becomes_a_string() {
        let props = Properties::new().expiration(5000);
        assert_eq!(props.expiration.as_deref(), Some("5000"));
        let props = Properties::new().expiration("7000");
        assert_eq!(props.expiration.as_deref(), Some("7000"));
    }

    #[test]
    fn flag_bits_match_declared_positions() {
        let props = Properties {
            content_type: Some("text/plain".into()),
            cluster_id: Some("x".into()),
            ..Properties::new()
        };
        let mut buf = BytesMut::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0b1000_0000);
        assert_eq!(buf[1], 0b0000_0100);
    }
}
