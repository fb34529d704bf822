//! The method frames the client speaks, with their wire argument layouts.
//!
//! Reserved (deprecated) arguments are written as zeros on encode and
//! skipped on decode; they never surface in the variant fields.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{
    bit, pack_bits, read_long_bytes, read_long_str, read_short_str, read_u16, read_u32, read_u64,
    read_u8, write_long_str, write_short_str,
};
use crate::definitions::class;
use crate::error::Error;
use crate::value::FieldTable;

mod id {
    pub const CONNECTION_START: u16 = 10;
    pub const CONNECTION_START_OK: u16 = 11;
    pub const CONNECTION_TUNE: u16 = 30;
    pub const CONNECTION_TUNE_OK: u16 = 31;
    pub const CONNECTION_OPEN: u16 = 40;
    pub const CONNECTION_OPEN_OK: u16 = 41;
    pub const CONNECTION_CLOSE: u16 = 50;
    pub const CONNECTION_CLOSE_OK: u16 = 51;
    pub const CONNECTION_BLOCKED: u16 = 60;
    pub const CONNECTION_UNBLOCKED: u16 = 61;
    pub const CONNECTION_UPDATE_SECRET: u16 = 70;
    pub const CONNECTION_UPDATE_SECRET_OK: u16 = 71;

    pub const CHANNEL_OPEN: u16 = 10;
    pub const CHANNEL_OPEN_OK: u16 = 11;
    pub const CHANNEL_CLOSE: u16 = 40;
    pub const CHANNEL_CLOSE_OK: u16 = 41;

    pub const EXCHANGE_DECLARE: u16 = 10;
    pub const EXCHANGE_DECLARE_OK: u16 = 11;
    pub const EXCHANGE_DELETE: u16 = 20;
    pub const EXCHANGE_DELETE_OK: u16 = 21;
    pub const EXCHANGE_BIND: u16 = 30;
    pub const EXCHANGE_BIND_OK: u16 = 31;
    pub const EXCHANGE_UNBIND: u16 = 40;
    pub const EXCHANGE_UNBIND_OK: u16 = 51;

    pub const QUEUE_DECLARE: u16 = 10;
    pub const QUEUE_DECLARE_OK: u16 = 11;
    pub const QUEUE_BIND: u16 = 20;
    pub const QUEUE_BIND_OK: u16 = 21;
    pub const QUEUE_PURGE: u16 = 30;
    pub const QUEUE_PURGE_OK: u16 = 31;
    pub const QUEUE_DELETE: u16 = 40;
    pub const QUEUE_DELETE_OK: u16 = 41;
    pub const QUEUE_UNBIND: u16 = 50;
    pub const QUEUE_UNBIND_OK: u16 = 51;

    pub const BASIC_QOS: u16 = 10;
    pub const BASIC_QOS_OK: u16 = 11;
    pub const BASIC_CONSUME: u16 = 20;
    pub const BASIC_CONSUME_OK: u16 = 21;
    pub const BASIC_CANCEL: u16 = 30;
    pub const BASIC_CANCEL_OK: u16 = 31;
    pub const BASIC_PUBLISH: u16 = 40;
    pub const BASIC_RETURN: u16 = 50;
    pub const BASIC_DELIVER: u16 = 60;
    pub const BASIC_GET: u16 = 70;
    pub const BASIC_GET_OK: u16 = 71;
    pub const BASIC_GET_EMPTY: u16 = 72;
    pub const BASIC_ACK: u16 = 80;
    pub const BASIC_REJECT: u16 = 90;
    pub const BASIC_RECOVER: u16 = 110;
    pub const BASIC_RECOVER_OK: u16 = 111;
    pub const BASIC_NACK: u16 = 120;

    pub const CONFIRM_SELECT: u16 = 10;
    pub const CONFIRM_SELECT_OK: u16 = 11;

    pub const TX_SELECT: u16 = 10;
    pub const TX_SELECT_OK: u16 = 11;
    pub const TX_COMMIT: u16 = 20;
    pub const TX_COMMIT_OK: u16 = 21;
    pub const TX_ROLLBACK: u16 = 30;
    pub const TX_ROLLBACK_OK: u16 = 31;
}

/// A decoded method frame payload.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Method {
    ConnectionStart {
        version_major: u8,
        version_minor: u8,
        server_properties: FieldTable,
        mechanisms: String,
        locales: String,
    },
    ConnectionStartOk {
        client_properties: FieldTable,
        mechanism: String,
        response: Bytes,
        locale: String,
    },
    ConnectionTune {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionTuneOk {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionOpen {
        vhost: String,
    },
    ConnectionOpenOk,
    ConnectionClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ConnectionCloseOk,
    ConnectionBlocked {
        reason: String,
    },
    ConnectionUnblocked,
    ConnectionUpdateSecret {
        new_secret: Bytes,
        reason: String,
    },
    ConnectionUpdateSecretOk,

    ChannelOpen,
    ChannelOpenOk,
    ChannelClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ChannelCloseOk,

    ExchangeDeclare {
        exchange: String,
        exchange_type: String,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeDeclareOk,
    ExchangeDelete {
        exchange: String,
        if_unused: bool,
        no_wait: bool,
    },
    ExchangeDeleteOk,
    ExchangeBind {
        destination: String,
        source: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeBindOk,
    ExchangeUnbind {
        destination: String,
        source: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeUnbindOk,

    QueueDeclare {
        queue: String,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    QueueDeclareOk {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    },
    QueueBind {
        queue: String,
        exchange: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    QueueBindOk,
    QueuePurge {
        queue: String,
        no_wait: bool,
    },
    QueuePurgeOk {
        message_count: u32,
    },
    QueueDelete {
        queue: String,
        if_unused: bool,
        if_empty: bool,
        no_wait: bool,
    },
    QueueDeleteOk {
        message_count: u32,
    },
    QueueUnbind {
        queue: String,
        exchange: String,
        routing_key: String,
        arguments: FieldTable,
    },
    QueueUnbindOk,

    BasicQos {
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    },
    BasicQosOk,
    BasicConsume {
        queue: String,
        consumer_tag: String,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    BasicConsumeOk {
        consumer_tag: String,
    },
    BasicCancel {
        consumer_tag: String,
        no_wait: bool,
    },
    BasicCancelOk {
        consumer_tag: String,
    },
    BasicPublish {
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
    },
    BasicReturn {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
    BasicDeliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    BasicGet {
        queue: String,
        no_ack: bool,
    },
    BasicGetOk {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    },
    BasicGetEmpty,
    BasicAck {
        delivery_tag: u64,
        multiple: bool,
    },
    BasicReject {
        delivery_tag: u64,
        requeue: bool,
    },
    BasicRecover {
        requeue: bool,
    },
    BasicRecoverOk,
    BasicNack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },

    ConfirmSelect {
        no_wait: bool,
    },
    ConfirmSelectOk,

    TxSelect,
    TxSelectOk,
    TxCommit,
    TxCommitOk,
    TxRollback,
    TxRollbackOk,
}

impl Method {
    /// The AMQP class id of this method.
    pub fn class_id(&self) -> u16 {
        use Method::*;
        match self {
            ConnectionStart { .. } | ConnectionStartOk { .. } | ConnectionTune { .. }
            | ConnectionTuneOk { .. } | ConnectionOpen { .. } | ConnectionOpenOk
            | ConnectionClose { .. } | ConnectionCloseOk | ConnectionBlocked { .. }
            | ConnectionUnblocked | ConnectionUpdateSecret { .. } | ConnectionUpdateSecretOk => {
                class::CONNECTION
            }
            ChannelOpen | ChannelOpenOk | ChannelClose { .. } | ChannelCloseOk => class::CHANNEL,
            ExchangeDeclare { .. } | ExchangeDeclareOk | ExchangeDelete { .. }
            | ExchangeDeleteOk | ExchangeBind { .. } | ExchangeBindOk | ExchangeUnbind { .. }
            | ExchangeUnbindOk => class::EXCHANGE,
            QueueDeclare { .. } | QueueDeclareOk { .. } | QueueBind { .. } | QueueBindOk
            | QueuePurge { .. } | QueuePurgeOk { .. } | QueueDelete { .. }
            | QueueDeleteOk { .. } | QueueUnbind { .. } | QueueUnbindOk => class::QUEUE,
            BasicQos { .. } | BasicQosOk | BasicConsume { .. } | BasicConsumeOk { .. }
            | BasicCancel { .. } | BasicCancelOk { .. } | BasicPublish { .. }
            | BasicReturn { .. } | BasicDeliver { .. } | BasicGet { .. } | BasicGetOk { .. }
            | BasicGetEmpty | BasicAck { .. } | BasicReject { .. } | BasicRecover { .. }
            | BasicRecoverOk | BasicNack { .. } => class::BASIC,
            ConfirmSelect { .. } | ConfirmSelectOk => class::CONFIRM,
            TxSelect | TxSelectOk | TxCommit | TxCommitOk | TxRollback | TxRollbackOk => class::TX,
        }
    }

    /// The method id of this method within its class.
    pub fn method_id(&self) -> u16 {
        use Method::*;
        match self {
            ConnectionStart { .. } => id::CONNECTION_START,
            ConnectionStartOk { .. } => id::CONNECTION_START_OK,
            ConnectionTune { .. } => id::CONNECTION_TUNE,
            ConnectionTuneOk { .. } => id::CONNECTION_TUNE_OK,
            ConnectionOpen { .. } => id::CONNECTION_OPEN,
            ConnectionOpenOk => id::CONNECTION_OPEN_OK,
            ConnectionClose { .. } => id::CONNECTION_CLOSE,
            ConnectionCloseOk => id::CONNECTION_CLOSE_OK,
            ConnectionBlocked { .. } => id::CONNECTION_BLOCKED,
            ConnectionUnblocked => id::CONNECTION_UNBLOCKED,
            ConnectionUpdateSecret { .. } => id::CONNECTION_UPDATE_SECRET,
            ConnectionUpdateSecretOk => id::CONNECTION_UPDATE_SECRET_OK,
            ChannelOpen => id::CHANNEL_OPEN,
            ChannelOpenOk => id::CHANNEL_OPEN_OK,
            ChannelClose { .. } => id::CHANNEL_CLOSE,
            ChannelCloseOk => id::CHANNEL_CLOSE_OK,
            ExchangeDeclare { .. } => id::EXCHANGE_DECLARE,
            ExchangeDeclareOk => id::EXCHANGE_DECLARE_OK,
            ExchangeDelete { .. } => id::EXCHANGE_DELETE,
            ExchangeDeleteOk => id::EXCHANGE_DELETE_OK,
            ExchangeBind { .. } => id::EXCHANGE_BIND,
            ExchangeBindOk => id::EXCHANGE_BIND_OK,
            ExchangeUnbind { .. } => id::EXCHANGE_UNBIND,
            ExchangeUnbindOk => id::EXCHANGE_UNBIND_OK,
            QueueDeclare { .. } => id::QUEUE_DECLARE,
            QueueDeclareOk { .. } => id::QUEUE_DECLARE_OK,
            QueueBind { .. } => id::QUEUE_BIND,
            QueueBindOk => id::QUEUE_BIND_OK,
            QueuePurge { .. } => id::QUEUE_PURGE,
            QueuePurgeOk { .. } => id::QUEUE_PURGE_OK,
            QueueDelete { .. } => id::QUEUE_DELETE,
            QueueDeleteOk { .. } => id::QUEUE_DELETE_OK,
            QueueUnbind { .. } => id::QUEUE_UNBIND,
            QueueUnbindOk => id::QUEUE_UNBIND_OK,
            BasicQos { .. } => id::BASIC_QOS,
            BasicQosOk => id::BASIC_QOS_OK,
            BasicConsume { .. } => id::BASIC_CONSUME,
            BasicConsumeOk { .. } => id::BASIC_CONSUME_OK,
            BasicCancel { .. } => id::BASIC_CANCEL,
            BasicCancelOk { .. } => id::BASIC_CANCEL_OK,
            BasicPublish { .. } => id::BASIC_PUBLISH,
            BasicReturn { .. } => id::BASIC_RETURN,
            BasicDeliver { .. } => id::BASIC_DELIVER,
            BasicGet { .. } => id::BASIC_GET,
            BasicGetOk { .. } => id::BASIC_GET_OK,
            BasicGetEmpty => id::BASIC_GET_EMPTY,
            BasicAck { .. } => id::BASIC_ACK,
            BasicReject { .. } => id::BASIC_REJECT,
            BasicRecover { .. } => id::BASIC_RECOVER,
            BasicRecoverOk => id::BASIC_RECOVER_OK,
            BasicNack { .. } => id::BASIC_NACK,
            ConfirmSelect { .. } => id::CONFIRM_SELECT,
            ConfirmSelectOk => id::CONFIRM_SELECT_OK,
            TxSelect => id::TX_SELECT,
            TxSelectOk => id::TX_SELECT_OK,
            TxCommit => id::TX_COMMIT,
            TxCommitOk => id::TX_COMMIT_OK,
            TxRollback => id::TX_ROLLBACK,
            TxRollbackOk => id::TX_ROLLBACK_OK,
        }
    }

    /// Encodes the class id, method id and arguments.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        use Method::*;

        dst.put_u16(self.class_id());
        dst.put_u16(self.method_id());

        match self {
            ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                locales,
            } => {
                dst.put_u8(*version_major);
                dst.put_u8(*version_minor);
                server_properties.encode(dst)?;
                write_long_str(dst, mechanisms.as_bytes());
                write_long_str(dst, locales.as_bytes());
            }
            ConnectionStartOk {
                client_properties,
                mechanism,
                response,
                locale,
            } => {
                client_properties.encode(dst)?;
                write_short_str(dst, mechanism)?;
                write_long_str(dst, response);
                write_short_str(dst, locale)?;
            }
            ConnectionTune {
                channel_max,
                frame_max,
                heartbeat,
            }
            | ConnectionTuneOk {
                channel_max,
                frame_max,
                heartbeat,
            } => {
                dst.put_u16(*channel_max);
                dst.put_u32(*frame_max);
                dst.put_u16(*heartbeat);
            }
            ConnectionOpen { vhost } => {
                write_short_str(dst, vhost)?;
                write_short_str(dst, "")?;
                dst.put_u8(0);
            }
            ConnectionOpenOk => write_short_str(dst, "")?,
            ConnectionClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            }
            | ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                dst.put_u16(*reply_code);
                write_short_str(dst, reply_text)?;
                dst.put_u16(*class_id);
                dst.put_u16(*method_id);
            }
            ConnectionCloseOk | ConnectionUnblocked | ConnectionUpdateSecretOk
            | ChannelCloseOk | ExchangeDeclareOk | ExchangeDeleteOk | ExchangeBindOk
            | ExchangeUnbindOk | QueueBindOk | QueueUnbindOk | BasicQosOk | BasicRecoverOk
            | ConfirmSelectOk | TxSelect | TxSelectOk | TxCommit | TxCommitOk | TxRollback
            | TxRollbackOk => {}
            BasicGetEmpty => write_short_str(dst, "")?,
            ConnectionBlocked { reason } => write_short_str(dst, reason)?,
            ConnectionUpdateSecret { new_secret, reason } => {
                write_long_str(dst, new_secret);
                write_short_str(dst, reason)?;
            }
            ChannelOpen => write_short_str(dst, "")?,
            ChannelOpenOk => write_long_str(dst, b""),
            ExchangeDeclare {
                exchange,
                exchange_type,
                passive,
                durable,
                auto_delete,
                internal,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                write_short_str(dst, exchange)?;
                write_short_str(dst, exchange_type)?;
                dst.put_u8(pack_bits(&[
                    *passive,
                    *durable,
                    *auto_delete,
                    *internal,
                    *no_wait,
                ]));
                arguments.encode(dst)?;
            }
            ExchangeDelete {
                exchange,
                if_unused,
                no_wait,
            } => {
                dst.put_u16(0);
                write_short_str(dst, exchange)?;
                dst.put_u8(pack_bits(&[*if_unused, *no_wait]));
            }
            ExchangeBind {
                destination,
                source,
                routing_key,
                no_wait,
                arguments,
            }
            | ExchangeUnbind {
                destination,
                source,
                routing_key,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                write_short_str(dst, destination)?;
                write_short_str(dst, source)?;
                write_short_str(dst, routing_key)?;
                dst.put_u8(*no_wait as u8);
                arguments.encode(dst)?;
            }
            QueueDeclare {
                queue,
                passive,
                durable,
                exclusive,
                auto_delete,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                dst.put_u8(pack_bits(&[
                    *passive,
                    *durable,
                    *exclusive,
                    *auto_delete,
                    *no_wait,
                ]));
                arguments.encode(dst)?;
            }
            QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            } => {
                write_short_str(dst, queue)?;
                dst.put_u32(*message_count);
                dst.put_u32(*consumer_count);
            }
            QueueBind {
                queue,
                exchange,
                routing_key,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                write_short_str(dst, exchange)?;
                write_short_str(dst, routing_key)?;
                dst.put_u8(*no_wait as u8);
                arguments.encode(dst)?;
            }
            QueuePurge { queue, no_wait } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                dst.put_u8(*no_wait as u8);
            }
            QueuePurgeOk { message_count } | QueueDeleteOk { message_count } => {
                dst.put_u32(*message_count);
            }
            QueueDelete {
                queue,
                if_unused,
                if_empty,
                no_wait,
            } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                dst.put_u8(pack_bits(&[*if_unused, *if_empty, *no_wait]));
            }
            QueueUnbind {
                queue,
                exchange,
                routing_key,
                arguments,
            } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                write_short_str(dst, exchange)?;
                write_short_str(dst, routing_key)?;
                arguments.encode(dst)?;
            }
            BasicQos {
                prefetch_size,
                prefetch_count,
                global,
            } => {
                dst.put_u32(*prefetch_size);
                dst.put_u16(*prefetch_count);
                dst.put_u8(*global as u8);
            }
            BasicConsume {
                queue,
                consumer_tag,
                no_local,
                no_ack,
                exclusive,
                no_wait,
                arguments,
            } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                write_short_str(dst, consumer_tag)?;
                dst.put_u8(pack_bits(&[*no_local, *no_ack, *exclusive, *no_wait]));
                arguments.encode(dst)?;
            }
            BasicConsumeOk { consumer_tag } | BasicCancelOk { consumer_tag } => {
                write_short_str(dst, consumer_tag)?;
            }
            BasicCancel {
                consumer_tag,
                no_wait,
            } => {
                write_short_str(dst, consumer_tag)?;
                dst.put_u8(*no_wait as u8);
            }
            BasicPublish {
                exchange,
                routing_key,
                mandatory,
                immediate,
            } => {
                dst.put_u16(0);
                write_short_str(dst, exchange)?;
                write_short_str(dst, routing_key)?;
                dst.put_u8(pack_bits(&[*mandatory, *immediate]));
            }
            BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => {
                dst.put_u16(*reply_code);
                write_short_str(dst, reply_text)?;
                write_short_str(dst, exchange)?;
                write_short_str(dst, routing_key)?;
            }
            BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => {
                write_short_str(dst, consumer_tag)?;
                dst.put_u64(*delivery_tag);
                dst.put_u8(*redelivered as u8);
                write_short_str(dst, exchange)?;
                write_short_str(dst, routing_key)?;
            }
            BasicGet { queue, no_ack } => {
                dst.put_u16(0);
                write_short_str(dst, queue)?;
                dst.put_u8(*no_ack as u8);
            }
            BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => {
                dst.put_u64(*delivery_tag);
                dst.put_u8(*redelivered as u8);
                write_short_str(dst, exchange)?;
                write_short_str(dst, routing_key)?;
                dst.put_u32(*message_count);
            }
            BasicAck {
                delivery_tag,
                multiple,
            } => {
                dst.put_u64(*delivery_tag);
                dst.put_u8(*multiple as u8);
            }
            BasicReject {
                delivery_tag,
                requeue,
            } => {
                dst.put_u64(*delivery_tag);
                dst.put_u8(*requeue as u8);
            }
            BasicRecover { requeue } => dst.put_u8(*requeue as u8),
            BasicNack {
                delivery_tag,
                multiple,
                requeue,
            } => {
                dst.put_u64(*delivery_tag);
                dst.put_u8(pack_bits(&[*multiple, *requeue]));
            }
            ConfirmSelect { no_wait } => dst.put_u8(*no_wait as u8),
        }
        Ok(())
    }

    /// Decodes a method frame payload.
    pub fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let class_id = read_u16(src)?;
        let method_id = read_u16(src)?;

        let method = match (class_id, method_id) {
            (class::CONNECTION, id::CONNECTION_START) => Method::ConnectionStart {
                version_major: read_u8(src)?,
                version_minor: read_u8(src)?,
                server_properties: FieldTable::decode(src)?,
                mechanisms: read_long_str(src)?,
                locales: read_long_str(src)?,
            },
            (class::CONNECTION, id::CONNECTION_START_OK) => Method::ConnectionStartOk {
                client_properties: FieldTable::decode(src)?,
                mechanism: read_short_str(src)?,
                response: read_long_bytes(src)?,
                locale: read_short_str(src)?,
            },
            (class::CONNECTION, id::CONNECTION_TUNE) => Method::ConnectionTune {
                channel_max: read_u16(src)?,
                frame_max: read_u32(src)?,
                heartbeat: read_u16(src)?,
            },
            (class::CONNECTION, id::CONNECTION_TUNE_OK) => Method::ConnectionTuneOk {
                channel_max: read_u16(src)?,
                frame_max: read_u32(src)?,
                heartbeat: read_u16(src)?,
            },
            (class::CONNECTION, id::CONNECTION_OPEN) => {
                let vhost = read_short_str(src)?;
                let _reserved = read_short_str(src)?;
                let _reserved = read_u8(src)?;
                Method::ConnectionOpen { vhost }
            }
            (class::CONNECTION, id::CONNECTION_OPEN_OK) => {
                let _reserved = read_short_str(src)?;
                Method::ConnectionOpenOk
            }
            (class::CONNECTION, id::CONNECTION_CLOSE) => Method::ConnectionClose {
                reply_code: read_u16(src)?,
                reply_text: read_short_str(src)?,
                class_id: read_u16(src)?,
                method_id: read_u16(src)?,
            },
            (class::CONNECTION, id::CONNECTION_CLOSE_OK) => Method::ConnectionCloseOk,
            (class::CONNECTION, id::CONNECTION_BLOCKED) => Method::ConnectionBlocked {
                reason: read_short_str(src)?,
            },
            (class::CONNECTION, id::CONNECTION_UNBLOCKED) => Method::ConnectionUnblocked,
            (class::CONNECTION, id::CONNECTION_UPDATE_SECRET) => Method::ConnectionUpdateSecret {
                new_secret: read_long_bytes(src)?,
                reason: read_short_str(src)?,
            },
            (class::CONNECTION, id::CONNECTION_UPDATE_SECRET_OK) => {
                Method::ConnectionUpdateSecretOk
            }

            (class::CHANNEL, id::CHANNEL_OPEN) => {
                let _reserved = read_short_str(src)?;
                Method::ChannelOpen
            }
            (class::CHANNEL, id::CHANNEL_OPEN_OK) => {
                let _reserved = read_long_bytes(src)?;
                Method::ChannelOpenOk
            }
            (class::CHANNEL, id::CHANNEL_CLOSE) => Method::ChannelClose {
                reply_code: read_u16(src)?,
                reply_text: read_short_str(src)?,
                class_id: read_u16(src)?,
                method_id: read_u16(src)?,
            },
            (class::CHANNEL, id::CHANNEL_CLOSE_OK) => Method::ChannelCloseOk,

            (class::EXCHANGE, id::EXCHANGE_DECLARE) => {
                let _reserved = read_u16(src)?;
                let exchange = read_short_str(src)?;
                let exchange_type = read_short_str(src)?;
                let flags = read_u8(src)?;
                Method::ExchangeDeclare {
                    exchange,
                    exchange_type,
                    passive: bit(flags, 0),
                    durable: bit(flags, 1),
                    auto_delete: bit(flags, 2),
                    internal: bit(flags, 3),
                    no_wait: bit(flags, 4),
                    arguments: FieldTable::decode(src)?,
                }
            }
            (class::EXCHANGE, id::EXCHANGE_DECLARE_OK) => Method::ExchangeDeclareOk,
            (class::EXCHANGE, id::EXCHANGE_DELETE) => {
                let _reserved = read_u16(src)?;
                let exchange = read_short_str(src)?;
                let flags = read_u8(src)?;
                Method::ExchangeDelete {
                    exchange,
                    if_unused: bit(flags, 0),
                    no_wait: bit(flags, 1),
                }
            }
            (class::EXCHANGE, id::EXCHANGE_DELETE_OK) => Method::ExchangeDeleteOk,
            (class::EXCHANGE, id::EXCHANGE_BIND) | (class::EXCHANGE, id::EXCHANGE_UNBIND) => {
                let _reserved = read_u16(src)?;
                let destination = read_short_str(src)?;
                let source = read_short_str(src)?;
                let routing_key = read_short_str(src)?;
                let no_wait = read_u8(src)? != 0;
                let arguments = FieldTable::decode(src)?;
                if method_id == id::EXCHANGE_BIND {
                    Method::ExchangeBind {
                        destination,
                        source,
                        routing_key,
                        no_wait,
                        arguments,
                    }
                } else {
                    Method::ExchangeUnbind {
                        destination,
                        source,
                        routing_key,
                        no_wait,
                        arguments,
                    }
                }
            }
            (class::EXCHANGE, id::EXCHANGE_BIND_OK) => Method::ExchangeBindOk,
            (class::EXCHANGE, id::EXCHANGE_UNBIND_OK) => Method::ExchangeUnbindOk,

            (class::QUEUE, id::QUEUE_DECLARE) => {
                let _reserved = read_u16(src)?;
                let queue = read_short_str(src)?;
                let flags = read_u8(src)?;
                Method::QueueDeclare {
                    queue,
                    passive: bit(flags, 0),
                    durable: bit(flags, 1),
                    exclusive: bit(flags, 2),
                    auto_delete: bit(flags, 3),
                    no_wait: bit(flags, 4),
                    arguments: FieldTable::decode(src)?,
                }
            }
            (class::QUEUE, id::QUEUE_DECLARE_OK) => Method::QueueDeclareOk {
                queue: read_short_str(src)?,
                message_count: read_u32(src)?,
                consumer_count: read_u32(src)?,
            },
            (class::QUEUE, id::QUEUE_BIND) => {
                let _reserved = read_u16(src)?;
                Method::QueueBind {
                    queue: read_short_str(src)?,
                    exchange: read_short_str(src)?,
                    routing_key: read_short_str(src)?,
                    no_wait: read_u8(src)? != 0,
                    arguments: FieldTable::decode(src)?,
                }
            }
            (class::QUEUE, id::QUEUE_BIND_OK) => Method::QueueBindOk,
            (class::QUEUE, id::QUEUE_PURGE) => {
                let _reserved = read_u16(src)?;
                Method::QueuePurge {
                    queue: read_short_str(src)?,
                    no_wait: read_u8(src)? != 0,
                }
            }
            (class::QUEUE, id::QUEUE_PURGE_OK) => Method::QueuePurgeOk {
                message_count: read_u32(src)?,
            },
            (class::QUEUE, id::QUEUE_DELETE) => {
                let _reserved = read_u16(src)?;
                let queue = read_short_str(src)?;
                let flags = read_u8(src)?;
                Method::QueueDelete {
                    queue,
                    if_unused: bit(flags, 0),
                    if_empty: bit(flags, 1),
                    no_wait: bit(flags, 2),
                }
            }
            (class::QUEUE, id::QUEUE_DELETE_OK) => Method::QueueDeleteOk {
                message_count: read_u32(src)?,
            },
            (class::QUEUE, id::QUEUE_UNBIND) => {
                let _reserved = read_u16(src)?;
                Method::QueueUnbind {
                    queue: read_short_str(src)?,
                    exchange: read_short_str(src)?,
                    routing_key: read_short_str(src)?,
                    arguments: FieldTable::decode(src)?,
                }
            }
            (class::QUEUE, id::QUEUE_UNBIND_OK) => Method::QueueUnbindOk,

            (class::BASIC, id::BASIC_QOS) => Method::BasicQos {
                prefetch_size: read_u32(src)?,
                prefetch_count: read_u16(src)?,
                global: read_u8(src)? != 0,
            },
            (class::BASIC, id::BASIC_QOS_OK) => Method::BasicQosOk,
            (class::BASIC, id::BASIC_CONSUME) => {
                let _reserved = read_u16(src)?;
                let queue = read_short_str(src)?;
                let consumer_tag = read_short_str(src)?;
                let flags = read_u8(src)?;
                Method::BasicConsume {
                    queue,
                    consumer_tag,
                    no_local: bit(flags, 0),
                    no_ack: bit(flags, 1),
                    exclusive: bit(flags, 2),
                    no_wait: bit(flags, 3),
                    arguments: FieldTable::decode(src)?,
                }
            }
            (class::BASIC, id::BASIC_CONSUME_OK) => Method::BasicConsumeOk {
                consumer_tag: read_short_str(src)?,
            },
            (class::BASIC, id::BASIC_CANCEL) => Method::BasicCancel {
                consumer_tag: read_short_str(src)?,
                no_wait: read_u8(src)? != 0,
            },
            (class::BASIC, id::BASIC_CANCEL_OK) => Method::BasicCancelOk {
                consumer_tag: read_short_str(src)?,
            },
            (class::BASIC, id::BASIC_PUBLISH) => {
                let _reserved = read_u16(src)?;
                let exchange = read_short_str(src)?;
                let routing_key = read_short_str(src)?;
                let flags = read_u8(src)?;
                Method::BasicPublish {
                    exchange,
                    routing_key,
                    mandatory: bit(flags, 0),
                    immediate: bit(flags, 1),
                }
            }
            (class::BASIC, id::BASIC_RETURN) => Method::BasicReturn {
                reply_code: read_u16(src)?,
                reply_text: read_short_str(src)?,
                exchange: read_short_str(src)?,
                routing_key: read_short_str(src)?,
            },
            (class::BASIC, id::BASIC_DELIVER) => Method::BasicDeliver {
                consumer_tag: read_short_str(src)?,
                delivery_tag: read_u64(src)?,
                redelivered: read_u8(src)? != 0,
                exchange: read_short_str(src)?,
                routing_key: read_short_str(src)?,
            },
            (class::BASIC, id::BASIC_GET) => {
                let _reserved = read_u16(src)?;
                Method::BasicGet {
                    queue: read_short_str(src)?,
                    no_ack: read_u8(src)? != 0,
                }
            }
            (class::BASIC, id::BASIC_GET_OK) => Method::BasicGetOk {
                delivery_tag: read_u64(src)?,
                redelivered: read_u8(src)? != 0,
                exchange: read_short_str(src)?,
                routing_key: read_short_str(src)?,
                message_count: read_u32(src)?,
            },
            (class::BASIC, id::BASIC_GET_EMPTY) => {
                let _reserved = read_short_str(src)?;
                Method::BasicGetEmpty
            }
            (class::BASIC, id::BASIC_ACK) => Method::BasicAck {
                delivery_tag: read_u64(src)?,
                multiple: read_u8(src)? != 0,
            },
            (class::BASIC, id::BASIC_REJECT) => Method::BasicReject {
                delivery_tag: read_u64(src)?,
                requeue: read_u8(src)? != 0,
            },
            (class::BASIC, id::BASIC_RECOVER) => Method::BasicRecover {
                requeue: read_u8(src)? != 0,
            },
            (class::BASIC, id::BASIC_RECOVER_OK) => Method::BasicRecoverOk,
            (class::BASIC, id::BASIC_NACK) => {
                let delivery_tag = read_u64(src)?;
                let flags = read_u8(src)?;
                Method::BasicNack {
                    delivery_tag,
                    multiple: bit(flags, 0),
                    requeue: bit(flags, 1),
                }
            }

            (class::CONFIRM, id::CONFIRM_SELECT) => Method::ConfirmSelect {
                no_wait: read_u8(src)? != 0,
            },
            (class::CONFIRM, id::CONFIRM_SELECT_OK) => Method::ConfirmSelectOk,

            (class::TX, id::TX_SELECT) => Method::TxSelect,
            (class::TX, id::TX_SELECT_OK) => Method::TxSelectOk,
            (class::TX, id::TX_COMMIT) => Method::TxCommit,
            (class::TX, id::TX_COMMIT_OK) => Method::TxCommitOk,
            (class::TX, id::TX_ROLLBACK) => Method::TxRollback,
            (class::TX, id::TX_ROLLBACK_OK) => Method::TxRollbackOk,

            (class_id, method_id) => {
                return Err(Error::UnsupportedMethod {
                    class_id,
                    method_id,
                })
            }
        };
        Ok(method)
    }
}
