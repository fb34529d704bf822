//! Option structs for the channel operations that take more than a flag
//! or two.

use amqp091_types::FieldTable;

/// Options for [`Channel::queue_declare`](super::Channel::queue_declare).
#[derive(Debug, Clone, Default)]
pub struct QueueDeclareOptions {
    /// Only check that the queue exists; fails with 404 otherwise.
    pub passive: bool,
    /// Survive a broker restart.
    pub durable: bool,
    /// Only accessible on this connection, deleted when it closes.
    pub exclusive: bool,
    /// Deleted when the last consumer cancels.
    pub auto_delete: bool,
    /// Broker-specific arguments, e.g. `x-max-length`.
    pub arguments: FieldTable,
}

/// The broker's answer to a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclareOk {
    /// The queue name, generated by the broker when the request left it
    /// empty.
    pub queue: String,
    /// Messages currently in the queue.
    pub message_count: u32,
    /// Consumers currently subscribed to the queue.
    pub consumer_count: u32,
}

/// Options for [`Channel::exchange_declare`](super::Channel::exchange_declare).
#[derive(Debug, Clone, Default)]
pub struct ExchangeDeclareOptions {
    /// Only check that the exchange exists.
    pub passive: bool,
    /// Survive a broker restart.
    pub durable: bool,
    /// Deleted when the last binding is removed.
    pub auto_delete: bool,
    /// Only reachable through exchange-to-exchange bindings.
    pub internal: bool,
    /// Broker-specific arguments.
    pub arguments: FieldTable,
}

/// Options for [`Channel::queue_delete`](super::Channel::queue_delete).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueDeleteOptions {
    /// Fail if the queue still has consumers.
    pub if_unused: bool,
    /// Fail if the queue still has messages.
    pub if_empty: bool,
}

/// Options for [`Channel::basic_consume`](super::Channel::basic_consume).
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    /// Consumer tag; empty asks the broker to generate one.
    pub consumer_tag: String,
    /// Deliveries need no acknowledgement.
    pub no_ack: bool,
    /// Only this consumer may consume from the queue.
    pub exclusive: bool,
    /// Broker-specific arguments, e.g. `x-priority`.
    pub arguments: FieldTable,
    /// Capacity of the local delivery queue the read loop hands off to.
    pub buffer: usize,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            consumer_tag: String::new(),
            no_ack: false,
            exclusive: false,
            arguments: FieldTable::new(),
            buffer: 1024,
        }
    }
}
