#![deny(missing_docs, missing_debug_implementations)]

//! Wire-level types for AMQP 0-9-1: frames, methods, field tables and
//! content properties, together with the frame codec used by the client.
//!
//! Everything here is pure data and byte-shuffling; the I/O lives in the
//! `amqp091` crate.

mod codec;

pub mod definitions;
pub mod error;
pub mod frame;
pub mod method;
pub mod properties;
pub mod value;

pub use error::Error;
pub use frame::{ContentHeader, Frame, FrameBody, FrameCodec};
pub use method::Method;
pub use properties::Properties;
pub use value::{Decimal, FieldTable, FieldValue};
