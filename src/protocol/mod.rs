//! Message protocol: envelope schema and validator.

pub mod envelope;
pub mod validate;

pub use envelope::{Message, MessagePayload, PROTOCOL_VERSION};
pub use validate::validate;
