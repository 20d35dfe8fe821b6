//! DNS forwarding support: query message construction.
//!
//! Response parsing doesn't need a dedicated module — the forwarder and
//! exchange layer work with `hickory_proto::op::Message` directly end to
//! end, so there's nothing to translate on the way back.

pub mod message_builder;

pub use message_builder::MessageBuilder;
