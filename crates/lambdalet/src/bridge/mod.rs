//! Wire bridge between the supervisor and the worker's local endpoint.
//!
//! - `protocol`: tag-based binary message schema (forward-compatible)
//! - `codec`: builds the wire message from an event + execution context
//! - `client`: issues the framed request over loopback and decodes the reply

pub mod client;
pub mod codec;
pub mod protocol;
