//! Broadcast protocol.
//!
//! Data from one client is relayed verbatim to every other connected
//! client. Relaying happens from the send handler, so messages go out on
//! the next idle iteration rather than while the sender is being read.

pub mod handler;

pub use handler::Broadcast;
