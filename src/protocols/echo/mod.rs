//! Echo protocol.
//!
//! Every chunk a client delivers is written straight back to it. There is
//! no framing: the reply mirrors however the bytes arrived.

pub mod handler;

pub use handler::Echo;
