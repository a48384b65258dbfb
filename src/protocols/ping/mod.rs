//! Ping protocol implementation.
//!
//! A minimal protocol for health checks and latency measurement:
//! - Client sends: `PING\r\n` or `PING <message>\r\n`
//! - Server responds: `PONG\r\n` or `PONG <message>\r\n`
//! - `QUIT\r\n` answers `OK\r\n` and closes the connection
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  PING\r\n
//! Response: PONG\r\n
//!
//! Request:  PING hello\r\n
//! Response: PONG hello\r\n
//! ```

pub mod handler;
pub mod parser;

pub use handler::Ping;
