//! Handler sets the binary can install on the server.
//!
//! - `echo`: writes every chunk back to its sender
//! - `ping`: line-based PING/PONG for health checks
//! - `broadcast`: relays each client's data to all others on idle ticks

pub mod broadcast;
pub mod echo;
pub mod ping;

pub use broadcast::Broadcast;
pub use echo::Echo;
pub use ping::Ping;
