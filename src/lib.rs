//! tidepool: a minimal multiplexed TCP server
//!
//! One listening socket, a bounded set of clients, and two callbacks:
//! - a read handler, called with whatever a client sent
//! - a send handler, called for every client when nothing is ready
//!
//! ```no_run
//! use tidepool::config::Config;
//! use tidepool::runtime::Server;
//!
//! let mut server = Server::bind(&Config::default())?;
//! server.set_read_handler(|clients, key, data| clients.write(key, data));
//! server.set_send_handler(|_, _| {});
//! server.run()?;
//! # Ok::<(), tidepool::error::ServerError>(())
//! ```

pub mod config;
pub mod error;
pub mod protocols;
pub mod runtime;
