//! Poll-driven connection multiplexer.
//!
//! - `Server`: listening socket and the poll-and-dispatch loop
//! - `ClientTable`: connected clients and the pending-deletion queue
//! - `ClientKey`: client identifiers, reset to 0 whenever the table empties
//! - `Handler`: read and send callbacks the loop dispatches to
//!
//! Everything runs on the calling thread.

mod connection;
mod event_loop;
mod handler;
mod io;
mod token;

pub use connection::ClientTable;
pub use event_loop::{Server, Tick};
pub use handler::{Handler, ReadHandler, SendHandler};
pub use token::ClientKey;

use crate::config::{Config, ProtocolType};
use crate::error::ServerError;
use crate::protocols::{Broadcast, Echo, Ping};

/// Bind a server for `config`, install the configured handlers, and run it.
pub fn run(config: Config) -> Result<(), ServerError> {
    let mut server = Server::bind(&config)?;

    match config.protocol {
        ProtocolType::Echo => server.set_handler(Echo),
        ProtocolType::Ping => server.set_handler(Ping::new()),
        ProtocolType::Broadcast => server.set_handler(Broadcast::new()),
    }

    server.run()
}
