//! Echo handler.

use crate::runtime::{ClientKey, ClientTable, Handler};

/// Writes received data back to its sender.
#[derive(Debug, Default)]
pub struct Echo;

impl Handler for Echo {
    fn on_data(&mut self, clients: &ClientTable, key: ClientKey, data: &[u8]) {
        clients.write(key, data);
    }
}
