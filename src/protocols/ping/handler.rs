//! Ping handler.

use super::parser::{self, Command, ParseResult};
use crate::runtime::{ClientKey, ClientTable, Handler};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use tracing::debug;

const MAX_LINE_LENGTH: usize = 1024;

/// Answers PING lines, buffering partial lines per client.
#[derive(Debug, Default)]
pub struct Ping {
    /// Unfinished input, tagged with the serial of the client it came from.
    partial: HashMap<ClientKey, (u64, BytesMut)>,
}

impl Ping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys are handed out again once the table empties; forget input left
    /// behind by clients that are gone.
    fn forget_departed(&mut self, clients: &ClientTable) {
        self.partial
            .retain(|key, (serial, _)| clients.serial(*key) == Some(*serial));
    }
}

impl Handler for Ping {
    fn on_data(&mut self, clients: &ClientTable, key: ClientKey, data: &[u8]) {
        let Some(serial) = clients.serial(key) else {
            return;
        };
        self.forget_departed(clients);

        let (_, buffer) = self
            .partial
            .entry(key)
            .or_insert_with(|| (serial, BytesMut::new()));
        buffer.extend_from_slice(data);

        let mut response = BytesMut::new();
        let mut quit = false;

        while !quit {
            match parser::parse(&buffer[..]) {
                ParseResult::Complete(cmd, consumed) => {
                    buffer.advance(consumed);
                    parser::respond(&cmd, &mut response);
                    quit = cmd == Command::Quit;
                }
                ParseResult::Unknown(consumed) => {
                    buffer.advance(consumed);
                    response.extend_from_slice(parser::response_error());
                }
                ParseResult::Incomplete => {
                    if buffer.len() > MAX_LINE_LENGTH {
                        debug!(%key, len = buffer.len(), "Line too long, discarding");
                        buffer.clear();
                        response.extend_from_slice(parser::response_error());
                    }
                    break;
                }
            }
        }

        if !response.is_empty() {
            clients.write(key, &response);
        }
        if quit {
            self.partial.remove(&key);
            clients.disconnect(key);
        }
    }

    fn on_idle_tick(&mut self, clients: &ClientTable, _key: ClientKey) {
        self.forget_departed(clients);
    }
}
