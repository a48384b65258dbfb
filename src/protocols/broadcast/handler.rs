//! Broadcast handler.

use crate::runtime::{ClientKey, ClientTable, Handler};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// Per-client outboxes filled on read and flushed on idle ticks.
#[derive(Debug, Default)]
pub struct Broadcast {
    /// Each outbox is tagged with the serial of the client it is for.
    outboxes: HashMap<ClientKey, (u64, VecDeque<Bytes>)>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting for `key`.
    pub fn queued(&self, key: ClientKey) -> usize {
        self.outboxes.get(&key).map_or(0, |(_, outbox)| outbox.len())
    }

    /// Outboxes of clients that left would otherwise be inherited by
    /// whoever is assigned their key next.
    fn forget_departed(&mut self, clients: &ClientTable) {
        self.outboxes
            .retain(|key, (serial, _)| clients.serial(*key) == Some(*serial));
    }
}

impl Handler for Broadcast {
    fn on_data(&mut self, clients: &ClientTable, key: ClientKey, data: &[u8]) {
        self.forget_departed(clients);

        let message = Bytes::copy_from_slice(data);
        for other in clients.keys().filter(|k| *k != key) {
            let Some(serial) = clients.serial(other) else {
                continue;
            };
            let (_, outbox) = self
                .outboxes
                .entry(other)
                .or_insert_with(|| (serial, VecDeque::new()));
            outbox.push_back(message.clone());
        }
    }

    fn on_idle_tick(&mut self, clients: &ClientTable, key: ClientKey) {
        self.forget_departed(clients);
        let Some((_, outbox)) = self.outboxes.get_mut(&key) else {
            return;
        };
        for message in outbox.drain(..) {
            clients.write(key, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::testing;
    use std::io::Write;

    #[test]
    fn test_relay_to_others() {
        let mut server = testing::serve(Broadcast::new());
        let mut a = testing::connect(&mut server);
        let mut b = testing::connect(&mut server);
        let mut c = testing::connect(&mut server);

        a.write_all(b"hi all").unwrap();
        assert_eq!(testing::receive(&mut server, &mut b, 6), b"hi all");
        assert_eq!(testing::receive(&mut server, &mut c, 6), b"hi all");
        testing::assert_silent(&mut server, &mut a);
    }

    #[test]
    fn test_queue_follows_live_clients() {
        let mut server = testing::serve(Broadcast::new());
        let _a = testing::connect(&mut server);
        let _b = testing::connect(&mut server);

        let mut handler = Broadcast::new();
        handler.on_data(server.clients(), ClientKey(0), b"one");
        handler.on_data(server.clients(), ClientKey(0), b"two");
        assert_eq!(handler.queued(ClientKey(1)), 2);
        assert_eq!(handler.queued(ClientKey(0)), 0);

        handler.on_idle_tick(server.clients(), ClientKey(1));
        assert_eq!(handler.queued(ClientKey(1)), 0);
    }

    #[test]
    fn test_reused_key_gets_no_stale_messages() {
        let mut server = testing::serve(Broadcast::new());
        let a = testing::connect(&mut server);
        let b = testing::connect(&mut server);

        let mut handler = Broadcast::new();
        handler.on_data(server.clients(), ClientKey(0), b"for the old b");
        assert_eq!(handler.queued(ClientKey(1)), 1);

        drop(a);
        drop(b);
        testing::drain(&mut server);

        let _c = testing::connect(&mut server);
        let mut d = testing::connect(&mut server);
        assert_eq!(server.client_keys(), vec![ClientKey(0), ClientKey(1)]);

        handler.on_idle_tick(server.clients(), ClientKey(1));
        assert_eq!(handler.queued(ClientKey(1)), 0);
        testing::assert_silent(&mut server, &mut d);
    }
}
