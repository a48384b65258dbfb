//! Client table for managing connected TCP clients.
//!
//! Each client tracks its socket and level-style readiness. The table owns
//! every client, hands out keys, and holds the queue of clients found closed
//! during a read cycle until the loop reaps them.

use crate::runtime::io::{self, ReadOutcome};
use crate::runtime::token::{ClientKey, KeyAllocator};
use mio::net::TcpStream;
use mio::{Interest, Registry};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::net::{Shutdown, SocketAddr};
use tracing::debug;

/// A single connected client.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    peer: SocketAddr,
    /// Never reused, unlike the key.
    serial: u64,
    /// Set by a readable event, cleared once a read drains the socket.
    readable: Cell<bool>,
    /// Peer has shut down its write side; the next read sees end of stream.
    read_closed: bool,
}

impl Client {
    fn new(stream: TcpStream, peer: SocketAddr, serial: u64) -> Self {
        Self {
            stream,
            peer,
            serial,
            readable: Cell::new(false),
            read_closed: false,
        }
    }

    fn mark_readable(&mut self, read_closed: bool) {
        self.readable.set(true);
        self.read_closed |= read_closed;
    }

    /// Drain the socket and update readiness.
    ///
    /// mio reports edges, so a client whose end of stream arrived together
    /// with its last data stays readable for one more cycle to observe it.
    fn read(&mut self) -> ReadOutcome {
        let outcome = io::read_all(&mut self.stream);
        self.readable.set(match &outcome {
            ReadOutcome::Data { eof, .. } => *eof || self.read_closed,
            _ => false,
        });
        outcome
    }
}

/// Registry of connected clients keyed by [`ClientKey`].
///
/// Handlers receive a shared reference: they can write to clients and shut
/// sockets down, but only the event loop inserts or removes entries.
pub struct ClientTable {
    clients: BTreeMap<ClientKey, Client>,
    pending_deletion: Vec<ClientKey>,
    keys: KeyAllocator,
    next_serial: u64,
    registry: Registry,
    max_connections: usize,
}

impl ClientTable {
    /// Create an empty table whose sockets register with `registry`.
    pub fn new(registry: Registry, max_connections: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            pending_deletion: Vec::new(),
            keys: KeyAllocator::new(),
            next_serial: 0,
            registry,
            max_connections,
        }
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Maximum number of clients allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_connections
    }

    pub fn contains(&self, key: ClientKey) -> bool {
        self.clients.contains_key(&key)
    }

    /// Keys of all connected clients, in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = ClientKey> + '_ {
        self.clients.keys().copied()
    }

    pub fn peer_addr(&self, key: ClientKey) -> Option<SocketAddr> {
        self.clients.get(&key).map(|client| client.peer)
    }

    /// Connection serial of the client currently holding `key`.
    ///
    /// Keys go back to 0 once the table empties; serials never repeat, so
    /// per-client state kept outside the table should be tagged with one.
    pub fn serial(&self, key: ClientKey) -> Option<u64> {
        self.clients.get(&key).map(|client| client.serial)
    }

    /// Clients found closed this cycle, waiting to be reaped.
    pub fn pending_deletion(&self) -> &[ClientKey] {
        &self.pending_deletion
    }

    /// Write `data` to a client.
    ///
    /// Unknown keys are ignored. A single write is issued; short writes are
    /// not retried and failures are only logged.
    pub fn write(&self, key: ClientKey, data: &[u8]) {
        let Some(client) = self.clients.get(&key) else {
            return;
        };

        let mut stream = &client.stream;
        match io::write_once(&mut stream, data) {
            Ok(n) if n < data.len() => {
                debug!(%key, written = n, len = data.len(), "Short write");
            }
            Ok(_) => {}
            Err(e) => {
                debug!(%key, error = %e, "Write failed");
            }
        }
    }

    /// Shut a client's socket down in both directions.
    ///
    /// The entry stays in the table and is marked readable, so the next
    /// read cycle sees end of stream and reaps it like any other closed
    /// client.
    pub fn disconnect(&self, key: ClientKey) {
        if let Some(client) = self.clients.get(&key) {
            if let Err(e) = client.stream.shutdown(Shutdown::Both) {
                debug!(%key, error = %e, "Shutdown failed");
            }
            client.readable.set(true);
        }
    }

    /// Register and insert a freshly accepted stream.
    ///
    /// Returns `Ok(None)` when the table is at capacity; the stream is
    /// dropped in that case.
    pub(crate) fn insert(
        &mut self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> std::io::Result<Option<ClientKey>> {
        if self.is_full() {
            return Ok(None);
        }

        let key = self.keys.peek();
        self.registry
            .register(&mut stream, key.token(), Interest::READABLE)?;
        let key = self.keys.alloc();
        let serial = self.next_serial;
        self.next_serial += 1;
        self.clients.insert(key, Client::new(stream, peer, serial));
        Ok(Some(key))
    }

    /// Shut down and remove a client. Returns false if the key was unknown.
    pub(crate) fn remove(&mut self, key: ClientKey) -> bool {
        let Some(mut client) = self.clients.remove(&key) else {
            return false;
        };

        if let Err(e) = self.registry.deregister(&mut client.stream) {
            debug!(%key, error = %e, "Deregister failed");
        }
        // The peer may already be gone, in which case shutdown reports ENOTCONN.
        if let Err(e) = client.stream.shutdown(Shutdown::Both) {
            debug!(%key, error = %e, "Shutdown failed");
        }

        if self.clients.is_empty() {
            self.keys.reset();
        }
        true
    }

    pub(crate) fn mark_readable(&mut self, key: ClientKey, read_closed: bool) {
        if let Some(client) = self.clients.get_mut(&key) {
            client.mark_readable(read_closed);
        }
    }

    /// Keys of clients with input waiting, in ascending order.
    pub(crate) fn readable_keys(&self) -> Vec<ClientKey> {
        self.clients
            .iter()
            .filter(|(_, client)| client.readable.get())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Drain a client's socket. `None` if the key is unknown.
    pub(crate) fn read(&mut self, key: ClientKey) -> Option<ReadOutcome> {
        self.clients.get_mut(&key).map(Client::read)
    }

    /// Queue a client for removal at the start of the next cycle.
    pub(crate) fn schedule_deletion(&mut self, key: ClientKey) {
        if let Some(client) = self.clients.get_mut(&key) {
            client.readable.set(false);
        }
        if !self.pending_deletion.contains(&key) {
            self.pending_deletion.push(key);
        }
    }

    /// Remove every queued client, returning the keys actually removed.
    pub(crate) fn drain_pending(&mut self) -> Vec<ClientKey> {
        let pending = std::mem::take(&mut self.pending_deletion);
        pending
            .into_iter()
            .filter(|key| self.remove(*key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;
    use std::io::Read;

    /// Accept one loopback connection, returning the peer side and the
    /// accepted non-blocking stream.
    fn connected_pair() -> (std::net::TcpStream, TcpStream, SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, addr) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (peer, TcpStream::from_std(accepted), addr)
    }

    fn table(max_connections: usize) -> (Poll, ClientTable) {
        let poll = Poll::new().unwrap();
        let registry = poll.registry().try_clone().unwrap();
        (poll, ClientTable::new(registry, max_connections))
    }

    #[test]
    fn test_insert_respects_capacity() {
        let (_poll, mut clients) = table(2);
        let mut peers = Vec::new();

        for expected in 0..2 {
            let (peer, stream, addr) = connected_pair();
            peers.push(peer);
            assert_eq!(clients.insert(stream, addr).unwrap(), Some(ClientKey(expected)));
        }

        let (_peer, stream, addr) = connected_pair();
        assert!(clients.is_full());
        assert_eq!(clients.insert(stream, addr).unwrap(), None);
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn test_keys_are_monotonic_until_empty() {
        let (_poll, mut clients) = table(8);
        let mut peers = Vec::new();

        for _ in 0..3 {
            let (peer, stream, addr) = connected_pair();
            peers.push(peer);
            clients.insert(stream, addr).unwrap();
        }

        // Removing a middle key does not make it available again
        assert!(clients.remove(ClientKey(1)));
        let (peer, stream, addr) = connected_pair();
        peers.push(peer);
        assert_eq!(clients.insert(stream, addr).unwrap(), Some(ClientKey(3)));

        for key in [0, 2, 3] {
            assert!(clients.remove(ClientKey(key)));
        }
        assert!(clients.is_empty());

        let (_peer, stream, addr) = connected_pair();
        assert_eq!(clients.insert(stream, addr).unwrap(), Some(ClientKey(0)));
    }

    #[test]
    fn test_serial_changes_when_key_is_reused() {
        let (_poll, mut clients) = table(4);
        let (_first_peer, stream, addr) = connected_pair();
        let key = clients.insert(stream, addr).unwrap().unwrap();
        let first = clients.serial(key).unwrap();

        assert!(clients.remove(key));
        assert_eq!(clients.serial(key), None);

        let (_second_peer, stream, addr) = connected_pair();
        assert_eq!(clients.insert(stream, addr).unwrap(), Some(key));
        assert_ne!(clients.serial(key), Some(first));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_poll, mut clients) = table(4);
        let (mut peer, stream, addr) = connected_pair();
        let key = clients.insert(stream, addr).unwrap().unwrap();

        assert!(clients.remove(key));
        assert!(!clients.remove(key));
        assert!(!clients.contains(key));

        // The peer sees the shutdown as end of stream
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_remove_after_peer_closed() {
        let (_poll, mut clients) = table(4);
        let (peer, stream, addr) = connected_pair();
        let key = clients.insert(stream, addr).unwrap().unwrap();

        // Shutdown may fail once the peer is gone; removal still completes
        drop(peer);
        clients.disconnect(key);
        assert!(clients.remove(key));
        assert!(clients.is_empty());
        assert_eq!(clients.keys.peek(), ClientKey(0));
    }

    #[test]
    fn test_write_to_missing_key_is_noop() {
        let (_poll, clients) = table(4);
        clients.write(ClientKey(42), b"nobody home");
        clients.disconnect(ClientKey(42));
        assert!(clients.is_empty());
    }

    #[test]
    fn test_write_reaches_peer() {
        let (_poll, mut clients) = table(4);
        let (mut peer, stream, addr) = connected_pair();
        let key = clients.insert(stream, addr).unwrap().unwrap();

        clients.write(key, b"hello");

        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_drain_pending() {
        let (_poll, mut clients) = table(4);
        let (_peer, stream, addr) = connected_pair();
        let key = clients.insert(stream, addr).unwrap().unwrap();

        clients.mark_readable(key, false);
        assert_eq!(clients.readable_keys(), vec![key]);

        clients.schedule_deletion(key);
        clients.schedule_deletion(key);
        assert_eq!(clients.pending_deletion(), &[key]);
        assert!(clients.readable_keys().is_empty());
        assert!(clients.contains(key));

        assert_eq!(clients.drain_pending(), vec![key]);
        assert!(clients.pending_deletion().is_empty());
        assert!(!clients.contains(key));
    }
}
