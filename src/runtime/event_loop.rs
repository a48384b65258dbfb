//! Single-threaded poll-and-dispatch loop.
//!
//! Readiness-based model: each iteration polls the listener and every
//! client with a short timeout, then either handles the ready sockets
//! (reap closed clients, accept one connection, read and dispatch data) or,
//! when nothing was ready, gives the send handler a turn for every client.
//! The two dispatch phases never run in the same iteration, so clients that
//! keep sending can starve the send handler.
//!
//! mio only reports readiness edges. The loop keeps a socket marked ready
//! until an operation on it drains it, which gives the same behaviour as a
//! level-triggered select. The listener is the exception: while the table is
//! full it is not counted as ready, and it is re-armed when a removal frees a
//! slot, so a connection left in the backlog is picked up without a new
//! event and a full table of quiet clients still gets idle iterations.

use crate::config::Config;
use crate::error::{HandlerKind, ServerError};
use crate::runtime::connection::ClientTable;
use crate::runtime::handler::{self, Handler, ReadHandler, SendHandler};
use crate::runtime::io::ReadOutcome;
use crate::runtime::token::{ClientKey, LISTENER_TOKEN};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a single loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// This many sockets were ready; accepts and reads were dispatched.
    Ready(usize),
    /// Nothing was ready; the send handler ran for every client.
    Idle,
}

/// The multiplexing server.
pub struct Server {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    /// Set by a listener event or when a full table frees a slot; cleared
    /// once accept would block or the table is full.
    listener_ready: bool,
    clients: ClientTable,
    read_handler: Option<ReadHandler>,
    send_handler: Option<SendHandler>,
    poll_interval: Duration,
    debug: bool,
}

impl Server {
    /// Bind the listening socket described by `config`.
    ///
    /// Every error here is fatal; nothing is retried.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = resolve(&config.listen_addr())?;
        let listener = create_listener(addr, config.backlog)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Listen(addr, e))?;

        let mut listener = TcpListener::from_std(listener);
        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Poll)?;
        let registry = poll.registry().try_clone().map_err(ServerError::Poll)?;

        info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            poll_interval_us = config.poll_interval.as_micros() as u64,
            "Listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(config.max_connections.saturating_add(1).min(1024)),
            listener,
            local_addr,
            listener_ready: false,
            clients: ClientTable::new(registry, config.max_connections),
            read_handler: None,
            send_handler: None,
            poll_interval: config.poll_interval,
            debug: config.debug,
        })
    }

    /// Set the callback invoked with data read from a client.
    pub fn set_read_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&ClientTable, ClientKey, &[u8]) + 'static,
    {
        self.read_handler = Some(Box::new(handler));
    }

    /// Set the callback invoked for every client on idle iterations.
    pub fn set_send_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&ClientTable, ClientKey) + 'static,
    {
        self.send_handler = Some(Box::new(handler));
    }

    /// Install both callbacks from one [`Handler`].
    pub fn set_handler<H: Handler + 'static>(&mut self, handler: H) {
        let (read, send) = handler::split(handler);
        self.read_handler = Some(read);
        self.send_handler = Some(send);
    }

    /// Run until the process is stopped or the poller fails.
    pub fn run(&mut self) -> Result<(), ServerError> {
        self.run_until(&AtomicBool::new(false))
    }

    /// Run until `stop` is set. The flag is checked once per iteration.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<(), ServerError> {
        self.check_handlers()?;
        info!(addr = %self.local_addr, "Entering event loop");

        while !stop.load(Ordering::Relaxed) {
            self.tick()?;
        }

        info!(clients = self.clients.len(), "Event loop stopped");
        Ok(())
    }

    /// Run a single iteration of the loop.
    pub fn tick(&mut self) -> Result<Tick, ServerError> {
        self.check_handlers()?;
        self.poll_readiness()?;

        let ready = usize::from(self.listener_ready) + self.clients.readable_keys().len();

        // Clients found closed last iteration go before anything is dispatched.
        let was_full = self.clients.is_full();
        let reaped = self.clients.drain_pending();
        if !reaped.is_empty() {
            if self.debug {
                debug!(?reaped, clients = self.clients.len(), "Removed closed clients");
            }
            self.rearm_listener(was_full);
        }

        if ready > 0 {
            if self.debug {
                debug!(ready, "Sockets ready");
            }
            if self.listener_ready {
                self.accept_one();
            }
            self.dispatch_reads();
            Ok(Tick::Ready(ready))
        } else {
            self.dispatch_sends();
            Ok(Tick::Idle)
        }
    }

    /// Write `data` to a client; unknown keys are ignored.
    pub fn write(&self, key: ClientKey, data: &[u8]) {
        self.clients.write(key, data);
    }

    /// Shut down and forget a client. Unknown keys are ignored.
    pub fn remove(&mut self, key: ClientKey) -> bool {
        let was_full = self.clients.is_full();
        let removed = self.clients.remove(key);
        if removed {
            self.rearm_listener(was_full);
        }
        removed
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn contains(&self, key: ClientKey) -> bool {
        self.clients.contains(key)
    }

    pub fn client_keys(&self) -> Vec<ClientKey> {
        self.clients.keys().collect()
    }

    /// Clients found closed during the last iteration.
    pub fn pending_deletion(&self) -> &[ClientKey] {
        self.clients.pending_deletion()
    }

    fn check_handlers(&self) -> Result<(), ServerError> {
        if self.read_handler.is_none() {
            return Err(ServerError::MissingHandler(HandlerKind::Read));
        }
        if self.send_handler.is_none() {
            return Err(ServerError::MissingHandler(HandlerKind::Send));
        }
        Ok(())
    }

    fn poll_readiness(&mut self) -> Result<(), ServerError> {
        match self.poll.poll(&mut self.events, Some(self.poll_interval)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(ServerError::Poll(e)),
        }

        for event in self.events.iter() {
            if event.token() == LISTENER_TOKEN {
                self.listener_ready = true;
            } else {
                self.clients
                    .mark_readable(ClientKey::from(event.token()), event.is_read_closed());
            }
        }
        Ok(())
    }

    /// A connection may have been left in the backlog while the table was
    /// full; look again now that there is room.
    fn rearm_listener(&mut self, was_full: bool) {
        if was_full && !self.clients.is_full() {
            self.listener_ready = true;
        }
    }

    /// Accept at most one connection. At capacity the connection stays in
    /// the backlog until a removal re-arms the listener.
    fn accept_one(&mut self) {
        if self.clients.is_full() {
            self.listener_ready = false;
            return;
        }

        match self.listener.accept() {
            Ok((stream, peer)) => match self.clients.insert(stream, peer) {
                Ok(Some(key)) => {
                    if self.clients.is_full() {
                        self.listener_ready = false;
                    }
                    if self.debug {
                        debug!(
                            %key,
                            %peer,
                            clients = self.clients.len(),
                            max = self.clients.capacity(),
                            "Accepted connection"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(%peer, error = %e, "Failed to register connection"),
            },
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.listener_ready = false;
            }
            Err(e) => {
                warn!(error = %e, "Accept error");
                self.listener_ready = false;
            }
        }
    }

    fn dispatch_reads(&mut self) {
        let Some(on_read) = self.read_handler.as_mut() else {
            return;
        };

        for key in self.clients.readable_keys() {
            let Some(outcome) = self.clients.read(key) else {
                continue;
            };

            match outcome {
                ReadOutcome::Data { bytes, .. } => on_read(&self.clients, key, &bytes[..]),
                ReadOutcome::Closed => {
                    if self.debug {
                        debug!(%key, peer = ?self.clients.peer_addr(key), "Client closed");
                    }
                    self.clients.schedule_deletion(key);
                }
                ReadOutcome::Failed(e) => {
                    debug!(%key, error = %e, "Read failed, closing client");
                    self.clients.schedule_deletion(key);
                }
                ReadOutcome::WouldBlock => {}
            }
        }
    }

    fn dispatch_sends(&mut self) {
        let Some(on_send) = self.send_handler.as_mut() else {
            return;
        };

        for key in self.clients.keys() {
            on_send(&self.clients, key);
        }
    }
}

fn resolve(addr: &str) -> Result<SocketAddr, ServerError> {
    addr.to_socket_addrs()
        .map_err(|e| ServerError::Resolve(addr.to_string(), e))?
        .next()
        .ok_or_else(|| {
            ServerError::Resolve(
                addr.to_string(),
                io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            )
        })
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener, ServerError> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(ServerError::Socket)?;

    socket
        .set_reuse_address(true)
        .map_err(ServerError::ReuseAddr)?;
    socket.set_nonblocking(true).map_err(ServerError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::Bind(addr, e))?;
    socket
        .listen(backlog)
        .map_err(|e| ServerError::Listen(addr, e))?;

    Ok(socket.into())
}
