//! Error types for the multiplexer.

use std::io;
use std::net::SocketAddr;

/// Which callback a [`ServerError::MissingHandler`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Read,
    Send,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Read => write!(f, "read"),
            HandlerKind::Send => write!(f, "send"),
        }
    }
}

/// Errors raised by the server.
///
/// Everything except `MissingHandler` and a failing poll in the loop comes
/// out of `Server::bind` and is fatal: callers should report it and exit.
#[derive(Debug)]
pub enum ServerError {
    /// `host:port` did not resolve to a socket address.
    Resolve(String, io::Error),
    /// Creating or configuring the listening socket failed.
    Socket(io::Error),
    /// Setting `SO_REUSEADDR` failed.
    ReuseAddr(io::Error),
    /// Binding the listening socket failed.
    Bind(SocketAddr, io::Error),
    /// Listening on the bound socket failed.
    Listen(SocketAddr, io::Error),
    /// Creating, registering with, or waiting on the poller failed.
    Poll(io::Error),
    /// `run` was called before both handlers were set.
    MissingHandler(HandlerKind),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Resolve(addr, e) => write!(f, "Could not resolve '{addr}': {e}"),
            ServerError::Socket(e) => write!(f, "Could not create listening socket: {e}"),
            ServerError::ReuseAddr(e) => write!(f, "Could not enable address reuse: {e}"),
            ServerError::Bind(addr, e) => write!(f, "Could not bind {addr}: {e}"),
            ServerError::Listen(addr, e) => write!(f, "Could not listen on {addr}: {e}"),
            ServerError::Poll(e) => write!(f, "Poll failed: {e}"),
            ServerError::MissingHandler(kind) => {
                write!(f, "No {kind} handler set before running the server")
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Resolve(_, e)
            | ServerError::Socket(e)
            | ServerError::ReuseAddr(e)
            | ServerError::Bind(_, e)
            | ServerError::Listen(_, e)
            | ServerError::Poll(e) => Some(e),
            ServerError::MissingHandler(_) => None,
        }
    }
}
