//! Client keys and their allocation.
//!
//! A client key doubles as the mio `Token` its socket is registered under.
//! The listener uses `usize::MAX`, which the allocator never hands out in
//! practice.

use mio::Token;

/// Token the listening socket is registered under.
pub const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Identifier of a connected client, unique among live clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientKey(pub usize);

impl ClientKey {
    pub fn token(self) -> Token {
        Token(self.0)
    }
}

impl From<Token> for ClientKey {
    fn from(token: Token) -> Self {
        ClientKey(token.0)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out client keys.
///
/// Keys increase monotonically and are never reused while any client is
/// connected. Once the client table empties the counter goes back to 0, so
/// the first client after an empty period always gets key 0.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    next: usize,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next key.
    pub fn alloc(&mut self) -> ClientKey {
        let key = ClientKey(self.next);
        self.next += 1;
        key
    }

    /// Called when the client table becomes empty.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Key the next `alloc` will return.
    pub fn peek(&self) -> ClientKey {
        ClientKey(self.next)
    }
}
