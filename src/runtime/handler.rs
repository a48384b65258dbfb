//! Callbacks the event loop dispatches to.
//!
//! Handlers run synchronously on the loop thread. There is no timeout or
//! preemption: a handler that blocks stalls every client.

use crate::runtime::connection::ClientTable;
use crate::runtime::token::ClientKey;
use std::cell::RefCell;
use std::rc::Rc;

/// Called with the bytes read from a client during a ready cycle.
pub type ReadHandler = Box<dyn FnMut(&ClientTable, ClientKey, &[u8])>;

/// Called once per live client during an idle cycle.
pub type SendHandler = Box<dyn FnMut(&ClientTable, ClientKey)>;

/// A read handler and a send handler sharing one piece of state.
pub trait Handler {
    /// A client delivered `data`.
    fn on_data(&mut self, clients: &ClientTable, key: ClientKey, data: &[u8]);

    /// No socket was ready this cycle; write to `key` if anything is due.
    fn on_idle_tick(&mut self, _clients: &ClientTable, _key: ClientKey) {}
}

/// Split a [`Handler`] into the two callbacks the server stores.
pub fn split<H: Handler + 'static>(handler: H) -> (ReadHandler, SendHandler) {
    let shared = Rc::new(RefCell::new(handler));
    let on_send = Rc::clone(&shared);

    let read: ReadHandler = Box::new(move |clients: &ClientTable, key: ClientKey, data: &[u8]| {
        shared.borrow_mut().on_data(clients, key, data);
    });
    let send: SendHandler = Box::new(move |clients: &ClientTable, key: ClientKey| {
        on_send.borrow_mut().on_idle_tick(clients, key);
    });
    (read, send)
}
