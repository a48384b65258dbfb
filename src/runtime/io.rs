//! Socket read and write helpers.
//!
//! Reads are done in small fixed-size chunks until the socket looks drained:
//! a chunk shorter than `READ_CHUNK`, end of stream, or `WouldBlock`.
//! Writes are a single non-blocking `write` with no retry on short writes.

use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};

/// Size of each read issued against a client socket.
pub const READ_CHUNK: usize = 255;

/// Result of draining a readable client socket.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes were read. `eof` is set when the peer's end of stream was
    /// already seen behind the data.
    Data { bytes: Bytes, eof: bool },
    /// Nothing was read and the peer has closed its side.
    Closed,
    /// Nothing was read because the read failed.
    Failed(io::Error),
    /// Nothing is available right now; the readiness was spurious.
    WouldBlock,
}

/// Read everything currently available from `reader`.
pub fn read_all<R: Read>(reader: &mut R) -> ReadOutcome {
    let mut data = BytesMut::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut eof = false;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => {
                eof = true;
                break;
            }
            Ok(n) => {
                data.extend_from_slice(&chunk[..n]);
                if n < READ_CHUNK {
                    break;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if data.is_empty() {
                    return ReadOutcome::Failed(e);
                }
                // Deliver what we have; the next read surfaces the error again.
                eof = true;
                break;
            }
        }
    }

    match (data.is_empty(), eof) {
        (false, _) => ReadOutcome::Data {
            bytes: data.freeze(),
            eof,
        },
        (true, true) => ReadOutcome::Closed,
        (true, false) => ReadOutcome::WouldBlock,
    }
}

/// Issue one write of `data`, returning how much the socket accepted.
pub fn write_once<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<usize> {
    loop {
        match writer.write(data) {
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
