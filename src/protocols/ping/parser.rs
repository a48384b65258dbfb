//! Ping line parser.

use bytes::{BufMut, BytesMut};

/// Parsed ping command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simple ping (no message).
    Ping,
    /// Ping with a message to echo back.
    PingMsg(Vec<u8>),
    /// Quit command.
    Quit,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// A full line was parsed; the second field is the bytes it took.
    Complete(Command, usize),
    /// No line terminator yet.
    Incomplete,
    /// A full line that is not a command; skip this many bytes.
    Unknown(usize),
}

/// Parse one line from the input buffer.
///
/// Lines end in `\n`; a preceding `\r` is dropped, so both `nc` and telnet
/// style clients work.
pub fn parse(input: &[u8]) -> ParseResult {
    let Some(newline) = input.iter().position(|&b| b == b'\n') else {
        return ParseResult::Incomplete;
    };

    let consumed = newline + 1;
    let line = input[..newline]
        .strip_suffix(b"\r")
        .unwrap_or(&input[..newline]);

    if line.eq_ignore_ascii_case(b"PING") {
        ParseResult::Complete(Command::Ping, consumed)
    } else if line.eq_ignore_ascii_case(b"QUIT") {
        ParseResult::Complete(Command::Quit, consumed)
    } else if line.len() > 5 && line[..5].eq_ignore_ascii_case(b"PING ") {
        ParseResult::Complete(Command::PingMsg(line[5..].to_vec()), consumed)
    } else {
        ParseResult::Unknown(consumed)
    }
}

/// Append the reply to `cmd` to `out`.
pub fn respond(cmd: &Command, out: &mut BytesMut) {
    match cmd {
        Command::Ping => out.put_slice(b"PONG\r\n"),
        Command::PingMsg(msg) => {
            out.reserve(5 + msg.len() + 2);
            out.put_slice(b"PONG ");
            out.put_slice(msg);
            out.put_slice(b"\r\n");
        }
        Command::Quit => out.put_slice(b"OK\r\n"),
    }
}

/// Reply to a line that is not a command.
pub fn response_error() -> &'static [u8] {
    b"ERROR unknown command\r\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping() {
        assert_eq!(parse(b"PING\r\n"), ParseResult::Complete(Command::Ping, 6));
        assert_eq!(parse(b"ping\n"), ParseResult::Complete(Command::Ping, 5));
    }

    #[test]
    fn test_parse_ping_msg() {
        match parse(b"PING hello\r\nPING") {
            ParseResult::Complete(Command::PingMsg(msg), 12) => {
                assert_eq!(msg, b"hello");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_quit() {
        assert_eq!(parse(b"quit\r\n"), ParseResult::Complete(Command::Quit, 6));
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(parse(b"PING"), ParseResult::Incomplete);
        assert_eq!(parse(b""), ParseResult::Incomplete);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse(b"FOO\r\nPING\r\n"), ParseResult::Unknown(5));
    }

    #[test]
    fn test_respond() {
        let mut out = BytesMut::new();
        respond(&Command::Ping, &mut out);
        respond(&Command::PingMsg(b"abc".to_vec()), &mut out);
        assert_eq!(&out[..], b"PONG\r\nPONG abc\r\n");
    }
}
