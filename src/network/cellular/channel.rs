//! AT command channel.
//!
//! The channel owns the transport and is the only code that reads from or
//! writes to it. A command exchange writes one `AT` line and then watches the
//! incoming bytes for one of the caller's expected markers. Lines that start
//! with a known URC prefix are not part of the reply: they are read to the end,
//! classified, and handed to a [`UrcHandler`] before the wait continues on
//! whatever time is left.
//!
//! ```text
//!  caller ──execute()──▶ "AT+QIRD=0,0\r\n" ──▶ modem
//!                                         ◀── "+QIURC: \"recv\",1,4\r\n"  → handler
//!                                         ◀── "+QIRD: 4,0,4"              → Ok(marker index)
//! ```
//!
//! After a marker matches, the caller parses the rest of the reply with the
//! field readers ([`read_int_until`](Channel::read_int_until),
//! [`skip_until`](Channel::skip_until), [`read_until`](Channel::read_until)).

use super::urc::{UrcHandler, URC_PREFIXES, classify};
use crate::network::Transport;
use crate::network::error::Error;
use core::fmt::{self, Write as _};
use heapless::{String, Vec};
use log::{trace, warn};

/// Line terminator appended to every command.
pub const AT_NL: &str = "\r\n";
/// Final result of a successful command.
pub const OK: &str = "OK\r\n";
/// Final result of a rejected command.
pub const ERROR: &str = "ERROR\r\n";
/// Terminates an MQTT payload, or aborts one when sent alone.
pub const CTRL_Z: u8 = 0x1A;

/// Longest command line, including `AT` and the terminator.
pub const COMMAND_MAX: usize = 256;
/// Longest unsolicited line the channel will classify.
pub const LINE_MAX: usize = 768;
const WINDOW_MAX: usize = 64;
const INT_MAX_DIGITS: usize = 16;

/// Owner of the transport and of the read cursor.
#[derive(Debug)]
pub struct Channel<T: Transport> {
    transport: T,
    window: Vec<u8, WINDOW_MAX>,
    field_timeout_ms: u32,
}

impl<T: Transport> Channel<T> {
    /// Wrap a transport. `field_timeout_ms` bounds each field reader.
    pub fn new(transport: T, field_timeout_ms: u32) -> Self {
        Self {
            transport,
            window: Vec::new(),
            field_timeout_ms,
        }
    }

    /// Shared access to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Exclusive access to the transport. Reading from it directly
    /// desynchronizes the channel.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back.
    pub fn into_inner(self) -> T {
        self.transport
    }

    pub(crate) fn set_field_timeout(&mut self, timeout_ms: u32) {
        self.field_timeout_ms = timeout_ms;
    }

    /// Write `AT<args>\r\n` and flush.
    pub fn send_command(&mut self, args: fmt::Arguments<'_>) -> Result<(), Error> {
        let mut line: String<COMMAND_MAX> = String::new();
        write!(line, "AT{}{}", args, AT_NL).map_err(|_| Error::BufferOverflow)?;
        trace!("> {}", line.trim_end());
        self.write_raw(line.as_bytes())
    }

    /// Write raw bytes (a payload after a prompt) and flush.
    pub fn write_raw(&mut self, mut bytes: &[u8]) -> Result<(), Error> {
        while !bytes.is_empty() {
            match self.transport.write(bytes) {
                Ok(0) | Err(_) => return Err(Error::TransportFailure),
                Ok(n) => bytes = &bytes[n..],
            }
        }
        self.transport.flush().map_err(|_| Error::TransportFailure)
    }

    /// Send a command and wait for one of `markers`.
    ///
    /// Returns the index of the marker that matched.
    pub fn execute<H: UrcHandler>(
        &mut self,
        args: fmt::Arguments<'_>,
        markers: &[&str],
        timeout_ms: u32,
        handler: &mut H,
    ) -> Result<usize, Error> {
        self.send_command(args)?;
        self.wait(markers, timeout_ms, handler)
    }

    /// Wait until the incoming text ends with one of `markers`.
    ///
    /// Unsolicited lines seen meanwhile go to `handler`. Markers are checked
    /// first, so a caller may wait for a URC-shaped reply directly.
    pub fn wait<H: UrcHandler>(
        &mut self,
        markers: &[&str],
        timeout_ms: u32,
        handler: &mut H,
    ) -> Result<usize, Error> {
        let start = self.transport.now_ms();
        self.window.clear();
        loop {
            if let Some(byte) = self.poll_byte() {
                self.push_window(byte);

                if let Some(index) = markers.iter().position(|m| self.window.ends_with(m.as_bytes())) {
                    self.window.clear();
                    return Ok(index);
                }

                if let Some(prefix) = self.urc_at_line_start(markers) {
                    self.window.clear();
                    self.dispatch_urc(prefix, handler);
                    continue;
                }

                if byte == b'\n' {
                    self.window.clear();
                }
            }
            if self.elapsed_since(start) >= u64::from(timeout_ms) {
                self.window.clear();
                return Err(Error::Timeout);
            }
        }
    }

    /// Wait for `OK`; `ERROR` becomes [`Error::ProtocolMismatch`].
    pub fn wait_ok<H: UrcHandler>(&mut self, timeout_ms: u32, handler: &mut H) -> Result<(), Error> {
        match self.wait(&[OK, ERROR], timeout_ms, handler)? {
            0 => Ok(()),
            _ => Err(Error::ProtocolMismatch),
        }
    }

    /// Consume the final result of a reply whose content was already parsed.
    pub fn drain<H: UrcHandler>(&mut self, timeout_ms: u32, handler: &mut H) {
        let _ = self.wait(&[OK, ERROR], timeout_ms, handler);
    }

    /// Read one raw byte.
    pub fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, Error> {
        let start = self.transport.now_ms();
        loop {
            if let Some(byte) = self.poll_byte() {
                return Ok(byte);
            }
            if self.elapsed_since(start) >= u64::from(timeout_ms) {
                return Err(Error::Timeout);
            }
        }
    }

    /// Discard bytes up to and including `delim`.
    pub fn skip_until(&mut self, delim: u8) -> Result<(), Error> {
        let timeout = self.field_timeout_ms;
        while self.read_byte(timeout)? != delim {}
        Ok(())
    }

    /// Collect bytes up to `delim` (consumed, not stored) into `out`.
    ///
    /// When `out` fills up the rest of the field is still consumed and
    /// [`Error::BufferOverflow`] is returned.
    pub fn read_until<const N: usize>(&mut self, delim: u8, out: &mut Vec<u8, N>) -> Result<(), Error> {
        let timeout = self.field_timeout_ms;
        let mut overflow = false;
        loop {
            let byte = self.read_byte(timeout)?;
            if byte == delim {
                break;
            }
            if out.push(byte).is_err() {
                overflow = true;
            }
        }
        if overflow { Err(Error::BufferOverflow) } else { Ok(()) }
    }

    /// Read a decimal integer terminated by `delim`.
    pub fn read_int_until(&mut self, delim: u8) -> Result<i32, Error> {
        let mut digits: Vec<u8, INT_MAX_DIGITS> = Vec::new();
        match self.read_until(delim, &mut digits) {
            Ok(()) | Err(Error::BufferOverflow) => {}
            Err(e) => return Err(e),
        }
        parse_int(&digits).ok_or_else(|| {
            warn!("expected an integer field");
            Error::ProtocolMismatch
        })
    }

    fn poll_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.transport.read(&mut byte) {
            Ok(n) if n > 0 => Some(byte[0]),
            _ => None,
        }
    }

    fn elapsed_since(&mut self, start: u64) -> u64 {
        self.transport.now_ms().saturating_sub(start)
    }

    fn push_window(&mut self, byte: u8) {
        if let Err(byte) = self.window.push(byte) {
            self.window.rotate_left(1);
            if let Some(last) = self.window.last_mut() {
                *last = byte;
            }
        }
    }

    /// The URC prefix the current line consists of, unless the caller is
    /// waiting for that very text.
    fn urc_at_line_start(&self, markers: &[&str]) -> Option<&'static str> {
        let line_start = self
            .window
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        let line = &self.window[line_start..];
        URC_PREFIXES
            .iter()
            .copied()
            .find(|p| line == p.as_bytes() && !markers.contains(p))
    }

    fn dispatch_urc<H: UrcHandler>(&mut self, prefix: &str, handler: &mut H) {
        let Ok(mut line) = Vec::<u8, LINE_MAX>::from_slice(prefix.as_bytes()) else {
            return;
        };
        if let Err(e) = self.read_until(b'\n', &mut line) {
            warn!("URC {} dropped: {}", prefix, e);
            return;
        }
        match core::str::from_utf8(&line) {
            Ok(text) => handler.handle(classify(text)),
            Err(_) => warn!("URC {} dropped: not UTF-8", prefix),
        }
    }
}

/// Parse the leading integer of `text` the way C `atoi` does: surrounding
/// whitespace is skipped, an optional sign is accepted, and parsing stops at
/// the first non-digit. Returns `None` when no digit is found.
pub(crate) fn parse_int(text: &[u8]) -> Option<i32> {
    let mut rest = text;
    while let [first, tail @ ..] = rest {
        if first.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }
    let (negative, rest) = match rest {
        [b'-', tail @ ..] => (true, tail),
        [b'+', tail @ ..] => (false, tail),
        _ => (false, rest),
    };
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let mut value: i32 = 0;
    for b in &rest[..digits] {
        value = value.checked_mul(10)?.checked_add(i32::from(b - b'0'))?;
    }
    Some(if negative { -value } else { value })
}

/// Split a comma-separated reply into integers. Fields past `N` are ignored.
pub(crate) fn parse_fields<const N: usize>(line: &[u8]) -> Result<Vec<i32, N>, Error> {
    line.split(|b| *b == b',')
        .take(N)
        .map(|field| parse_int(field).ok_or(Error::ProtocolMismatch))
        .collect()
}
