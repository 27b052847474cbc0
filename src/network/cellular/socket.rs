//! Multiplexed TCP/TLS sockets.
//!
//! The modem exposes [`MUX_COUNT`] connection slots. Each slot is represented
//! by a [`Socket`] in the driver's table; plain and TLS sockets share the same
//! struct and differ only in the command set chosen at each call.
//!
//! # State machine
//!
//! ```text
//!   open() ok                   close() / "closed" URC
//! Disconnected ──▶ Opening ──▶ Connected ──▶ Closing ──▶ Disconnected
//!                     │ open() failed
//!                     └──────────────▶ Disconnected
//! ```
//!
//! Incoming data is announced by a `recv` URC or discovered by polling, and
//! moved into a per-socket FIFO on [`Modem::read`].

use super::channel::{ERROR, OK};
use super::Modem;
use crate::network::Transport;
use crate::network::error::Error;
use heapless::Deque;
use log::{debug, warn};

/// Number of socket slots the modem supports.
pub const MUX_COUNT: usize = 7;
/// Size of each socket's local receive FIFO.
pub const RX_BUFFER_SIZE: usize = 512;
/// Largest payload accepted by one send command.
pub const MAX_SEND_SIZE: usize = 1460;

const SEND_OK: &str = "SEND OK\r\n";
const PROMPT: &str = ">";
/// Modem socket state code meaning "connected".
const STATE_CONNECTED: i32 = 2;

/// Connection state of one socket slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No connection.
    Disconnected,
    /// Open command issued, result pending.
    Opening,
    /// Connection established.
    Connected,
    /// Close command issued.
    Closing,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SocketState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SocketState::Disconnected => defmt::write!(f, "Disconnected"),
            SocketState::Opening => defmt::write!(f, "Opening"),
            SocketState::Connected => defmt::write!(f, "Connected"),
            SocketState::Closing => defmt::write!(f, "Closing"),
        }
    }
}

/// One entry of the socket table.
#[derive(Debug)]
pub struct Socket {
    pub(crate) mux: u8,
    pub(crate) secure: bool,
    pub(crate) state: SocketState,
    pub(crate) pending: usize,
    pub(crate) got_data: bool,
    pub(crate) last_poll_ms: Option<u64>,
    /// What [`Modem::available`] last reported, less what was read since.
    pub(crate) last_available: usize,
    pub(crate) rx: Deque<u8, RX_BUFFER_SIZE>,
}

impl Socket {
    pub(crate) fn new(mux: u8, secure: bool) -> Self {
        Self {
            mux,
            secure,
            state: SocketState::Disconnected,
            pending: 0,
            got_data: false,
            last_poll_ms: None,
            last_available: 0,
            rx: Deque::new(),
        }
    }

    /// Slot index.
    pub fn mux(&self) -> u8 {
        self.mux
    }

    /// Whether the slot uses the TLS command set.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Current state.
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Whether the socket is connected, as last observed.
    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Connected
    }

    /// Unread bytes still held by the modem, as last reported.
    ///
    /// Only accurate right after a poll or a `recv` notification.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Bytes already moved into the local FIFO.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }
}

impl<T: Transport> Modem<T> {
    /// Open a connection on slot `mux % MUX_COUNT`.
    ///
    /// Any previous occupant of the slot is closed and replaced. On success the
    /// slot index actually used is returned; on failure the slot is left
    /// [`SocketState::Disconnected`].
    pub fn open(
        &mut self,
        mux: u8,
        host: &str,
        port: u16,
        secure: bool,
        timeout_s: u32,
    ) -> Result<u8, Error> {
        let mux = (mux as usize % MUX_COUNT) as u8;
        if self.session.socket(mux).is_ok_and(|s| s.is_connected()) {
            let _ = self.close(mux, self.config.ok_timeout_ms);
        }
        self.session.install(mux, secure).state = SocketState::Opening;

        let result = self.open_on_modem(mux, host, port, secure, timeout_s.saturating_mul(1000));
        let socket = self.session.socket_mut(mux)?;
        socket.state = match result {
            Ok(()) => SocketState::Connected,
            Err(_) => SocketState::Disconnected,
        };
        debug!("socket {} open: {:?}", mux, result);
        result.map(|()| mux)
    }

    fn open_on_modem(
        &mut self,
        mux: u8,
        host: &str,
        port: u16,
        secure: bool,
        timeout_ms: u32,
    ) -> Result<(), Error> {
        let marker = if secure {
            if let Some(cert) = self.session.certificates[mux as usize].clone() {
                self.command_ok(
                    format_args!("+QSSLCFG=\"cacert\",{},\"{}\"", mux, cert),
                    self.config.ok_timeout_ms,
                )?;
            }
            self.channel.send_command(format_args!(
                "+QSSLOPEN=1,{},{},\"{}\",{},0",
                mux, mux, host, port
            ))?;
            "+QSSLOPEN:"
        } else {
            self.channel.send_command(format_args!(
                "+QIOPEN=1,{},\"TCP\",\"{}\",{},0,1",
                mux, host, port
            ))?;
            "+QIOPEN:"
        };
        // The immediate OK only acknowledges the request; a missing one is
        // tolerated, a rejection is not.
        if let Ok(1) = self
            .channel
            .wait(&[OK, ERROR], self.config.ok_timeout_ms, &mut self.session)
        {
            return Err(Error::ProtocolMismatch);
        }
        self.channel.wait(&[marker], timeout_ms, &mut self.session)?;

        if self.channel.read_int_until(b',')? != i32::from(mux) {
            warn!("open result for a different socket");
            return Err(Error::ProtocolMismatch);
        }
        match self.channel.read_int_until(b'\n')? {
            0 => Ok(()),
            code => {
                debug!("socket {} open refused: {}", mux, code);
                Err(Error::ProtocolMismatch)
            }
        }
    }

    /// Record the CA certificate name used by the next TLS open on `mux`.
    pub fn set_certificate(&mut self, mux: u8, name: &str) -> Result<(), Error> {
        let slot = self
            .session
            .certificates
            .get_mut(mux as usize)
            .ok_or(Error::InvalidArgument)?;
        *slot = Some(name.try_into().map_err(|_| Error::BufferOverflow)?);
        Ok(())
    }

    /// Send `data` on `mux`.
    ///
    /// Returns the number of bytes the modem accepted. Any failure (no prompt,
    /// no `SEND OK`) is an error and leaves the socket state untouched; the
    /// caller should treat the connection as unreliable.
    pub fn send(&mut self, mux: u8, data: &[u8]) -> Result<usize, Error> {
        let secure = self.session.socket(mux)?.secure;
        if data.is_empty() {
            return Ok(0);
        }
        if data.len() > MAX_SEND_SIZE {
            return Err(Error::InvalidArgument);
        }

        let len = data.len();
        if secure {
            self.channel.send_command(format_args!("+QSSLSEND={},{}", mux, len))?;
        } else {
            self.channel.send_command(format_args!("+QISEND={},{}", mux, len))?;
        }
        self.channel
            .wait(&[PROMPT, ERROR], self.config.prompt_timeout_ms, &mut self.session)
            .and_then(|i| if i == 0 { Ok(()) } else { Err(Error::ProtocolMismatch) })?;

        self.channel.write_raw(data)?;
        match self
            .channel
            .wait(&[SEND_OK, ERROR], self.config.send_timeout_ms, &mut self.session)?
        {
            0 => Ok(len),
            _ => Err(Error::ProtocolMismatch),
        }
    }

    /// Bytes that can be read from `mux` right now.
    ///
    /// This is the local FIFO plus the modem's last reported unread count. When
    /// both are empty and either a `recv` notification arrived or
    /// [`Config::poll_interval_ms`](super::Config::poll_interval_ms) has passed,
    /// the modem is queried; a failed or empty query also re-checks the
    /// connection, which is how silent remote closures are noticed.
    pub fn available(&mut self, mux: u8) -> usize {
        let now = self.channel.transport_mut().now_ms();
        let interval = u64::from(self.config.poll_interval_ms);
        let Ok(socket) = self.session.socket_mut(mux) else {
            return 0;
        };
        let due = socket
            .last_poll_ms
            .is_none_or(|last| now.saturating_sub(last) >= interval);
        if socket.rx.is_empty() && socket.pending == 0 && (socket.got_data || due) {
            socket.got_data = false;
            socket.last_poll_ms = Some(now);
            let secure = socket.secure;
            self.poll_pending(mux, secure);
        }
        let Ok(socket) = self.session.socket_mut(mux) else {
            return 0;
        };
        socket.last_available = socket.rx.len() + socket.pending;
        socket.last_available
    }

    fn poll_pending(&mut self, mux: u8, secure: bool) {
        let unread = self.query_unread(mux, secure);
        if let Ok(n) = unread {
            if n > 0 {
                debug!("{} bytes available on {}", n, mux);
            }
        }
        let count = unread.unwrap_or(0);
        let connected = if count == 0 {
            Some(self.query_connected(mux, secure))
        } else {
            None
        };
        if let Ok(socket) = self.session.socket_mut(mux) {
            socket.pending = count;
            match connected {
                Some(true) => socket.state = SocketState::Connected,
                Some(false) => socket.state = SocketState::Disconnected,
                None => {}
            }
        }
    }

    /// `+QIRD: <total>,<read>,<unread>`
    fn query_unread(&mut self, mux: u8, secure: bool) -> Result<usize, Error> {
        let marker = if secure {
            self.channel.send_command(format_args!("+QSSLRECV={},0", mux))?;
            "+QSSLRECV:"
        } else {
            self.channel.send_command(format_args!("+QIRD={},0", mux))?;
            "+QIRD:"
        };
        self.channel
            .wait(&[marker, ERROR], self.config.ok_timeout_ms, &mut self.session)
            .and_then(|i| if i == 0 { Ok(()) } else { Err(Error::ProtocolMismatch) })?;
        self.channel.skip_until(b',')?;
        self.channel.skip_until(b',')?;
        let unread = self.channel.read_int_until(b'\n')?;
        self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
        usize::try_from(unread).map_err(|_| Error::ProtocolMismatch)
    }

    fn query_connected(&mut self, mux: u8, secure: bool) -> bool {
        self.query_state(mux, secure).unwrap_or(false)
    }

    /// `+QISTATE: <mux>,"TCP",<ip>,<rport>,<lport>,<state>,...`
    fn query_state(&mut self, mux: u8, secure: bool) -> Result<bool, Error> {
        let marker = if secure {
            self.channel.send_command(format_args!("+QSSLSTATE=1,{}", mux))?;
            "+QSSLSTATE:"
        } else {
            self.channel.send_command(format_args!("+QISTATE=1,{}", mux))?;
            "+QISTATE:"
        };
        // An empty listing is a bare OK: nothing is open on that slot.
        let matched = self
            .channel
            .wait(&[marker, OK, ERROR], self.config.ok_timeout_ms, &mut self.session)?;
        if matched != 0 {
            return Ok(false);
        }
        for _ in 0..5 {
            self.channel.skip_until(b',')?;
        }
        let state = self.channel.read_int_until(b',')?;
        self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
        Ok(state == STATE_CONNECTED)
    }

    /// Move up to `buf.len()` received bytes from `mux` into `buf`.
    ///
    /// Bytes come from the local FIFO; when it is empty and the modem reported
    /// unread data, one fetch command refills it. A stall part-way through a
    /// fetch keeps what arrived.
    ///
    /// The bytes returned since the last [`available`](Self::available) call
    /// never exceed its result: data announced after it waits for the next
    /// call. An empty `buf` returns 0 without touching the modem.
    pub fn read(&mut self, mux: u8, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let Ok(socket) = self.session.socket(mux) else {
            return 0;
        };
        if socket.last_available == 0 {
            return 0;
        }
        if socket.rx.is_empty() && socket.pending > 0 {
            let wanted = socket
                .pending
                .min(socket.rx.capacity())
                .min(socket.last_available);
            let secure = socket.secure;
            if let Err(e) = self.fetch(mux, secure, wanted) {
                debug!("fetch on {} stopped: {}", mux, e);
            }
        }

        let Ok(socket) = self.session.socket_mut(mux) else {
            return 0;
        };
        let limit = buf.len().min(socket.last_available);
        let mut copied = 0;
        for slot in buf[..limit].iter_mut() {
            match socket.rx.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        socket.last_available -= copied;
        copied
    }

    /// `+QIRD=<mux>,<n>` → `+QIRD: <len>\r\n<len bytes>\r\nOK`
    fn fetch(&mut self, mux: u8, secure: bool, wanted: usize) -> Result<(), Error> {
        let marker = if secure {
            self.channel.send_command(format_args!("+QSSLRECV={},{}", mux, wanted))?;
            "+QSSLRECV:"
        } else {
            self.channel.send_command(format_args!("+QIRD={},{}", mux, wanted))?;
            "+QIRD:"
        };
        self.channel
            .wait(&[marker, ERROR], self.config.ok_timeout_ms, &mut self.session)
            .and_then(|i| if i == 0 { Ok(()) } else { Err(Error::ProtocolMismatch) })?;
        let announced = self.channel.read_int_until(b'\n')?;
        let announced = usize::try_from(announced)
            .map_err(|_| Error::ProtocolMismatch)?
            .min(wanted);

        let mut moved = 0;
        let mut outcome = Ok(());
        while moved < announced {
            match self.channel.read_byte(self.config.field_timeout_ms) {
                Ok(byte) => {
                    let socket = self.session.socket_mut(mux)?;
                    if socket.rx.push_back(byte).is_err() {
                        outcome = Err(Error::BufferOverflow);
                        break;
                    }
                    moved += 1;
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let socket = self.session.socket_mut(mux)?;
        socket.pending = socket.pending.saturating_sub(moved);
        if outcome.is_ok() {
            self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
        }
        outcome
    }

    /// Close `mux`.
    ///
    /// Buffered data is dropped and the slot always ends
    /// [`SocketState::Disconnected`]; the result reports whether the modem
    /// acknowledged the close within `timeout_ms`.
    pub fn close(&mut self, mux: u8, timeout_ms: u32) -> Result<(), Error> {
        let socket = self.session.socket_mut(mux)?;
        socket.rx.clear();
        socket.pending = 0;
        socket.last_available = 0;
        socket.got_data = false;
        socket.state = SocketState::Closing;
        let secure = socket.secure;

        let sent = if secure {
            self.channel.send_command(format_args!("+QSSLCLOSE={}", mux))
        } else {
            self.channel.send_command(format_args!("+QICLOSE={}", mux))
        };
        self.session.socket_mut(mux)?.state = SocketState::Disconnected;
        sent?;
        self.channel.wait_ok(timeout_ms, &mut self.session)
    }

    /// Whether `mux` is connected.
    ///
    /// Notifications already waiting on the transport are processed first, so
    /// a remote close that has been reported is always reflected.
    pub fn connected(&mut self, mux: u8) -> bool {
        self.maintain();
        self.session.socket(mux).is_ok_and(Socket::is_connected)
    }
}

