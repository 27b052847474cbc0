//! AT-command cellular modem driver.
//!
//! This module turns a half-duplex serial link to a Quectel-style modem into
//! seven independent TCP/TLS sockets and a native MQTT session. Everything is
//! driven by one [`Modem`] value that owns the transport, the socket table and
//! the MQTT mailbox. Every operation takes `&mut self`, so at most one command
//! is ever outstanding on the link.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ Socket / MQTT│──▶│ Command Channel │──▶│  Transport   │
//! │     API      │   │   (execute)     │◀──│  (UART, ...) │
//! └──────────────┘   └─────────────────┘   └──────────────┘
//!        ▲                    │ unsolicited lines
//!        │                    ▼
//!        │           ┌─────────────────┐
//!        └───────────│ URC dispatcher  │──▶ socket table, mailbox
//!                    └─────────────────┘
//! ```
//!
//! Unsolicited result codes (URCs) that arrive while a command is waiting for
//! its reply are classified on the spot and applied to the socket table or the
//! mailbox; the wait then continues. There is no background task: call
//! [`Modem::maintain`] from the application loop to pick up notifications that
//! arrive between commands.
//!
//! # Example
//!
//! ```rust,no_run
//! use libmodem::network::cellular::Modem;
//! # use libmodem::network::{Clock, Read, Transport, Write};
//! # struct Uart;
//! # impl Read for Uart {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for Uart {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Clock for Uart {
//! #     fn now_ms(&mut self) -> u64 { 0 }
//! # }
//! # impl Transport for Uart {}
//!
//! let mut modem = Modem::new(Uart);
//! let mux = modem.open(0, "10.0.0.1", 1883, false, 75)?;
//! modem.send(mux, b"PING")?;
//!
//! let mut buf = [0u8; 64];
//! if modem.available(mux) > 0 {
//!     let n = modem.read(mux, &mut buf);
//!     // handle &buf[..n]
//! }
//! modem.close(mux, 15_000)?;
//! # Ok::<(), libmodem::network::error::Error>(())
//! ```

/// Command/response channel over the transport.
pub mod channel;

/// Timeouts and retry budgets.
pub mod config;

/// Modem management: power, SIM, registration, packet data.
pub mod info;

/// Native MQTT client of the modem.
pub mod mqtt;

/// Multiplexed TCP/TLS sockets.
pub mod socket;

/// Unsolicited result code classification and dispatch.
pub mod urc;

pub use channel::Channel;
pub use config::Config;
pub use info::{ModemInfo, RegistrationStatus, SimStatus};
pub use socket::{MUX_COUNT, Socket, SocketState};
pub use urc::{AsyncResult, Message, Urc};

use crate::network::Transport;
use crate::network::error::Error;
use heapless::String;

/// Longest certificate name accepted by [`Modem::set_certificate`].
pub const CERT_NAME_MAX: usize = 32;

/// State mutated by the URC dispatcher and the socket/MQTT operations.
#[derive(Debug)]
pub struct Session {
    pub(crate) sockets: [Option<Socket>; MUX_COUNT],
    pub(crate) certificates: [Option<String<CERT_NAME_MAX>>; MUX_COUNT],
    pub(crate) mailbox: Option<Message>,
    pub(crate) async_result: Option<AsyncResult>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An empty socket table and mailbox.
    pub fn new() -> Self {
        Self {
            sockets: core::array::from_fn(|_| None),
            certificates: core::array::from_fn(|_| None),
            mailbox: None,
            async_result: None,
        }
    }

    /// Put a fresh socket in slot `mux`, replacing any earlier occupant.
    pub(crate) fn install(&mut self, mux: u8, secure: bool) -> &mut Socket {
        self.sockets[mux as usize].insert(Socket::new(mux, secure))
    }

    /// Drop every slot's received data and mark all sockets disconnected.
    pub(crate) fn reset_sockets(&mut self) {
        for socket in self.sockets.iter_mut().flatten() {
            socket.rx.clear();
            socket.pending = 0;
            socket.last_available = 0;
            socket.got_data = false;
            socket.state = SocketState::Disconnected;
        }
    }

    pub(crate) fn socket(&self, mux: u8) -> Result<&Socket, Error> {
        self.sockets
            .get(mux as usize)
            .ok_or(Error::InvalidArgument)?
            .as_ref()
            .ok_or(Error::NotInitialized)
    }

    pub(crate) fn socket_mut(&mut self, mux: u8) -> Result<&mut Socket, Error> {
        self.sockets
            .get_mut(mux as usize)
            .ok_or(Error::InvalidArgument)?
            .as_mut()
            .ok_or(Error::NotInitialized)
    }
}

/// Driver for one modem on one transport.
#[derive(Debug)]
pub struct Modem<T: Transport> {
    pub(crate) channel: Channel<T>,
    pub(crate) session: Session,
    pub(crate) config: Config,
}

impl<T: Transport> Modem<T> {
    /// Create a driver with the default [`Config`].
    pub fn new(transport: T) -> Self {
        let config = Config::default();
        Self {
            channel: Channel::new(transport, config.field_timeout_ms),
            session: Session::new(),
            config,
        }
    }

    /// Create a driver with a custom configuration.
    pub fn with_config(transport: T, config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            channel: Channel::new(transport, config.field_timeout_ms),
            session: Session::new(),
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: Config) -> Result<(), Error> {
        config.validate()?;
        self.channel.set_field_timeout(config.field_timeout_ms);
        self.config = config;
        Ok(())
    }

    /// The command channel, for commands this driver does not wrap.
    pub fn channel(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    /// Socket table entry `mux`, if it was ever opened.
    pub fn socket(&self, mux: u8) -> Option<&Socket> {
        self.session.socket(mux).ok()
    }

    /// Release the transport.
    pub fn release(self) -> T {
        self.channel.into_inner()
    }

    /// Send a command whose only reply is `OK`/`ERROR`.
    pub fn command_ok(&mut self, args: core::fmt::Arguments<'_>, timeout_ms: u32) -> Result<(), Error> {
        self.channel.send_command(args)?;
        self.channel.wait_ok(timeout_ms, &mut self.session)
    }

    /// Process URCs that are already waiting on the transport.
    ///
    /// Listens for [`Config::maintain_timeout_ms`] without sending anything.
    pub fn maintain(&mut self) {
        let _ = self
            .channel
            .wait(&[], self.config.maintain_timeout_ms, &mut self.session);
    }
}
