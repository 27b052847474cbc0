//! # libmodem - cellular modem driver
//!
//! A `no_std` driver for Quectel-style cellular modems that speak AT commands
//! over a serial link. One half-duplex byte stream is turned into seven
//! independent TCP/TLS sockets and a session with the modem's built-in MQTT
//! client.
//!
//! ## Features
//!
//! ### Sockets
//! - Up to seven concurrent connections, plain or TLS
//! - Local receive FIFO per socket, filled on demand
//! - Data-arrival and peer-close notifications applied as they are seen
//!
//! ### MQTT
//! - Broker open, connect, subscribe and publish on the modem's own client
//! - Incoming messages parked in a one-slot mailbox
//!
//! ### Modem management
//! - Init, restart and power-off
//! - SIM, registration, provider and packet-data context
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libmodem = "0.1.0"
//! ```
//!
//! Implement [`network::Transport`] for your UART and hand it to
//! [`network::cellular::Modem`]:
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
//! modem.init(None)?;
//! modem.gprs_connect(Some("internet"))?;
//!
//! let mux = modem.open(1, "example.com", 80, false, 75)?;
//! modem.send(mux, b"GET / HTTP/1.0\r\n\r\n")?;
//! # Ok::<(), libmodem::network::error::Error>(())
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux hosts driving a modem over USB serial
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt formatting of driver types for embedded debugging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade; install
//! any logger to see them.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://shishir-dey.github.io/libiot/")]

/// Transport traits and the cellular modem driver built on them.
///
/// This module contains the byte-stream abstraction the driver talks through,
/// the driver's error type, and the driver itself.
pub mod network;
