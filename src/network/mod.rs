//! A network abstraction layer for embedded systems
//!
//! This module provides the byte-stream traits the cellular driver is built on,
//! together with the driver itself. A transport is anything that can move bytes
//! in both directions and tell the time: a UART, a USB CDC endpoint, or a
//! scripted mock in tests.
//!

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// AT-command cellular modem driver: sockets, URCs and native MQTT.
pub mod cellular;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Clock, Read, Transport, Write};
}

/// Non-blocking byte source.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read whatever is buffered into `buf`.
    ///
    /// Returns `Ok(0)` when no byte is available yet; callers poll again
    /// until their own deadline passes.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Byte sink.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the link
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Monotonic millisecond clock used to enforce timeouts.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now_ms(&mut self) -> u64;
}

/// A duplex serial link to the modem.
pub trait Transport: Read + Write + Clock {}
