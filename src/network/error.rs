//! Common error types for network operations

use core::fmt;

/// A common error type for modem operations.
///
/// This enum defines the failures the driver can report. It is designed to be
/// simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No matching reply arrived within the time budget.
    Timeout,
    /// A reply arrived but carried a non-success status.
    ProtocolMismatch,
    /// Writing or flushing the transport failed.
    TransportFailure,
    /// The socket table entry was never opened.
    NotInitialized,
    /// An argument was out of range (index, topic count, payload size).
    InvalidArgument,
    /// A fixed-capacity buffer could not hold the data.
    BufferOverflow,
    /// A configuration document could not be parsed or was inconsistent.
    Config,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Timeout => "timed out waiting for modem reply",
            Error::ProtocolMismatch => "modem reported a failure status",
            Error::TransportFailure => "transport write failed",
            Error::NotInitialized => "socket was never opened",
            Error::InvalidArgument => "argument out of range",
            Error::BufferOverflow => "buffer capacity exceeded",
            Error::Config => "invalid configuration",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ProtocolMismatch => defmt::write!(f, "ProtocolMismatch"),
            Error::TransportFailure => defmt::write!(f, "TransportFailure"),
            Error::NotInitialized => defmt::write!(f, "NotInitialized"),
            Error::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            Error::Config => defmt::write!(f, "Config"),
        }
    }
}
