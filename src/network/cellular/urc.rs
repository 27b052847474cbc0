//! Unsolicited result code (URC) classification and dispatch.
//!
//! The modem may report socket data, remote closures and MQTT traffic at any
//! moment, including in the middle of a reply to an unrelated command. The
//! [`Channel`](super::channel::Channel) notices such lines by their prefix,
//! hands the complete line to [`classify`], and passes the result to a
//! [`UrcHandler`]. The handler only updates in-memory state; it never talks
//! to the modem.
//!
//! # Recognized lines
//!
//! ```text
//! +QIURC: "recv",<mux>,<len>        data arrived on a plain socket
//! +QIURC: "closed",<mux>            plain socket closed by the peer
//! +QSSLURC: "recv",<mux>,<len>      same, for TLS sockets
//! +QSSLURC: "closed",<mux>
//! +QMTRECV: <mux>,<msgid>,"<topic>","<payload>"
//! +QMTSTAT: <mux>,<code>            asynchronous MQTT session event
//! ```
//!
//! # Examples
//!
//! ```rust
//! use libmodem::network::cellular::urc::{classify, Urc};
//!
//! assert_eq!(
//!     classify("+QIURC: \"recv\",3,128\r\n"),
//!     Urc::DataArrived { mux: 3, len: 128 }
//! );
//! assert_eq!(classify("+QIURC: \"closed\",2"), Urc::Closed { mux: 2 });
//! assert_eq!(classify("RING"), Urc::Unknown);
//! ```

use super::{MUX_COUNT, Session, SocketState};
use heapless::{String, Vec};
use log::{debug, warn};

/// Longest topic kept from an incoming MQTT message.
pub const TOPIC_MAX: usize = 128;
/// Largest MQTT payload kept in the mailbox.
pub const PAYLOAD_MAX: usize = 512;

pub(crate) const QIURC: &str = "+QIURC:";
pub(crate) const QSSLURC: &str = "+QSSLURC:";
pub(crate) const QMTRECV: &str = "+QMTRECV:";
pub(crate) const QMTSTAT: &str = "+QMTSTAT:";

/// Line prefixes the channel treats as unsolicited.
pub const URC_PREFIXES: [&str; 4] = [QIURC, QSSLURC, QMTRECV, QMTSTAT];

/// An MQTT message delivered by the modem's native client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client index the message arrived on.
    pub mux: u8,
    /// Topic the message was published to.
    pub topic: String<TOPIC_MAX>,
    /// Message body, with surrounding quotes removed.
    pub payload: Vec<u8, PAYLOAD_MAX>,
}

/// Result code of an asynchronous MQTT session event (`+QMTSTAT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncResult {
    /// Client index the event refers to.
    pub mux: u8,
    /// Modem-specific status code.
    pub code: i32,
}

/// Classification of one unsolicited line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urc {
    /// `len` unread bytes are waiting on socket `mux`.
    DataArrived {
        /// Socket index.
        mux: u8,
        /// Unread byte count reported by the modem.
        len: usize,
    },
    /// The peer closed socket `mux`.
    Closed {
        /// Socket index.
        mux: u8,
    },
    /// An MQTT message arrived while nobody was waiting for it.
    MqttMessage(Message),
    /// The MQTT session reported an event.
    MqttAsyncResult(AsyncResult),
    /// Anything else. Dropped after logging.
    Unknown,
}

/// Receiver of classified URCs.
///
/// Implementations must only touch in-memory state: the channel is in the
/// middle of a command exchange when it calls [`handle`](Self::handle).
pub trait UrcHandler {
    /// Apply one notification.
    fn handle(&mut self, urc: Urc);
}

/// Discards every notification.
impl UrcHandler for () {
    fn handle(&mut self, _urc: Urc) {}
}

/// Classify a complete unsolicited line (trailing `\r\n` optional).
pub fn classify(line: &str) -> Urc {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(QIURC) {
        socket_event(rest)
    } else if let Some(rest) = line.strip_prefix(QSSLURC) {
        socket_event(rest)
    } else if let Some(rest) = line.strip_prefix(QMTRECV) {
        parse_message(rest).map_or(Urc::Unknown, Urc::MqttMessage)
    } else if let Some(rest) = line.strip_prefix(QMTSTAT) {
        parse_async_result(rest).map_or(Urc::Unknown, Urc::MqttAsyncResult)
    } else {
        Urc::Unknown
    }
}

fn socket_event(rest: &str) -> Urc {
    let mut fields = rest.trim().split(',');
    let kind = fields.next().map(|k| k.trim().trim_matches('"'));
    let Some(mux) = fields.next().and_then(parse_mux) else {
        return Urc::Unknown;
    };
    match kind {
        Some("recv") => match fields.next().and_then(|f| f.trim().parse::<usize>().ok()) {
            Some(len) => Urc::DataArrived { mux, len },
            None => Urc::Unknown,
        },
        Some("closed") => Urc::Closed { mux },
        _ => Urc::Unknown,
    }
}

fn parse_mux(field: &str) -> Option<u8> {
    field
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|m| (*m as usize) < MUX_COUNT)
}

/// Parse the text following `+QMTRECV:`.
pub(crate) fn parse_message(rest: &str) -> Option<Message> {
    let (mux, rest) = rest.trim_start().split_once(',')?;
    let mux = mux.trim().parse::<u8>().ok()?;
    let (_msg_id, rest) = rest.split_once(',')?;

    let rest = rest.trim_start();
    let (topic, payload) = match rest.strip_prefix('"') {
        Some(quoted) => {
            let (topic, after) = quoted.split_once('"')?;
            (topic, after.strip_prefix(',')?)
        }
        None => rest.split_once(',')?,
    };

    let payload = unquote(payload.trim());
    Some(Message {
        mux,
        topic: String::try_from(topic).ok()?,
        payload: Vec::from_slice(payload.as_bytes()).ok()?,
    })
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

fn parse_async_result(rest: &str) -> Option<AsyncResult> {
    let (mux, code) = rest.trim().split_once(',')?;
    Some(AsyncResult {
        mux: mux.trim().parse().ok()?,
        code: code.trim().parse().ok()?,
    })
}

impl UrcHandler for Session {
    fn handle(&mut self, urc: Urc) {
        match urc {
            Urc::DataArrived { mux, len } => {
                debug!("URC recv: {} bytes on {}", len, mux);
                if let Some(socket) = self.sockets[mux as usize].as_mut() {
                    socket.got_data = true;
                    socket.pending = len;
                }
            }
            Urc::Closed { mux } => {
                debug!("URC closed: {}", mux);
                if let Some(socket) = self.sockets[mux as usize].as_mut() {
                    socket.state = SocketState::Disconnected;
                }
            }
            Urc::MqttMessage(message) => {
                if self.mailbox.is_some() {
                    warn!("mailbox overwritten, earlier MQTT message lost");
                }
                debug!("URC MQTT message on {} ({} bytes)", message.mux, message.payload.len());
                self.mailbox = Some(message);
            }
            Urc::MqttAsyncResult(result) => {
                debug!("URC MQTT status {} on {}", result.code, result.mux);
                self.async_result = Some(result);
            }
            Urc::Unknown => warn!("unhandled URC discarded"),
        }
    }
}
