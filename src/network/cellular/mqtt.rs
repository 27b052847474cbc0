//! Native MQTT client of the modem.
//!
//! Besides raw sockets, the modem firmware carries its own MQTT 3.1.1 client.
//! This module drives it through the same command channel:
//!
//! 1. [`mqtt_open`](Modem::mqtt_open) opens the network connection to the broker
//! 2. [`mqtt_connect`](Modem::mqtt_connect) authenticates
//! 3. [`mqtt_subscribe`](Modem::mqtt_subscribe) / [`mqtt_publish`](Modem::mqtt_publish)
//!
//! Each step is acknowledged with `OK` and later completed by a result line
//! (`+QMTOPEN:`, `+QMTCONN:`, ...). The firmware may print progress lines with
//! the same prefix before the final one, so every step waits for its result up
//! to [`MAX_WAITS`](super::config::MAX_WAITS) times before giving up.
//!
//! Incoming publications arrive as `+QMTRECV:` lines. When one shows up while
//! another command is running it lands in a one-slot mailbox; a later message
//! overwrites an unread one. [`mqtt_receive`](Modem::mqtt_receive) drains the
//! mailbox first and otherwise listens briefly for a fresh message.
//!
//! # Examples
//!
//! ```rust,no_run
//! use libmodem::network::cellular::{Modem, mqtt::QoS};
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
//! modem.mqtt_open(0, "broker.example.com", 1883)?;
//! modem.mqtt_connect(0, "meter-01", "user", "secret")?;
//! modem.mqtt_subscribe(0, &["meter-01/cmd"], QoS::AtLeastOnce)?;
//!
//! if modem.mqtt_poll_connected(0) {
//!     modem.mqtt_publish(0, "meter-01/energy", b"{\"kwh\":12.5}")?;
//! }
//! if let Some(message) = modem.mqtt_receive() {
//!     // act on message.topic / message.payload
//! }
//! # Ok::<(), libmodem::network::error::Error>(())
//! ```

use super::channel::{CTRL_Z, ERROR, LINE_MAX, OK, parse_fields};
use super::config::Waits;
use super::urc::{AsyncResult, Message, QMTRECV, parse_message};
use super::Modem;
use crate::network::Transport;
use crate::network::error::Error;
use heapless::Vec;
use log::{debug, warn};

/// Number of MQTT client slots the modem offers.
pub const MQTT_CLIENT_COUNT: u8 = 6;

const QMTOPEN: &str = "+QMTOPEN:";
const QMTCONN: &str = "+QMTCONN:";
const QMTSUB: &str = "+QMTSUB:";
const QMTPUB: &str = "+QMTPUB:";
const PROMPT: &str = ">";

/// `+QMTCONN?` state code of a connected client.
const STATE_CONNECTED: i32 = 3;
/// Message id used for subscriptions.
const SUBSCRIBE_MSG_ID: u16 = 1;

/// Quality of Service levels for MQTT messages.
///
/// # Examples
///
/// ```rust
/// use libmodem::network::cellular::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::ExactlyOnce as u8, 2);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

/// How a result line answers the step that is waiting for it.
enum Verdict {
    /// Final answer.
    Done(Result<(), Error>),
    /// Progress line or a line for another client: keep waiting.
    Pending,
}

/// Judge `+QMTSUB:`/`+QMTPUB:` fields: `<mux>,<msgid>,<result>[,...]`.
fn ack_verdict(fields: &[i32]) -> Verdict {
    match fields.get(2) {
        Some(0) => Verdict::Done(Ok(())),
        // Retransmission in progress.
        Some(1) => Verdict::Pending,
        _ => Verdict::Done(Err(Error::ProtocolMismatch)),
    }
}

impl<T: Transport> Modem<T> {
    /// Open the network connection of MQTT client `mux` to `broker:port`.
    pub fn mqtt_open(&mut self, mux: u8, broker: &str, port: u16) -> Result<(), Error> {
        check_client(mux)?;
        self.command_ok(
            format_args!("+QMTOPEN={},\"{}\",{}", mux, broker, port),
            self.config.ok_timeout_ms,
        )?;
        let waits = self.config.mqtt_open_waits.clone();
        // +QMTOPEN: <mux>,<result>
        let result = self.mqtt_result(mux, QMTOPEN, &waits, |fields| match fields.get(1) {
            Some(0) => Verdict::Done(Ok(())),
            _ => Verdict::Done(Err(Error::ProtocolMismatch)),
        });
        debug!("MQTT {} open: {:?}", mux, result);
        result
    }

    /// Connect MQTT client `mux` to its broker.
    pub fn mqtt_connect(
        &mut self,
        mux: u8,
        client_id: &str,
        user: &str,
        password: &str,
    ) -> Result<(), Error> {
        check_client(mux)?;
        self.command_ok(
            format_args!(
                "+QMTCONN={},\"{}\",\"{}\",\"{}\"",
                mux, client_id, user, password
            ),
            self.config.mqtt_ack_timeout_ms,
        )?;
        let waits = self.config.mqtt_connect_waits.clone();
        // +QMTCONN: <mux>,<result>[,<ret_code>]
        let result = self.mqtt_result(mux, QMTCONN, &waits, |fields| {
            match (fields.get(1), fields.get(2)) {
                (Some(0), None | Some(0)) => Verdict::Done(Ok(())),
                (Some(1), _) => Verdict::Pending,
                _ => Verdict::Done(Err(Error::ProtocolMismatch)),
            }
        });
        debug!("MQTT {} connect: {:?}", mux, result);
        result
    }

    /// Subscribe client `mux` to one or two topic filters.
    pub fn mqtt_subscribe(&mut self, mux: u8, topics: &[&str], qos: QoS) -> Result<(), Error> {
        check_client(mux)?;
        let qos = qos as u8;
        match topics {
            [topic] => self.channel.send_command(format_args!(
                "+QMTSUB={},{},\"{}\",{}",
                mux, SUBSCRIBE_MSG_ID, topic, qos
            ))?,
            [first, second] => self.channel.send_command(format_args!(
                "+QMTSUB={},{},\"{}\",{},\"{}\",{}",
                mux, SUBSCRIBE_MSG_ID, first, qos, second, qos
            ))?,
            _ => return Err(Error::InvalidArgument),
        }
        self.channel
            .wait_ok(self.config.mqtt_ack_timeout_ms, &mut self.session)?;
        let waits = self.config.mqtt_subscribe_waits.clone();
        self.mqtt_result(mux, QMTSUB, &waits, ack_verdict)
    }

    /// Publish `payload` to `topic` with QoS 0.
    ///
    /// When the data prompt does not appear the pending request is aborted
    /// with `0x1A` and the step fails, whatever the abort's own outcome.
    pub fn mqtt_publish(&mut self, mux: u8, topic: &str, payload: &[u8]) -> Result<(), Error> {
        check_client(mux)?;
        if payload.contains(&CTRL_Z) {
            return Err(Error::InvalidArgument);
        }
        self.channel
            .send_command(format_args!("+QMTPUB={},0,0,0,\"{}\"", mux, topic))?;
        if self
            .channel
            .wait(&[PROMPT], self.config.mqtt_prompt_timeout_ms, &mut self.session)
            .is_err()
        {
            warn!("MQTT {} publish: no prompt, aborting", mux);
            self.channel.write_raw(&[CTRL_Z])?;
            self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
            return Err(Error::Timeout);
        }

        self.channel.write_raw(payload)?;
        self.channel.write_raw(&[CTRL_Z])?;
        self.channel.wait_ok(self.config.ok_timeout_ms, &mut self.session)?;
        let waits = self.config.mqtt_publish_waits.clone();
        self.mqtt_result(mux, QMTPUB, &waits, ack_verdict)
    }

    /// Ask the modem whether client `mux` is connected to its broker.
    ///
    /// The whole `+QMTCONN?` listing is consumed up to its final result, so
    /// the next command starts on a clean line.
    pub fn mqtt_poll_connected(&mut self, mux: u8) -> bool {
        if check_client(mux).is_err() {
            return false;
        }
        if self.channel.send_command(format_args!("+QMTCONN?")).is_err() {
            return false;
        }
        let waits = self.config.mqtt_state_waits.clone();
        let mut budget = waits.iter();
        let Some(mut timeout_ms) = budget.next().copied() else {
            return false;
        };
        let mut connected = false;
        // The listing has one line per open client and ends with OK or ERROR;
        // only a silent wait spends the budget.
        loop {
            match self
                .channel
                .wait(&[QMTCONN, OK, ERROR], timeout_ms, &mut self.session)
            {
                Ok(0) => {
                    // +QMTCONN: <mux>,<state>
                    if let Ok(fields) = self.read_fields() {
                        if fields.first() == Some(&i32::from(mux)) {
                            connected = fields.get(1) == Some(&STATE_CONNECTED);
                        }
                    }
                }
                Ok(_) => return connected,
                Err(_) => match budget.next() {
                    Some(next) => timeout_ms = *next,
                    None => {
                        debug!("MQTT {} state listing unterminated", mux);
                        return connected;
                    }
                },
            }
        }
    }

    /// Take the next incoming MQTT message.
    ///
    /// A message parked in the mailbox is returned first. Otherwise the modem
    /// is given [`Config::mqtt_receive_timeout_ms`](super::Config::mqtt_receive_timeout_ms)
    /// to deliver one.
    pub fn mqtt_receive(&mut self) -> Option<Message> {
        if let Some(message) = self.session.mailbox.take() {
            return Some(message);
        }
        self.channel
            .wait(&[QMTRECV], self.config.mqtt_receive_timeout_ms, &mut self.session)
            .ok()?;
        let mut line: Vec<u8, LINE_MAX> = Vec::new();
        self.channel.read_until(b'\n', &mut line).ok()?;
        let message = core::str::from_utf8(&line).ok().and_then(parse_message);
        if message.is_none() {
            warn!("malformed MQTT message dropped");
        }
        message
    }

    /// Take the last asynchronous session event (`+QMTSTAT`), if any.
    pub fn mqtt_take_async_result(&mut self) -> Option<AsyncResult> {
        self.session.async_result.take()
    }

    /// Wait for the result line of a step, tolerating progress lines and lines
    /// for other clients until `waits` runs out.
    fn mqtt_result(
        &mut self,
        mux: u8,
        marker: &str,
        waits: &Waits,
        judge: impl Fn(&[i32]) -> Verdict,
    ) -> Result<(), Error> {
        let mut last = Err(Error::Timeout);
        for timeout_ms in waits.iter() {
            if let Err(e) = self.channel.wait(&[marker], *timeout_ms, &mut self.session) {
                last = Err(e);
                continue;
            }
            let fields = match self.read_fields() {
                Ok(fields) => fields,
                Err(e) => {
                    last = Err(e);
                    continue;
                }
            };
            if fields.first() != Some(&i32::from(mux)) {
                continue;
            }
            match judge(&fields[..]) {
                Verdict::Done(result) => return result,
                Verdict::Pending => last = Err(Error::Timeout),
            }
        }
        last
    }

    fn read_fields(&mut self) -> Result<Vec<i32, 6>, Error> {
        let mut line: Vec<u8, 64> = Vec::new();
        self.channel.read_until(b'\n', &mut line)?;
        parse_fields(&line)
    }
}

fn check_client(mux: u8) -> Result<(), Error> {
    if mux < MQTT_CLIENT_COUNT {
        Ok(())
    } else {
        Err(Error::InvalidArgument)
    }
}
