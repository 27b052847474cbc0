use libmodem::network::cellular::{Config, Modem};
use libmodem::network::error::Error;
use libmodem::network::{Clock, Read, Transport, Write};
use std::collections::VecDeque;

/// Simulated milliseconds that pass on every read that finds nothing.
const IDLE_TICK_MS: u64 = 5;

/// Scripted modem.
///
/// Each script entry is released into the receive queue once the bytes
/// written since the previous release contain its trigger. Time only moves
/// while the driver polls an empty queue, so timeouts are deterministic.
#[derive(Debug, Default)]
pub struct MockModem {
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
    rx: VecDeque<u8>,
    written: Vec<u8>,
    cursor: usize,
    now: u64,
    pub is_open: bool,
}

impl MockModem {
    pub fn new() -> Self {
        Self {
            is_open: true,
            ..Default::default()
        }
    }

    /// Queue `reply` to be sent once `trigger` has been written.
    pub fn expect(&mut self, trigger: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) -> &mut Self {
        self.script
            .push_back((trigger.as_ref().to_vec(), reply.as_ref().to_vec()));
        self
    }

    /// Make bytes available immediately, as if the modem had sent them unasked.
    pub fn push_rx(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.rx.extend(data.as_ref());
        self
    }

    /// Everything the driver wrote so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Script entries that never fired.
    pub fn unused(&self) -> usize {
        self.script.len()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    fn release(&mut self) {
        while let Some((trigger, _)) = self.script.front() {
            let window = &self.written[self.cursor..];
            let Some(at) = window
                .windows(trigger.len())
                .position(|w| w == trigger.as_slice())
            else {
                break;
            };
            self.cursor += at + trigger.len();
            if let Some((_, reply)) = self.script.pop_front() {
                self.rx.extend(reply);
            }
        }
    }
}

impl Read for MockModem {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.is_open {
            return Err(Error::TransportFailure);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        if n == 0 {
            self.now += IDLE_TICK_MS;
        }
        Ok(n)
    }
}

impl Write for MockModem {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if !self.is_open {
            return Err(Error::TransportFailure);
        }
        self.written.extend_from_slice(buf);
        self.release();
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if !self.is_open {
            return Err(Error::TransportFailure);
        }
        Ok(())
    }
}

impl Clock for MockModem {
    fn now_ms(&mut self) -> u64 {
        self.now
    }
}

impl Transport for MockModem {}

/// Short timeouts so failing waits finish quickly.
pub fn fast_config() -> Config {
    Config::from_json(
        r#"{
            "field_timeout_ms": 200,
            "ok_timeout_ms": 200,
            "poll_interval_ms": 500,
            "prompt_timeout_ms": 200,
            "send_timeout_ms": 200,
            "mqtt_ack_timeout_ms": 200,
            "mqtt_open_waits": [500, 500, 500],
            "mqtt_connect_waits": [500, 500, 500],
            "mqtt_subscribe_waits": [500],
            "mqtt_state_waits": [300, 300, 300],
            "mqtt_publish_waits": [500]
        }"#,
    )
    .unwrap()
}

pub fn modem() -> Modem<MockModem> {
    Modem::with_config(MockModem::new(), fast_config()).unwrap()
}

/// Script a successful plain open of `mux` and run it.
pub fn open_plain(modem: &mut Modem<MockModem>, mux: u8) {
    modem.channel().transport_mut().expect(
        format!("AT+QIOPEN=1,{},", mux),
        format!("\r\nOK\r\n\r\n+QIOPEN: {},0\r\n", mux),
    );
    assert_eq!(modem.open(mux, "10.0.0.1", 1883, false, 5), Ok(mux));
}

/// Script a successful TLS open of `mux`, without a certificate, and run it.
pub fn open_secure(modem: &mut Modem<MockModem>, mux: u8) {
    modem.channel().transport_mut().expect(
        format!("AT+QSSLOPEN=1,{},{},", mux, mux),
        format!("\r\nOK\r\n\r\n+QSSLOPEN: {},0\r\n", mux),
    );
    assert_eq!(modem.open(mux, "example.com", 443, true, 5), Ok(mux));
}
