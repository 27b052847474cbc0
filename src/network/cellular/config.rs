//! Driver timing configuration.
//!
//! Every wait the driver performs is bounded by a value from [`Config`]. The
//! defaults match what the modem firmware needs in the field; tests usually
//! shrink them. A configuration can be embedded as JSON and parsed without
//! allocation:
//!
//! ```rust
//! use libmodem::network::cellular::Config;
//!
//! let config = Config::from_json(r#"{"poll_interval_ms":250,"mqtt_open_waits":[5000]}"#).unwrap();
//! assert_eq!(config.poll_interval_ms, 250);
//! assert_eq!(&config.mqtt_open_waits[..], &[5000]);
//! // Fields that are not mentioned keep their defaults.
//! assert_eq!(config.ok_timeout_ms, Config::default().ok_timeout_ms);
//! ```

use crate::network::error::Error;
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Maximum number of consecutive waits an MQTT step may spend on its marker.
pub const MAX_WAITS: usize = 3;

/// Per-attempt timeouts, in milliseconds, for a step that tolerates
/// repeated waits.
pub type Waits = Vec<u32, MAX_WAITS>;

fn waits(list: &[u32]) -> Waits {
    list.iter().take(MAX_WAITS).copied().collect()
}

/// Timeouts and retry budgets used by [`Modem`](super::Modem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Budget for reading a single reply field after its marker matched.
    pub field_timeout_ms: u32,
    /// Budget for a plain `OK`/`ERROR` final result.
    pub ok_timeout_ms: u32,
    /// Minimum time between two unsolicited pending-data queries per socket.
    pub poll_interval_ms: u32,
    /// How long [`Modem::maintain`](super::Modem::maintain) listens for URCs.
    pub maintain_timeout_ms: u32,
    /// Budget for the `>` data prompt of a socket send.
    pub prompt_timeout_ms: u32,
    /// Budget for `SEND OK` after a socket payload was written.
    pub send_timeout_ms: u32,
    /// Budget for the `OK` that acknowledges an MQTT connect or subscribe.
    pub mqtt_ack_timeout_ms: u32,
    /// Waits for `+QMTOPEN:`.
    pub mqtt_open_waits: Waits,
    /// Waits for `+QMTCONN:` after a connect request.
    pub mqtt_connect_waits: Waits,
    /// Waits for `+QMTSUB:`.
    pub mqtt_subscribe_waits: Waits,
    /// Waits for `+QMTCONN:` when polling the session state.
    pub mqtt_state_waits: Waits,
    /// Waits for `+QMTPUB:`.
    pub mqtt_publish_waits: Waits,
    /// Budget for the `>` prompt of an MQTT publish.
    pub mqtt_prompt_timeout_ms: u32,
    /// Budget for a direct `+QMTRECV:` wait when the mailbox is empty.
    pub mqtt_receive_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            field_timeout_ms: 1_000,
            ok_timeout_ms: 1_000,
            poll_interval_ms: 500,
            maintain_timeout_ms: 10,
            prompt_timeout_ms: 1_000,
            send_timeout_ms: 1_000,
            mqtt_ack_timeout_ms: 2_000,
            mqtt_open_waits: waits(&[30_000, 30_000, 150_000]),
            mqtt_connect_waits: waits(&[10_000, 10_000, 30_000]),
            mqtt_subscribe_waits: waits(&[40_000]),
            mqtt_state_waits: waits(&[4_000, 4_000, 4_000]),
            mqtt_publish_waits: waits(&[1_000]),
            mqtt_prompt_timeout_ms: 300,
            mqtt_receive_timeout_ms: 300,
        }
    }
}

impl Config {
    /// Parse a JSON document; absent fields keep their default values.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let (config, _): (Config, _) =
            serde_json_core::from_str(json).map_err(|_| Error::Config)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every retrying step has at least one wait.
    pub fn validate(&self) -> Result<(), Error> {
        let all = [
            &self.mqtt_open_waits,
            &self.mqtt_connect_waits,
            &self.mqtt_subscribe_waits,
            &self.mqtt_state_waits,
            &self.mqtt_publish_waits,
        ];
        if all.iter().any(|w| w.is_empty()) {
            return Err(Error::Config);
        }
        Ok(())
    }
}
