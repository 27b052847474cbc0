//! Modem management: liveness, power, SIM, network registration and the
//! packet-data context.
//!
//! These are plain command exchanges with no socket state of their own,
//! except that a restart or power-off marks every socket disconnected.

use super::channel::ERROR;
use super::Modem;
use crate::network::error::Error;
use crate::network::Transport;
use heapless::{String, Vec};
use log::{debug, info, warn};
use serde::Serialize;

/// Longest provider name kept by [`Modem::provider`].
pub const PROVIDER_MAX: usize = 32;
/// Longest ICCID kept by [`Modem::sim_ccid`].
pub const CCID_MAX: usize = 24;

const AT_RETRY_MS: u32 = 100;
const SIM_RETRY_MS: u32 = 1_000;
const SIM_TIMEOUT_MS: u32 = 10_000;
const TIME_ZONE_TIMEOUT_MS: u32 = 10_000;
const READY_TIMEOUT_MS: u32 = 10_000;
const POWER_DOWN_TIMEOUT_MS: u32 = 300;
const FUNCTIONALITY_TIMEOUT_MS: u32 = 15_500;
const CONTEXT_ACTIVATE_TIMEOUT_MS: u32 = 150_000;
const ATTACH_TIMEOUT_MS: u32 = 60_000;
const CONTEXT_DEACTIVATE_TIMEOUT_MS: u32 = 40_000;

/// Network registration state reported by `+CEREG?`/`+CREG?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationStatus {
    /// The modem gave no usable answer.
    NoResult,
    /// Not registered and not searching.
    Unregistered,
    /// Registered on the home network.
    Home,
    /// Searching for an operator.
    Searching,
    /// Registration denied.
    Denied,
    /// Unknown state.
    Unknown,
    /// Registered while roaming.
    Roaming,
}

impl From<i32> for RegistrationStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Unregistered,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::Roaming,
            -1 => Self::NoResult,
            _ => Self::Unknown,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RegistrationStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            RegistrationStatus::NoResult => defmt::write!(f, "NoResult"),
            RegistrationStatus::Unregistered => defmt::write!(f, "Unregistered"),
            RegistrationStatus::Home => defmt::write!(f, "Home"),
            RegistrationStatus::Searching => defmt::write!(f, "Searching"),
            RegistrationStatus::Denied => defmt::write!(f, "Denied"),
            RegistrationStatus::Unknown => defmt::write!(f, "Unknown"),
            RegistrationStatus::Roaming => defmt::write!(f, "Roaming"),
        }
    }
}

/// SIM card state reported by `+CPIN?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimStatus {
    /// Missing, not ready, or no answer.
    Error,
    /// Ready for use.
    Ready,
    /// Waiting for a PIN or PUK.
    Locked,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SimStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SimStatus::Error => defmt::write!(f, "Error"),
            SimStatus::Ready => defmt::write!(f, "Ready"),
            SimStatus::Locked => defmt::write!(f, "Locked"),
        }
    }
}

/// Snapshot of the modem's identity and network state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModemInfo {
    /// Service provider name.
    pub provider: String<PROVIDER_MAX>,
    /// SIM card ICCID.
    pub ccid: String<CCID_MAX>,
    /// LTE registration state.
    pub registration: RegistrationStatus,
}

impl<T: Transport> Modem<T> {
    /// Repeat `AT` until the modem answers `OK` or `timeout_ms` passes.
    pub fn test_at(&mut self, timeout_ms: u32) -> Result<(), Error> {
        let start = self.now_ms();
        loop {
            if self.command_ok(format_args!(""), AT_RETRY_MS).is_ok() {
                return Ok(());
            }
            if self.now_ms().saturating_sub(start) >= u64::from(timeout_ms) {
                return Err(Error::Timeout);
            }
        }
    }

    /// Bring the modem into a known state and check the SIM.
    ///
    /// A locked SIM is unlocked with `pin` when one is given. Without a pin a
    /// locked SIM is accepted as is.
    pub fn init(&mut self, pin: Option<&str>) -> Result<SimStatus, Error> {
        self.test_at(SIM_TIMEOUT_MS)?;
        self.command_ok(format_args!("E0"), self.config.ok_timeout_ms)?;
        let _ = self.command_ok(format_args!("+CMEE=0"), self.config.ok_timeout_ms);
        self.command_ok(format_args!("+CTZR=0"), TIME_ZONE_TIMEOUT_MS)?;
        self.command_ok(format_args!("+CTZU=1"), TIME_ZONE_TIMEOUT_MS)?;

        let status = self.sim_status(SIM_TIMEOUT_MS);
        match (status, pin) {
            (SimStatus::Ready, _) => Ok(status),
            (_, Some(pin)) if !pin.is_empty() => {
                self.sim_unlock(pin)?;
                match self.sim_status(SIM_TIMEOUT_MS) {
                    SimStatus::Ready => Ok(SimStatus::Ready),
                    _ => Err(Error::ProtocolMismatch),
                }
            }
            (SimStatus::Locked, _) => Ok(status),
            _ => Err(Error::NotInitialized),
        }
    }

    /// Reboot the modem and run [`init`](Self::init) again.
    pub fn restart(&mut self, pin: Option<&str>) -> Result<SimStatus, Error> {
        self.test_at(SIM_TIMEOUT_MS)?;
        self.set_phone_functionality(1, true)?;
        self.session.reset_sockets();
        if self
            .channel
            .wait(&["APP RDY"], READY_TIMEOUT_MS, &mut self.session)
            .is_err()
        {
            debug!("no APP RDY after restart");
        }
        info!("modem restarted");
        self.init(pin)
    }

    /// Power the modem down.
    pub fn power_off(&mut self) -> Result<(), Error> {
        self.channel.send_command(format_args!("+QPOWD=1"))?;
        self.session.reset_sockets();
        self.channel.drain(POWER_DOWN_TIMEOUT_MS, &mut self.session);
        self.channel
            .wait(&["POWERED DOWN"], POWER_DOWN_TIMEOUT_MS, &mut self.session)?;
        info!("modem powered down");
        Ok(())
    }

    /// Allow or forbid the modem to enter sleep mode.
    pub fn sleep_enable(&mut self, enable: bool) -> Result<(), Error> {
        self.command_ok(
            format_args!("+QSCLK={}", u8::from(enable)),
            self.config.ok_timeout_ms,
        )
    }

    /// Set the phone functionality level (`+CFUN`), optionally resetting.
    pub fn set_phone_functionality(&mut self, fun: u8, reset: bool) -> Result<(), Error> {
        let suffix = if reset { ",1" } else { "" };
        self.command_ok(
            format_args!("+CFUN={}{}", fun, suffix),
            FUNCTIONALITY_TIMEOUT_MS,
        )
    }

    /// Query the SIM card, retrying once a second for up to `timeout_ms`.
    pub fn sim_status(&mut self, timeout_ms: u32) -> SimStatus {
        let start = self.now_ms();
        loop {
            // "NOT READY" goes before "READY": both match on the same byte.
            let reply = self.channel.execute(
                format_args!("+CPIN?"),
                &["NOT READY", "NOT INSERTED", "READY", "SIM PIN", "SIM PUK", ERROR],
                SIM_RETRY_MS,
                &mut self.session,
            );
            let status = match reply {
                Ok(2) => Some(SimStatus::Ready),
                Ok(3 | 4) => Some(SimStatus::Locked),
                _ => None,
            };
            if let Some(status) = status {
                self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
                return status;
            }
            if self.now_ms().saturating_sub(start) >= u64::from(timeout_ms) {
                warn!("SIM not ready");
                return SimStatus::Error;
            }
        }
    }

    /// Enter the SIM PIN.
    pub fn sim_unlock(&mut self, pin: &str) -> Result<(), Error> {
        self.command_ok(format_args!("+CPIN=\"{}\"", pin), self.config.ok_timeout_ms)
    }

    /// LTE registration state (`+CEREG?`).
    pub fn registration_status(&mut self) -> RegistrationStatus {
        self.query_registration(format_args!("+CEREG?"), "+CEREG:")
    }

    /// 2G registration state (`+CREG?`).
    pub fn registration_status_2g(&mut self) -> RegistrationStatus {
        self.query_registration(format_args!("+CREG?"), "+CREG:")
    }

    /// Whether the modem is registered, at home or roaming.
    pub fn is_network_connected(&mut self) -> bool {
        matches!(
            self.registration_status(),
            RegistrationStatus::Home | RegistrationStatus::Roaming
        )
    }

    /// Name of the service provider (`+QSPN?`).
    pub fn provider(&mut self) -> Result<String<PROVIDER_MAX>, Error> {
        self.expect_marker(format_args!("+QSPN?"), "+QSPN:")?;
        // +QSPN: "<full name>","<short name>",...
        self.channel.skip_until(b'"')?;
        let mut name: Vec<u8, PROVIDER_MAX> = Vec::new();
        let read = self.channel.read_until(b'"', &mut name);
        self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
        read?;
        String::from_utf8(name).map_err(|_| Error::ProtocolMismatch)
    }

    /// ICCID of the SIM card (`+QCCID`).
    pub fn sim_ccid(&mut self) -> Result<String<CCID_MAX>, Error> {
        self.expect_marker(format_args!("+QCCID"), "+QCCID:")?;
        let mut line: Vec<u8, CCID_MAX> = Vec::new();
        let read = self.channel.read_until(b'\n', &mut line);
        self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
        read?;
        let text = core::str::from_utf8(&line).map_err(|_| Error::ProtocolMismatch)?;
        text.trim().try_into().map_err(|_| Error::BufferOverflow)
    }

    /// Activate the packet-data context, defining it first when `apn` is given.
    pub fn gprs_connect(&mut self, apn: Option<&str>) -> Result<(), Error> {
        let _ = self.gprs_disconnect();
        if let Some(apn) = apn {
            self.command_ok(
                format_args!("+CGDCONT=1,\"IPV4V6\",\"{}\"", apn),
                self.config.ok_timeout_ms,
            )?;
        }
        self.command_ok(format_args!("+CGACT=1,1"), CONTEXT_ACTIVATE_TIMEOUT_MS)?;
        self.command_ok(format_args!("+CGPADDR=1"), ATTACH_TIMEOUT_MS)?;
        self.command_ok(format_args!("+CGATT=1"), ATTACH_TIMEOUT_MS)?;
        info!("packet data context active");
        Ok(())
    }

    /// Deactivate the packet-data context.
    pub fn gprs_disconnect(&mut self) -> Result<(), Error> {
        self.command_ok(format_args!("+CGACT=0"), CONTEXT_DEACTIVATE_TIMEOUT_MS)
    }

    /// Collect provider, ICCID and registration state.
    pub fn info(&mut self) -> Result<ModemInfo, Error> {
        Ok(ModemInfo {
            provider: self.provider()?,
            ccid: self.sim_ccid()?,
            registration: self.registration_status(),
        })
    }

    fn query_registration(
        &mut self,
        command: core::fmt::Arguments<'_>,
        marker: &str,
    ) -> RegistrationStatus {
        if self.expect_marker(command, marker).is_err() {
            return RegistrationStatus::NoResult;
        }
        // +CEREG: <n>,<stat>[,...]
        let status = self
            .channel
            .skip_until(b',')
            .and_then(|()| self.channel.read_int_until(b'\n'))
            .map_or(RegistrationStatus::NoResult, RegistrationStatus::from);
        self.channel.drain(self.config.ok_timeout_ms, &mut self.session);
        status
    }

    /// Send a command and wait for the line carrying its answer.
    fn expect_marker(&mut self, args: core::fmt::Arguments<'_>, marker: &str) -> Result<(), Error> {
        match self
            .channel
            .execute(args, &[marker, ERROR], self.config.ok_timeout_ms, &mut self.session)?
        {
            0 => Ok(()),
            _ => Err(Error::ProtocolMismatch),
        }
    }

    fn now_ms(&mut self) -> u64 {
        self.channel.transport_mut().now_ms()
    }
}
