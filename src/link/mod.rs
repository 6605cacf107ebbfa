//! Half-duplex radio link as seen by the relay and controller roles.
//!
//! Transmit and receive never overlap: a role calls one or the other, and
//! `receive` always returns within its timeout.

use std::time::Duration;

use thiserror::Error;

pub mod serial;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Channel stayed busy past the transmit timeout. Fatal to this
    /// attempt only.
    #[error("transmit timed out")]
    SendTimeout,
    /// No telemetry reply before the timeout. Fatal to this request only.
    #[error("telemetry request timed out")]
    TelemetryTimeout,
    /// The adapter cannot be reached at all.
    #[error("link unavailable: {0}")]
    Unavailable(String),
}

/// Radio state reported in an `InfoResponse`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub temperature_c: f32,
    pub frequency_mhz: f32,
    pub bitrate_kbps: f32,
    pub frequency_deviation_hz: f32,
    pub tx_power_dbm: i8,
    pub high_power: bool,
}

pub trait RadioLink {
    fn transmit(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// `Ok(None)` means nothing arrived before `timeout`.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError>;

    /// RSSI in dBm of the last successful `receive`.
    fn last_signal_strength(&self) -> f32;

    fn set_transmit_power(&mut self, dbm: i8) -> Result<(), LinkError>;

    fn set_high_power_mode(&mut self, enabled: bool) -> Result<(), LinkError>;

    fn telemetry(&mut self) -> Result<Telemetry, LinkError>;
}
