use std::collections::VecDeque;
use std::time::Duration;

use super::{LinkError, RadioLink, Telemetry};

/// Scripted link: hands out queued receptions and records every
/// transmission. Never sleeps.
#[derive(Debug)]
pub struct MemoryLink {
    pub inbox: VecDeque<(Vec<u8>, f32)>,
    pub outbox: Vec<Vec<u8>>,
    /// Number of upcoming transmits that fail with `SendTimeout`.
    pub failing_transmits: usize,
    /// When set, `telemetry` times out.
    pub telemetry_silent: bool,
    pub telemetry: Telemetry,
    last_rssi: f32,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            failing_transmits: 0,
            telemetry_silent: false,
            telemetry: Telemetry {
                temperature_c: 21.0,
                frequency_mhz: 915.0,
                bitrate_kbps: 250.0,
                frequency_deviation_hz: 250_000.0,
                tx_power_dbm: 13,
                high_power: true,
            },
            last_rssi: 0.0,
        }
    }

    pub fn push_rx(&mut self, payload: impl Into<Vec<u8>>, rssi: f32) {
        self.inbox.push_back((payload.into(), rssi));
    }

    pub fn take_outbox(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }
}

impl RadioLink for MemoryLink {
    fn transmit(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if self.failing_transmits > 0 {
            self.failing_transmits -= 1;
            return Err(LinkError::SendTimeout);
        }
        self.outbox.push(payload.to_vec());
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        Ok(self.inbox.pop_front().map(|(payload, rssi)| {
            self.last_rssi = rssi;
            payload
        }))
    }

    fn last_signal_strength(&self) -> f32 {
        self.last_rssi
    }

    fn set_transmit_power(&mut self, dbm: i8) -> Result<(), LinkError> {
        self.telemetry.tx_power_dbm = dbm;
        Ok(())
    }

    fn set_high_power_mode(&mut self, enabled: bool) -> Result<(), LinkError> {
        self.telemetry.high_power = enabled;
        Ok(())
    }

    fn telemetry(&mut self) -> Result<Telemetry, LinkError> {
        if self.telemetry_silent {
            return Err(LinkError::TelemetryTimeout);
        }
        Ok(self.telemetry)
    }
}
