use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // ---- Test campaign ----
    RunTestRequest {
        num_packets: u32,
        delay_ms: u32,
        stagger_ms: u32,
        high_power: bool,
        tx_power_dbm: i8,
    },
    /// One heartbeat of a running test; identity and sequence only.
    RunTestResponse {
        device_id: DeviceId,
        packet_sequence: u32,
    },

    // ---- Device info ----
    InfoRequest,
    InfoResponse {
        device_id: DeviceId,
        high_power: bool,
        tx_power_dbm: i8,
        temperature_c: f32,
        frequency_mhz: f32,
        bitrate_kbps: f32,
        frequency_deviation_hz: f32,
    },
}

impl Message {
    pub fn run_test(params: &TestParameters) -> Self {
        Message::RunTestRequest {
            num_packets: params.num_packets,
            delay_ms: params.delay_ms,
            stagger_ms: params.stagger_ms,
            high_power: params.high_power,
            tx_power_dbm: params.tx_power_dbm,
        }
    }
}

/// Test campaign settings owned by the controller and copied into each
/// `RunTestRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestParameters {
    pub num_packets: u32,
    pub delay_ms: u32,
    pub stagger_ms: u32,
    pub high_power: bool,
    pub tx_power_dbm: i8,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            num_packets: 10,
            delay_ms: 1000,
            stagger_ms: 100,
            high_power: true,
            tx_power_dbm: 13,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid device id {0:?}: must be non-empty printable ASCII without ':'")]
pub struct InvalidDeviceId(pub String);

/// Relay identity as carried on the wire. Guaranteed to be a single
/// colon-free field, so encoding a message can never fail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidDeviceId> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_graphic() && b != b':');
        if valid {
            Ok(Self(id))
        } else {
            Err(InvalidDeviceId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = InvalidDeviceId;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceId::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_rejects_separator_and_blank() {
        assert!(DeviceId::new("AABBCC").is_ok());
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("AA:BB").is_err());
        assert!(DeviceId::new("AA BB").is_err());
        assert!(DeviceId::new("caf\u{e9}").is_err());
    }

    #[test]
    fn run_test_copies_parameters() {
        let params = TestParameters {
            num_packets: 3,
            delay_ms: 0,
            stagger_ms: 5,
            high_power: false,
            tx_power_dbm: -2,
        };
        assert_eq!(
            Message::run_test(&params),
            Message::RunTestRequest {
                num_packets: 3,
                delay_ms: 0,
                stagger_ms: 5,
                high_power: false,
                tx_power_dbm: -2,
            }
        );
    }
}
