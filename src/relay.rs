use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;

use crate::config::RoleConfig;
use crate::console::Console;
use crate::link::{LinkError, RadioLink};
use crate::mode::Mode;
use crate::proto::codec::{decode, encode};
use crate::proto::message::{DeviceId, Message, TestParameters};

/// Answers controller requests. The relay is in one of three states,
/// each a stretch of control flow rather than a stored value:
///
/// - idle: `run` polling the console and the link;
/// - running a test: `run_test`, entered from a `RunTestRequest`;
/// - responding to info: `respond_info`, entered from an `InfoRequest`.
///
/// Both busy states run to completion and fall back to idle before the
/// next poll, so a key press never interrupts them.
pub struct Relay {
    device_id: DeviceId,
    config: RoleConfig,
}

impl Relay {
    pub fn new(device_id: DeviceId, config: RoleConfig) -> Self {
        Self { device_id, config }
    }

    /// Listens until the operator presses a key. Only a fatal link error
    /// ends the loop early.
    pub fn run<L: RadioLink, C: Console>(
        &mut self,
        link: &mut L,
        console: &mut C,
    ) -> Result<Mode, LinkError> {
        info!("[relay] listening for commands (press any key for controller mode)");
        loop {
            if console.poll_key().is_some() {
                info!("[relay] switching to controller mode");
                return Ok(Mode::Controller);
            }
            let Some(payload) = link.receive(self.config.poll_interval)? else {
                continue;
            };
            let rssi = link.last_signal_strength();
            self.handle_payload(link, &payload, rssi)?;
        }
    }

    pub fn handle_payload<L: RadioLink>(
        &mut self,
        link: &mut L,
        payload: &[u8],
        rssi: f32,
    ) -> Result<(), LinkError> {
        let msg = match decode(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "[relay] dropping malformed packet: {} payload={:?} rssi={}",
                    e,
                    String::from_utf8_lossy(payload),
                    rssi
                );
                return Ok(());
            }
        };

        match msg {
            Message::RunTestRequest {
                num_packets,
                delay_ms,
                stagger_ms,
                high_power,
                tx_power_dbm,
            } => {
                info!("[relay] received test command | RSSI: {}dB", rssi);
                let params = TestParameters {
                    num_packets,
                    delay_ms,
                    stagger_ms,
                    high_power,
                    tx_power_dbm,
                };
                self.run_test(link, &params).map(|_| ())
            }
            Message::InfoRequest => {
                info!("[relay] received info request | RSSI: {}dB", rssi);
                self.respond_info(link)
            }
            Message::RunTestResponse { .. } | Message::InfoResponse { .. } => {
                debug!("[relay] ignoring {:?} | RSSI: {}dB", msg, rssi);
                Ok(())
            }
        }
    }

    /// Transmits `num_packets` responses numbered from 0. A send timeout
    /// skips that packet; the burst carries on. Returns how many went out.
    pub fn run_test<L: RadioLink>(
        &mut self,
        link: &mut L,
        params: &TestParameters,
    ) -> Result<u32, LinkError> {
        info!(
            "[relay] starting test: packets={} delay={}ms stagger={}ms high_power={} tx_power={}dB",
            params.num_packets,
            params.delay_ms,
            params.stagger_ms,
            params.high_power,
            params.tx_power_dbm
        );
        link.set_high_power_mode(params.high_power)?;
        link.set_transmit_power(params.tx_power_dbm)?;

        let mut rng = rand::thread_rng();
        let mut sent = 0;
        for seq in 0..params.num_packets {
            let response = Message::RunTestResponse {
                device_id: self.device_id.clone(),
                packet_sequence: seq,
            };
            match link.transmit(&encode(&response)) {
                Ok(()) => {
                    sent += 1;
                    debug!("[relay] sent packet {}/{}", seq + 1, params.num_packets);
                }
                Err(LinkError::SendTimeout) => {
                    warn!("[relay] send timeout on packet {}, continuing", seq);
                }
                Err(e) => return Err(e),
            }

            let jitter = rng.gen_range(0..=params.stagger_ms);
            let pause = u64::from(params.delay_ms) + u64::from(jitter);
            if pause > 0 {
                thread::sleep(Duration::from_millis(pause));
            }
        }

        info!("[relay] test complete: {}/{} sent", sent, params.num_packets);
        Ok(sent)
    }

    /// Backs off randomly, then reports current radio telemetry.
    pub fn respond_info<L: RadioLink>(&mut self, link: &mut L) -> Result<(), LinkError> {
        let backoff = rand::thread_rng().gen_range(self.config.info_backoff_ms.clone());
        if backoff > 0 {
            thread::sleep(Duration::from_millis(backoff));
        }

        let t = match link.telemetry() {
            Ok(t) => t,
            Err(LinkError::TelemetryTimeout) => {
                warn!("[relay] no telemetry from radio, info request dropped");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let response = Message::InfoResponse {
            device_id: self.device_id.clone(),
            high_power: t.high_power,
            tx_power_dbm: t.tx_power_dbm,
            temperature_c: t.temperature_c,
            frequency_mhz: t.frequency_mhz,
            bitrate_kbps: t.bitrate_kbps,
            frequency_deviation_hz: t.frequency_deviation_hz,
        };
        match link.transmit(&encode(&response)) {
            Ok(()) => info!("[relay] device info sent to controller"),
            Err(LinkError::SendTimeout) => warn!("[relay] send timeout on info reply"),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
