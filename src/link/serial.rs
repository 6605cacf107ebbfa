use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, warn};
use serialport::SerialPort;

use super::{LinkError, RadioLink, Telemetry};
use crate::cli::SerialOpts;
use crate::frame::{
    BridgeLine, build_cfg_high_power, build_cfg_power, build_stat_query, build_tx, parse_line,
};
use crate::port::{LinePort, open_port};

/// Radio reached through a serial bridge speaking the `@@ ... ##` line
/// protocol from `frame`.
pub struct SerialLink<P = Box<dyn SerialPort>> {
    port: LinePort<P>,
    tx_timeout: Duration,
    /// Receptions that showed up while waiting for a TX or STAT reply.
    rx_queue: VecDeque<(f32, Vec<u8>)>,
    last_rssi: f32,
}

impl SerialLink {
    pub fn open(opts: &SerialOpts) -> Result<Self> {
        let port = open_port(opts).with_context(|| format!("opening radio bridge {}", opts.dev))?;
        Ok(Self::with_port(port, Duration::from_millis(opts.tx_timeout_ms)))
    }
}

impl<P: Read + Write> SerialLink<P> {
    pub fn with_port(port: P, tx_timeout: Duration) -> Self {
        Self {
            port: LinePort::new(port),
            tx_timeout,
            rx_queue: VecDeque::new(),
            last_rssi: 0.0,
        }
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        debug!("[link] > {}", line);
        self.port
            .write_line(line)
            .map_err(|e| LinkError::Unavailable(format!("serial write: {}", e)))
    }

    /// Reads bridge lines until `on_line` accepts one or the deadline
    /// passes. Receptions are queued for `receive` along the way.
    fn await_reply<T>(
        &mut self,
        deadline: Instant,
        mut on_line: impl FnMut(BridgeLine) -> Option<T>,
    ) -> Result<Option<T>, LinkError> {
        loop {
            let Some(line) = self.read_line(deadline)? else {
                return Ok(None);
            };
            match parse_line(&line) {
                Ok(BridgeLine::Rx { rssi, payload }) => self.rx_queue.push_back((rssi, payload)),
                Ok(other) => {
                    if let Some(v) = on_line(other) {
                        return Ok(Some(v));
                    }
                }
                Err(e) => warn!("[link] bad bridge line: {} line=\"{}\"", e, line),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn read_line(&mut self, deadline: Instant) -> Result<Option<String>, LinkError> {
        let line = self
            .port
            .read_line(deadline)
            .map_err(|e| LinkError::Unavailable(format!("serial read: {}", e)))?;
        if let Some(l) = &line {
            debug!("[link] < {}", l);
        }
        Ok(line)
    }
}

impl<P: Read + Write> RadioLink for SerialLink<P> {
    fn transmit(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.send_line(&build_tx(payload))?;
        let deadline = Instant::now() + self.tx_timeout;
        let reply = self.await_reply(deadline, |line| match line {
            BridgeLine::TxOk => Some(true),
            BridgeLine::TxErr => Some(false),
            _ => None,
        })?;
        match reply {
            Some(true) => Ok(()),
            Some(false) | None => Err(LinkError::SendTimeout),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some((rssi, payload)) = self.rx_queue.pop_front() {
            self.last_rssi = rssi;
            return Ok(Some(payload));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let Some(line) = self.read_line(deadline)? else {
                return Ok(None);
            };
            match parse_line(&line) {
                Ok(BridgeLine::Rx { rssi, payload }) => {
                    self.last_rssi = rssi;
                    return Ok(Some(payload));
                }
                Ok(other) => debug!("[link] ignoring stray {:?}", other),
                Err(e) => warn!("[link] bad bridge line: {} line=\"{}\"", e, line),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn last_signal_strength(&self) -> f32 {
        self.last_rssi
    }

    fn set_transmit_power(&mut self, dbm: i8) -> Result<(), LinkError> {
        self.send_line(&build_cfg_power(dbm))
    }

    fn set_high_power_mode(&mut self, enabled: bool) -> Result<(), LinkError> {
        self.send_line(&build_cfg_high_power(enabled))
    }

    fn telemetry(&mut self) -> Result<Telemetry, LinkError> {
        self.send_line(&build_stat_query())?;
        let deadline = Instant::now() + self.tx_timeout;
        self.await_reply(deadline, |line| match line {
            BridgeLine::Stat(t) => Some(t),
            _ => None,
        })?
        .ok_or(LinkError::TelemetryTimeout)
    }
}
