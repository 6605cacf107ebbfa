use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;

use crate::config::RoleConfig;
use crate::distance::DistanceModel;
use crate::mode::Mode;
use crate::proto::message::TestParameters;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "range-hammer",
    about = "Radio range tester (controller/relay) over a serial radio bridge"
)]
pub struct Cli {
    /// Verbose logging (per-packet traffic)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Interactive relay/controller node
    Run(RunOpts),
    /// Transmit numbered ping beacons
    Ping(PingOpts),
    /// Receive ping beacons and report loss and RSSI
    Listen(ListenOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path of the radio bridge
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
    /// How long the bridge may take to confirm a transmission
    #[arg(long, default_value_t = 500)]
    pub tx_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Identity reported to the controller (random 6 hex digits if omitted)
    #[arg(long)]
    pub device_id: Option<String>,
    /// Role to start in
    #[arg(long, value_enum, default_value_t = Mode::Relay)]
    pub start_mode: Mode,
    /// Receive timeout per loop iteration
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,
    /// Slack added to the controller's test window
    #[arg(long, default_value_t = 2_000)]
    pub window_margin_ms: u64,
    /// Lower bound of the relay's random backoff before an info reply
    #[arg(long, default_value_t = 50)]
    pub info_backoff_min_ms: u64,
    /// Upper bound of the relay's random backoff before an info reply
    #[arg(long, default_value_t = 200)]
    pub info_backoff_max_ms: u64,
    /// Seconds to wait for operator input at a prompt
    #[arg(long, default_value_t = 30)]
    pub prompt_timeout_s: u64,
    /// Packets per test
    #[arg(long, default_value_t = 10)]
    pub packets: u32,
    /// Delay between test packets (ms)
    #[arg(long, default_value_t = 1_000)]
    pub delay_ms: u32,
    /// Random extra delay between test packets, upper bound (ms)
    #[arg(long, default_value_t = 100)]
    pub stagger_ms: u32,
    /// Relay high power mode during tests
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub high_power: bool,
    /// Relay transmit power during tests (dBm)
    #[arg(long, default_value_t = 13, allow_negative_numbers = true)]
    pub tx_power: i8,
    /// Reference signal strength at 1 m used by the distance model (dB)
    #[arg(long, default_value_t = 35.0, allow_negative_numbers = true)]
    pub ref_rssi: f32,
    /// Path-loss exponent used by the distance model
    #[arg(long, default_value_t = 2.7)]
    pub path_loss: f32,
}

impl RunOpts {
    pub fn role_config(&self) -> anyhow::Result<RoleConfig> {
        if self.info_backoff_min_ms > self.info_backoff_max_ms {
            anyhow::bail!("info backoff min must not exceed max");
        }
        Ok(RoleConfig {
            poll_interval: Duration::from_millis(self.poll_ms),
            test_window_margin: Duration::from_millis(self.window_margin_ms),
            info_backoff_ms: self.info_backoff_min_ms..=self.info_backoff_max_ms,
            prompt_timeout: Duration::from_secs(self.prompt_timeout_s),
        })
    }

    pub fn test_parameters(&self) -> TestParameters {
        TestParameters {
            num_packets: self.packets,
            delay_ms: self.delay_ms,
            stagger_ms: self.stagger_ms,
            high_power: self.high_power,
            tx_power_dbm: self.tx_power,
        }
    }

    pub fn distance_model(&self) -> anyhow::Result<DistanceModel> {
        if self.path_loss <= 0.0 {
            anyhow::bail!("path-loss exponent must be positive");
        }
        Ok(DistanceModel {
            reference_rssi_at_1m: self.ref_rssi,
            path_loss_exponent: self.path_loss,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct PingOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Gap between beacons (ms)
    #[arg(long, default_value_t = 1_000)]
    pub delay_ms: u64,
    /// Stop after this many beacons (runs forever by default)
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ListenOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 5.0)]
    pub stats: f64,
    /// Receive timeout per poll (ms)
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,
}
