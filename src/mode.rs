use anyhow::{Context, Result};
use clap::ValueEnum;
use log::{error, info};
use rand::Rng;

use crate::cli::RunOpts;
use crate::console::{Console, StdinConsole};
use crate::controller::Controller;
use crate::link::serial::SerialLink;
use crate::link::{LinkError, RadioLink};
use crate::proto::message::{DeviceId, InvalidDeviceId};
use crate::relay::Relay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Relay,
    Controller,
}

/// Entry point of the `run` subcommand.
pub fn run_node(opts: RunOpts) -> Result<()> {
    let config = opts.role_config()?;
    let device_id = match &opts.device_id {
        Some(id) => DeviceId::new(id.as_str())?,
        None => random_device_id()?,
    };
    let mut link = SerialLink::open(&opts.ser)?;
    let mut console = StdinConsole::spawn(config.prompt_timeout);

    print_banner(&mut link, &device_id, opts.start_mode)?;

    let mut relay = Relay::new(device_id.clone(), config.clone());
    let mut controller = Controller::new(
        device_id,
        config,
        opts.test_parameters(),
        opts.distance_model()?,
    );

    let mut mode = opts.start_mode;
    loop {
        mode = switch(mode, &mut relay, &mut controller, &mut link, &mut console)
            .inspect_err(|e| error!("[mode] {:?} role stopped: {}", mode, e))
            .with_context(|| format!("{:?} mode", mode))?;
    }
}

/// Hands the link to the role for `mode` until that role asks for the
/// other one.
pub fn switch<L: RadioLink, C: Console>(
    mode: Mode,
    relay: &mut Relay,
    controller: &mut Controller,
    link: &mut L,
    console: &mut C,
) -> Result<Mode, LinkError> {
    match mode {
        Mode::Relay => relay.run(link, console),
        Mode::Controller => controller.run(link, console),
    }
}

fn random_device_id() -> Result<DeviceId, InvalidDeviceId> {
    let raw: u32 = rand::thread_rng().gen_range(0..=0x00FF_FFFF);
    DeviceId::new(format!("{:06X}", raw))
}

fn print_banner<L: RadioLink>(link: &mut L, device_id: &DeviceId, mode: Mode) -> Result<()> {
    let t = link.telemetry().context("reading radio telemetry")?;
    let rule = "=".repeat(50);
    println!("\n{}", rule);
    println!("Radio range tester - Device Info");
    println!("{}", rule);
    println!("Device ID: {}", device_id);
    println!("Temperature: {}C", t.temperature_c);
    println!("Frequency: {}MHz", t.frequency_mhz);
    println!("Bit rate: {}kbit/s", t.bitrate_kbps);
    println!("Frequency deviation: {}Hz", t.frequency_deviation_hz);
    println!("Transmit power: {}dBm", t.tx_power_dbm);
    println!("{}", rule);
    match mode {
        Mode::Relay => {
            println!("\nStarting in RELAY mode...");
            println!("Press any key (then Enter) to switch to CONTROLLER mode");
        }
        Mode::Controller => println!("\nStarting in CONTROLLER mode..."),
    }
    println!("{}\n", rule);
    info!("[mode] device {} ready", device_id);
    Ok(())
}
