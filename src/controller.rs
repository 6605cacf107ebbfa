use std::fmt::{Display, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::RoleConfig;
use crate::console::{Console, OperatorCommand};
use crate::distance::DistanceModel;
use crate::link::{LinkError, RadioLink};
use crate::mode::Mode;
use crate::proto::codec::{decode, encode};
use crate::proto::message::{DeviceId, Message, TestParameters};
use crate::report::{Report, Sample, TestRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    TestInFlight,
}

/// Issues test and info requests and aggregates relay responses per
/// device identity. Commands, receptions and the deadline check share one
/// loop; nothing here runs on another thread.
pub struct Controller {
    device_id: DeviceId,
    config: RoleConfig,
    params: TestParameters,
    model: DistanceModel,
    state: ControllerState,
    run: TestRun,
}

/// How long to wait for a campaign's responses.
pub fn test_window(params: &TestParameters, margin: Duration) -> Duration {
    Duration::from_millis(u64::from(params.num_packets) * u64::from(params.delay_ms)) + margin
}

impl Controller {
    pub fn new(
        device_id: DeviceId,
        config: RoleConfig,
        params: TestParameters,
        model: DistanceModel,
    ) -> Self {
        Self {
            device_id,
            config,
            params,
            model,
            state: ControllerState::Idle,
            // Holds strays that arrive before the first test.
            run: TestRun::new(params, Instant::now()),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn test_run(&self) -> &TestRun {
        &self.run
    }

    pub fn params(&self) -> &TestParameters {
        &self.params
    }

    pub fn model(&self) -> &DistanceModel {
        &self.model
    }

    pub fn run<L: RadioLink, C: Console>(
        &mut self,
        link: &mut L,
        console: &mut C,
    ) -> Result<Mode, LinkError> {
        self.show_help();
        loop {
            let cmd = OperatorCommand::from_key(console.poll_key());
            if let Some(mode) = self.execute(cmd, link, console)? {
                return Ok(mode);
            }

            if let Some(payload) = link.receive(self.config.poll_interval)? {
                let rssi = link.last_signal_strength();
                self.handle_payload(&payload, rssi);
            }

            if let Some(report) = self.poll_deadline(Instant::now()) {
                println!("{}", report);
            }
        }
    }

    /// Runs one operator command. `Some(mode)` means leave the controller.
    pub fn execute<L: RadioLink, C: Console>(
        &mut self,
        cmd: OperatorCommand,
        link: &mut L,
        console: &mut C,
    ) -> Result<Option<Mode>, LinkError> {
        match cmd {
            OperatorCommand::ReturnToRelay => {
                info!("[controller] switching back to relay mode");
                return Ok(Some(Mode::Relay));
            }
            OperatorCommand::StartTest => self.start_test(link, Instant::now())?,
            OperatorCommand::ConfigureTest => self.configure_test(console),
            OperatorCommand::ConfigureDistanceModel => self.configure_distance_model(console),
            OperatorCommand::ShowParameters => println!("{}", self.parameters_text()),
            OperatorCommand::ShowTable => self.show_results_table(),
            OperatorCommand::RequestInfo => self.request_info(link)?,
            OperatorCommand::ShowLocalInfo => self.show_local_info(link)?,
            OperatorCommand::ShowHelp => self.show_help(),
            OperatorCommand::None => {}
        }
        Ok(None)
    }

    /// Replaces the current run, broadcasts the request and arms the
    /// deadline. A send timeout leaves the controller idle.
    pub fn start_test<L: RadioLink>(
        &mut self,
        link: &mut L,
        now: Instant,
    ) -> Result<(), LinkError> {
        let window = test_window(&self.params, self.config.test_window_margin);
        self.run = TestRun::new(self.params, now + window);

        match link.transmit(&encode(&Message::run_test(&self.params))) {
            Ok(()) => {
                self.state = ControllerState::TestInFlight;
                info!(
                    "[controller] test command sent, collecting for {:.1}s",
                    window.as_secs_f32()
                );
                Ok(())
            }
            Err(LinkError::SendTimeout) => {
                self.state = ControllerState::Idle;
                warn!("[controller] send timeout, test command not sent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn handle_payload(&mut self, payload: &[u8], rssi: f32) {
        let msg = match decode(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "[controller] dropping malformed packet: {} payload={:?} rssi={}",
                    e,
                    String::from_utf8_lossy(payload),
                    rssi
                );
                return;
            }
        };

        match msg {
            Message::RunTestResponse {
                device_id,
                packet_sequence,
            } => {
                info!(
                    "[controller] test packet from {} | {} | RSSI: {}dB",
                    device_id, packet_sequence, rssi
                );
                self.run.record(
                    device_id,
                    Sample {
                        packet_sequence,
                        rssi,
                    },
                );
            }
            Message::InfoResponse {
                device_id,
                high_power,
                tx_power_dbm,
                temperature_c,
                frequency_mhz,
                bitrate_kbps,
                frequency_deviation_hz,
            } => {
                println!("\n[CONTROLLER] Received device info | RSSI: {}dB", rssi);
                println!("  Device ID: {}", device_id);
                println!("  High Power: {}", high_power);
                println!("  TX Power: {}dBm", tx_power_dbm);
                println!("  Temperature: {}C", temperature_c);
                println!("  Frequency: {}MHz", frequency_mhz);
                println!("  Bitrate: {:.1}kbit/s", bitrate_kbps);
                println!("  Frequency Deviation: {}Hz\n", frequency_deviation_hz);
            }
            Message::RunTestRequest { .. } | Message::InfoRequest => {
                debug!("[controller] ignoring request from another controller: {:?}", msg);
            }
        }
    }

    /// Closes an expired test window and hands back its report.
    pub fn poll_deadline(&mut self, now: Instant) -> Option<Report> {
        if self.state != ControllerState::TestInFlight || !self.run.is_expired(now) {
            return None;
        }
        self.state = ControllerState::Idle;
        info!(
            "[controller] test run complete: {} responses from {} devices",
            self.run.total_samples(),
            self.run.device_count()
        );
        Some(self.report())
    }

    pub fn report(&self) -> Report {
        Report::build(&self.run, &self.model)
    }

    pub fn show_results_table(&self) {
        println!("{}", self.report());
    }

    pub fn request_info<L: RadioLink>(&mut self, link: &mut L) -> Result<(), LinkError> {
        match link.transmit(&encode(&Message::InfoRequest)) {
            Ok(()) => info!("[controller] info request sent"),
            Err(LinkError::SendTimeout) => warn!("[controller] send timeout on info request"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn show_local_info<L: RadioLink>(&self, link: &mut L) -> Result<(), LinkError> {
        let t = match link.telemetry() {
            Ok(t) => t,
            Err(LinkError::TelemetryTimeout) => {
                warn!("[controller] radio did not report telemetry");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        println!(
            "\n[INFO] Device: {} | Temperature: {}C | TX Power: {}dBm | High Power: {} | Freq: {}MHz\n",
            self.device_id, t.temperature_c, t.tx_power_dbm, t.high_power, t.frequency_mhz
        );
        Ok(())
    }

    pub fn configure_test<C: Console>(&mut self, console: &mut C) {
        println!("\n[CONTROLLER] Configure Test Parameters");
        println!("{}", "-".repeat(40));
        let p = &mut self.params;
        p.num_packets = prompt_parse(console, "Number of packets", p.num_packets);
        p.delay_ms = prompt_parse(console, "Delay between packets (ms)", p.delay_ms);
        p.stagger_ms = prompt_parse(
            console,
            "Stagger (random delay) between packets (ms)",
            p.stagger_ms,
        );
        let answer = console.prompt("High power mode (true/false)", &p.high_power.to_string());
        match parse_yes_no(&answer) {
            Some(b) => p.high_power = b,
            None => warn!(
                "[controller] invalid high power value {:?}, keeping {}",
                answer, p.high_power
            ),
        }
        p.tx_power_dbm = prompt_parse(console, "TX power (dB)", p.tx_power_dbm);
        println!("\n[CONTROLLER] Parameters updated:");
        println!("{}", self.parameters_text());
    }

    pub fn configure_distance_model<C: Console>(&mut self, console: &mut C) {
        println!("\n[CONTROLLER] Configure Distance Parameters");
        println!("{}", "-".repeat(40));
        let m = &mut self.model;
        m.reference_rssi_at_1m =
            prompt_parse(console, "A value (signal @ 1m)", m.reference_rssi_at_1m);
        let n = prompt_parse(console, "Path-loss exponent n", m.path_loss_exponent);
        if n > 0.0 {
            m.path_loss_exponent = n;
        } else {
            warn!(
                "[controller] path-loss exponent must be positive, keeping {}",
                m.path_loss_exponent
            );
        }
        println!("\n[CONTROLLER] Distance parameters updated:");
        println!("  A: {}dB", m.reference_rssi_at_1m);
        println!("  n: {}", m.path_loss_exponent);
    }

    pub fn parameters_text(&self) -> String {
        let p = &self.params;
        let m = &self.model;
        let mut out = String::new();
        let _ = writeln!(out, "Current test parameters:");
        let _ = writeln!(out, "  Packets: {}", p.num_packets);
        let _ = writeln!(out, "  Delay: {}ms", p.delay_ms);
        let _ = writeln!(out, "  Stagger: {}ms", p.stagger_ms);
        let _ = writeln!(out, "  High Power: {}", p.high_power);
        let _ = writeln!(out, "  TX Power: {}dB", p.tx_power_dbm);
        let _ = writeln!(out);
        let _ = writeln!(out, "Distance calculation parameters:");
        let _ = writeln!(out, "  A (signal @ 1m): {}dB", m.reference_rssi_at_1m);
        let _ = write!(out, "  n (path-loss exponent): {}", m.path_loss_exponent);
        out
    }

    pub fn show_help(&self) {
        let rule = "=".repeat(50);
        println!("\n{}", rule);
        println!("CONTROLLER MODE ACTIVATED");
        println!("{}", rule);
        println!("Commands:");
        println!("  r - Return to relay mode");
        println!("  s - Start test (send command to relays)");
        println!("  c - Configure test parameters");
        println!("  d - Configure distance calculation parameters");
        println!("  p - Show current parameters");
        println!("  t - Show results table");
        println!("  q - Request relay device info");
        println!("  i - Show local device info");
        println!("  h - Show this help menu");
        println!("{}\n", rule);
        println!("{}\n", self.parameters_text());
    }
}

/// Prompts with `current` as default; unparsable input keeps `current`.
fn prompt_parse<C: Console, T: FromStr + Display + Copy>(
    console: &mut C,
    label: &str,
    current: T,
) -> T {
    let answer = console.prompt(label, &current.to_string());
    match answer.parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(
                "[controller] invalid value {:?} for {}, keeping {}",
                answer, label, current
            );
            current
        }
    }
}

fn parse_yes_no(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::scripted::ScriptedConsole;
    use crate::link::memory::MemoryLink;
    use crate::relay::Relay;

    fn id(s: &str) -> DeviceId {
        DeviceId::new(s).unwrap()
    }

    fn controller(params: TestParameters) -> Controller {
        let config = RoleConfig {
            test_window_margin: Duration::from_secs(2),
            info_backoff_ms: 0..=0,
            ..RoleConfig::default()
        };
        Controller::new(id("C0FFEE"), config, params, DistanceModel::default())
    }

    fn response(dev: &str, seq: u32) -> Vec<u8> {
        encode(&Message::RunTestResponse {
            device_id: id(dev),
            packet_sequence: seq,
        })
    }

    fn quick_test(num_packets: u32) -> TestParameters {
        TestParameters {
            num_packets,
            delay_ms: 0,
            stagger_ms: 0,
            ..TestParameters::default()
        }
    }

    #[test]
    fn window_is_packets_times_delay_plus_margin() {
        let params = TestParameters {
            num_packets: 10,
            delay_ms: 1000,
            ..TestParameters::default()
        };
        assert_eq!(test_window(&params, Duration::from_secs(2)), Duration::from_secs(12));
        assert_eq!(
            test_window(&quick_test(3), Duration::from_millis(250)),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn start_test_broadcasts_and_arms_deadline() {
        let mut link = MemoryLink::new();
        let mut c = controller(quick_test(3));
        let now = Instant::now();
        c.start_test(&mut link, now).unwrap();
        assert_eq!(c.state(), ControllerState::TestInFlight);
        assert_eq!(c.test_run().deadline, now + Duration::from_secs(2));
        assert_eq!(
            decode(&link.outbox[0]).unwrap(),
            Message::run_test(&quick_test(3))
        );
    }

    #[test]
    fn start_test_replaces_previous_run() {
        let mut link = MemoryLink::new();
        let mut c = controller(quick_test(3));
        c.handle_payload(&response("OLD", 0), -50.0);
        assert_eq!(c.test_run().total_samples(), 1);
        c.start_test(&mut link, Instant::now()).unwrap();
        assert_eq!(c.test_run().total_samples(), 0);
    }

    #[test]
    fn failed_broadcast_stays_idle() {
        let mut link = MemoryLink::new();
        link.failing_transmits = 1;
        let mut c = controller(quick_test(3));
        c.start_test(&mut link, Instant::now()).unwrap();
        assert_eq!(c.state(), ControllerState::Idle);
        assert!(link.outbox.is_empty());
    }

    #[test]
    fn interleaved_devices_are_kept_apart() {
        let mut c = controller(quick_test(3));
        let arrivals = [
            ("A1", 0),
            ("B2", 0),
            ("A1", 1),
            ("B2", 1),
            ("B2", 2),
            ("A1", 2),
            ("B2", 0),
        ];
        for (dev, seq) in arrivals {
            c.handle_payload(&response(dev, seq), -60.0);
        }
        let run = c.test_run();
        let a = run.samples(&id("A1")).unwrap();
        let b = run.samples(&id("B2")).unwrap();
        assert_eq!(a.len() + b.len(), arrivals.len());
        assert_eq!(a.iter().map(|s| s.packet_sequence).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(b.iter().map(|s| s.packet_sequence).collect::<Vec<_>>(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn strays_recorded_while_idle_and_malformed_dropped() {
        let mut c = controller(quick_test(3));
        assert_eq!(c.state(), ControllerState::Idle);
        c.handle_payload(&response("LATE", 2), -90.0);
        c.handle_payload(b"RR:LATE", -90.0);
        c.handle_payload(b"RR:LATE:x", -90.0);
        c.handle_payload(&encode(&Message::InfoRequest), -90.0);
        assert_eq!(c.test_run().samples(&id("LATE")).unwrap().len(), 1);
        assert_eq!(c.test_run().total_samples(), 1);
    }

    #[test]
    fn deadline_ends_test_once() {
        let mut link = MemoryLink::new();
        let mut c = controller(quick_test(3));
        let now = Instant::now();
        c.start_test(&mut link, now).unwrap();
        assert!(c.poll_deadline(now + Duration::from_secs(1)).is_none());
        assert_eq!(c.state(), ControllerState::TestInFlight);
        assert!(c.poll_deadline(now + Duration::from_secs(3)).is_some());
        assert_eq!(c.state(), ControllerState::Idle);
        assert!(c.poll_deadline(now + Duration::from_secs(4)).is_none());
    }

    #[test]
    fn configure_test_reads_prompts_and_keeps_bad_values() {
        let mut c = controller(TestParameters::default());
        let mut console = ScriptedConsole::default().answer(&["25", "abc", "", "no", "-4"]);
        c.configure_test(&mut console);
        let p = c.params();
        assert_eq!(p.num_packets, 25);
        assert_eq!(p.delay_ms, 1000);
        assert_eq!(p.stagger_ms, 100);
        assert!(!p.high_power);
        assert_eq!(p.tx_power_dbm, -4);
    }

    #[test]
    fn configure_distance_model_rejects_non_positive_exponent() {
        let mut c = controller(TestParameters::default());
        let mut console = ScriptedConsole::default().answer(&["40", "0"]);
        c.configure_distance_model(&mut console);
        assert_eq!(c.model().reference_rssi_at_1m, 40.0);
        assert_eq!(c.model().path_loss_exponent, DistanceModel::default().path_loss_exponent);
    }

    #[test]
    fn run_loop_returns_to_relay_on_r() {
        let mut link = MemoryLink::new();
        link.push_rx(response("AABBCC", 0), -55.0);
        let mut console = ScriptedConsole::with_keys([None, Some('q'), Some('r')]);
        let mut c = controller(quick_test(3));
        let mode = c.run(&mut link, &mut console).unwrap();
        assert_eq!(mode, Mode::Relay);
        assert_eq!(c.test_run().total_samples(), 1);
        assert_eq!(decode(&link.outbox[0]).unwrap(), Message::InfoRequest);
    }

    #[test]
    fn silent_radio_telemetry_keeps_controller_running() {
        let mut link = MemoryLink::new();
        link.telemetry_silent = true;
        let mut console = ScriptedConsole::with_keys([Some('i'), Some('s'), Some('r')]);
        let mut c = controller(quick_test(3));
        let mode = c.run(&mut link, &mut console).unwrap();
        assert_eq!(mode, Mode::Relay);
        assert_eq!(decode(&link.outbox[0]).unwrap(), Message::run_test(&quick_test(3)));
    }

    #[test]
    fn parameters_text_lists_test_and_distance_settings() {
        let text = controller(quick_test(3)).parameters_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Current test parameters:");
        assert_eq!(lines[1], "  Packets: 3");
        assert_eq!(lines[5], "  TX Power: 13dB");
        assert_eq!(lines[6], "");
        assert_eq!(lines[8], "  A (signal @ 1m): 35dB");
        assert_eq!(lines[9], "  n (path-loss exponent): 2.7");
        assert_eq!(lines.len(), 10);
    }

    #[test]
    fn parse_yes_no_words() {
        assert_eq!(parse_yes_no("Y"), Some(true));
        assert_eq!(parse_yes_no(" false "), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }

    #[test]
    fn end_to_end_three_packet_test() {
        let mut controller_link = MemoryLink::new();
        let mut relay_link = MemoryLink::new();
        let mut c = controller(quick_test(3));
        let mut relay = Relay::new(
            id("AABBCC"),
            RoleConfig {
                info_backoff_ms: 0..=0,
                ..RoleConfig::default()
            },
        );

        let start = Instant::now();
        c.start_test(&mut controller_link, start).unwrap();

        // controller -> relay
        for request in controller_link.take_outbox() {
            relay.handle_payload(&mut relay_link, &request, -48.0).unwrap();
        }
        // relay -> controller, one RSSI per packet
        let rssi = [-61.0, -64.0, -70.0];
        let burst = relay_link.take_outbox();
        assert_eq!(burst.len(), 3);
        for (payload, rssi) in burst.into_iter().zip(rssi) {
            controller_link.push_rx(payload, rssi);
        }
        while let Some(payload) = controller_link.receive(Duration::ZERO).unwrap() {
            c.handle_payload(&payload, controller_link.last_signal_strength());
        }

        let report = c.poll_deadline(start + Duration::from_secs(3)).unwrap();
        let row = report.row(&id("AABBCC")).unwrap();
        assert_eq!(row.packet_loss_pct, 0.0);
        assert_eq!(row.received, 3);
        assert_eq!(row.rssi_avg, (-61.0 - 64.0 - 70.0) / 3.0);
        assert_eq!(row.rssi_min, -70.0);
        assert_eq!(row.rssi_max, -61.0);
    }

    #[test]
    fn silent_relay_has_no_row() {
        let mut link = MemoryLink::new();
        let mut c = controller(quick_test(3));
        let start = Instant::now();
        c.start_test(&mut link, start).unwrap();
        c.handle_payload(&response("HEARD", 0), -80.0);
        let report = c.poll_deadline(start + Duration::from_secs(3)).unwrap();
        assert_eq!(report.rows.len(), 1);
        assert!(report.row(&id("SILENT")).is_none());
        let heard = report.row(&id("HEARD")).unwrap();
        assert!((heard.packet_loss_pct - 66.666_67).abs() < 1e-3);
    }
}
