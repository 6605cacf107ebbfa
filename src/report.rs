use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;

use crate::distance::{DistanceModel, ILLUSTRATIVE_EXPONENTS};
use crate::proto::message::{DeviceId, TestParameters};

/// One received `RunTestResponse`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub packet_sequence: u32,
    pub rssi: f32,
}

/// Controller-side record of one test campaign. Samples are kept per
/// reporting relay in arrival order.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub params: TestParameters,
    pub deadline: Instant,
    records: BTreeMap<DeviceId, Vec<Sample>>,
}

impl TestRun {
    pub fn new(params: TestParameters, deadline: Instant) -> Self {
        Self {
            params,
            deadline,
            records: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, device_id: DeviceId, sample: Sample) {
        self.records.entry(device_id).or_default().push(sample);
    }

    pub fn samples(&self, device_id: &DeviceId) -> Option<&[Sample]> {
        self.records.get(device_id).map(Vec::as_slice)
    }

    pub fn device_count(&self) -> usize {
        self.records.len()
    }

    pub fn total_samples(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    pub device_id: DeviceId,
    pub tx_power_dbm: i8,
    pub received: usize,
    /// Expected sequences (`0..num_packets`) never seen.
    pub missing: u32,
    pub rssi_min: f32,
    pub rssi_max: f32,
    pub rssi_avg: f32,
    pub packet_loss_pct: f32,
    /// Distances at `ILLUSTRATIVE_EXPONENTS`, same order.
    pub distances: [f32; 3],
    pub distance_configured: f32,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub rows: Vec<DeviceReport>,
    pub num_packets: u32,
    pub model: DistanceModel,
}

impl Report {
    pub fn build(run: &TestRun, model: &DistanceModel) -> Self {
        let rows = run
            .records
            .iter()
            .filter_map(|(id, samples)| device_report(id, samples, &run.params, model))
            .collect();
        Self {
            rows,
            num_packets: run.params.num_packets,
            model: *model,
        }
    }

    pub fn row(&self, device_id: &DeviceId) -> Option<&DeviceReport> {
        self.rows.iter().find(|r| &r.device_id == device_id)
    }
}

pub fn packet_loss_pct(received: usize, num_packets: u32) -> f32 {
    if num_packets == 0 {
        return 0.0;
    }
    100.0 * (1.0 - received as f32 / num_packets as f32)
}

fn device_report(
    device_id: &DeviceId,
    samples: &[Sample],
    params: &TestParameters,
    model: &DistanceModel,
) -> Option<DeviceReport> {
    if samples.is_empty() {
        return None;
    }
    let rssi_min = samples.iter().map(|s| s.rssi).fold(f32::INFINITY, f32::min);
    let rssi_max = samples
        .iter()
        .map(|s| s.rssi)
        .fold(f32::NEG_INFINITY, f32::max);
    let rssi_avg = samples.iter().map(|s| s.rssi).sum::<f32>() / samples.len() as f32;

    let seen: HashSet<u32> = samples
        .iter()
        .map(|s| s.packet_sequence)
        .filter(|seq| *seq < params.num_packets)
        .collect();
    let missing = params.num_packets - seen.len() as u32;

    let tx = f32::from(params.tx_power_dbm);
    Some(DeviceReport {
        device_id: device_id.clone(),
        tx_power_dbm: params.tx_power_dbm,
        received: samples.len(),
        missing,
        rssi_min,
        rssi_max,
        rssi_avg,
        packet_loss_pct: packet_loss_pct(samples.len(), params.num_packets),
        distances: ILLUSTRATIVE_EXPONENTS.map(|n| model.estimate_with(tx, rssi_avg, n)),
        distance_configured: model.estimate(tx, rssi_avg),
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "No test results yet");
        }
        let rule = "=".repeat(100);
        writeln!(f, "\n{}", rule)?;
        writeln!(f, "TEST RESULTS TABLE ({} packets per device)", self.num_packets)?;
        writeln!(f, "{}", rule)?;
        write!(
            f,
            "\n| Device       | TX Power | RSSI Min | RSSI Max | RSSI Avg |  Loss % | Missing |"
        )?;
        for n in ILLUSTRATIVE_EXPONENTS {
            write!(f, " Dist(n={}) |", n)?;
        }
        writeln!(f, " Dist(n={}) |", self.model.path_loss_exponent)?;
        write!(
            f,
            "|--------------|----------|----------|----------|----------|---------|---------|"
        )?;
        for _ in 0..=ILLUSTRATIVE_EXPONENTS.len() {
            write!(f, "-----------|")?;
        }
        writeln!(f)?;

        for r in &self.rows {
            write!(
                f,
                "| {:<12} | {:>6}dB | {:>8.1} | {:>8.1} | {:>8.1} | {:>6.1}% | {:>7} |",
                r.device_id.as_str(),
                r.tx_power_dbm,
                r.rssi_min,
                r.rssi_max,
                r.rssi_avg,
                r.packet_loss_pct,
                r.missing
            )?;
            for d in r.distances {
                write!(f, " {:>8.1}m |", d)?;
            }
            writeln!(f, " {:>8.1}m |", r.distance_configured)?;
        }

        writeln!(f, "\nDistance calculation parameters:")?;
        writeln!(f, "  A (signal @ 1m): {}dB", self.model.reference_rssi_at_1m)?;
        writeln!(f, "  n (path-loss exponent): {}", self.model.path_loss_exponent)?;
        writeln!(f, "{}", rule)
    }
}
