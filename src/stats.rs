use log::info;
use std::time::Instant;

/// Running counters for the beacon listener.
#[derive(Debug, Clone)]
pub struct Stats {
    pub ok: u64,
    pub bad: u64,
    pub lost: u64,
    pub resets: u64,
    pub duplicates: u64,
    rssi_min: f32,
    rssi_max: f32,
    rssi_sum: f64,
    last: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            ok: 0,
            bad: 0,
            lost: 0,
            resets: 0,
            duplicates: 0,
            rssi_min: f32::INFINITY,
            rssi_max: f32::NEG_INFINITY,
            rssi_sum: 0.0,
            last: Instant::now(),
        }
    }
    pub fn inc_ok(&mut self, rssi: f32) {
        self.ok += 1;
        self.rssi_min = self.rssi_min.min(rssi);
        self.rssi_max = self.rssi_max.max(rssi);
        self.rssi_sum += f64::from(rssi);
    }
    pub fn inc_bad(&mut self) {
        self.bad += 1;
    }
    pub fn add_lost(&mut self, n: u64) {
        self.lost += n;
    }
    pub fn inc_reset(&mut self) {
        self.resets += 1;
    }
    pub fn inc_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn rssi_avg(&self) -> Option<f32> {
        (self.ok > 0).then(|| (self.rssi_sum / self.ok as f64) as f32)
    }

    /// Share of expected beacons that never arrived, in percent.
    pub fn loss_pct(&self) -> f64 {
        let expected = self.ok + self.lost;
        if expected == 0 {
            return 0.0;
        }
        100.0 * self.lost as f64 / expected as f64
    }

    pub fn maybe_print(&mut self, stats_int: f64) {
        if self.last.elapsed().as_secs_f64() >= stats_int {
            self.print();
            self.last = Instant::now();
        }
    }

    pub fn print(&self) {
        match self.rssi_avg() {
            Some(avg) => info!(
                "[listen] ok={} bad={} lost={} ({:.1}%) resets={} dups={} rssi min/avg/max={:.1}/{:.1}/{:.1}",
                self.ok,
                self.bad,
                self.lost,
                self.loss_pct(),
                self.resets,
                self.duplicates,
                self.rssi_min,
                avg,
                self.rssi_max
            ),
            None => info!("[listen] no beacons yet (bad={})", self.bad),
        }
    }
}
