use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Duration;

use crate::cli::ListenOpts;
use crate::frame::parse_ping;
use crate::link::RadioLink;
use crate::link::serial::SerialLink;
use crate::stats::Stats;

pub fn run(opts: ListenOpts) -> Result<()> {
    debug!("listen: {:?}", opts);
    let mut link = SerialLink::open(&opts.ser)?;
    let poll = Duration::from_millis(opts.poll_ms);

    let mut stats = Stats::new();
    let mut last: Option<u64> = None;

    info!("[listen] waiting for ping beacons on {}", opts.ser.dev);

    loop {
        let received = link.receive(poll).context("radio receive")?;
        if let Some(payload) = received {
            let rssi = link.last_signal_strength();
            match parse_ping(&payload) {
                Ok(seq) => {
                    observe(&mut stats, &mut last, seq, rssi);
                    info!("[listen] received {} with RSSI: {}", seq, rssi);
                }
                Err(err) => {
                    stats.inc_bad();
                    warn!(
                        "[listen] unknown format: {} payload={:?} RSSI: {}",
                        err,
                        String::from_utf8_lossy(&payload),
                        rssi
                    );
                }
            }
        }

        stats.maybe_print(opts.stats);
    }
}

/// Folds one beacon into the counters. A sequence going backwards means
/// the transmitter restarted, not that packets were lost.
fn observe(stats: &mut Stats, last: &mut Option<u64>, seq: u64, rssi: f32) {
    stats.inc_ok(rssi);
    if let Some(prev) = *last {
        if seq < prev {
            stats.inc_reset();
            warn!("[listen] transmitter sequence reset ({} -> {})", prev, seq);
        } else if seq == prev {
            stats.inc_duplicate();
        } else if seq > prev + 1 {
            let lost = seq - prev - 1;
            stats.add_lost(lost);
            warn!("[listen] lost {} packets", lost);
        }
    }
    *last = Some(seq);
}
