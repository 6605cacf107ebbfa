use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Duration;

use crate::cli::PingOpts;
use crate::frame::build_ping;
use crate::link::serial::SerialLink;
use crate::link::{LinkError, RadioLink};

pub fn run(opts: PingOpts) -> Result<()> {
    let mut link = SerialLink::open(&opts.ser)?;
    let gap = Duration::from_millis(opts.delay_ms);

    info!(
        "[ping] dev={} baud={} delay={}ms count={:?}",
        opts.ser.dev, opts.ser.baud, opts.delay_ms, opts.count
    );

    let (sent, failed) = beacon(&mut link, gap, opts.count).context("ping transmit")?;
    info!("[ping] done: sent={} failed={}", sent, failed);
    Ok(())
}

/// Sends numbered beacons until `count` is reached (forever when `None`).
/// Returns (sent, timed out).
fn beacon<L: RadioLink>(
    link: &mut L,
    gap: Duration,
    count: Option<u64>,
) -> Result<(u64, u64), LinkError> {
    let mut seq: u64 = 0;
    let mut failed: u64 = 0;

    loop {
        if let Some(max) = count
            && seq >= max
        {
            break;
        }
        match link.transmit(&build_ping(seq)) {
            Ok(()) => debug!("[ping] sent {}", seq),
            Err(LinkError::SendTimeout) => {
                failed += 1;
                warn!("[ping] send timeout on {}", seq);
            }
            Err(e) => return Err(e),
        }
        if !gap.is_zero() {
            std::thread::sleep(gap);
        }
        seq = seq.wrapping_add(1);
    }

    Ok((seq - failed, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::parse_ping;
    use crate::link::memory::MemoryLink;

    #[test]
    fn sends_numbered_beacons() {
        let mut link = MemoryLink::new();
        link.failing_transmits = 1;
        let (sent, failed) = beacon(&mut link, Duration::ZERO, Some(4)).unwrap();
        assert_eq!((sent, failed), (3, 1));
        let seqs: Vec<u64> = link.outbox.iter().map(|p| parse_ping(p).unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }
}
