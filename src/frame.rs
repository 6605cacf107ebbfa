//! Line framing spoken with the serial radio bridge.
//!
//! Every line is `@@ <KIND> KEY=VALUE ... ##`. Radio payloads travel as
//! hex with an additive checksum since the radio side is lossy and the
//! UART side is not trusted either.

use anyhow::{Context, Result, bail};
use std::fmt::Write;

use crate::link::Telemetry;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeLine {
    Rx { rssi: f32, payload: Vec<u8> },
    TxOk,
    TxErr,
    Stat(Telemetry),
}

pub fn hexsum(payload_hex: &str) -> Result<u8> {
    Ok(decode_hex(payload_hex)?
        .iter()
        .fold(0u8, |sum, b| sum.wrapping_add(*b)))
}

fn decode_hex(payload_hex: &str) -> Result<Vec<u8>> {
    if payload_hex.len() % 2 != 0 {
        bail!("odd hex length");
    }
    if !payload_hex.is_ascii() {
        bail!("non-ascii PAY");
    }
    (0..payload_hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&payload_hex[i..i + 2], 16).context("bad hex in PAY"))
        .collect()
}

fn encode_hex(payload: &[u8]) -> (String, u8) {
    let mut sum: u8 = 0;
    let mut s = String::with_capacity(2 * payload.len());
    for b in payload {
        sum = sum.wrapping_add(*b);
        let _ = write!(s, "{:02X}", b);
    }
    (s, sum)
}

pub fn build_tx(payload: &[u8]) -> String {
    let (hex, sum) = encode_hex(payload);
    format!("@@ TX LEN={} PAY={} SUM={:02X} ##", payload.len(), hex, sum)
}

pub fn build_cfg_power(dbm: i8) -> String {
    format!("@@ CFG POW={} ##", dbm)
}

pub fn build_cfg_high_power(enabled: bool) -> String {
    format!("@@ CFG HP={} ##", u8::from(enabled))
}

pub fn build_stat_query() -> String {
    "@@ STAT ##".to_string()
}

/// Payload of a stand-alone link check beacon.
pub fn build_ping(seq: u64) -> Vec<u8> {
    format!("Ping {}", seq).into_bytes()
}

pub fn parse_ping(payload: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(payload).context("ping is not utf-8")?;
    let seq = text
        .strip_prefix("Ping ")
        .ok_or_else(|| anyhow::anyhow!("not a ping"))?;
    seq.parse::<u64>().context("bad ping sequence")
}

pub fn parse_line(line: &str) -> Result<BridgeLine> {
    let body = line
        .trim()
        .strip_prefix("@@")
        .and_then(|s| s.strip_suffix("##"))
        .ok_or_else(|| anyhow::anyhow!("missing @@/## markers"))?;
    let mut tokens = body.split_whitespace();
    let kind = tokens.next().ok_or_else(|| anyhow::anyhow!("no kind"))?;

    match kind {
        "TXOK" => Ok(BridgeLine::TxOk),
        "TXERR" => Ok(BridgeLine::TxErr),
        "RX" => parse_rx(tokens),
        "STAT" => parse_stat(tokens),
        other => bail!("unknown bridge line kind {}", other),
    }
}

fn parse_rx<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<BridgeLine> {
    let mut rssi = None;
    let mut len = None;
    let mut pay = None;
    let mut sum = None;
    for tok in tokens {
        if let Some(v) = tok.strip_prefix("RSSI=") {
            rssi = Some(v.parse::<f32>().context("bad RSSI")?)
        } else if let Some(v) = tok.strip_prefix("LEN=") {
            len = Some(v.parse::<usize>().context("bad LEN")?)
        } else if let Some(v) = tok.strip_prefix("PAY=") {
            pay = Some(v)
        } else if let Some(v) = tok.strip_prefix("SUM=") {
            sum = Some(u8::from_str_radix(v, 16).context("bad SUM")?)
        }
    }
    let (rssi, len, pay, sumrx) = (
        rssi.ok_or_else(|| anyhow::anyhow!("no RSSI"))?,
        len.ok_or_else(|| anyhow::anyhow!("no LEN"))?,
        pay.ok_or_else(|| anyhow::anyhow!("no PAY"))?,
        sum.ok_or_else(|| anyhow::anyhow!("no SUM"))?,
    );
    if len.checked_mul(2) != Some(pay.len()) {
        bail!("len mismatch");
    }
    let calc = hexsum(pay)?;
    if calc != sumrx {
        bail!("checksum {:02X}!={:02X}", calc, sumrx);
    }
    Ok(BridgeLine::Rx {
        rssi,
        payload: decode_hex(pay)?,
    })
}

fn parse_stat<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<BridgeLine> {
    let mut temp = None;
    let mut freq = None;
    let mut br = None;
    let mut fdev = None;
    let mut pow = None;
    let mut hp = None;
    for tok in tokens {
        if let Some(v) = tok.strip_prefix("TEMP=") {
            temp = Some(v.parse::<f32>().context("bad TEMP")?)
        } else if let Some(v) = tok.strip_prefix("FREQ=") {
            freq = Some(v.parse::<f32>().context("bad FREQ")?)
        } else if let Some(v) = tok.strip_prefix("BR=") {
            br = Some(v.parse::<f32>().context("bad BR")?)
        } else if let Some(v) = tok.strip_prefix("FDEV=") {
            fdev = Some(v.parse::<f32>().context("bad FDEV")?)
        } else if let Some(v) = tok.strip_prefix("POW=") {
            pow = Some(v.parse::<i8>().context("bad POW")?)
        } else if let Some(v) = tok.strip_prefix("HP=") {
            hp = Some(match v {
                "0" => false,
                "1" => true,
                _ => bail!("bad HP {}", v),
            })
        }
    }
    Ok(BridgeLine::Stat(Telemetry {
        temperature_c: temp.ok_or_else(|| anyhow::anyhow!("no TEMP"))?,
        frequency_mhz: freq.ok_or_else(|| anyhow::anyhow!("no FREQ"))?,
        bitrate_kbps: br.ok_or_else(|| anyhow::anyhow!("no BR"))?,
        frequency_deviation_hz: fdev.ok_or_else(|| anyhow::anyhow!("no FDEV"))?,
        tx_power_dbm: pow.ok_or_else(|| anyhow::anyhow!("no POW"))?,
        high_power: hp.ok_or_else(|| anyhow::anyhow!("no HP"))?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_line_carries_checksum() {
        let line = build_tx(b"RR:AB:1");
        assert_eq!(line, "@@ TX LEN=7 PAY=52523A41423A31 SUM=CC ##");
        assert_eq!(hexsum("52523A41423A31").unwrap(), 0xCC);
    }

    #[test]
    fn parses_rx_line() {
        let line = "@@ RX RSSI=-71.5 LEN=3 PAY=414243 SUM=C6 ##\r\n";
        match parse_line(line).unwrap() {
            BridgeLine::Rx { rssi, payload } => {
                assert_eq!(rssi, -71.5);
                assert_eq!(payload, b"ABC");
            }
            other => panic!("wrong line {:?}", other),
        }
    }

    #[test]
    fn rejects_corrupt_rx_line() {
        assert!(parse_line("@@ RX RSSI=-70 LEN=3 PAY=414243 SUM=C7 ##").is_err());
        assert!(parse_line("@@ RX RSSI=-70 LEN=2 PAY=414243 SUM=C6 ##").is_err());
        assert!(parse_line("@@ RX LEN=3 PAY=414243 SUM=C6 ##").is_err());
        assert!(parse_line("RX RSSI=-70 LEN=3 PAY=414243 SUM=C6").is_err());
        assert!(parse_line("@@ HELLO ##").is_err());
    }

    #[test]
    fn huge_len_is_rejected_not_overflowed() {
        let line = format!("@@ RX RSSI=-70 LEN={} PAY=41 SUM=41 ##", usize::MAX);
        assert!(parse_line(&line).is_err());
        let line = format!("@@ RX RSSI=-70 LEN={} PAY=41 SUM=41 ##", usize::MAX / 2 + 1);
        assert!(parse_line(&line).is_err());
    }

    #[test]
    fn parses_stat_line() {
        let line = "@@ STAT TEMP=23.5 FREQ=915 BR=250 FDEV=19200 POW=13 HP=1 ##";
        let expected = Telemetry {
            temperature_c: 23.5,
            frequency_mhz: 915.0,
            bitrate_kbps: 250.0,
            frequency_deviation_hz: 19200.0,
            tx_power_dbm: 13,
            high_power: true,
        };
        assert_eq!(parse_line(line).unwrap(), BridgeLine::Stat(expected));
        assert_eq!(parse_line("@@ TXOK ##").unwrap(), BridgeLine::TxOk);
        assert_eq!(parse_line("@@ TXERR ##").unwrap(), BridgeLine::TxErr);
    }

    #[test]
    fn ping_payloads() {
        assert_eq!(build_ping(42), b"Ping 42");
        assert_eq!(parse_ping(b"Ping 42").unwrap(), 42);
        assert!(parse_ping(b"Ping x").is_err());
        assert!(parse_ping(b"RR:AABBCC:1").is_err());
    }

    #[test]
    fn config_lines() {
        assert_eq!(build_cfg_power(-2), "@@ CFG POW=-2 ##");
        assert_eq!(build_cfg_high_power(true), "@@ CFG HP=1 ##");
        assert_eq!(build_stat_query(), "@@ STAT ##");
    }
}
