// src/proto/codec.rs
use std::str::FromStr;

use thiserror::Error;

use super::message::{DeviceId, Message};

const TAG_RUN_TEST: &str = "R";
const TAG_RUN_TEST_RESPONSE: &str = "RR";
const TAG_INFO: &str = "I";
const TAG_INFO_RESPONSE: &str = "IR";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("empty payload")]
    Empty,
    #[error("unknown tag: {0}")]
    UnknownTag(String),
    #[error("{tag}: expected {expected} fields, got {got}")]
    FieldCount {
        tag: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid value for {field}: {value}")]
    BadField { field: &'static str, value: String },
    #[error("invalid device id: {0}")]
    BadDeviceId(String),
}

/// Public API: serialize a message into its colon-delimited wire form.
pub fn encode(msg: &Message) -> Vec<u8> {
    use Message::*;
    let mut out = String::new();

    macro_rules! push_field {
        ($v:expr) => {{
            out.push(':');
            out.push_str(&$v.to_string());
        }};
    }

    match msg {
        RunTestRequest {
            num_packets,
            delay_ms,
            stagger_ms,
            high_power,
            tx_power_dbm,
        } => {
            out.push_str(TAG_RUN_TEST);
            push_field!(num_packets);
            push_field!(delay_ms);
            push_field!(stagger_ms);
            push_field!(bool_to_str(*high_power));
            push_field!(tx_power_dbm);
        }
        RunTestResponse {
            device_id,
            packet_sequence,
        } => {
            out.push_str(TAG_RUN_TEST_RESPONSE);
            push_field!(device_id);
            push_field!(packet_sequence);
        }
        InfoRequest => out.push_str(TAG_INFO),
        InfoResponse {
            device_id,
            high_power,
            tx_power_dbm,
            temperature_c,
            frequency_mhz,
            bitrate_kbps,
            frequency_deviation_hz,
        } => {
            out.push_str(TAG_INFO_RESPONSE);
            push_field!(device_id);
            push_field!(bool_to_str(*high_power));
            push_field!(tx_power_dbm);
            push_field!(temperature_c);
            push_field!(frequency_mhz);
            push_field!(bitrate_kbps);
            push_field!(frequency_deviation_hz);
        }
    }

    out.into_bytes()
}

/// Public API: parse a received payload. Any bad token rejects the whole
/// message.
pub fn decode(payload: &[u8]) -> Result<Message, MalformedMessage> {
    let text = std::str::from_utf8(payload).map_err(|_| MalformedMessage::NotUtf8)?;
    if text.is_empty() {
        return Err(MalformedMessage::Empty);
    }

    let mut parts = text.split(':');
    let tag = parts.next().unwrap_or_default();
    let fields: Vec<&str> = parts.collect();

    use Message::*;

    match tag {
        TAG_RUN_TEST => {
            expect_fields(TAG_RUN_TEST, &fields, 5)?;
            Ok(RunTestRequest {
                num_packets: req_num(fields[0], "num_packets")?,
                delay_ms: req_num(fields[1], "delay_ms")?,
                stagger_ms: req_num(fields[2], "stagger_ms")?,
                high_power: req_bool(fields[3], "high_power")?,
                tx_power_dbm: req_num(fields[4], "tx_power_dbm")?,
            })
        }
        TAG_RUN_TEST_RESPONSE => {
            expect_fields(TAG_RUN_TEST_RESPONSE, &fields, 2)?;
            Ok(RunTestResponse {
                device_id: req_device_id(fields[0])?,
                packet_sequence: req_num(fields[1], "packet_sequence")?,
            })
        }
        TAG_INFO => {
            expect_fields(TAG_INFO, &fields, 0)?;
            Ok(InfoRequest)
        }
        TAG_INFO_RESPONSE => {
            expect_fields(TAG_INFO_RESPONSE, &fields, 7)?;
            Ok(InfoResponse {
                device_id: req_device_id(fields[0])?,
                high_power: req_bool(fields[1], "high_power")?,
                tx_power_dbm: req_num(fields[2], "tx_power_dbm")?,
                temperature_c: req_num(fields[3], "temperature_c")?,
                frequency_mhz: req_num(fields[4], "frequency_mhz")?,
                bitrate_kbps: req_num(fields[5], "bitrate_kbps")?,
                frequency_deviation_hz: req_num(fields[6], "frequency_deviation_hz")?,
            })
        }
        _ => Err(MalformedMessage::UnknownTag(tag.to_string())),
    }
}

/* ---------- helpers ---------- */

fn expect_fields(
    tag: &'static str,
    fields: &[&str],
    expected: usize,
) -> Result<(), MalformedMessage> {
    if fields.len() != expected {
        return Err(MalformedMessage::FieldCount {
            tag,
            expected,
            got: fields.len(),
        });
    }
    Ok(())
}

fn req_num<T: FromStr>(v: &str, field: &'static str) -> Result<T, MalformedMessage> {
    v.parse::<T>().map_err(|_| MalformedMessage::BadField {
        field,
        value: v.to_string(),
    })
}

fn req_bool(v: &str, field: &'static str) -> Result<bool, MalformedMessage> {
    match v {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(MalformedMessage::BadField {
            field,
            value: v.to_string(),
        }),
    }
}

fn req_device_id(v: &str) -> Result<DeviceId, MalformedMessage> {
    DeviceId::new(v).map_err(|_| MalformedMessage::BadDeviceId(v.to_string()))
}

fn bool_to_str(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

/* ---------- tests ---------- */
