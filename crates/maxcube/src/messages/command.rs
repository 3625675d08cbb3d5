use base64::Engine as _;

use super::CUBE_BASE64;
use crate::device::Mode;
use crate::device::RfAddress;
use crate::error::CommandError;

/// Request the live state of every device.
pub const LIST_COMMAND: &str = "l:\r\n";

/// Fixed prefix of a set-temperature/mode packet.
const SET_HEADER: [u8; 6] = [0x00, 0x04, 0x40, 0x00, 0x00, 0x00];

const MAX_TEMPERATURE: f64 = 31.5;

/// Two-character room code used in write commands.
///
/// No room is `"00"`; ids below 10 are zero-padded and larger ones are used
/// as-is.
pub fn room_code(room_id: Option<u8>) -> String {
    match room_id {
        None => "00".to_string(),
        Some(id) => format!("{:02}", id),
    }
}

/// Encode an `s:` line setting `temperature` and `mode` on one device.
///
/// The temperature is truncated to half-degree resolution.
pub fn encode_set_command(
    rf_address: RfAddress,
    room_id: Option<u8>,
    temperature: f64,
    mode: Mode,
) -> Result<String, CommandError> {
    if !temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(CommandError::InvalidArgument(format!(
            "temperature {} outside 0.0..={}",
            temperature, MAX_TEMPERATURE
        )));
    }

    // The Cube reads the decimal room code as a hex byte.
    let code = room_code(room_id);
    let room = match u8::from_str_radix(&code, 16) {
        Ok(room) if code.len() == 2 => room,
        _ => {
            return Err(CommandError::InvalidArgument(format!(
                "room id {} does not fit a two-digit room code",
                code
            )));
        }
    };

    let half_degrees = (temperature * 2.0).floor() as u8;
    let mut packet = Vec::with_capacity(SET_HEADER.len() + 5);
    packet.extend_from_slice(&SET_HEADER);
    packet.extend_from_slice(&rf_address.as_bytes());
    packet.push(room);
    packet.push(half_degrees | (mode.bits() << 6));

    Ok(format!("s:{}\r\n", CUBE_BASE64.encode(packet)))
}

/// Decoded `S:` acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub duty_cycle: u8,
    pub result: u8,
    pub free_slots: u8,
}

/// Parse an `S:<duty cycle>,<result>,<free slots>` line (with or without the
/// `S:` prefix). A non-zero result becomes [`CommandError::Rejected`].
pub fn parse_ack(line: &str) -> Result<Ack, CommandError> {
    let bad = || CommandError::BadAcknowledgement(line.trim().to_string());

    let body = line.trim();
    let body = body.strip_prefix("S:").unwrap_or(body);
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    let [duty_cycle, result, free_slots] = fields.as_slice() else {
        return Err(bad());
    };

    let ack = Ack {
        duty_cycle: u8::from_str_radix(duty_cycle, 16).map_err(|_| bad())?,
        result: u8::from_str_radix(result, 16).map_err(|_| bad())?,
        free_slots: u8::from_str_radix(free_slots, 16).map_err(|_| bad())?,
    };
    if ack.result != 0 {
        return Err(CommandError::Rejected(ack.result));
    }
    Ok(ack)
}
