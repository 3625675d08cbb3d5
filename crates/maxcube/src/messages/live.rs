use tracing::debug;
use tracing::warn;

use super::decode_base64;
use crate::device::Device;
use crate::device::DeviceState;
use crate::device::Mode;
use crate::device::RfAddress;
use crate::error::DecodeError;

const BASE_LEN: usize = 6;
const THERMOSTAT_LEN: usize = 10;
const WALL_THERMOSTAT_LEN: usize = 12;

const BATTERY_LOW: u8 = 0x80;

/// Decode an `L:` body and apply each record to the matching device.
///
/// The body is a run of `{len, record[len]}` entries. A record too short for
/// its device's kind is skipped; a record running past the end of the buffer
/// ends decoding. Records for addresses not in `devices` are ignored.
pub(super) fn decode_live(body: &str, devices: &mut [Device]) -> Result<(), DecodeError> {
    let data = decode_base64('L', body)?;
    let mut pos = 0;

    while pos < data.len() {
        let len = data[pos] as usize;
        pos += 1;
        let Some(record) = data.get(pos..pos + len) else {
            warn!(
                "Live state record at offset {} overruns payload ({} bytes declared, {} left)",
                pos - 1,
                len,
                data.len() - pos
            );
            break;
        };
        pos += len;

        let Some(rf_address) = RfAddress::from_slice(record) else {
            warn!("Skipping live state record too short for an address");
            continue;
        };
        let Some(device) = devices.iter_mut().find(|d| d.rf_address == rf_address) else {
            debug!("Live state for unknown device {}", rf_address);
            continue;
        };

        if let Err(e) = apply_record(device, record) {
            warn!("Skipping live state for {}: {}", rf_address, e);
        }
    }

    Ok(())
}

/// Record offsets: `[0..3]` address, `[4]` flags, `[5]` flags (battery,
/// mode or open state), `[6]` valve, `[7]` setpoint, `[8..10]` actual
/// temperature, `[11]` wall thermostat actual temperature.
fn apply_record(device: &mut Device, record: &[u8]) -> Result<(), DecodeError> {
    let needed = match device.state {
        DeviceState::Thermostat(_) => THERMOSTAT_LEN,
        DeviceState::WallThermostat(_) => WALL_THERMOSTAT_LEN,
        DeviceState::WindowShutter(_) | DeviceState::Generic => BASE_LEN,
    };
    if record.len() < needed {
        return Err(DecodeError::Truncated {
            what: "live state record",
            needed,
            available: record.len(),
        });
    }

    let flags = record[5];
    device.battery_low = Some(flags & BATTERY_LOW != 0);

    match &mut device.state {
        DeviceState::Thermostat(t) => {
            let mode = Mode::from_bits(flags);
            t.mode = Some(mode);
            t.valve_position = Some(record[6]);
            t.target_temperature = Some(f64::from(record[7] & 0x7f) / 2.0);
            // In vacation and boost these bytes hold an end date instead.
            t.actual_temperature = match mode {
                Mode::Auto | Mode::Manual => {
                    let raw = u16::from_be_bytes([record[8], record[9]]);
                    (raw != 0).then(|| f64::from(raw) / 10.0)
                }
                Mode::Vacation | Mode::Boost => None,
            };
        }
        DeviceState::WallThermostat(w) => {
            w.mode = Some(Mode::from_bits(flags));
            w.target_temperature = Some(f64::from(record[7] & 0x7f) / 2.0);
            let raw = (u16::from(record[7] & 0x80) << 1) | u16::from(record[11]);
            w.actual_temperature = Some(f64::from(raw) / 10.0);
        }
        DeviceState::WindowShutter(s) => {
            s.is_open = Some(flags & 0x03 != 0);
        }
        DeviceState::Generic => {}
    }

    Ok(())
}
