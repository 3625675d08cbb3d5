use tracing::warn;

use super::decode_base64;
use super::Cursor;
use crate::device::Device;
use crate::device::DeviceType;
use crate::device::Room;
use crate::error::DecodeError;

/// One `M:<index>,<count>,<base64>` line.
#[derive(Debug, PartialEq)]
pub(super) struct MetadataPart<'a> {
    pub index: u8,
    pub count: u8,
    pub payload: &'a str,
}

pub(super) fn parse_part(body: &str) -> Result<MetadataPart<'_>, DecodeError> {
    let malformed = |reason: &str| DecodeError::Malformed {
        record: 'M',
        reason: reason.to_string(),
    };

    let mut fields = body.splitn(3, ',');
    let index = fields.next().ok_or_else(|| malformed("missing index"))?;
    let count = fields.next().ok_or_else(|| malformed("missing part count"))?;
    let payload = fields.next().ok_or_else(|| malformed("missing payload"))?;

    let index = u8::from_str_radix(index.trim(), 16).map_err(|_| malformed("bad index"))?;
    let count = u8::from_str_radix(count.trim(), 16).map_err(|_| malformed("bad part count"))?;

    Ok(MetadataPart {
        index,
        count,
        payload,
    })
}

/// Concatenate the decoded bytes of all metadata parts in index order.
pub(super) fn assemble(mut parts: Vec<MetadataPart<'_>>) -> Result<Vec<u8>, DecodeError> {
    parts.sort_by_key(|p| p.index);
    parts.dedup_by_key(|p| p.index);

    if let Some(expected) = parts.first().map(|p| p.count) {
        if parts.len() != expected as usize {
            warn!(
                "Metadata announced {} parts but {} arrived",
                expected,
                parts.len()
            );
        }
    }

    let mut data = Vec::new();
    for part in parts {
        data.extend(decode_base64('M', part.payload)?);
    }
    Ok(data)
}

/// Decode the room table and device directory.
///
/// Records are back to back without per-record framing, so the first
/// truncated record ends decoding; everything before it is kept.
pub(super) fn decode_metadata(data: &[u8]) -> Result<(Vec<Room>, Vec<Device>), DecodeError> {
    let mut cursor = Cursor::new(data);
    cursor.take(2, "metadata header")?;
    let room_count = cursor.u8("room count")?;

    let mut rooms = Vec::with_capacity(room_count as usize);
    for _ in 0..room_count {
        match decode_room(&mut cursor) {
            Ok(room) => rooms.push(room),
            Err(e) => {
                warn!("Skipping truncated room record: {}", e);
                return Ok((rooms, Vec::new()));
            }
        }
    }

    let device_count = match cursor.u8("device count") {
        Ok(count) => count,
        Err(e) => {
            warn!("Metadata has no device directory: {}", e);
            return Ok((rooms, Vec::new()));
        }
    };

    let mut devices = Vec::with_capacity(device_count as usize);
    for _ in 0..device_count {
        match decode_device(&mut cursor) {
            Ok(device) => devices.push(device),
            Err(e) => {
                warn!("Skipping truncated device record: {}", e);
                break;
            }
        }
    }

    Ok((rooms, devices))
}

fn decode_room(cursor: &mut Cursor<'_>) -> Result<Room, DecodeError> {
    let id = cursor.u8("room id")?;
    let name = cursor.short_string("room name")?;
    let rf_address = cursor.rf_address("room group address")?;
    Ok(Room {
        id,
        name,
        rf_address: Some(rf_address),
    })
}

fn decode_device(cursor: &mut Cursor<'_>) -> Result<Device, DecodeError> {
    let device_type = DeviceType::from(cursor.u8("device type")?);
    let rf_address = cursor.rf_address("device address")?;
    let serial = String::from_utf8_lossy(cursor.take(10, "device serial")?).into_owned();
    let name = cursor.short_string("device name")?;
    let room_id = cursor.u8("device room")?;

    let mut device = Device::new(rf_address, Some(device_type));
    device.serial = Some(serial);
    device.name = Some(name);
    device.room_id = Some(room_id);
    Ok(device)
}
