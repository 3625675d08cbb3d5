use crate::device::CubeInfo;
use crate::error::DecodeError;

/// Parse the body of an `H:` line:
/// `<serial>,<rf address>,<firmware>,...` (remaining fields ignored).
pub(super) fn parse_hello(body: &str) -> Result<CubeInfo, DecodeError> {
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(DecodeError::Malformed {
            record: 'H',
            reason: format!("expected at least 3 fields, got {}", fields.len()),
        });
    }

    let serial = Some(fields[0]).filter(|s| !s.is_empty()).map(str::to_string);
    let rf_address = Some(fields[1].parse()?);

    // "0113" is firmware 1.13
    let firmware = fields[2];
    let firmware_version = if firmware.len() == 4 && firmware.is_ascii() {
        Some(format!("{}.{}", &firmware[..2], &firmware[2..]))
    } else if firmware.is_empty() {
        None
    } else {
        Some(firmware.to_string())
    };

    Ok(CubeInfo {
        serial,
        rf_address,
        firmware_version,
    })
}
