//! Decoding of Cube responses and encoding of commands.
//!
//! A response is a run of CRLF-terminated lines, each `<T>:<body>` where `T`
//! is a one-letter record type:
//! - `H`: hello, the Cube's own identity
//! - `M`: metadata, the room table and device directory (base64)
//! - `C`: per-device configuration (base64)
//! - `L`: live device state (base64)
//! - `S`: command acknowledgement
//!
//! Anything else (`F:` NTP servers, ...) is ignored.

mod command;
mod config;
mod hello;
mod live;
mod metadata;

use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::GeneralPurpose;
use base64::engine::GeneralPurposeConfig;
use base64::Engine as _;
use tracing::debug;
use tracing::warn;

pub use command::encode_set_command;
pub use command::parse_ack;
pub use command::room_code;
pub use command::Ack;
pub use command::LIST_COMMAND;
pub use config::DeviceConfig;
pub use config::Setpoints;

use crate::device::RfAddress;
use crate::device::Snapshot;
use crate::error::DecodeError;
use crate::error::UpdateError;

/// Standard alphabet; the Cube's padding is not always reliable.
pub(crate) const CUBE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub(crate) fn decode_base64(record: char, payload: &str) -> Result<Vec<u8>, DecodeError> {
    CUBE_BASE64
        .decode(payload.trim())
        .map_err(|source| DecodeError::Base64 { record, source })
}

/// Split a response into `(type, body)` pairs, skipping blank lines and
/// lines without a one-letter type prefix.
pub fn records(payload: &str) -> impl Iterator<Item = (char, &str)> {
    payload.lines().filter_map(|line| {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return None;
        }
        let (tag, body) = line.split_once(':')?;
        let mut chars = tag.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some((c, body)),
            _ => {
                debug!("Ignoring unrecognised line {:?}", line);
                None
            }
        }
    })
}

/// Decode a full Cube response (greeting plus any `l:` reply) into a fresh
/// snapshot.
///
/// The device directory must be present and readable; individual bad room,
/// device, configuration or live-state records are logged and skipped.
/// When several `L:` lines are present the last one wins.
pub fn decode_response(payload: &str) -> Result<Snapshot, UpdateError> {
    let mut snapshot = Snapshot::default();
    let mut metadata_parts = Vec::new();
    let mut configs = Vec::new();
    let mut live = None;

    for (record, body) in records(payload) {
        match record {
            'H' => match hello::parse_hello(body) {
                Ok(cube) => snapshot.cube = cube,
                Err(e) => warn!("Skipping hello line: {}", e),
            },
            'M' => match metadata::parse_part(body) {
                Ok(part) => metadata_parts.push(part),
                Err(e) => warn!("Skipping metadata line: {}", e),
            },
            'C' => configs.push(body),
            'L' => live = Some(body),
            other => debug!("Ignoring {}: line", other),
        }
    }

    if metadata_parts.is_empty() {
        return Err(UpdateError::MissingRecord('M'));
    }
    let directory = metadata::assemble(metadata_parts)?;
    let (rooms, mut devices) = metadata::decode_metadata(&directory)?;

    for body in configs {
        match config::parse_config(body) {
            Ok(cfg) => match devices.iter_mut().find(|d| d.rf_address == cfg.rf_address) {
                Some(device) => config::apply_config(device, &cfg),
                None => debug!("Configuration for unknown device {}", cfg.rf_address),
            },
            Err(e) => warn!("Skipping configuration line: {}", e),
        }
    }

    match live {
        Some(body) => {
            if let Err(e) = live::decode_live(body, &mut devices) {
                warn!("Skipping live state line: {}", e);
            }
        }
        None => warn!("Cube response carried no live state"),
    }

    debug!(
        "Decoded {} rooms and {} devices",
        rooms.len(),
        devices.len()
    );
    snapshot.rooms = rooms;
    snapshot.devices = devices;
    Ok(snapshot)
}

/// Bounds-checked reader over a decoded record.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                what,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn rf_address(&mut self, what: &'static str) -> Result<RfAddress, DecodeError> {
        let bytes = self.take(3, what)?;
        Ok(RfAddress::new([bytes[0], bytes[1], bytes[2]]))
    }

    /// A `u8` length followed by that many bytes, decoded lossily.
    pub(crate) fn short_string(&mut self, what: &'static str) -> Result<String, DecodeError> {
        let len = self.u8(what)? as usize;
        let bytes = self.take(len, what)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
