//! Device and room model.
//!
//! Every field the Cube reports is optional: a device discovered from the
//! metadata directory carries nothing but its address until a live-state
//! record for it has been decoded.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::Serializer;

use crate::error::DecodeError;

/// Three-byte radio address, the primary key of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RfAddress([u8; 3]);

impl RfAddress {
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Read an address from the first three bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 3] = bytes.get(..3)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for RfAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for RfAddress {
    type Err = DecodeError;

    /// Parses six hex digits, case-insensitive (e.g. `"0a1B2c"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecodeError::InvalidAddress(s.to_string());
        if s.len() != 6 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 3];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for RfAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Device kind byte from the Cube's metadata directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Cube,
    HeaterThermostat,
    HeaterThermostatPlus,
    WallThermostat,
    ShutterContact,
    EcoSwitch,
    Unknown(u8),
}

impl From<u8> for DeviceType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Cube,
            1 => Self::HeaterThermostat,
            2 => Self::HeaterThermostatPlus,
            3 => Self::WallThermostat,
            4 => Self::ShutterContact,
            5 => Self::EcoSwitch,
            other => Self::Unknown(other),
        }
    }
}

/// Thermostat operating mode, as carried in the low two bits of the
/// live-state flags and the top two bits of a set command.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    Auto,
    Manual,
    Vacation,
    Boost,
}

impl Mode {
    /// Decode the two mode bits; higher bits are ignored.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::Auto,
            1 => Mode::Manual,
            2 => Mode::Vacation,
            _ => Mode::Boost,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Mode::Auto => 0,
            Mode::Manual => 1,
            Mode::Vacation => 2,
            Mode::Boost => 3,
        }
    }
}

/// Radiator valve state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThermostatState {
    pub mode: Option<Mode>,
    pub target_temperature: Option<f64>,
    pub actual_temperature: Option<f64>,
    /// Valve opening in percent (0-100).
    pub valve_position: Option<u8>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub comfort_temperature: Option<f64>,
    pub eco_temperature: Option<f64>,
}

/// Wall thermostat state; like a radiator thermostat without a valve.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WallThermostatState {
    pub mode: Option<Mode>,
    pub target_temperature: Option<f64>,
    pub actual_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub comfort_temperature: Option<f64>,
    pub eco_temperature: Option<f64>,
}

/// Window/door contact state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShutterState {
    pub is_open: Option<bool>,
}

/// Per-kind state; only the fields that kind of device reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceState {
    Thermostat(ThermostatState),
    WallThermostat(WallThermostatState),
    WindowShutter(ShutterState),
    Generic,
}

impl DeviceState {
    fn empty_for(device_type: Option<DeviceType>) -> Self {
        match device_type {
            Some(DeviceType::HeaterThermostat | DeviceType::HeaterThermostatPlus) => {
                DeviceState::Thermostat(ThermostatState::default())
            }
            Some(DeviceType::WallThermostat) => {
                DeviceState::WallThermostat(WallThermostatState::default())
            }
            Some(DeviceType::ShutterContact) => DeviceState::WindowShutter(ShutterState::default()),
            _ => DeviceState::Generic,
        }
    }
}

/// A device attached to the Cube.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub rf_address: RfAddress,
    #[serde(rename = "type")]
    pub device_type: Option<DeviceType>,
    /// Assigned by the Cube's room table; a back-reference, not ownership.
    pub room_id: Option<u8>,
    pub name: Option<String>,
    pub serial: Option<String>,
    pub battery_low: Option<bool>,
    pub state: DeviceState,
}

impl Device {
    /// A device with nothing known but its address and (maybe) its kind.
    pub fn new(rf_address: RfAddress, device_type: Option<DeviceType>) -> Self {
        Self {
            rf_address,
            device_type,
            room_id: None,
            name: None,
            serial: None,
            battery_low: None,
            state: DeviceState::empty_for(device_type),
        }
    }

    pub fn is_thermostat(&self) -> bool {
        matches!(
            self.device_type,
            Some(DeviceType::HeaterThermostat | DeviceType::HeaterThermostatPlus)
        )
    }

    pub fn is_wallthermostat(&self) -> bool {
        self.device_type == Some(DeviceType::WallThermostat)
    }

    pub fn is_windowshutter(&self) -> bool {
        self.device_type == Some(DeviceType::ShutterContact)
    }

    pub fn mode(&self) -> Option<Mode> {
        match &self.state {
            DeviceState::Thermostat(t) => t.mode,
            DeviceState::WallThermostat(w) => w.mode,
            _ => None,
        }
    }

    pub fn target_temperature(&self) -> Option<f64> {
        match &self.state {
            DeviceState::Thermostat(t) => t.target_temperature,
            DeviceState::WallThermostat(w) => w.target_temperature,
            _ => None,
        }
    }

    pub fn actual_temperature(&self) -> Option<f64> {
        match &self.state {
            DeviceState::Thermostat(t) => t.actual_temperature,
            DeviceState::WallThermostat(w) => w.actual_temperature,
            _ => None,
        }
    }

    pub fn min_temperature(&self) -> Option<f64> {
        match &self.state {
            DeviceState::Thermostat(t) => t.min_temperature,
            DeviceState::WallThermostat(w) => w.min_temperature,
            _ => None,
        }
    }

    pub fn max_temperature(&self) -> Option<f64> {
        match &self.state {
            DeviceState::Thermostat(t) => t.max_temperature,
            DeviceState::WallThermostat(w) => w.max_temperature,
            _ => None,
        }
    }

    pub fn valve_position(&self) -> Option<u8> {
        match &self.state {
            DeviceState::Thermostat(t) => t.valve_position,
            _ => None,
        }
    }

    pub fn is_open(&self) -> Option<bool> {
        match &self.state {
            DeviceState::WindowShutter(s) => s.is_open,
            _ => None,
        }
    }
}

/// A room from the Cube's metadata; rooms do not own their devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: u8,
    pub name: String,
    /// Address of the room's group (the Cube's virtual device for the room).
    pub rf_address: Option<RfAddress>,
}

/// Identity of the Cube itself, from its hello line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CubeInfo {
    pub serial: Option<String>,
    pub rf_address: Option<RfAddress>,
    /// Rendered as `"01.13"`.
    pub firmware_version: Option<String>,
}

/// Everything one `update()` learned about the Cube.
///
/// Snapshots are replaced wholesale; nothing carries over between them
/// except what matching RF addresses and room ids imply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub cube: CubeInfo,
    pub rooms: Vec<Room>,
    pub devices: Vec<Device>,
}

impl Snapshot {
    pub fn device_by_rf(&self, rf_address: &RfAddress) -> Option<&Device> {
        self.devices.iter().find(|d| &d.rf_address == rf_address)
    }

    pub fn room_by_id(&self, id: u8) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: RfAddress = RfAddress::new([0x06, 0xbc, 0x53]);

    #[test]
    fn test_new_device_has_no_state() {
        for ty in [
            None,
            Some(DeviceType::HeaterThermostat),
            Some(DeviceType::WallThermostat),
            Some(DeviceType::ShutterContact),
            Some(DeviceType::EcoSwitch),
        ] {
            let device = Device::new(ADDR, ty);
            assert_eq!(device.room_id, None);
            assert_eq!(device.name, None);
            assert_eq!(device.serial, None);
            assert_eq!(device.battery_low, None);
            assert_eq!(device.mode(), None);
            assert_eq!(device.target_temperature(), None);
            assert_eq!(device.actual_temperature(), None);
            assert_eq!(device.valve_position(), None);
            assert_eq!(device.min_temperature(), None);
            assert_eq!(device.max_temperature(), None);
            assert_eq!(device.is_open(), None);
        }
    }

    #[test]
    fn test_classification_from_type_tag() {
        let thermostat = Device::new(ADDR, Some(DeviceType::HeaterThermostat));
        assert!(thermostat.is_thermostat());
        assert!(!thermostat.is_wallthermostat());
        assert!(!thermostat.is_windowshutter());

        let plus = Device::new(ADDR, Some(DeviceType::HeaterThermostatPlus));
        assert!(plus.is_thermostat());

        let wall = Device::new(ADDR, Some(DeviceType::WallThermostat));
        assert!(wall.is_wallthermostat());
        assert!(!wall.is_thermostat());
        assert!(matches!(wall.state, DeviceState::WallThermostat(_)));

        let shutter = Device::new(ADDR, Some(DeviceType::ShutterContact));
        assert!(shutter.is_windowshutter());
        assert!(matches!(shutter.state, DeviceState::WindowShutter(_)));

        let untyped = Device::new(ADDR, None);
        assert!(!untyped.is_thermostat());
        assert!(!untyped.is_wallthermostat());
        assert!(!untyped.is_windowshutter());
        assert_eq!(untyped.state, DeviceState::Generic);

        let unknown = Device::new(ADDR, Some(DeviceType::from(0x42)));
        assert_eq!(unknown.device_type, Some(DeviceType::Unknown(0x42)));
        assert_eq!(unknown.state, DeviceState::Generic);
    }

    #[test]
    fn test_rf_address_display_and_parse() {
        assert_eq!(ADDR.to_string(), "06bc53");
        assert_eq!("06BC53".parse::<RfAddress>().unwrap(), ADDR);
        assert!("06bc5".parse::<RfAddress>().is_err());
        assert!("zzzzzz".parse::<RfAddress>().is_err());
        assert_eq!(RfAddress::from_slice(&[0x06, 0xbc, 0x53, 0xff]), Some(ADDR));
        assert_eq!(RfAddress::from_slice(&[0x06, 0xbc]), None);
    }

    #[test]
    fn test_mode_bits() {
        for mode in [Mode::Auto, Mode::Manual, Mode::Vacation, Mode::Boost] {
            assert_eq!(Mode::from_bits(mode.bits()), mode);
        }
        assert_eq!(Mode::from_bits(0x9b), Mode::Boost);
        assert_eq!("Manual".parse::<Mode>().unwrap(), Mode::Manual);
        assert_eq!(Mode::Vacation.to_string(), "vacation");
    }

    #[test]
    fn test_device_serializes_address_as_hex() {
        let device = Device::new(ADDR, Some(DeviceType::ShutterContact));
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["rf_address"], "06bc53");
        assert_eq!(json["type"], "shutter_contact");
        assert_eq!(json["state"]["kind"], "window_shutter");
    }
}
