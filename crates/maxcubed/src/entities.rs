//! Entities exposed for a Cube: climate controls, sensors and switches.
//!
//! Entities are a pure projection of a [`CubeState`]; they are rebuilt on
//! every request and carry no state of their own.

use maxcube::Device;
use maxcube::Mode;
use maxcube::RfAddress;
use maxcube::Snapshot;
use serde::Deserialize;
use serde::Serialize;

use crate::config::CubeConfig;
use crate::coordinator::CubeState;

const DEFAULT_MIN_TEMPERATURE: f64 = 5.0;
const DEFAULT_MAX_TEMPERATURE: f64 = 30.0;

/// Heating mode as offered by a climate entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HvacMode {
    Auto,
    Heat,
    Off,
}

impl HvacMode {
    pub const ALL: [HvacMode; 3] = [HvacMode::Auto, HvacMode::Heat, HvacMode::Off];

    /// Boost shows up as Heat; an unknown mode as Auto.
    pub fn from_mode(mode: Option<Mode>) -> Self {
        match mode {
            Some(Mode::Manual | Mode::Boost) => HvacMode::Heat,
            Some(Mode::Vacation) => HvacMode::Off,
            Some(Mode::Auto) | None => HvacMode::Auto,
        }
    }

    /// Heat always means manual; boost is never selected from here.
    pub fn to_mode(self) -> Mode {
        match self {
            HvacMode::Auto => Mode::Auto,
            HvacMode::Heat => Mode::Manual,
            HvacMode::Off => Mode::Vacation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Climate {
    pub unique_id: String,
    pub name: String,
    pub rf_address: RfAddress,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub hvac_mode: HvacMode,
    pub hvac_modes: [HvacMode; 3],
    pub min_temp: f64,
    pub max_temp: f64,
    /// Whether `hvac_mode` may be written
    pub mode_changes_enabled: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    ValvePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    pub unique_id: String,
    pub name: String,
    pub rf_address: RfAddress,
    pub kind: SensorKind,
    pub value: Option<f64>,
    pub unit: &'static str,
    pub available: bool,
}

/// Read-only on/off entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Switch {
    pub unique_id: String,
    pub name: String,
    pub rf_address: Option<RfAddress>,
    pub is_on: bool,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum Entity {
    Climate(Climate),
    Sensor(Sensor),
    Switch(Switch),
}

impl Entity {
    pub fn unique_id(&self) -> &str {
        match self {
            Entity::Climate(c) => &c.unique_id,
            Entity::Sensor(s) => &s.unique_id,
            Entity::Switch(s) => &s.unique_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Climate(c) => &c.name,
            Entity::Sensor(s) => &s.name,
            Entity::Switch(s) => &s.name,
        }
    }

    pub fn available(&self) -> bool {
        match self {
            Entity::Climate(c) => c.available,
            Entity::Sensor(s) => s.available,
            Entity::Switch(s) => s.available,
        }
    }
}

/// `"<room> <device>"`, or just the device name when it has no known room.
fn display_name(snapshot: &Snapshot, device: &Device) -> String {
    let device_name = device
        .name
        .clone()
        .unwrap_or_else(|| device.rf_address.to_string());
    match device.room_id.and_then(|id| snapshot.room_by_id(id)) {
        Some(room) => format!("{} {}", room.name, device_name),
        None => device_name,
    }
}

/// Radiator thermostats are controlled through their room's wall
/// thermostat when there is one.
fn has_climate(snapshot: &Snapshot, device: &Device) -> bool {
    if device.is_wallthermostat() {
        return true;
    }
    device.is_thermostat()
        && !snapshot
            .devices
            .iter()
            .any(|d| d.is_wallthermostat() && d.room_id == device.room_id)
}

/// Project a cube's state onto its entities: climates, then sensors, then
/// switches, each in device order.
pub fn entities(state: &CubeState, options: &CubeConfig) -> Vec<Entity> {
    let snapshot = &state.snapshot;
    let available = state.last_update_success;
    let mut climates = Vec::new();
    let mut sensors = Vec::new();
    let mut switches = Vec::new();

    if options.heat_demand_switch {
        switches.push(Entity::Switch(Switch {
            unique_id: "maxcube_heat_demand".to_string(),
            name: "Heat Demand".to_string(),
            rf_address: None,
            is_on: state.heat_demand,
            available,
        }));
    }

    for device in &snapshot.devices {
        let name = display_name(snapshot, device);
        let rf = device.rf_address;

        if has_climate(snapshot, device) {
            climates.push(Entity::Climate(Climate {
                unique_id: format!("maxcube_{}", rf),
                name: name.clone(),
                rf_address: rf,
                current_temperature: device.actual_temperature(),
                target_temperature: device.target_temperature(),
                hvac_mode: HvacMode::from_mode(device.mode()),
                hvac_modes: HvacMode::ALL,
                min_temp: device.min_temperature().unwrap_or(DEFAULT_MIN_TEMPERATURE),
                max_temp: device.max_temperature().unwrap_or(DEFAULT_MAX_TEMPERATURE),
                mode_changes_enabled: options.thermostat_modes,
                available,
            }));
        }

        if device.is_thermostat() || device.is_wallthermostat() {
            sensors.push(Entity::Sensor(Sensor {
                unique_id: format!("maxcube_temp_{}", rf),
                name: format!("{} Temperature", name),
                rf_address: rf,
                kind: SensorKind::Temperature,
                value: device.actual_temperature(),
                unit: "°C",
                available,
            }));
        }

        if device.is_thermostat() && options.valve_positions {
            sensors.push(Entity::Sensor(Sensor {
                unique_id: format!("maxcube_valve_{}", rf),
                name: format!("{} Valve Position", name),
                rf_address: rf,
                kind: SensorKind::ValvePosition,
                value: device.valve_position().map(f64::from),
                unit: "%",
                available,
            }));
        }

        if device.is_windowshutter() {
            switches.push(Entity::Switch(Switch {
                unique_id: format!("maxcube_contact_{}", rf),
                name,
                rf_address: Some(rf),
                is_on: device.is_open().unwrap_or(false),
                available,
            }));
        }
    }

    climates.extend(sensors);
    climates.extend(switches);
    climates
}
