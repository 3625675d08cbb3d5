use super::decode_base64;
use super::Cursor;
use crate::device::Device;
use crate::device::DeviceState;
use crate::device::DeviceType;
use crate::device::RfAddress;
use crate::error::DecodeError;

/// Setpoints stored on a thermostat or wall thermostat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoints {
    pub comfort: f64,
    pub eco: f64,
    pub max: f64,
    pub min: f64,
}

/// Decoded `C:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub rf_address: RfAddress,
    pub device_type: DeviceType,
    pub room_id: u8,
    pub setpoints: Option<Setpoints>,
}

/// Parse `C:<rf>,<base64>`.
///
/// Layout: `[0]` length, `[1..4]` address, `[4]` type, `[5]` room,
/// `[6]` firmware, `[7]` test result, `[8..18]` serial, then type-specific
/// data. Thermostats and wall thermostats carry comfort, eco, max and min
/// setpoints (half-degrees) at `[18..22]`.
pub fn parse_config(body: &str) -> Result<DeviceConfig, DecodeError> {
    let (_, payload) = body.split_once(',').ok_or_else(|| DecodeError::Malformed {
        record: 'C',
        reason: "missing payload".to_string(),
    })?;
    let data = decode_base64('C', payload)?;

    let mut cursor = Cursor::new(&data);
    cursor.u8("config length")?;
    let rf_address = cursor.rf_address("config address")?;
    let device_type = DeviceType::from(cursor.u8("config device type")?);
    let room_id = cursor.u8("config room")?;
    cursor.take(12, "config header")?;

    let setpoints = match device_type {
        DeviceType::HeaterThermostat
        | DeviceType::HeaterThermostatPlus
        | DeviceType::WallThermostat => {
            let raw = cursor.take(4, "config setpoints")?;
            Some(Setpoints {
                comfort: f64::from(raw[0]) / 2.0,
                eco: f64::from(raw[1]) / 2.0,
                max: f64::from(raw[2]) / 2.0,
                min: f64::from(raw[3]) / 2.0,
            })
        }
        _ => None,
    };

    Ok(DeviceConfig {
        rf_address,
        device_type,
        room_id,
        setpoints,
    })
}

pub(super) fn apply_config(device: &mut Device, config: &DeviceConfig) {
    let Some(sp) = config.setpoints else {
        return;
    };
    match &mut device.state {
        DeviceState::Thermostat(t) => {
            t.comfort_temperature = Some(sp.comfort);
            t.eco_temperature = Some(sp.eco);
            t.max_temperature = Some(sp.max);
            t.min_temperature = Some(sp.min);
        }
        DeviceState::WallThermostat(w) => {
            w.comfort_temperature = Some(sp.comfort);
            w.eco_temperature = Some(sp.eco);
            w.max_temperature = Some(sp.max);
            w.min_temperature = Some(sp.min);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THERMOSTAT_CONFIG: &str = "06bc53,0ga8UwEBGf9LRVEwMzM2MTA4KiI9CQcYAzsH/wA=";
    const WALL_CONFIG: &str = "08ab82,zgirggMCEP9LRVEwMzM1ODYyKSE8Cg==";

    #[test]
    fn test_parse_thermostat_config() {
        let cfg = parse_config(THERMOSTAT_CONFIG).unwrap();
        assert_eq!(cfg.rf_address.to_string(), "06bc53");
        assert_eq!(cfg.device_type, DeviceType::HeaterThermostat);
        assert_eq!(cfg.room_id, 1);
        assert_eq!(
            cfg.setpoints,
            Some(Setpoints {
                comfort: 21.0,
                eco: 17.0,
                max: 30.5,
                min: 4.5,
            })
        );
    }

    #[test]
    fn test_apply_wall_thermostat_config() {
        let cfg = parse_config(WALL_CONFIG).unwrap();
        let mut device = Device::new(cfg.rf_address, Some(DeviceType::WallThermostat));
        apply_config(&mut device, &cfg);
        assert_eq!(device.min_temperature(), Some(5.0));
        assert_eq!(device.max_temperature(), Some(30.0));
        match &device.state {
            DeviceState::WallThermostat(w) => {
                assert_eq!(w.comfort_temperature, Some(20.5));
                assert_eq!(w.eco_temperature, Some(16.5));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_truncated_thermostat_config() {
        // header only, no setpoints
        let err = parse_config("06bc53,0ga8UwEBGf9LRVEwMzM2MTA4").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                what: "config setpoints",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_payload() {
        assert!(parse_config("06bc53").is_err());
    }
}
