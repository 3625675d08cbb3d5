//! Configuration file parsing and structures.
//!
//! maxcubed reads a single TOML file with one `[cubes.<name>]` table per
//! Cube plus optional `[logging]`, `[api]` and `[gpio]` tables.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Polling intervals offered for a Cube, in seconds.
pub const UPDATE_INTERVALS: [u64; 5] = [60, 120, 300, 600, 1800];

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub gpio: GpioConfig,

    /// Key = cube name, used in API paths and log lines
    #[serde(default)]
    pub cubes: BTreeMap<String, CubeConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `maxcube = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter. With `cube_debug` set the `maxcube`
    /// target logs at DEBUG unless an explicit override says otherwise.
    pub fn targets(&self, cube_debug: bool) -> Targets {
        let mut targets = Targets::new().with_default(LevelFilter::from(self.level));
        if cube_debug && !self.overrides.contains_key("maxcube") {
            targets = targets
                .with_target("maxcube", LevelFilter::DEBUG)
                .with_target("maxcubed", LevelFilter::DEBUG);
        }
        for (target, level) in &self.overrides {
            targets = targets.with_target(target.clone(), LevelFilter::from(*level));
        }
        targets
    }
}

/// HTTP API listener
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_api_port(),
        }
    }
}

/// GPIO helper endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GpioConfig {
    #[serde(default = "default_gpio_url")]
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            url: default_gpio_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GpioConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One MAX! Cube
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CubeConfig {
    /// Host name or IP address of the Cube
    pub address: String,

    #[serde(default = "default_cube_port")]
    pub port: u16,

    /// Seconds between polls, one of [`UPDATE_INTERVALS`]
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Expose a valve-position sensor per radiator thermostat
    #[serde(default = "default_true")]
    pub valve_positions: bool,

    /// Allow HVAC mode changes through climate entities
    #[serde(default)]
    pub thermostat_modes: bool,

    /// Expose the aggregated heat demand switch
    #[serde(default)]
    pub heat_demand_switch: bool,

    /// Valve opening (percent) above which a thermostat demands heat
    #[serde(default = "default_min_valve_position")]
    pub min_valve_position: u8,

    #[serde(default)]
    pub debug: bool,

    /// Socket timeout for every exchange with the Cube
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CubeConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: default_cube_port(),
            update_interval: default_update_interval(),
            valve_positions: true,
            thermostat_modes: false,
            heat_demand_switch: false,
            min_valve_position: default_min_valve_position(),
            debug: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: String| ConfigError::Invalid {
            field: format!("cubes.{}.{}", name, field),
            message,
        };

        if self.address.trim().is_empty() {
            return Err(invalid("address", "address must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(invalid("port", "port must be between 1 and 65535".to_string()));
        }
        if !UPDATE_INTERVALS.contains(&self.update_interval) {
            return Err(invalid(
                "update_interval",
                format!("must be one of {:?} seconds", UPDATE_INTERVALS),
            ));
        }
        if !(1..=100).contains(&self.min_valve_position) {
            return Err(invalid(
                "min_valve_position",
                "must be between 1 and 100".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be positive".to_string()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

fn default_gpio_url() -> String {
    "http://192.168.1.190/control".to_string()
}

fn default_cube_port() -> u16 {
    maxcube::DEFAULT_PORT
}

fn default_update_interval() -> u64 {
    300
}

fn default_min_valve_position() -> u8 {
    25
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }

    /// Validate field ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cubes.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cubes".to_string(),
                message: "at least one cube must be configured".to_string(),
            });
        }
        for (name, cube) in &self.cubes {
            cube.validate(name)?;
        }
        if self.gpio.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "gpio.timeout_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Whether any cube asked for protocol debug logging
    pub fn cube_debug(&self) -> bool {
        self.cubes.values().any(|c| c.debug)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = r#"
            [cubes.house]
            address = "192.168.1.20"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.port, 8565);
        assert_eq!(config.gpio.url, "http://192.168.1.190/control");
        assert_eq!(config.gpio.timeout(), Duration::from_secs(10));

        let cube = &config.cubes["house"];
        assert_eq!(cube.address, "192.168.1.20");
        assert_eq!(cube.port, 62910);
        assert_eq!(cube.update_interval(), Duration::from_secs(300));
        assert!(cube.valve_positions);
        assert!(!cube.thermostat_modes);
        assert!(!cube.heat_demand_switch);
        assert_eq!(cube.min_valve_position, 25);
        assert!(!cube.debug);
        assert_eq!(cube.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = r#"
            [logging]
            level = "warn"

            [logging.overrides]
            maxcube = "trace"

            [api]
            listen = "0.0.0.0"
            port = 9000

            [gpio]
            url = "http://10.0.0.5/control"
            timeout_secs = 3

            [cubes.upstairs]
            address = "10.0.0.2"
            port = 62911
            update_interval = 60
            valve_positions = false
            thermostat_modes = true
            heat_demand_switch = true
            min_valve_position = 40
            debug = true
            timeout_secs = 5

            [cubes.downstairs]
            address = "10.0.0.3"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.overrides.get("maxcube"), Some(&LogLevel::Trace));
        assert_eq!(config.api.listen, "0.0.0.0");
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.gpio.timeout_secs, 3);
        assert_eq!(
            config.cubes.keys().collect::<Vec<_>>(),
            vec!["downstairs", "upstairs"]
        );

        let up = &config.cubes["upstairs"];
        assert_eq!(up.port, 62911);
        assert_eq!(up.update_interval, 60);
        assert!(!up.valve_positions);
        assert!(up.thermostat_modes);
        assert!(up.heat_demand_switch);
        assert_eq!(up.min_valve_position, 40);
        assert!(config.cube_debug());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            ("port = 0", "cubes.house.port"),
            ("update_interval = 45", "cubes.house.update_interval"),
            ("min_valve_position = 0", "cubes.house.min_valve_position"),
            ("min_valve_position = 101", "cubes.house.min_valve_position"),
            ("timeout_secs = 0", "cubes.house.timeout_secs"),
        ];
        for (line, expected) in cases {
            let toml = format!("[cubes.house]\naddress = \"10.0.0.2\"\n{}\n", line);
            match toml.parse::<Config>() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected, "{}", line),
                other => panic!("{}: expected invalid config, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_no_cubes_is_rejected() {
        assert!(matches!(
            "".parse::<Config>(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_address_is_a_parse_error() {
        assert!(matches!(
            "[cubes.house]\nport = 62910\n".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cubes.house]\naddress = \"cube.local\"\nupdate_interval = 1800").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.cubes["house"].update_interval, 1800);
    }

    #[test]
    fn test_missing_file_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
    }

    #[test]
    fn test_cube_debug_raises_protocol_logging() {
        let logging = LoggingConfig::default();
        let targets = logging.targets(true);
        assert!(targets.would_enable("maxcube::messages", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("axum", &tracing::Level::DEBUG));

        let quiet = logging.targets(false);
        assert!(!quiet.would_enable("maxcube::messages", &tracing::Level::DEBUG));
    }
}
