use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::DateTime;
use chrono::Utc;
use maxcube::CommandError;
use maxcube::Connection;
use maxcube::MaxCube;
use maxcube::Mode;
use maxcube::RfAddress;
use maxcube::Snapshot;
use maxcube::TcpConnection;
use maxcube::UpdateError;
use serde::Serialize;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::CubeConfig;
use crate::entities::HvacMode;

/// What readers see of one Cube: the last good snapshot plus whether the
/// most recent poll succeeded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CubeState {
    pub snapshot: Snapshot,
    pub heat_demand: bool,
    pub last_update_success: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
pub enum GpioState {
    #[default]
    Ready,
    Success,
    Failed,
}

/// Outcome of the most recent GPIO helper command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpioStatus {
    pub status: GpioState,
    pub last_command: Option<String>,
    pub last_result: Option<String>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub command_count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Error communicating with MAX! Cube: {0}")]
    Update(#[from] UpdateError),

    #[error("Command failed: {0}")]
    Command(#[from] CommandError),

    #[error("Device {0} not found")]
    DeviceNotFound(RfAddress),

    #[error("Thermostat mode changes are disabled for this cube")]
    ModeChangesDisabled,
}

/// Polls one Cube and serializes every exchange with it.
///
/// The cube client sits behind an async mutex so at most one update or
/// command is in flight per Cube; readers never wait on it and instead load
/// the last published [`CubeState`].
pub struct Coordinator {
    name: String,
    options: CubeConfig,
    cube: Mutex<MaxCube<Box<dyn Connection>>>,
    state: ArcSwap<CubeState>,
    gpio: std::sync::Mutex<GpioStatus>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, options: CubeConfig, connection: Box<dyn Connection>) -> Self {
        Self {
            name: name.into(),
            options,
            cube: Mutex::new(MaxCube::new(connection)),
            state: ArcSwap::new(Arc::default()),
            gpio: std::sync::Mutex::new(GpioStatus::default()),
        }
    }

    /// Coordinator talking TCP to the configured address.
    pub fn from_config(name: impl Into<String>, options: CubeConfig) -> Self {
        let connection =
            TcpConnection::with_timeout(options.address.clone(), options.port, options.timeout());
        Self::new(name, options, Box::new(connection))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CubeConfig {
        &self.options
    }

    pub fn state(&self) -> Arc<CubeState> {
        self.state.load_full()
    }

    pub fn gpio_status(&self) -> GpioStatus {
        self.gpio
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Poll the Cube and publish the result.
    ///
    /// On failure the previous snapshot stays visible but is marked stale.
    pub async fn refresh(&self) -> Result<(), CoordinatorError> {
        let mut cube = self.cube.lock().await;
        self.update_locked(&mut cube).await
    }

    async fn update_locked(&self, cube: &mut MaxCube<Box<dyn Connection>>) -> Result<(), CoordinatorError> {
        match cube.update().await {
            Ok(snapshot) => {
                self.publish(snapshot);
                Ok(())
            }
            Err(e) => {
                warn!("[{}] Error communicating with MAX! Cube: {}", self.name, e);
                let previous = self.state.load();
                self.state.store(Arc::new(CubeState {
                    last_update_success: false,
                    ..CubeState::clone(&previous)
                }));
                Err(e.into())
            }
        }
    }

    fn publish(&self, snapshot: &Snapshot) {
        let heat_demand = heat_demand(snapshot, self.options.min_valve_position);
        debug!(
            "[{}] Updated MAX! Cube data: {} devices, {} rooms, heat demand {}",
            self.name,
            snapshot.devices.len(),
            snapshot.rooms.len(),
            heat_demand
        );
        self.state.store(Arc::new(CubeState {
            snapshot: snapshot.clone(),
            heat_demand,
            last_update_success: true,
        }));
    }

    /// Refresh every `update_interval` until `shutdown` flips.
    ///
    /// The first poll happens one interval after the call; the caller is
    /// expected to have refreshed once at startup.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.options.update_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("[{}] Polling every {:?}", self.name, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged and published by refresh.
                    let _ = self.refresh().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("[{}] Polling stopped", self.name);
    }

    pub async fn set_target_temperature(
        &self,
        rf_address: RfAddress,
        temperature: f64,
    ) -> Result<(), CoordinatorError> {
        {
            let mut cube = self.cube.lock().await;
            self.update_locked(&mut cube).await?;
            let device = cube
                .device_by_rf(&rf_address)
                .cloned()
                .ok_or(CoordinatorError::DeviceNotFound(rf_address))?;
            cube.set_target_temperature(&device, temperature).await?;
        }
        info!("[{}] Set temperature {} for device {}", self.name, temperature, rf_address);
        self.refresh_after_write().await;
        Ok(())
    }

    pub async fn set_mode(&self, rf_address: RfAddress, mode: Mode) -> Result<(), CoordinatorError> {
        {
            let mut cube = self.cube.lock().await;
            self.update_locked(&mut cube).await?;
            let device = cube
                .device_by_rf(&rf_address)
                .cloned()
                .ok_or(CoordinatorError::DeviceNotFound(rf_address))?;
            cube.set_mode(&device, mode).await?;
        }
        info!("[{}] Set mode {} for device {}", self.name, mode, rf_address);
        self.refresh_after_write().await;
        Ok(())
    }

    /// Mode change requested through a climate entity.
    pub async fn set_hvac_mode(
        &self,
        rf_address: RfAddress,
        hvac_mode: HvacMode,
    ) -> Result<(), CoordinatorError> {
        if !self.options.thermostat_modes {
            warn!("[{}] Thermostat mode changes are disabled in configuration", self.name);
            return Err(CoordinatorError::ModeChangesDisabled);
        }
        self.set_mode(rf_address, hvac_mode.to_mode()).await
    }

    async fn refresh_after_write(&self) {
        if self.refresh().await.is_err() {
            debug!("[{}] Re-read after write failed; state marked stale", self.name);
        }
    }

    /// Scan the Cube again and publish what it reports.
    pub async fn reload_devices(&self) -> Result<(), CoordinatorError> {
        info!("[{}] Reloading MAX! Cube devices", self.name);
        self.refresh().await?;
        let state = self.state();
        info!(
            "[{}] Reloaded {} devices and {} rooms",
            self.name,
            state.snapshot.devices.len(),
            state.snapshot.rooms.len()
        );
        Ok(())
    }

    /// Drop the cached snapshot, then reload.
    pub async fn clear_and_reload_devices(&self) -> Result<(), CoordinatorError> {
        info!("[{}] Clearing cached data", self.name);
        self.state.store(Arc::default());
        self.reload_devices().await
    }

    /// Record the outcome of a GPIO helper command.
    pub fn record_gpio_result(&self, command: &str, result: &str, success: bool) {
        let mut gpio = self
            .gpio
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        gpio.status = if success {
            GpioState::Success
        } else {
            GpioState::Failed
        };
        gpio.last_command = Some(command.to_string());
        gpio.last_result = Some(result.to_string());
        gpio.last_timestamp = Some(Utc::now());
        gpio.command_count += 1;

        info!(
            "[{}] GPIO command '{}' {}: {}",
            self.name,
            command,
            if success { "succeeded" } else { "failed" },
            result
        );
    }
}

/// True when any radiator thermostat's valve is open wider than
/// `min_valve_position` percent.
pub fn heat_demand(snapshot: &Snapshot, min_valve_position: u8) -> bool {
    snapshot.devices.iter().any(|d| {
        d.is_thermostat()
            && d
                .valve_position()
                .is_some_and(|position| position > min_valve_position)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use maxcube::Device;
    use maxcube::DeviceState;
    use maxcube::DeviceType;

    use super::*;
    use crate::testing::FakeCube;

    fn rf(s: &str) -> RfAddress {
        s.parse().unwrap()
    }

    fn coordinator(options: CubeConfig) -> (Coordinator, Arc<crate::testing::FakeCubeLog>) {
        let (conn, log) = FakeCube::boxed();
        (Coordinator::new("house", options, conn), log)
    }

    #[tokio::test]
    async fn test_refresh_publishes_state() {
        let (coord, _) = coordinator(CubeConfig::new("cube.local"));
        assert!(!coord.state().last_update_success);

        coord.refresh().await.unwrap();
        let state = coord.state();
        assert!(state.last_update_success);
        assert_eq!(state.snapshot.devices.len(), 6);
        // 06bc53 at 32% and 06bc5a at 100% are both above 25%.
        assert!(state.heat_demand);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_snapshot() {
        let (coord, log) = coordinator(CubeConfig::new("cube.local"));
        coord.refresh().await.unwrap();

        log.set_offline(true);
        let err = coord.refresh().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Update(_)));

        let state = coord.state();
        assert!(!state.last_update_success);
        assert_eq!(state.snapshot.devices.len(), 6);

        log.set_offline(false);
        coord.refresh().await.unwrap();
        assert!(coord.state().last_update_success);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_serialized() {
        let log = {
            let (mut cube, log) = FakeCube::new();
            cube.delay = Duration::from_millis(20);
            let coord = Arc::new(Coordinator::new(
                "house",
                CubeConfig::new("cube.local"),
                Box::new(cube),
            ));

            let a = tokio::spawn({
                let coord = coord.clone();
                async move { coord.refresh().await }
            });
            let b = tokio::spawn({
                let coord = coord.clone();
                async move { coord.set_target_temperature(rf("06bc53"), 20.0).await }
            });
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();
            log
        };

        assert_eq!(log.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(log.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_target_temperature_rereads_writes_and_refreshes() {
        let (coord, log) = coordinator(CubeConfig::new("cube.local"));
        coord
            .set_target_temperature(rf("0a0b0c"), 21.5)
            .await
            .unwrap();

        assert_eq!(
            log.sent(),
            vec![
                "l:\r\n".to_string(),
                "s:AARAAAAACgsMEms=\r\n".to_string(),
                "l:\r\n".to_string(),
            ]
        );
        assert!(coord.state().last_update_success);
    }

    #[tokio::test]
    async fn test_unknown_device_is_reported() {
        let (coord, log) = coordinator(CubeConfig::new("cube.local"));
        let err = coord
            .set_mode(rf("ffffff"), Mode::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::DeviceNotFound(_)));
        assert_eq!(log.sent(), vec!["l:\r\n".to_string()]);
    }

    #[tokio::test]
    async fn test_hvac_mode_requires_thermostat_modes() {
        let (coord, log) = coordinator(CubeConfig::new("cube.local"));
        let err = coord
            .set_hvac_mode(rf("06bc53"), HvacMode::Heat)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ModeChangesDisabled));
        assert!(log.sent().is_empty());

        let mut options = CubeConfig::new("cube.local");
        options.thermostat_modes = true;
        let (coord, log) = coordinator(options);
        coord
            .set_hvac_mode(rf("06bc53"), HvacMode::Off)
            .await
            .unwrap();
        // 21.0 in vacation mode
        assert_eq!(log.sent()[1], "s:AARAAAAABrxTAao=\r\n");
    }

    #[tokio::test]
    async fn test_rejected_command_surfaces() {
        let (mut cube, _) = FakeCube::new();
        cube.ack = "S:00,1,31\r\n".to_string();
        let coord = Coordinator::new("house", CubeConfig::new("cube.local"), Box::new(cube));
        let err = coord
            .set_target_temperature(rf("06bc53"), 19.0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Command(CommandError::Rejected(1))
        ));
    }

    #[tokio::test]
    async fn test_clear_and_reload() {
        let (coord, log) = coordinator(CubeConfig::new("cube.local"));
        coord.refresh().await.unwrap();

        log.set_offline(true);
        assert!(coord.clear_and_reload_devices().await.is_err());
        assert!(coord.state().snapshot.devices.is_empty());

        log.set_offline(false);
        coord.clear_and_reload_devices().await.unwrap();
        assert_eq!(coord.state().snapshot.devices.len(), 6);
    }

    #[tokio::test]
    async fn test_gpio_status_survives_refresh() {
        let (coord, _) = coordinator(CubeConfig::new("cube.local"));
        assert_eq!(coord.gpio_status().status, GpioState::Ready);

        let before = Utc::now();
        coord.record_gpio_result("boiler_on", "OK", true);
        coord.record_gpio_result("boiler_off", "timeout", false);
        let after = Utc::now();
        coord.refresh().await.unwrap();

        let gpio = coord.gpio_status();
        assert_eq!(gpio.status, GpioState::Failed);
        assert_eq!(gpio.last_command.as_deref(), Some("boiler_off"));
        assert_eq!(gpio.last_result.as_deref(), Some("timeout"));
        let recorded = gpio.last_timestamp.unwrap();
        assert!(before <= recorded && recorded <= after);
        assert_eq!(gpio.command_count, 2);
    }

    #[test]
    fn test_gpio_timestamp_serializes_as_datetime() {
        let (coord, _) = coordinator(CubeConfig::new("cube.local"));
        coord.record_gpio_result("on", "OK", true);

        let json = serde_json::to_value(coord.gpio_status()).unwrap();
        let stamp = json["last_timestamp"].as_str().unwrap();
        let parsed: DateTime<Utc> = stamp.parse().unwrap();
        assert_eq!(Some(parsed), coord.gpio_status().last_timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_shutdown() {
        let mut options = CubeConfig::new("cube.local");
        options.update_interval = 60;
        let (coord, log) = coordinator(options);
        let coord = Arc::new(coord);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(coord.clone().run(rx));
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(log.connects.load(Ordering::SeqCst), 2);
        assert!(coord.state().last_update_success);
    }

    #[test]
    fn test_heat_demand_threshold() {
        let mut thermostat = Device::new(rf("06bc53"), Some(DeviceType::HeaterThermostat));
        let snapshot_with = |device: &Device| Snapshot {
            devices: vec![device.clone()],
            ..Snapshot::default()
        };

        assert!(!heat_demand(&snapshot_with(&thermostat), 25));

        if let DeviceState::Thermostat(t) = &mut thermostat.state {
            t.valve_position = Some(25);
        }
        assert!(!heat_demand(&snapshot_with(&thermostat), 25));

        if let DeviceState::Thermostat(t) = &mut thermostat.state {
            t.valve_position = Some(26);
        }
        assert!(heat_demand(&snapshot_with(&thermostat), 25));
        assert!(!heat_demand(&snapshot_with(&thermostat), 30));
    }
}
