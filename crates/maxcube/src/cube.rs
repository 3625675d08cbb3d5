use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use crate::connection::Connection;
use crate::connection::TcpConnection;
use crate::device::CubeInfo;
use crate::device::Device;
use crate::device::Mode;
use crate::device::RfAddress;
use crate::device::Room;
use crate::device::Snapshot;
use crate::error::CommandError;
use crate::error::ConnectionError;
use crate::error::UpdateError;
use crate::messages;
use crate::messages::LIST_COMMAND;

/// TCP port the Cube listens on.
pub const DEFAULT_PORT: u16 = 62910;

/// Terminates the greeting the Cube pushes on every connect.
const GREETING_END: &str = "L:";
const ACK_PREFIX: &str = "S:";

/// Client for a single MAX! Cube.
///
/// Every call opens its own connection, performs one exchange and closes it
/// again. Calls on one client are serialized; two clients pointed at the same
/// Cube are not coordinated with each other.
pub struct MaxCube<C = TcpConnection> {
    connection: Mutex<C>,
    snapshot: Snapshot,
}

impl MaxCube<TcpConnection> {
    /// Client for the Cube at `host:port`. No I/O happens until
    /// [`MaxCube::update`].
    pub fn connect_to(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self::new(TcpConnection::with_timeout(host, port, timeout))
    }
}

impl<C: Connection> MaxCube<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection: Mutex::new(connection),
            snapshot: Snapshot::default(),
        }
    }

    /// Fetch and decode the Cube's full state, replacing the current
    /// snapshot. On error the previous snapshot is left untouched.
    pub async fn update(&mut self) -> Result<&Snapshot, UpdateError> {
        let payload = {
            let mut conn = self.connection.lock().await;
            exchange(&mut *conn, LIST_COMMAND, GREETING_END).await?
        };

        let snapshot = messages::decode_response(&payload)?;
        debug!(
            "Cube {} reports {} devices in {} rooms",
            snapshot
                .cube
                .serial
                .as_deref()
                .unwrap_or("<unknown>"),
            snapshot.devices.len(),
            snapshot.rooms.len()
        );
        self.snapshot = snapshot;
        Ok(&self.snapshot)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn devices(&self) -> &[Device] {
        &self.snapshot.devices
    }

    pub fn rooms(&self) -> &[Room] {
        &self.snapshot.rooms
    }

    pub fn cube_info(&self) -> &CubeInfo {
        &self.snapshot.cube
    }

    pub fn device_by_rf(&self, rf_address: &RfAddress) -> Option<&Device> {
        self.snapshot.device_by_rf(rf_address)
    }

    pub fn room_by_id(&self, id: u8) -> Option<&Room> {
        self.snapshot.room_by_id(id)
    }

    pub fn is_thermostat(&self, device: &Device) -> bool {
        device.is_thermostat()
    }

    pub fn is_wallthermostat(&self, device: &Device) -> bool {
        device.is_wallthermostat()
    }

    pub fn is_windowshutter(&self, device: &Device) -> bool {
        device.is_windowshutter()
    }

    /// Change a device's setpoint, keeping its current mode.
    pub async fn set_target_temperature(
        &self,
        device: &Device,
        temperature: f64,
    ) -> Result<(), CommandError> {
        let Some(mode) = device.mode() else {
            return Err(CommandError::InvalidState("mode is unset".to_string()));
        };
        self.set_temperature_mode(device, Some(temperature), Some(mode))
            .await
    }

    /// Change a device's mode, keeping its current setpoint.
    pub async fn set_mode(&self, device: &Device, mode: Mode) -> Result<(), CommandError> {
        let Some(temperature) = device.target_temperature() else {
            return Err(CommandError::InvalidState(
                "temperature is unset".to_string(),
            ));
        };
        self.set_temperature_mode(device, Some(temperature), Some(mode))
            .await
    }

    /// Write both setpoint and mode in a single command.
    ///
    /// The device itself is not modified; the new values show up on the next
    /// [`MaxCube::update`].
    pub async fn set_temperature_mode(
        &self,
        device: &Device,
        temperature: Option<f64>,
        mode: Option<Mode>,
    ) -> Result<(), CommandError> {
        let Some(temperature) = temperature else {
            return Err(CommandError::InvalidArgument(
                "temperature is None".to_string(),
            ));
        };
        let Some(mode) = mode else {
            return Err(CommandError::InvalidArgument("mode is None".to_string()));
        };
        if !device.is_thermostat() && !device.is_wallthermostat() {
            return Err(CommandError::InvalidArgument(format!(
                "device {} does not accept temperature commands",
                device.rf_address
            )));
        }

        let line = messages::encode_set_command(device.rf_address, device.room_id, temperature, mode)?;
        info!(
            "Setting {} to {} in {} mode",
            device.rf_address, temperature, mode
        );

        let reply = {
            let mut conn = self.connection.lock().await;
            exchange(&mut *conn, &line, ACK_PREFIX).await?
        };
        let ack_line = messages::records(&reply)
            .filter(|(record, _)| *record == 'S')
            .last()
            .map(|(_, body)| body)
            .ok_or_else(|| CommandError::BadAcknowledgement(reply.trim().to_string()))?;
        let ack = messages::parse_ack(ack_line)?;
        debug!(
            "Command accepted, duty cycle {} free slots {}",
            ack.duty_cycle, ack.free_slots
        );
        Ok(())
    }
}

/// Connect, drain the greeting, send `request`, read up to `terminator` and
/// disconnect. Returns the greeting followed by the reply.
async fn exchange<C: Connection>(
    conn: &mut C,
    request: &str,
    terminator: &str,
) -> Result<String, ConnectionError> {
    conn.connect().await?;
    let result = async {
        let mut payload = conn.read_response(GREETING_END).await?;
        conn.send(request).await?;
        payload.push_str(&conn.read_response(terminator).await?);
        Ok::<_, ConnectionError>(payload)
    }
    .await;
    conn.disconnect().await;
    result
}
