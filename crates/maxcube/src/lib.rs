//! Client for the eQ-3 MAX! Cube heating controller.
//!
//! [`MaxCube`] talks the Cube's line protocol over a [`Connection`], decodes
//! its responses into a [`Snapshot`] of rooms and devices, and encodes
//! setpoint/mode writes.

pub mod connection;
mod cube;
pub mod device;
pub mod error;
pub mod messages;

pub use connection::Connection;
pub use connection::TcpConnection;
pub use connection::DEFAULT_TIMEOUT;
pub use cube::MaxCube;
pub use cube::DEFAULT_PORT;
pub use device::CubeInfo;
pub use device::Device;
pub use device::DeviceState;
pub use device::DeviceType;
pub use device::Mode;
pub use device::RfAddress;
pub use device::Room;
pub use device::Snapshot;
pub use error::CommandError;
pub use error::ConnectionError;
pub use error::DecodeError;
pub use error::UpdateError;
