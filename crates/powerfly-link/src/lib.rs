pub mod command;
pub mod config;
pub mod error;
pub mod event_loop;
#[cfg(feature = "ardupilot")]
pub mod modes;
pub mod state;
pub mod vehicle;

pub use config::{RetryPolicy, VehicleConfig};
pub use error::VehicleError;
pub use vehicle::Vehicle;

pub use state::{
    AutopilotType, GpsFixType, LinkState, SystemStatus, Telemetry, VehicleIdentity,
    VehicleState, VehicleType,
};
