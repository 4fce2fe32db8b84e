pub mod config;
pub mod error;
pub mod geo;
pub mod machine;
pub mod plan;
pub mod ports;
pub mod telemetry;

pub use config::{LegProtocol, MissionConfig, LAND_SETTLE_S, TAKEOFF_STABILIZE_S};
pub use error::{ArmRejected, ConfigError};
pub use geo::Coordinate;
pub use machine::{MissionEvent, MissionMachine, MissionPhase, StageCounter};
pub use plan::{PlanAnchors, PlanLayout, Waypoint, WaypointKind, WaypointPlan};
pub use ports::{PowerPort, PowerSignal, VehiclePort};
pub use telemetry::TelemetrySample;
