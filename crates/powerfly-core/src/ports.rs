//! Seams to the collaborators the mission controller drives but does not own.

use crate::geo::Coordinate;
use mavlink::common::MavCmd;
use serde::{Deserialize, Serialize};

/// Live view of the bound vehicle plus non-blocking guidance commands.
///
/// Readouts may lag the vehicle by up to one tick. Commands are
/// fire-and-forget: their effect is only ever observed through later readouts.
pub trait VehiclePort {
    fn is_armed(&self) -> bool;
    fn is_guided(&self) -> bool;
    /// Latitude, longitude and altitude relative to home.
    fn position(&self) -> Coordinate;
    fn relative_altitude_m(&self) -> f64;
    fn ground_speed_mps(&self) -> f64;

    fn set_armed(&mut self, armed: bool);
    /// COMMAND_LONG to the vehicle's default component.
    fn command_long(&mut self, command: MavCmd, params: [f32; 7]);
    fn goto_location(&mut self, target: Coordinate);
    fn land(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSignal {
    /// Begin a measurement.
    Start,
    /// End the running measurement. A no-op on the receiver when none runs.
    Stop,
    /// Timestamped marker inside the running measurement.
    Event,
    /// Telemetry payload for the measurement log.
    Info,
}

impl PowerSignal {
    pub fn code(self) -> u8 {
        match self {
            PowerSignal::Start => 1,
            PowerSignal::Stop => 2,
            PowerSignal::Event => 3,
            PowerSignal::Info => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PowerSignal::Start),
            2 => Some(PowerSignal::Stop),
            3 => Some(PowerSignal::Event),
            4 => Some(PowerSignal::Info),
            _ => None,
        }
    }
}

/// Outbound channel to the power-measurement instrument. Never blocks.
pub trait PowerPort {
    fn send(&mut self, signal: PowerSignal, payload: &[u8]);
}

impl<T: PowerPort + ?Sized> PowerPort for &mut T {
    fn send(&mut self, signal: PowerSignal, payload: &[u8]) {
        (**self).send(signal, payload);
    }
}
