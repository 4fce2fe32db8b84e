use crate::error::ConfigError;
use crate::plan::PlanLayout;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hover time after reaching takeoff altitude before the mission begins.
pub const TAKEOFF_STABILIZE_S: f64 = 3.0;
/// Time on the ground after disarm before the mission returns to idle.
pub const LAND_SETTLE_S: f64 = 3.0;

/// How legs are flown once airborne.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegProtocol {
    /// The controller commands heading and position for every leg and waits
    /// inside the point zone before finishing it.
    #[default]
    Guided,
    /// The vehicle is flown by someone else; the controller only sequences the
    /// power measurement from the observed proximity to the plan.
    Passive,
}

impl LegProtocol {
    pub fn layout(self) -> PlanLayout {
        match self {
            LegProtocol::Guided => PlanLayout::OutAndBack,
            LegProtocol::Passive => PlanLayout::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub tick_period_s: f64,
    /// Position arrival radius, also the near-ground altitude tolerance.
    pub point_zone_m: f64,
    /// Multiple of the point zone that counts as "close" in the passive protocol.
    pub close_factor: f64,
    /// Multiple of the point zone that counts as "clear of" in the passive protocol.
    pub clear_factor: f64,
    pub takeoff_altitude_m: f64,
    /// 0 is north, 90 is east.
    pub flight_direction_deg: f64,
    pub flight_distance_m: f64,
    pub flight_speed_mps: f64,
    pub target_wait_time_s: f64,
    pub target_stabilize_time_s: f64,
    pub yaw_rate_deg_s: f64,
    pub protocol: LegProtocol,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            tick_period_s: 0.1,
            point_zone_m: 1.0,
            close_factor: 5.0,
            clear_factor: 10.0,
            takeoff_altitude_m: 5.0,
            flight_direction_deg: 180.0,
            flight_distance_m: 50.0,
            flight_speed_mps: 5.0,
            target_wait_time_s: 1.0,
            target_stabilize_time_s: 1.0,
            yaw_rate_deg_s: 30.0,
            protocol: LegProtocol::Guided,
        }
    }
}

impl MissionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("tick_period_s", self.tick_period_s),
            ("point_zone_m", self.point_zone_m),
            ("takeoff_altitude_m", self.takeoff_altitude_m),
            ("flight_distance_m", self.flight_distance_m),
            ("flight_speed_mps", self.flight_speed_mps),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        if !(0.0..360.0).contains(&self.flight_direction_deg) {
            return Err(ConfigError::DirectionOutOfRange(self.flight_direction_deg));
        }

        if !(self.close_factor >= 1.0 && self.close_factor < self.clear_factor) {
            return Err(ConfigError::ProximityFactors {
                close: self.close_factor,
                clear: self.clear_factor,
            });
        }

        Ok(())
    }

    /// Panics on a period that does not pass [`MissionConfig::validate`].
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_period_s)
    }

    pub fn close_radius_m(&self) -> f64 {
        self.close_factor * self.point_zone_m
    }

    pub fn clear_radius_m(&self) -> f64 {
        self.clear_factor * self.point_zone_m
    }

    /// Whether `ticks` scheduler periods cover a window of `window_s` seconds.
    pub fn window_elapsed(&self, ticks: u32, window_s: f64) -> bool {
        f64::from(ticks) >= window_s / self.tick_period_s - 0.001
    }
}
