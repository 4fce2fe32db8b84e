use crate::ports::VehiclePort;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One row of the flight log forwarded to the power instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub since_epoch: Duration,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub relative_altitude_m: f64,
    pub ground_speed_mps: f64,
}

impl TelemetrySample {
    pub fn capture<V: VehiclePort + ?Sized>(vehicle: &V, now: SystemTime) -> Self {
        let position = vehicle.position();
        Self {
            since_epoch: now.duration_since(UNIX_EPOCH).unwrap_or_default(),
            latitude_deg: position.latitude_deg,
            longitude_deg: position.longitude_deg,
            relative_altitude_m: vehicle.relative_altitude_m(),
            ground_speed_mps: vehicle.ground_speed_mps(),
        }
    }

    /// `<epoch s, 3 dp>\tLAT=..\tLON=..\tALT=..\tVEL=..`, values at 20 decimals.
    pub fn info_line(&self) -> String {
        let seconds = self.since_epoch.as_millis() as f64 / 1000.0;
        format!(
            "{seconds:.3}\tLAT={:.20}\tLON={:.20}\tALT={:.20}\tVEL={:.20}",
            self.latitude_deg, self.longitude_deg, self.relative_altitude_m, self.ground_speed_mps,
        )
    }
}
