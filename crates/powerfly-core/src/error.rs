/// Why an arm event did not start a mission.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArmRejected {
    #[error("the mission can not start while the drone is airborne ({altitude_m:.2} m above {limit_m:.2} m)")]
    Airborne { altitude_m: f64, limit_m: f64 },
    #[error("the mission can not start while the drone is not in Guided mode")]
    NotGuided,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("flight direction {0} is outside [0, 360)")]
    DirectionOutOfRange(f64),
    #[error("proximity factors must satisfy 1 <= close ({close}) < clear ({clear})")]
    ProximityFactors { close: f64, clear: f64 },
}
