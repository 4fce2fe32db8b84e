//! The mission state machine.
//!
//! One [`MissionMachine`] is bound to one vehicle. The scheduler calls
//! [`MissionMachine::tick`] once per period and feeds vehicle-originated
//! events through [`MissionMachine::handle_event`] on the same timeline, so
//! an event is always observed before the next tick decides anything.

mod guided;
mod passive;

use crate::config::{LegProtocol, MissionConfig, LAND_SETTLE_S, TAKEOFF_STABILIZE_S};
use crate::error::ArmRejected;
use crate::geo::Coordinate;
use crate::plan::WaypointPlan;
use crate::ports::{PowerPort, PowerSignal, VehiclePort};
use crate::telemetry::TelemetrySample;
use guided::GuidedLeg;
use mavlink::common::MavCmd;
use passive::PassiveLeg;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const LAND_MODE: &str = "LAND";
const GUIDED_MODE: &str = "GUIDED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Idle,
    Takeoff,
    Mission,
    Land,
}

/// Sub-stage within the current phase and the ticks spent in it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounter {
    pub stage: u8,
    pub tick: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionEvent {
    ArmedChanged(bool),
    FlightModeChanged(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TakeoffStage {
    Climbing,
    Stabilizing { ticks: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LandStage {
    Descending,
    AwaitingDisarm,
    Settling { ticks: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegStage {
    Guided(GuidedLeg),
    Passive(PassiveLeg),
}

#[derive(Debug, Clone, PartialEq)]
struct MissionRun {
    plan: WaypointPlan,
    cursor: usize,
    leg: LegStage,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Takeoff(TakeoffStage),
    Mission(MissionRun),
    Land(LandStage),
}

pub(crate) enum Progress {
    Continue,
    Complete,
}

pub struct MissionMachine {
    config: MissionConfig,
    state: State,
    previous_mode: Option<String>,
}

impl MissionMachine {
    pub fn new(config: MissionConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            previous_mode: None,
        }
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn phase(&self) -> MissionPhase {
        match self.state {
            State::Idle => MissionPhase::Idle,
            State::Takeoff(_) => MissionPhase::Takeoff,
            State::Mission(_) => MissionPhase::Mission,
            State::Land(_) => MissionPhase::Land,
        }
    }

    pub fn stage_counter(&self) -> StageCounter {
        let (stage, tick) = match &self.state {
            State::Idle => (0, 0),
            State::Takeoff(TakeoffStage::Climbing) => (0, 0),
            State::Takeoff(TakeoffStage::Stabilizing { ticks }) => (1, *ticks),
            State::Mission(run) => match &run.leg {
                LegStage::Guided(leg) => leg.stage(),
                LegStage::Passive(leg) => leg.stage(),
            },
            State::Land(LandStage::Descending) => (0, 0),
            State::Land(LandStage::AwaitingDisarm) => (1, 0),
            State::Land(LandStage::Settling { ticks }) => (2, *ticks),
        };
        StageCounter { stage, tick }
    }

    /// Index of the next waypoint; zero outside the mission phase.
    pub fn progress(&self) -> usize {
        match &self.state {
            State::Mission(run) => run.cursor,
            _ => 0,
        }
    }

    pub fn plan(&self) -> Option<&WaypointPlan> {
        match &self.state {
            State::Mission(run) => Some(&run.plan),
            _ => None,
        }
    }

    pub fn previous_flight_mode(&self) -> Option<&str> {
        self.previous_mode.as_deref()
    }

    pub fn handle_event<V, P>(&mut self, event: MissionEvent, vehicle: &mut V, power: &mut P)
    where
        V: VehiclePort + ?Sized,
        P: PowerPort + ?Sized,
    {
        match event {
            MissionEvent::ArmedChanged(armed) => {
                if let Err(err) = self.on_armed_changed(armed, vehicle, power) {
                    warn!("{err}");
                }
            }
            MissionEvent::FlightModeChanged(mode) => self.on_flight_mode_changed(&mode, vehicle),
        }
    }

    /// Disarm aborts to idle unless landing; arm starts a mission when the
    /// vehicle is on the ground in guided mode.
    pub fn on_armed_changed<V, P>(
        &mut self,
        armed: bool,
        vehicle: &mut V,
        power: &mut P,
    ) -> Result<(), ArmRejected>
    where
        V: VehiclePort + ?Sized,
        P: PowerPort + ?Sized,
    {
        if !armed {
            if !matches!(self.state, State::Land(_) | State::Idle) {
                info!(phase = ?self.phase(), "vehicle disarmed, mission aborted");
                self.state = State::Idle;
            }
            return Ok(());
        }

        let altitude_m = vehicle.relative_altitude_m();
        if altitude_m > self.config.point_zone_m {
            return Err(ArmRejected::Airborne {
                altitude_m,
                limit_m: self.config.point_zone_m,
            });
        }
        if !vehicle.is_guided() {
            return Err(ArmRejected::NotGuided);
        }

        power.send(PowerSignal::Stop, &[]);
        info!("Mission starts...");
        self.state = State::Takeoff(TakeoffStage::Climbing);
        let altitude = self.config.takeoff_altitude_m as f32;
        vehicle.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude],
        );
        Ok(())
    }

    /// Re-arms automatically on a Land to Guided switch while disarmed.
    ///
    /// Only the edge arms: a repeated Guided report finds Guided as the
    /// previous mode and does nothing.
    pub fn on_flight_mode_changed<V>(&mut self, mode: &str, vehicle: &mut V)
    where
        V: VehiclePort + ?Sized,
    {
        info!(mode, "flight mode changed");
        let guided = mode.eq_ignore_ascii_case(GUIDED_MODE);
        let from_land = self
            .previous_mode
            .as_deref()
            .is_some_and(|previous| previous.eq_ignore_ascii_case(LAND_MODE));
        if from_land && guided && !vehicle.is_armed() {
            info!("switched from Land to Guided, arming");
            vehicle.set_armed(true);
        }

        self.previous_mode = Some(mode.to_string());
    }

    /// Advances the machine by one scheduler period, then logs a telemetry line.
    pub fn tick<V, P>(&mut self, vehicle: &mut V, power: &mut P, now: SystemTime)
    where
        V: VehiclePort + ?Sized,
        P: PowerPort + ?Sized,
    {
        let next = match &mut self.state {
            State::Idle => None,
            State::Takeoff(stage) => step_takeoff(stage, &self.config, vehicle),
            State::Mission(run) => step_mission(run, &self.config, vehicle, power),
            State::Land(stage) => step_land(stage, &self.config, vehicle),
        };
        if let Some(state) = next {
            self.state = state;
        }

        let line = TelemetrySample::capture(vehicle, now).info_line();
        debug!(target: "telemetry", "{line}");
        power.send(PowerSignal::Info, line.as_bytes());
    }
}

fn step_takeoff<V>(stage: &mut TakeoffStage, config: &MissionConfig, vehicle: &mut V) -> Option<State>
where
    V: VehiclePort + ?Sized,
{
    if *stage == TakeoffStage::Climbing {
        if vehicle.relative_altitude_m() < config.takeoff_altitude_m - config.point_zone_m {
            return None;
        }
        // the tick that reaches altitude is the first hover tick
        *stage = TakeoffStage::Stabilizing { ticks: 0 };
    }

    match *stage {
        TakeoffStage::Climbing => None,
        TakeoffStage::Stabilizing { ticks } => {
            let ticks = ticks + 1;
            if !config.window_elapsed(ticks, TAKEOFF_STABILIZE_S) {
                *stage = TakeoffStage::Stabilizing { ticks };
                return None;
            }

            info!("Takeoff completed.");
            vehicle.command_long(
                MavCmd::MAV_CMD_DO_CHANGE_SPEED,
                [1.0, config.flight_speed_mps as f32, -1.0, 0.0, 0.0, 0.0, 0.0],
            );

            let start = vehicle.position();
            let plan = WaypointPlan::build(
                start,
                config.flight_direction_deg,
                config.flight_distance_m,
                config.protocol.layout(),
            );
            face_bearing(vehicle, config, start, config.flight_direction_deg);

            let leg = match config.protocol {
                LegProtocol::Guided => LegStage::Guided(GuidedLeg::Decide),
                LegProtocol::Passive => LegStage::Passive(PassiveLeg::Approach),
            };
            Some(State::Mission(MissionRun {
                plan,
                cursor: 0,
                leg,
            }))
        }
    }
}

fn step_mission<V, P>(
    run: &mut MissionRun,
    config: &MissionConfig,
    vehicle: &mut V,
    power: &mut P,
) -> Option<State>
where
    V: VehiclePort + ?Sized,
    P: PowerPort + ?Sized,
{
    let MissionRun { plan, cursor, leg } = run;
    let progress = match leg {
        LegStage::Guided(leg) => guided::step(leg, plan, cursor, config, vehicle, power),
        LegStage::Passive(leg) => passive::step(leg, plan, cursor, config, vehicle, power),
    };

    match progress {
        Progress::Continue => None,
        Progress::Complete => {
            info!(legs = plan.len(), "all legs flown, landing");
            vehicle.land();
            Some(State::Land(LandStage::Descending))
        }
    }
}

fn step_land<V>(stage: &mut LandStage, config: &MissionConfig, vehicle: &mut V) -> Option<State>
where
    V: VehiclePort + ?Sized,
{
    match *stage {
        LandStage::Descending => {
            if vehicle.relative_altitude_m() < config.point_zone_m {
                info!("Land completed. Waiting for disarm");
                *stage = LandStage::AwaitingDisarm;
            }
            None
        }
        LandStage::AwaitingDisarm => {
            if !vehicle.is_armed() {
                info!("Motors stopped. Waiting for 3 seconds.");
                *stage = LandStage::Settling { ticks: 0 };
            }
            None
        }
        LandStage::Settling { ticks } => {
            let ticks = ticks + 1;
            if config.window_elapsed(ticks, LAND_SETTLE_S) {
                info!("You may now restart the mission by changing to LAND and then GUIDED mode.");
                return Some(State::Idle);
            }
            *stage = LandStage::Settling { ticks };
            None
        }
    }
}

/// Holds position at `here` and yaws to `bearing_deg`.
///
/// The position target goes first: a later one would reset the yaw target.
pub(crate) fn face_bearing<V>(vehicle: &mut V, config: &MissionConfig, here: Coordinate, bearing_deg: f64)
where
    V: VehiclePort + ?Sized,
{
    vehicle.goto_location(here.at_distance_and_azimuth(0.0, bearing_deg));
    vehicle.command_long(
        MavCmd::MAV_CMD_CONDITION_YAW,
        [bearing_deg as f32, config.yaw_rate_deg_s as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
    );
}
