//! Leg protocol in which the controller flies every leg itself.

use super::{face_bearing, Progress};
use crate::config::MissionConfig;
use crate::plan::{WaypointKind, WaypointPlan};
use crate::ports::{PowerPort, PowerSignal, VehiclePort};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuidedLeg {
    /// Pick the next waypoint and turn towards it.
    Decide,
    /// Let the heading settle, then start the measurement and fly.
    CommitHeading { ticks: u32 },
    /// Wait for arrival. `dwell` latches on the first tick inside the point zone.
    ///
    /// A straight leg ends here without waiting and without a terminal
    /// signal: the measurement started towards a straight mid point keeps
    /// running through it and is closed by the STOP at the turn point.
    TrackArrival { dwell: Option<u32> },
}

impl GuidedLeg {
    pub(crate) fn stage(&self) -> (u8, u32) {
        match *self {
            GuidedLeg::Decide => (0, 0),
            GuidedLeg::CommitHeading { ticks } => (1, ticks),
            GuidedLeg::TrackArrival { dwell } => (2, dwell.unwrap_or(0)),
        }
    }
}

pub(crate) fn step<V, P>(
    leg: &mut GuidedLeg,
    plan: &WaypointPlan,
    cursor: &mut usize,
    config: &MissionConfig,
    vehicle: &mut V,
    power: &mut P,
) -> Progress
where
    V: VehiclePort + ?Sized,
    P: PowerPort + ?Sized,
{
    loop {
        let Some(target) = plan.get(*cursor).copied() else {
            return Progress::Complete;
        };

        match *leg {
            GuidedLeg::Decide => {
                *leg = GuidedLeg::CommitHeading { ticks: 0 };
                if target.straight {
                    debug!(index = *cursor, "straight continuation, keeping heading");
                    continue;
                }
                let here = vehicle.position();
                let bearing = here.azimuth_to(&target.coordinate);
                debug!(index = *cursor, bearing, "fixing heading");
                face_bearing(vehicle, config, here, bearing);
                return Progress::Continue;
            }
            GuidedLeg::CommitHeading { ticks } => {
                let ticks = ticks + 1;
                let settle = target.kind == WaypointKind::Rally && !target.straight;
                if settle && !config.window_elapsed(ticks, config.target_wait_time_s) {
                    *leg = GuidedLeg::CommitHeading { ticks };
                    return Progress::Continue;
                }

                if target.kind == WaypointKind::Rally {
                    info!(index = *cursor, "heading to rally point, starting power measurement");
                    // STOP first so a stale measurement is discarded
                    power.send(PowerSignal::Stop, &[]);
                    power.send(PowerSignal::Start, &[]);
                }
                vehicle.goto_location(target.coordinate);
                *leg = GuidedLeg::TrackArrival { dwell: None };
                if !target.straight {
                    return Progress::Continue;
                }
            }
            GuidedLeg::TrackArrival { dwell } => {
                if target.straight {
                    *cursor += 1;
                    *leg = GuidedLeg::Decide;
                    return Progress::Continue;
                }

                let dwell = match dwell {
                    Some(ticks) => Some(ticks + 1),
                    None if vehicle.position().distance_to(&target.coordinate) < config.point_zone_m => {
                        debug!(index = *cursor, "inside point zone");
                        Some(1)
                    }
                    None => None,
                };

                match dwell {
                    Some(ticks) if config.window_elapsed(ticks, config.target_stabilize_time_s) => {
                        match target.kind {
                            WaypointKind::Rally => {
                                info!(index = *cursor, "rally point reached, sending EVENT");
                                power.send(PowerSignal::Event, &[]);
                            }
                            WaypointKind::Turn => {
                                info!(index = *cursor, "turn point reached, stopping power measurement");
                                power.send(PowerSignal::Stop, &[]);
                            }
                        }
                        *cursor += 1;
                        *leg = GuidedLeg::Decide;
                    }
                    _ => *leg = GuidedLeg::TrackArrival { dwell },
                }
                return Progress::Continue;
            }
        }
    }
}
