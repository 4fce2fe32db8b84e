//! Leg protocol for an externally flown vehicle: only the measurement is sequenced.

use super::Progress;
use crate::config::MissionConfig;
use crate::plan::WaypointPlan;
use crate::ports::{PowerPort, PowerSignal, VehiclePort};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassiveLeg {
    /// Closing in on a heading point (even cursor).
    Approach,
    /// Holding at the heading point before turning out again.
    Hold { ticks: u32 },
    /// Leaving the previous heading point (odd cursor).
    Depart,
    /// Closing in on the rally point.
    PassRally,
}

impl PassiveLeg {
    pub(crate) fn stage(&self) -> (u8, u32) {
        match *self {
            PassiveLeg::Approach => (0, 0),
            PassiveLeg::Hold { ticks } => (1, ticks),
            PassiveLeg::Depart => (2, 0),
            PassiveLeg::PassRally => (3, 0),
        }
    }

    fn expects_even_cursor(&self) -> bool {
        matches!(self, PassiveLeg::Approach | PassiveLeg::Hold { .. })
    }
}

pub(crate) fn step<V, P>(
    leg: &mut PassiveLeg,
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
    if leg.expects_even_cursor() != (*cursor % 2 == 0) {
        warn!(cursor = *cursor, stage = leg.stage().0, "progress cursor parity mismatch");
    }

    let Some(target) = plan.get(*cursor).copied() else {
        return Progress::Complete;
    };
    let here = vehicle.position();

    match *leg {
        PassiveLeg::Approach => {
            if here.distance_to(&target.coordinate) < config.close_radius_m() {
                info!(index = *cursor, "getting close to the target, stopping power measurement");
                power.send(PowerSignal::Stop, &[]);
                *leg = PassiveLeg::Hold { ticks: 0 };
            }
        }
        PassiveLeg::Hold { ticks } => {
            let ticks = ticks + 1;
            if config.window_elapsed(ticks, config.target_wait_time_s) {
                *cursor += 1;
                if *cursor >= plan.len() {
                    return Progress::Complete;
                }
                *leg = PassiveLeg::Depart;
            } else {
                *leg = PassiveLeg::Hold { ticks };
            }
        }
        PassiveLeg::Depart => {
            let Some(previous) = cursor.checked_sub(1).and_then(|index| plan.get(index)) else {
                warn!(cursor = *cursor, "no heading point behind the cursor");
                *leg = PassiveLeg::PassRally;
                return Progress::Continue;
            };
            if here.distance_to(&previous.coordinate) > config.clear_radius_m() {
                info!(index = *cursor, "getting away from heading point, starting power measurement");
                // discards any unfinished measurement
                power.send(PowerSignal::Stop, &[]);
                power.send(PowerSignal::Start, &[]);
                *leg = PassiveLeg::PassRally;
            }
        }
        PassiveLeg::PassRally => {
            if here.distance_to(&target.coordinate) < config.close_radius_m() {
                info!(index = *cursor, "getting close to the rally point, sending EVENT");
                power.send(PowerSignal::Event, &[]);
                *cursor += 1;
                *leg = PassiveLeg::Approach;
            }
        }
    }

    Progress::Continue
}
