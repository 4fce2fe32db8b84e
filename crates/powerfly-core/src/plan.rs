use crate::geo::{bearing_difference, normalize_bearing, Coordinate};
use serde::{Deserialize, Serialize};

/// Consecutive entries closer than this are the same point.
const SAME_POINT_M: f64 = 0.001;
/// Inbound and outbound bearings closer than this form a straight line.
const STRAIGHT_TOLERANCE_DEG: f64 = 1.0;

/// Bearing offsets of the four measurement directions, relative to the flight direction.
const TURN_OFFSETS_DEG: [f64; 4] = [0.0, 45.0, 90.0, 135.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// Mid point between the start and a turn point. Passing it is marked with EVENT.
    Rally,
    /// End of a directional leg (a turn point or the start). Arriving stops the measurement.
    Turn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanLayout {
    /// `[mid, turn0, mid, start, ...]`, 16 entries, flown from the start point.
    OutAndBack,
    /// `[start, mid, turn0, mid, start, ...]`, 17 entries, closed at the start point.
    Closed,
}

impl PlanLayout {
    pub fn entry_count(self) -> usize {
        match self {
            PlanLayout::OutAndBack => 16,
            PlanLayout::Closed => 17,
        }
    }

    /// Kind of the entry at `index`. Parity alone decides it.
    pub fn kind_at(self, index: usize) -> WaypointKind {
        let even = index % 2 == 0;
        match (self, even) {
            (PlanLayout::OutAndBack, true) | (PlanLayout::Closed, false) => WaypointKind::Rally,
            (PlanLayout::OutAndBack, false) | (PlanLayout::Closed, true) => WaypointKind::Turn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: Coordinate,
    pub kind: WaypointKind,
    /// Lies on a straight line with its neighbours; flown through without re-heading.
    pub straight: bool,
}

/// The six surveyed points a plan is interleaved from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanAnchors {
    pub start: Coordinate,
    pub mid: Coordinate,
    /// Turn points at +0, +45, +90 and +135 degrees from the flight direction.
    pub turns: [Coordinate; 4],
}

impl PlanAnchors {
    pub fn generate(start: Coordinate, flight_direction_deg: f64, leg_distance_m: f64) -> Self {
        let mid = start.at_distance_and_azimuth(leg_distance_m, flight_direction_deg);
        let turns = TURN_OFFSETS_DEG.map(|offset| {
            mid.at_distance_and_azimuth(leg_distance_m, normalize_bearing(flight_direction_deg + offset))
        });
        Self { start, mid, turns }
    }
}

/// Ordered, immutable list of destinations for one mission run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointPlan {
    origin: Coordinate,
    layout: PlanLayout,
    waypoints: Vec<Waypoint>,
}

impl WaypointPlan {
    pub fn build(
        start: Coordinate,
        flight_direction_deg: f64,
        leg_distance_m: f64,
        layout: PlanLayout,
    ) -> Self {
        Self::from_anchors(&PlanAnchors::generate(start, flight_direction_deg, leg_distance_m), layout)
    }

    pub fn from_anchors(anchors: &PlanAnchors, layout: PlanLayout) -> Self {
        let mut points = Vec::with_capacity(layout.entry_count());
        if layout == PlanLayout::Closed {
            points.push(anchors.start);
        }
        for turn in anchors.turns {
            points.extend([anchors.mid, turn, anchors.mid, anchors.start]);
        }

        let straight = straight_flags(&anchors.start, &points);
        let waypoints = points
            .into_iter()
            .zip(straight)
            .enumerate()
            .map(|(index, (coordinate, straight))| Waypoint {
                coordinate,
                kind: layout.kind_at(index),
                straight,
            })
            .collect();

        Self {
            origin: anchors.start,
            layout,
            waypoints,
        }
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn layout(&self) -> PlanLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }
}

fn straight_flags(origin: &Coordinate, points: &[Coordinate]) -> Vec<bool> {
    points
        .iter()
        .enumerate()
        .map(|(index, here)| {
            let previous = if index == 0 { origin } else { &points[index - 1] };
            if previous.distance_to(here) < SAME_POINT_M {
                return true;
            }
            let Some(next) = points.get(index + 1) else {
                return false;
            };
            let inbound = previous.azimuth_to(here);
            let outbound = here.azimuth_to(next);
            bearing_difference(inbound, outbound) < STRAIGHT_TOLERANCE_DEG
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> Coordinate {
        Coordinate::new(43.00885, -78.78970, 5.0)
    }

    #[test]
    fn out_and_back_interleaves_anchors() {
        let anchors = PlanAnchors::generate(start(), 180.0, 50.0);
        let plan = WaypointPlan::from_anchors(&anchors, PlanLayout::OutAndBack);
        let a = &anchors;
        #[rustfmt::skip]
        let expected = [
            a.mid, a.turns[0], a.mid, a.start,
            a.mid, a.turns[1], a.mid, a.start,
            a.mid, a.turns[2], a.mid, a.start,
            a.mid, a.turns[3], a.mid, a.start,
        ];
        let got: Vec<Coordinate> = plan.waypoints().iter().map(|w| w.coordinate).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn closed_layout_starts_and_ends_at_start() {
        let plan = WaypointPlan::build(start(), 90.0, 30.0, PlanLayout::Closed);
        assert_eq!(plan.len(), 17);
        assert_eq!(plan.get(0).map(|w| w.coordinate), Some(start()));
        assert_eq!(plan.get(16).map(|w| w.coordinate), Some(start()));
        assert_eq!(plan.get(0).map(|w| w.kind), Some(WaypointKind::Turn));
        assert_eq!(plan.get(1).map(|w| w.kind), Some(WaypointKind::Rally));
    }

    #[test]
    fn build_is_deterministic() {
        let a = WaypointPlan::build(start(), 180.0, 50.0, PlanLayout::OutAndBack);
        let b = WaypointPlan::build(start(), 180.0, 50.0, PlanLayout::OutAndBack);
        for (x, y) in a.waypoints().iter().zip(b.waypoints()) {
            assert!((x.coordinate.latitude_deg - y.coordinate.latitude_deg).abs() < 1e-9);
            assert!((x.coordinate.longitude_deg - y.coordinate.longitude_deg).abs() < 1e-9);
        }
    }

    #[test]
    fn turn_points_sit_at_leg_distance_from_mid() {
        let anchors = PlanAnchors::generate(start(), 300.0, 40.0);
        assert!((anchors.start.distance_to(&anchors.mid) - 40.0).abs() < 1e-6);
        for (turn, offset) in anchors.turns.iter().zip(TURN_OFFSETS_DEG) {
            assert!((anchors.mid.distance_to(turn) - 40.0).abs() < 1e-6);
            let expected = normalize_bearing(300.0 + offset);
            assert!(bearing_difference(anchors.mid.azimuth_to(turn), expected) < 1e-6);
        }
    }

    #[test]
    fn only_first_two_mid_points_are_straight() {
        let plan = WaypointPlan::build(start(), 180.0, 50.0, PlanLayout::OutAndBack);
        let straight: Vec<usize> = plan
            .waypoints()
            .iter()
            .enumerate()
            .filter(|(_, w)| w.straight)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(straight, vec![0, 2]);
    }

    #[test]
    fn out_and_back_parity_decides_kind() {
        let plan = WaypointPlan::build(start(), 0.0, 50.0, PlanLayout::OutAndBack);
        for (index, waypoint) in plan.waypoints().iter().enumerate() {
            let expected = if index % 2 == 0 {
                WaypointKind::Rally
            } else {
                WaypointKind::Turn
            };
            assert_eq!(waypoint.kind, expected, "index {index}");
        }
    }
}
