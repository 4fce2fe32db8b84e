//! [`VehiclePort`] backed by a live MAVLink link.

use mavlink::common::MavCmd;
use powerfly_core::{Coordinate, VehiclePort};
use powerfly_link::{Telemetry, Vehicle, VehicleError, VehicleState};
use tokio::sync::{mpsc, watch};
use tracing::warn;

const GUIDED_MODE: &str = "GUIDED";

#[derive(Debug, Clone, PartialEq)]
enum VehicleOp {
    Arm(bool),
    CommandLong(MavCmd, [f32; 7]),
    Goto(Coordinate),
    Land,
}

impl VehicleOp {
    async fn apply(&self, vehicle: &Vehicle) -> Result<(), VehicleError> {
        match self {
            VehicleOp::Arm(true) => vehicle.arm(false).await,
            VehicleOp::Arm(false) => vehicle.disarm(false).await,
            VehicleOp::CommandLong(command, params) => vehicle.command_long(*command, *params).await,
            VehicleOp::Goto(target) => {
                vehicle
                    .goto(target.latitude_deg, target.longitude_deg, target.altitude_m as f32)
                    .await
            }
            VehicleOp::Land => vehicle.land().await,
        }
    }
}

/// Reads come from the link's watch channels; commands are queued to one
/// task that issues them in order and logs failures.
pub struct LinkedVehicle {
    state: watch::Receiver<VehicleState>,
    telemetry: watch::Receiver<Telemetry>,
    ops: mpsc::UnboundedSender<VehicleOp>,
}

impl LinkedVehicle {
    pub fn new(vehicle: Vehicle) -> Self {
        let (ops, queue) = mpsc::unbounded_channel();
        let state = vehicle.state();
        let telemetry = vehicle.telemetry();
        tokio::spawn(dispatch(vehicle, queue));
        Self {
            state,
            telemetry,
            ops,
        }
    }

    fn enqueue(&self, op: VehicleOp) {
        if self.ops.send(op).is_err() {
            warn!("vehicle command dispatcher stopped, command dropped");
        }
    }
}

async fn dispatch(vehicle: Vehicle, mut queue: mpsc::UnboundedReceiver<VehicleOp>) {
    while let Some(op) = queue.recv().await {
        if let Err(err) = op.apply(&vehicle).await {
            warn!(?op, "vehicle command failed: {err}");
        }
    }
}

impl VehiclePort for LinkedVehicle {
    fn is_armed(&self) -> bool {
        self.state.borrow().armed
    }

    fn is_guided(&self) -> bool {
        self.state.borrow().mode_name.eq_ignore_ascii_case(GUIDED_MODE)
    }

    fn position(&self) -> Coordinate {
        let telemetry = self.telemetry.borrow();
        Coordinate::new(
            telemetry.latitude_deg.unwrap_or_default(),
            telemetry.longitude_deg.unwrap_or_default(),
            telemetry.relative_altitude_m.unwrap_or_default(),
        )
    }

    fn relative_altitude_m(&self) -> f64 {
        self.telemetry.borrow().relative_altitude_m.unwrap_or_default()
    }

    fn ground_speed_mps(&self) -> f64 {
        self.telemetry.borrow().ground_speed_mps.unwrap_or_default()
    }

    fn set_armed(&mut self, armed: bool) {
        self.enqueue(VehicleOp::Arm(armed));
    }

    fn command_long(&mut self, command: MavCmd, params: [f32; 7]) {
        self.enqueue(VehicleOp::CommandLong(command, params));
    }

    fn goto_location(&mut self, target: Coordinate) {
        self.enqueue(VehicleOp::Goto(target));
    }

    fn land(&mut self) {
        self.enqueue(VehicleOp::Land);
    }
}
