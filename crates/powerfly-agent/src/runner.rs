//! The agent's main loop: keeps a vehicle bound, feeds its events to the
//! mission machine and ticks the machine at the configured period.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::frame::{Frame, PEER_IDENT};
use crate::peer::PeerLink;
use crate::power::PowerClient;
use crate::vehicle::LinkedVehicle;
use powerfly_core::{MissionEvent, MissionMachine};
use powerfly_link::{Vehicle, VehicleState};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

enum Unbound {
    LinkLost,
    Shutdown,
}

struct Agent {
    config: AgentConfig,
    machine: MissionMachine,
    power: PowerClient,
    power_inbound: mpsc::Receiver<Frame>,
    peer: PeerLink,
    peer_inbound: mpsc::Receiver<Frame>,
}

pub async fn run(config: AgentConfig, instance: u8, cancel: CancellationToken) -> Result<(), AgentError> {
    config.mission.validate()?;
    let address = config.vehicle_address(instance)?;
    let peer_address = config.peer_address(instance)?;

    let retry = config.reconnect_delay();
    let (power, power_inbound) = PowerClient::spawn(config.power_address(), retry, cancel.child_token());
    let (peer, peer_inbound) = PeerLink::spawn(peer_address, retry, cancel.child_token());
    let mut agent = Agent {
        machine: MissionMachine::new(config.mission.clone()),
        config,
        power,
        power_inbound,
        peer,
        peer_inbound,
    };

    info!(instance, %address, "agent started");

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = Vehicle::connect_with_config(&address, agent.config.vehicle_config()) => result,
        };

        match connected {
            Ok(vehicle) => {
                if let Unbound::Shutdown = agent.fly(vehicle, &cancel).await {
                    return Ok(());
                }
            }
            Err(err) => warn!(%address, "vehicle connection failed: {err}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(retry) => {}
        }
    }
}

impl Agent {
    /// Drives the machine for one bound vehicle until its link drops or the
    /// agent shuts down.
    async fn fly(&mut self, vehicle: Vehicle, cancel: &CancellationToken) -> Unbound {
        let vehicle_id = vehicle.identity().borrow().map(|identity| identity.system_id).unwrap_or(0);
        info!("New MAV connected with ID: {vehicle_id}");
        self.peer.set_peer_id(vehicle_id);
        self.power.set_source_id(vehicle_id);

        let mut state_rx = vehicle.state();
        let mut link_rx = vehicle.link_state();
        let mut port = LinkedVehicle::new(vehicle);

        let mut last = state_rx.borrow_and_update().clone();
        for event in rebind_events(&last) {
            self.machine.handle_event(event, &mut port, &mut self.power);
        }

        let mut ticker = tokio::time::interval(self.config.mission.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Unbound::Shutdown,
                changed = link_rx.changed() => {
                    if changed.is_err() || link_rx.borrow_and_update().is_down() {
                        break Unbound::LinkLost;
                    }
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break Unbound::LinkLost;
                    }
                    let current = state_rx.borrow_and_update().clone();
                    for event in state_events(&last, &current) {
                        self.machine.handle_event(event, &mut port, &mut self.power);
                    }
                    last = current;
                }
                Some(frame) = self.peer_inbound.recv() => log_inbound("peer", &frame),
                Some(frame) = self.power_inbound.recv() => log_inbound("power", &frame),
                _ = ticker.tick() => {
                    self.machine.tick(&mut port, &mut self.power, SystemTime::now());
                }
            }
        };

        if let Unbound::LinkLost = outcome {
            info!("MAV disconnected with ID: {vehicle_id}");
        }
        self.peer.set_peer_id(0);
        outcome
    }
}

/// Events implied by two consecutive heartbeats; a mode change is reported
/// before an arming change.
fn state_events(previous: &VehicleState, current: &VehicleState) -> Vec<MissionEvent> {
    let mut events = Vec::new();
    if current.mode_name != previous.mode_name {
        events.push(MissionEvent::FlightModeChanged(current.mode_name.clone()));
    }
    if current.armed != previous.armed {
        events.push(MissionEvent::ArmedChanged(current.armed));
    }
    events
}

/// Events that bring a machine which outlived its previous link up to date
/// with a freshly bound vehicle. A disarm missed while the link was down
/// still aborts the mission.
fn rebind_events(current: &VehicleState) -> Vec<MissionEvent> {
    let mut events = vec![MissionEvent::FlightModeChanged(current.mode_name.clone())];
    if !current.armed {
        events.push(MissionEvent::ArmedChanged(false));
    }
    events
}

fn log_inbound(channel: &str, frame: &Frame) {
    if frame.kind == PEER_IDENT {
        info!(channel, "peer agent {} announced itself", frame.source_id);
        return;
    }
    info!(
        channel,
        kind = frame.kind,
        "Data received from srcID={}: {}",
        frame.source_id,
        String::from_utf8_lossy(&frame.payload)
    );
}
