use crate::command::Command;
use crate::config::VehicleConfig;
use crate::error::VehicleError;
use crate::state::{
    AutopilotType, GpsFixType, LinkState, StateWriters, SystemStatus, VehicleIdentity,
    VehicleState, VehicleType,
};
use mavlink::common::{self, MavCmd, MavModeFlag};
use mavlink::{AsyncMavConnection, MavHeader};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const MAGIC_FORCE_ARM_VALUE: f32 = 2989.0;
const MAGIC_FORCE_DISARM_VALUE: f32 = 21196.0;

/// Position and velocity target fields ignored by a guided goto: everything
/// but the position, including yaw and yaw rate so a goto keeps the heading.
const GOTO_TYPE_MASK: u16 = 0x0FF8;

/// Messages the controller reads every tick.
const STREAMED_MESSAGES: [u32; 2] = [
    33, // GLOBAL_POSITION_INT
    74, // VFR_HUD
];

type Connection = dyn AsyncMavConnection<common::MavMessage> + Sync + Send;

#[derive(Debug, Clone, Copy)]
struct VehicleTarget {
    system_id: u8,
    component_id: u8,
    autopilot: common::MavAutopilot,
    vehicle_type: common::MavType,
    /// Set once the system has identified itself with an autopilot heartbeat.
    confirmed: bool,
}

pub(crate) async fn run_event_loop(
    connection: Box<Connection>,
    mut command_rx: mpsc::Receiver<Command>,
    state_writers: StateWriters,
    config: VehicleConfig,
    cancel: CancellationToken,
) {
    let mut vehicle_target: Option<VehicleTarget> = None;
    let mut streams_requested = false;

    let _ = state_writers.link_state.send(LinkState::Connected);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                let _ = state_writers.link_state.send(LinkState::Disconnected);
                break;
            }
            Some(cmd) = command_rx.recv() => {
                if let Command::Shutdown = cmd {
                    debug!("event loop shutdown requested");
                    let _ = state_writers.link_state.send(LinkState::Disconnected);
                    break;
                }
                handle_command(cmd, &*connection, &state_writers, &mut vehicle_target, &config, &cancel).await;
            }
            result = connection.recv() => {
                match result {
                    Ok((header, msg)) => {
                        update_vehicle_target(&mut vehicle_target, &header, &msg);
                        if !streams_requested {
                            if let Some(target) = vehicle_target {
                                request_streams(&*connection, &target, &config).await;
                                streams_requested = true;
                            }
                        }
                        update_state(&header, &msg, &state_writers, &vehicle_target);
                    }
                    Err(err) => {
                        warn!("MAVLink recv error: {err}");
                        let _ = state_writers.link_state.send(LinkState::Error(err.to_string()));
                        break;
                    }
                }
            }
        }
    }
}

async fn request_streams(connection: &Connection, target: &VehicleTarget, config: &VehicleConfig) {
    let Some(interval) = config.telemetry_interval() else {
        return;
    };
    let interval_us = interval.as_micros() as f32;
    for message_id in STREAMED_MESSAGES {
        let message = command_long_message(
            target,
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [message_id as f32, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0],
        );
        if let Err(err) = send_message(connection, config, message).await {
            warn!(message_id, "failed to request message interval: {err}");
        }
    }
}

/// Heartbeats from components that are not an autopilot (a GCS, a camera, a
/// gimbal) never become the target. Once an autopilot heartbeat has been
/// seen, the target stays on that system.
fn update_vehicle_target(
    vehicle_target: &mut Option<VehicleTarget>,
    header: &MavHeader,
    message: &common::MavMessage,
) {
    if header.system_id == 0 {
        return;
    }

    if let common::MavMessage::HEARTBEAT(hb) = message {
        if hb.autopilot == common::MavAutopilot::MAV_AUTOPILOT_INVALID {
            return;
        }
        if vehicle_target.is_some_and(|t| t.confirmed && t.system_id != header.system_id) {
            trace!(system_id = header.system_id, "heartbeat from another system ignored");
            return;
        }
        *vehicle_target = Some(VehicleTarget {
            system_id: header.system_id,
            component_id: header.component_id,
            autopilot: hb.autopilot,
            vehicle_type: hb.mavtype,
            confirmed: true,
        });
    } else if vehicle_target.is_none() {
        *vehicle_target = Some(VehicleTarget {
            system_id: header.system_id,
            component_id: header.component_id,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_GENERIC,
            vehicle_type: common::MavType::MAV_TYPE_GENERIC,
            confirmed: false,
        });
    }
}

#[cfg(feature = "ardupilot")]
fn describe_mode(autopilot: AutopilotType, custom_mode: u32) -> String {
    crate::modes::mode_name(autopilot, custom_mode)
}

#[cfg(not(feature = "ardupilot"))]
fn describe_mode(_autopilot: AutopilotType, custom_mode: u32) -> String {
    format!("MODE({custom_mode})")
}

fn update_state(
    header: &MavHeader,
    message: &common::MavMessage,
    writers: &StateWriters,
    vehicle_target: &Option<VehicleTarget>,
) {
    if vehicle_target.is_some_and(|t| t.system_id != header.system_id) {
        return;
    }

    match message {
        common::MavMessage::HEARTBEAT(hb) => {
            let Some(target) = vehicle_target else {
                return;
            };
            if hb.autopilot == common::MavAutopilot::MAV_AUTOPILOT_INVALID {
                return;
            }
            let autopilot = AutopilotType::from_mav(target.autopilot);
            let identity = VehicleIdentity {
                system_id: target.system_id,
                component_id: target.component_id,
                autopilot,
                vehicle_type: VehicleType::from_mav(target.vehicle_type),
            };
            writers.identity.send_if_modified(|current| {
                let changed = *current != Some(identity);
                *current = Some(identity);
                changed
            });

            let state = VehicleState {
                armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
                custom_mode: hb.custom_mode,
                mode_name: describe_mode(autopilot, hb.custom_mode),
                system_status: SystemStatus::from_mav(hb.system_status),
            };
            writers.vehicle_state.send_if_modified(|current| {
                let changed = *current != state;
                *current = state;
                changed
            });
        }
        common::MavMessage::VFR_HUD(data) => {
            writers.telemetry.send_modify(|t| {
                t.ground_speed_mps = Some(data.groundspeed as f64);
                t.heading_deg = Some(data.heading as f64);
            });
        }
        common::MavMessage::GLOBAL_POSITION_INT(data) => {
            writers.telemetry.send_modify(|t| {
                t.relative_altitude_m = Some(data.relative_alt as f64 / 1000.0);
                t.latitude_deg = Some(data.lat as f64 / 1e7);
                t.longitude_deg = Some(data.lon as f64 / 1e7);
                let vx = data.vx as f64 / 100.0;
                let vy = data.vy as f64 / 100.0;
                t.ground_speed_mps = Some((vx * vx + vy * vy).sqrt());
                if data.hdg != u16::MAX {
                    t.heading_deg = Some(data.hdg as f64 / 100.0);
                }
            });
        }
        common::MavMessage::GPS_RAW_INT(data) => {
            writers.telemetry.send_modify(|t| {
                t.gps_fix_type = Some(GpsFixType::from_raw(data.fix_type as u8));
            });
        }
        _ => {
            trace!("unhandled message type");
        }
    }
}

// ---------------------------------------------------------------------------
// Command handling
// ---------------------------------------------------------------------------

async fn handle_command(
    cmd: Command,
    connection: &Connection,
    writers: &StateWriters,
    vehicle_target: &mut Option<VehicleTarget>,
    config: &VehicleConfig,
    cancel: &CancellationToken,
) {
    let mut link = Link {
        connection,
        writers,
        vehicle_target,
        config,
        cancel,
    };
    match cmd {
        Command::Arm { force, reply } => {
            let _ = reply.send(link.arm_disarm(true, force).await);
        }
        Command::Disarm { force, reply } => {
            let _ = reply.send(link.arm_disarm(false, force).await);
        }
        Command::SetMode { custom_mode, reply } => {
            let _ = reply.send(link.set_mode(custom_mode).await);
        }
        Command::CommandLong { command, params, reply } => {
            let _ = reply.send(link.command_long_ack(command, params).await);
        }
        Command::GuidedGoto {
            lat_e7,
            lon_e7,
            alt_m,
            reply,
        } => {
            let _ = reply.send(link.guided_goto(lat_e7, lon_e7, alt_m).await);
        }
        Command::Shutdown => {}
    }
}

/// Everything a command handler needs while it owns the connection.
struct Link<'a> {
    connection: &'a Connection,
    writers: &'a StateWriters,
    vehicle_target: &'a mut Option<VehicleTarget>,
    config: &'a VehicleConfig,
    cancel: &'a CancellationToken,
}

impl Link<'_> {
    fn target(&self) -> Result<VehicleTarget, VehicleError> {
        self.vehicle_target.ok_or(VehicleError::IdentityUnknown)
    }

    /// Receives one message and keeps the shared state current with it.
    async fn recv(&mut self) -> Result<common::MavMessage, VehicleError> {
        let (header, msg) = self.connection.recv().await.map_err(VehicleError::io)?;
        update_vehicle_target(self.vehicle_target, &header, &msg);
        update_state(&header, &msg, self.writers, self.vehicle_target);
        Ok(msg)
    }

    async fn arm_disarm(&mut self, arm: bool, force: bool) -> Result<(), VehicleError> {
        let param1 = if arm { 1.0 } else { 0.0 };
        let param2 = match (force, arm) {
            (false, _) => 0.0,
            (true, true) => MAGIC_FORCE_ARM_VALUE,
            (true, false) => MAGIC_FORCE_DISARM_VALUE,
        };
        self.command_long_ack(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [param1, param2, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .await
    }

    /// Sends a COMMAND_LONG and waits for its COMMAND_ACK, resending on timeout.
    async fn command_long_ack(&mut self, command: MavCmd, params: [f32; 7]) -> Result<(), VehicleError> {
        let target = self.target()?;
        let retry_policy = self.config.retry_policy;
        let cancel = self.cancel;

        for attempt in 0..=retry_policy.max_retries {
            if attempt > 0 {
                debug!(?command, attempt, "no COMMAND_ACK, resending");
            }
            send_message(
                self.connection,
                self.config,
                command_long_message(&target, command, params),
            )
            .await?;

            let deadline = tokio::time::sleep(Duration::from_millis(retry_policy.ack_timeout_ms));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(VehicleError::Cancelled),
                    _ = &mut deadline => break,
                    result = self.recv() => {
                        if let common::MavMessage::COMMAND_ACK(ack) = result? {
                            if ack.command == command {
                                return ack_result(command, ack.result);
                            }
                        }
                    }
                }
            }
        }

        Err(VehicleError::Timeout)
    }

    async fn set_mode(&mut self, custom_mode: u32) -> Result<(), VehicleError> {
        let acked = self
            .command_long_ack(
                MavCmd::MAV_CMD_DO_SET_MODE,
                [1.0, custom_mode as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
            )
            .await;
        if acked.is_ok() {
            return Ok(());
        }

        // older firmware only confirms through the heartbeat
        let cancel = self.cancel;
        let deadline = tokio::time::sleep(Duration::from_secs(2));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VehicleError::Cancelled),
                _ = &mut deadline => {
                    return Err(VehicleError::CommandRejected {
                        command: format!("DO_SET_MODE({custom_mode})"),
                        result: "no confirming HEARTBEAT".to_string(),
                    });
                }
                result = self.recv() => {
                    if let common::MavMessage::HEARTBEAT(hb) = result? {
                        if hb.custom_mode == custom_mode {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn guided_goto(&mut self, lat_e7: i32, lon_e7: i32, alt_m: f32) -> Result<(), VehicleError> {
        let target = self.target()?;
        send_message(
            self.connection,
            self.config,
            common::MavMessage::SET_POSITION_TARGET_GLOBAL_INT(
                common::SET_POSITION_TARGET_GLOBAL_INT_DATA {
                    time_boot_ms: 0,
                    target_system: target.system_id,
                    target_component: target.component_id,
                    coordinate_frame: common::MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
                    type_mask: common::PositionTargetTypemask::from_bits_truncate(GOTO_TYPE_MASK),
                    lat_int: lat_e7,
                    lon_int: lon_e7,
                    alt: alt_m,
                    vx: 0.0,
                    vy: 0.0,
                    vz: 0.0,
                    afx: 0.0,
                    afy: 0.0,
                    afz: 0.0,
                    yaw: 0.0,
                    yaw_rate: 0.0,
                },
            ),
        )
        .await
    }
}

fn ack_result(command: MavCmd, result: common::MavResult) -> Result<(), VehicleError> {
    match result {
        common::MavResult::MAV_RESULT_ACCEPTED | common::MavResult::MAV_RESULT_IN_PROGRESS => Ok(()),
        other => Err(VehicleError::CommandRejected {
            command: format!("{command:?}"),
            result: format!("{other:?}"),
        }),
    }
}

fn command_long_message(target: &VehicleTarget, command: MavCmd, params: [f32; 7]) -> common::MavMessage {
    common::MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
        target_system: target.system_id,
        target_component: target.component_id,
        command,
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    })
}

async fn send_message(
    connection: &Connection,
    config: &VehicleConfig,
    message: common::MavMessage,
) -> Result<(), VehicleError> {
    connection
        .send(
            &MavHeader {
                system_id: config.gcs_system_id,
                component_id: config.gcs_component_id,
                sequence: 0,
            },
            &message,
        )
        .await
        .map(|_| ())
        .map_err(VehicleError::io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{create_channels, Telemetry};

    fn header(system_id: u8) -> MavHeader {
        MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        }
    }

    fn heartbeat(custom_mode: u32, armed: bool) -> common::MavMessage {
        let base_mode = if armed {
            MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        } else {
            MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        };
        common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
            custom_mode,
            mavtype: common::MavType::MAV_TYPE_QUADROTOR,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: common::MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn position(lat: i32, lon: i32, relative_alt: i32, vx: i16, vy: i16) -> common::MavMessage {
        common::MavMessage::GLOBAL_POSITION_INT(common::GLOBAL_POSITION_INT_DATA {
            time_boot_ms: 0,
            lat,
            lon,
            alt: relative_alt + 180_000,
            relative_alt,
            vx,
            vy,
            vz: 0,
            hdg: u16::MAX,
        })
    }

    #[test]
    fn heartbeat_publishes_identity_and_mode() {
        let (writers, channels) = create_channels();
        let mut target = None;
        let msg = heartbeat(4, true);
        update_vehicle_target(&mut target, &header(7), &msg);
        update_state(&header(7), &msg, &writers, &target);

        let identity = (*channels.identity.borrow()).expect("identity after heartbeat");
        assert_eq!(identity.system_id, 7);
        assert_eq!(identity.autopilot, AutopilotType::ArduPilotMega);
        assert_eq!(identity.vehicle_type, VehicleType::Quadrotor);

        let state = channels.vehicle_state.borrow().clone();
        assert!(state.armed);
        assert_eq!(state.custom_mode, 4);
        assert_eq!(state.system_status, SystemStatus::Active);
        #[cfg(feature = "ardupilot")]
        assert_eq!(state.mode_name, "GUIDED");
    }

    fn gcs_heartbeat() -> common::MavMessage {
        common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: common::MavType::MAV_TYPE_GCS,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: common::MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    #[test]
    fn gcs_heartbeat_does_not_disarm_the_vehicle() {
        let (writers, channels) = create_channels();
        let mut target = None;
        for (system_id, msg) in [(1, heartbeat(4, true)), (255, gcs_heartbeat())] {
            update_vehicle_target(&mut target, &header(system_id), &msg);
            update_state(&header(system_id), &msg, &writers, &target);
        }

        assert_eq!(target.map(|t| t.system_id), Some(1));
        assert_eq!(channels.identity.borrow().map(|i| i.system_id), Some(1));
        assert!(channels.vehicle_state.borrow().armed);
    }

    #[test]
    fn second_autopilot_does_not_take_over_the_target() {
        let (writers, channels) = create_channels();
        let mut target = None;
        for (system_id, msg) in [(1, heartbeat(4, true)), (2, heartbeat(9, false))] {
            update_vehicle_target(&mut target, &header(system_id), &msg);
            update_state(&header(system_id), &msg, &writers, &target);
        }

        assert_eq!(target.map(|t| t.system_id), Some(1));
        let state = channels.vehicle_state.borrow().clone();
        assert!(state.armed);
        assert_eq!(state.custom_mode, 4);
    }

    #[test]
    fn telemetry_from_other_systems_is_ignored() {
        let (writers, channels) = create_channels();
        let mut target = None;
        let msg = heartbeat(4, true);
        update_vehicle_target(&mut target, &header(1), &msg);
        update_state(&header(1), &position(430_000_000, 0, 5_000, 0, 0), &writers, &target);
        update_state(&header(255), &position(0, 0, 0, 0, 0), &writers, &target);

        assert_eq!(channels.telemetry.borrow().relative_altitude_m, Some(5.0));
    }

    #[test]
    fn autopilot_heartbeat_confirms_a_provisional_target() {
        let mut target = None;
        update_vehicle_target(&mut target, &header(3), &position(0, 0, 0, 0, 0));
        update_vehicle_target(&mut target, &header(1), &heartbeat(4, false));
        let target = target.expect("target after heartbeat");
        assert_eq!(target.system_id, 1);
        assert!(target.confirmed);
    }

    #[test]
    fn repeated_heartbeat_does_not_wake_watchers() {
        let (writers, mut channels) = create_channels();
        let mut target = None;
        let msg = heartbeat(9, false);
        update_vehicle_target(&mut target, &header(1), &msg);
        update_state(&header(1), &msg, &writers, &target);
        channels.vehicle_state.mark_unchanged();

        update_state(&header(1), &msg, &writers, &target);
        assert!(!channels.vehicle_state.has_changed().unwrap());

        update_state(&header(1), &heartbeat(4, false), &writers, &target);
        assert!(channels.vehicle_state.has_changed().unwrap());
    }

    #[test]
    fn global_position_fills_navigation_readouts() {
        let (writers, channels) = create_channels();
        let target = None;
        update_state(
            &header(1),
            &position(430_088_501, -787_897_001, 5_250, 300, 400),
            &writers,
            &target,
        );

        let telemetry: Telemetry = channels.telemetry.borrow().clone();
        assert!((telemetry.latitude_deg.unwrap() - 43.0088501).abs() < 1e-9);
        assert!((telemetry.longitude_deg.unwrap() + 78.7897001).abs() < 1e-9);
        assert_eq!(telemetry.relative_altitude_m, Some(5.25));
        assert_eq!(telemetry.ground_speed_mps, Some(5.0));
        assert_eq!(telemetry.heading_deg, None);
    }

    #[test]
    fn vfr_hud_updates_speed_but_not_altitude() {
        let (writers, channels) = create_channels();
        let target = None;
        update_state(&header(1), &position(0, 0, 2_000, 0, 0), &writers, &target);
        update_state(
            &header(1),
            &common::MavMessage::VFR_HUD(common::VFR_HUD_DATA {
                airspeed: 4.0,
                groundspeed: 3.5,
                alt: 182.0,
                climb: 0.0,
                heading: 90,
                throttle: 40,
            }),
            &writers,
            &target,
        );

        let telemetry = channels.telemetry.borrow().clone();
        assert_eq!(telemetry.relative_altitude_m, Some(2.0));
        assert_eq!(telemetry.ground_speed_mps, Some(3.5));
        assert_eq!(telemetry.heading_deg, Some(90.0));
    }

    #[test]
    fn non_heartbeat_sets_generic_target_once() {
        let mut target = None;
        update_vehicle_target(&mut target, &header(3), &position(0, 0, 0, 0, 0));
        let first = target.expect("target from any message");
        assert_eq!(first.system_id, 3);
        assert_eq!(first.autopilot, common::MavAutopilot::MAV_AUTOPILOT_GENERIC);

        update_vehicle_target(&mut target, &header(4), &position(0, 0, 0, 0, 0));
        assert_eq!(target.map(|t| t.system_id), Some(3));
    }

    #[test]
    fn broadcast_system_is_ignored() {
        let mut target = None;
        update_vehicle_target(&mut target, &header(0), &heartbeat(0, false));
        assert!(target.is_none());
    }

    #[test]
    fn ack_in_progress_counts_as_accepted() {
        let cmd = MavCmd::MAV_CMD_NAV_TAKEOFF;
        assert!(ack_result(cmd, common::MavResult::MAV_RESULT_IN_PROGRESS).is_ok());
        assert!(matches!(
            ack_result(cmd, common::MavResult::MAV_RESULT_DENIED),
            Err(VehicleError::CommandRejected { .. })
        ));
    }
}
