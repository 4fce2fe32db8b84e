//! Drives a `Vehicle` against a minimal in-process autopilot over TCP.

use mavlink::common::{self, MavCmd, MavModeFlag, MavResult};
use mavlink::{AsyncMavConnection, MavHeader};
use powerfly_link::{AutopilotType, Vehicle, VehicleError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GUIDED: u32 = 4;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn header() -> MavHeader {
    MavHeader {
        system_id: 1,
        component_id: 1,
        sequence: 0,
    }
}

fn heartbeat(armed: bool) -> common::MavMessage {
    let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
    if armed {
        base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
    }
    common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
        custom_mode: GUIDED,
        mavtype: common::MavType::MAV_TYPE_QUADROTOR,
        autopilot: common::MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        base_mode,
        system_status: common::MavState::MAV_STATE_STANDBY,
        mavlink_version: 3,
    })
}

fn position() -> common::MavMessage {
    common::MavMessage::GLOBAL_POSITION_INT(common::GLOBAL_POSITION_INT_DATA {
        time_boot_ms: 1_000,
        lat: 430_088_501,
        lon: -787_897_001,
        alt: 180_500,
        relative_alt: 500,
        vx: 0,
        vy: 0,
        vz: 0,
        hdg: 18_000,
    })
}

fn ack(command: MavCmd, result: MavResult) -> common::MavMessage {
    common::MavMessage::COMMAND_ACK(common::COMMAND_ACK_DATA {
        command,
        result,
        progress: 0,
        result_param2: 0,
        target_system: 255,
        target_component: 190,
    })
}

/// Accepts one client, streams heartbeat and position, acks arming and
/// refuses takeoff.
async fn serve(port: u16) {
    let connection = mavlink::connect_async::<common::MavMessage>(&format!("tcpin:127.0.0.1:{port}"))
        .await
        .unwrap();
    let armed = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let hb = heartbeat(armed.load(Ordering::SeqCst));
                if connection.send(&header(), &hb).await.is_err() {
                    return;
                }
                let _ = connection.send(&header(), &position()).await;
            }
            received = connection.recv() => {
                let Ok((_, message)) = received else {
                    return;
                };
                if let common::MavMessage::COMMAND_LONG(cmd) = message {
                    let result = match cmd.command {
                        MavCmd::MAV_CMD_COMPONENT_ARM_DISARM => {
                            armed.store(cmd.param1 > 0.5, Ordering::SeqCst);
                            MavResult::MAV_RESULT_ACCEPTED
                        }
                        MavCmd::MAV_CMD_NAV_TAKEOFF => MavResult::MAV_RESULT_DENIED,
                        _ => MavResult::MAV_RESULT_ACCEPTED,
                    };
                    let _ = connection.send(&header(), &ack(cmd.command, result)).await;
                }
            }
        }
    }
}

async fn connect(port: u16) -> Vehicle {
    for _ in 0..50 {
        match Vehicle::connect_tcp(&format!("127.0.0.1:{port}")).await {
            Ok(vehicle) => return vehicle,
            Err(VehicleError::ConnectionFailed(_)) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(err) => panic!("connect failed: {err}"),
        }
    }
    panic!("fake autopilot never accepted");
}

#[tokio::test]
async fn heartbeat_and_position_reach_the_watch_channels() {
    let port = free_port();
    tokio::spawn(serve(port));
    let vehicle = connect(port).await;

    let identity = (*vehicle.identity().borrow()).expect("identity after connect");
    assert_eq!(identity.system_id, 1);
    assert_eq!(identity.autopilot, AutopilotType::ArduPilotMega);

    let mut telemetry = vehicle.telemetry();
    let seen = tokio::time::timeout(
        Duration::from_secs(2),
        telemetry.wait_for(|t| t.relative_altitude_m.is_some()),
    )
    .await
    .expect("position within two seconds")
    .map(|t| t.clone())
    .unwrap();
    assert_eq!(seen.relative_altitude_m, Some(0.5));
    assert_eq!(seen.heading_deg, Some(180.0));
    assert_eq!(vehicle.state().borrow().mode_name, "GUIDED");
}

#[tokio::test]
async fn arm_is_acknowledged_and_reflected_in_state() {
    let port = free_port();
    tokio::spawn(serve(port));
    let vehicle = connect(port).await;

    vehicle.arm(false).await.unwrap();
    let mut state = vehicle.state();
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| s.armed))
        .await
        .expect("armed heartbeat within two seconds")
        .unwrap();
}

#[tokio::test]
async fn rejected_command_surfaces_the_result() {
    let port = free_port();
    tokio::spawn(serve(port));
    let vehicle = connect(port).await;

    let err = vehicle.takeoff(5.0).await.unwrap_err();
    match err {
        VehicleError::CommandRejected { command, result } => {
            assert!(command.contains("NAV_TAKEOFF"));
            assert!(result.contains("DENIED"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn connecting_to_a_closed_port_fails() {
    let port = free_port();
    let result = Vehicle::connect_tcp(&format!("127.0.0.1:{port}")).await;
    assert!(matches!(result, Err(VehicleError::ConnectionFailed(_))));
}
