use powerfly_link::{Vehicle, VehicleState};
use std::time::Duration;

fn sitl_addr() -> String {
    std::env::var("POWERFLY_SITL_TCP").unwrap_or_else(|_| String::from("127.0.0.1:5763"))
}

async fn wait_for_state<F>(vehicle: &Vehicle, predicate: F, timeout: Duration)
where
    F: FnMut(&VehicleState) -> bool,
{
    let mut rx = vehicle.state();
    tokio::time::timeout(timeout, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for vehicle state")
        .expect("watch channel closed");
}

#[tokio::test]
#[ignore = "requires ArduPilot SITL endpoint"]
async fn guided_takeoff_and_land() {
    let vehicle = Vehicle::connect_tcp(&sitl_addr()).await.unwrap();

    vehicle.set_mode_by_name("GUIDED").await.unwrap();
    wait_for_state(&vehicle, |s| s.mode_name == "GUIDED", Duration::from_secs(5)).await;

    vehicle.arm(false).await.unwrap();
    wait_for_state(&vehicle, |s| s.armed, Duration::from_secs(10)).await;

    vehicle.takeoff(5.0).await.unwrap();
    let mut telemetry = vehicle.telemetry();
    tokio::time::timeout(
        Duration::from_secs(30),
        telemetry.wait_for(|t| t.relative_altitude_m.is_some_and(|alt| alt > 4.0)),
    )
    .await
    .expect("climb to 4 m")
    .unwrap();

    vehicle.land().await.unwrap();
    wait_for_state(&vehicle, |s| !s.armed, Duration::from_secs(60)).await;
    vehicle.disconnect().await.unwrap();
}
