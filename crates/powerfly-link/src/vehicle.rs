use crate::command::{Command, Reply};
use crate::config::VehicleConfig;
use crate::error::VehicleError;
use crate::event_loop::run_event_loop;
use crate::state::{create_channels, LinkState, StateChannels, Telemetry, VehicleIdentity, VehicleState};
use mavlink::common::{self, MavCmd};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Async MAVLink vehicle handle.
///
/// `Vehicle` is `Clone + Send + Sync`. Clones share the same connection.
/// When the last clone is dropped, the event loop is cancelled.
#[derive(Clone)]
pub struct Vehicle {
    inner: Arc<VehicleInner>,
}

struct VehicleInner {
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    channels: StateChannels,
}

impl Drop for VehicleInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Vehicle {
    /// Connect using a mavlink address string (e.g. `tcpout:127.0.0.1:5763`).
    /// Waits for the first HEARTBEAT before returning.
    pub async fn connect(address: &str) -> Result<Self, VehicleError> {
        Self::connect_with_config(address, VehicleConfig::default()).await
    }

    /// Connect via TCP to a listening autopilot. `addr` is `host:port`.
    #[cfg(feature = "tcp")]
    pub async fn connect_tcp(addr: &str) -> Result<Self, VehicleError> {
        Self::connect(&format!("tcpout:{addr}")).await
    }

    pub async fn connect_with_config(
        address: &str,
        config: VehicleConfig,
    ) -> Result<Self, VehicleError> {
        let connection = mavlink::connect_async::<common::MavMessage>(address)
            .await
            .map_err(|err| VehicleError::ConnectionFailed(err.to_string()))?;

        let (writers, channels) = create_channels();
        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let connect_timeout = config.connect_timeout;

        tokio::spawn(run_event_loop(
            connection,
            command_rx,
            writers,
            config,
            cancel.clone(),
        ));

        let vehicle = Vehicle {
            inner: Arc::new(VehicleInner {
                command_tx,
                cancel,
                channels,
            }),
        };

        let mut identity_rx = vehicle.identity();
        let heartbeat = tokio::time::timeout(
            connect_timeout,
            identity_rx.wait_for(|identity| identity.is_some()),
        )
        .await
        .map(|seen| seen.map(|_| ()));
        match heartbeat {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(VehicleError::Disconnected),
            Err(_) => return Err(VehicleError::Timeout),
        }
        debug!(address, "vehicle heartbeat received");

        Ok(vehicle)
    }

    // --- Reactive state (watch channels) ---

    pub fn identity(&self) -> watch::Receiver<Option<VehicleIdentity>> {
        self.inner.channels.identity.clone()
    }

    pub fn state(&self) -> watch::Receiver<VehicleState> {
        self.inner.channels.vehicle_state.clone()
    }

    pub fn telemetry(&self) -> watch::Receiver<Telemetry> {
        self.inner.channels.telemetry.clone()
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.inner.channels.link_state.clone()
    }

    // --- Vehicle commands ---

    pub async fn arm(&self, force: bool) -> Result<(), VehicleError> {
        self.send_command(|reply| Command::Arm { force, reply }).await
    }

    pub async fn disarm(&self, force: bool) -> Result<(), VehicleError> {
        self.send_command(|reply| Command::Disarm { force, reply }).await
    }

    pub async fn set_mode(&self, custom_mode: u32) -> Result<(), VehicleError> {
        self.send_command(|reply| Command::SetMode { custom_mode, reply }).await
    }

    #[cfg(feature = "ardupilot")]
    pub async fn set_mode_by_name(&self, name: &str) -> Result<(), VehicleError> {
        let autopilot = self
            .inner
            .channels
            .identity
            .borrow()
            .map(|identity| identity.autopilot)
            .ok_or(VehicleError::IdentityUnknown)?;
        let custom_mode = crate::modes::mode_number(autopilot, name)
            .ok_or_else(|| VehicleError::ModeNotAvailable(name.to_string()))?;
        self.set_mode(custom_mode).await
    }


    pub async fn takeoff(&self, altitude_m: f32) -> Result<(), VehicleError> {
        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude_m],
        )
        .await
    }

    /// Switches to the autopilot's LAND mode.
    #[cfg(feature = "ardupilot")]
    pub async fn land(&self) -> Result<(), VehicleError> {
        self.set_mode_by_name("LAND").await
    }

    /// Guided position target; `alt_m` is relative to home.
    pub async fn goto(&self, lat_deg: f64, lon_deg: f64, alt_m: f32) -> Result<(), VehicleError> {
        let lat_e7 = (lat_deg * 1e7).round() as i32;
        let lon_e7 = (lon_deg * 1e7).round() as i32;
        self.send_command(|reply| Command::GuidedGoto {
            lat_e7,
            lon_e7,
            alt_m,
            reply,
        })
        .await
    }

    pub async fn command_long(&self, cmd: MavCmd, params: [f32; 7]) -> Result<(), VehicleError> {
        self.send_command(|reply| Command::CommandLong {
            command: cmd,
            params,
            reply,
        })
        .await
    }

    /// Gracefully disconnect from the vehicle.
    pub async fn disconnect(self) -> Result<(), VehicleError> {
        let _ = self.inner.command_tx.send(Command::Shutdown).await;
        Ok(())
    }

    async fn send_command(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), VehicleError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(make(tx))
            .await
            .map_err(|_| VehicleError::Disconnected)?;
        rx.await.map_err(|_| VehicleError::Disconnected)?
    }
}
