use crate::error::VehicleError;
use mavlink::common::MavCmd;
use tokio::sync::oneshot;

pub(crate) type Reply = oneshot::Sender<Result<(), VehicleError>>;

pub(crate) enum Command {
    Arm {
        force: bool,
        reply: Reply,
    },
    Disarm {
        force: bool,
        reply: Reply,
    },
    SetMode {
        custom_mode: u32,
        reply: Reply,
    },
    CommandLong {
        command: MavCmd,
        params: [f32; 7],
        reply: Reply,
    },
    GuidedGoto {
        lat_e7: i32,
        lon_e7: i32,
        alt_m: f32,
        reply: Reply,
    },
    Shutdown,
}
