use crate::channel::FramedClient;
use crate::frame::Frame;
use powerfly_core::{PowerPort, PowerSignal};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Client of the power-measurement device.
#[derive(Debug, Clone)]
pub struct PowerClient {
    client: FramedClient,
    source_id: u8,
}

impl PowerClient {
    pub fn spawn(
        addr: String,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (client, inbound) = FramedClient::spawn("power", addr, retry_delay, cancel);
        (
            Self {
                client,
                source_id: 0,
            },
            inbound,
        )
    }

    /// Id stamped on outgoing frames; the bound vehicle's system id.
    pub fn set_source_id(&mut self, source_id: u8) {
        self.source_id = source_id;
    }
}

impl PowerPort for PowerClient {
    fn send(&mut self, signal: PowerSignal, payload: &[u8]) {
        self.client
            .try_send(Frame::new(signal.code(), self.source_id, payload));
    }
}
