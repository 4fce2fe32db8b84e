use crate::channel::FramedClient;
use crate::frame::{Frame, PEER_IDENT};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Channel to the other agents. Nothing is exchanged yet beyond identification;
/// inbound data is only logged.
#[derive(Debug, Clone)]
pub struct PeerLink {
    client: FramedClient,
}

impl PeerLink {
    pub fn spawn(
        addr: String,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (client, inbound) = FramedClient::spawn("peer", addr, retry_delay, cancel);
        (Self { client }, inbound)
    }

    /// Sets the id this agent speaks as; 0 means no vehicle is bound.
    pub fn set_peer_id(&self, peer_id: u8) {
        if peer_id != 0 {
            debug!(peer_id, "announcing peer id");
            self.client.try_send(Frame::new(PEER_IDENT, peer_id, Vec::new()));
        }
    }
}
