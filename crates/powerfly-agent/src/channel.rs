//! Reconnecting TCP client that carries [`Frame`]s in both directions.

use crate::frame::{read_frame, write_frame, Frame};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const OUTBOUND_CAPACITY: usize = 256;
const INBOUND_CAPACITY: usize = 64;

/// Sending half of a framed connection. Sends never wait: frames queue while
/// the connection is down and are dropped with a warning once the queue is full.
#[derive(Debug, Clone)]
pub struct FramedClient {
    label: &'static str,
    tx: mpsc::Sender<Frame>,
}

impl FramedClient {
    /// Starts the connection task. Frames received from the remote end arrive
    /// on the returned receiver.
    pub fn spawn(
        label: &'static str,
        addr: String,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, outbound) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(run_connection(label, addr, outbound, inbound_tx, retry_delay, cancel));
        (Self { label, tx }, inbound)
    }

    pub fn try_send(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(channel = self.label, kind = frame.kind, "outbound queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(channel = self.label, "connection task stopped, frame dropped");
                false
            }
        }
    }
}

async fn run_connection(
    label: &'static str,
    addr: String,
    mut outbound: mpsc::Receiver<Frame>,
    inbound: mpsc::Sender<Frame>,
    retry_delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = TcpStream::connect(&addr) => result,
        };

        match connected {
            Ok(stream) => {
                info!(channel = label, %addr, "connected");
                let (mut reader, mut writer) = stream.into_split();
                let receiving = async {
                    loop {
                        match read_frame(&mut reader).await {
                            Ok(Some(frame)) => {
                                if inbound.try_send(frame).is_err() {
                                    debug!(channel = label, "inbound frame dropped");
                                }
                            }
                            Ok(None) => return,
                            Err(err) => {
                                warn!(channel = label, "bad inbound frame: {err}");
                                return;
                            }
                        }
                    }
                };
                tokio::pin!(receiving);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = &mut receiving => break,
                        next = outbound.recv() => {
                            let Some(frame) = next else {
                                return;
                            };
                            if let Err(err) = write_frame(&mut writer, &frame).await {
                                warn!(channel = label, "write failed: {err}");
                                break;
                            }
                        }
                    }
                }
                warn!(channel = label, %addr, "connection lost, reconnecting");
            }
            Err(err) => {
                debug!(channel = label, %addr, "connect failed: {err}");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}
