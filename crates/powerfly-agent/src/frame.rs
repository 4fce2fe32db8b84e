//! `[kind u8][source id u8][length u32 BE][payload]` frames shared by the
//! power device and the peer channel.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_PAYLOAD: usize = 64 * 1024;
const HEADER_LEN: usize = 6;

/// Payload for the peer, from the local agent.
pub const PEER_DATA: u8 = 0x10;
/// Announces the sender's id after it binds a vehicle.
pub const PEER_IDENT: u8 = 0x11;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload of {0} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD)]
    TooLarge(usize),
    #[error("stream closed inside a frame")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub source_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: u8, source_id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            source_id,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(FrameError::TooLarge(self.payload.len()));
        }
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.push(self.kind);
        bytes.push(self.source_id);
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()?).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next frame. `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let first = reader.read(&mut header[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await.map_err(truncated)?;

    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(FrameError::TooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(truncated)?;

    Ok(Some(Frame {
        kind: header[0],
        source_id: header[1],
        payload,
    }))
}

fn truncated(err: std::io::Error) -> FrameError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::Truncated
    } else {
        FrameError::Io(err)
    }
}
