//! Transport to the native messaging bridge
//!
//! Frames are native-messaging style: a 4-byte little-endian length
//! followed by that many bytes of UTF-8 JSON.

use crate::client::message::Outbound;
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted in either direction
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Events delivered by a transport to the client link
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The channel (re)connected and accepts messages
    Opened,
    /// A decoded JSON frame
    Frame(Value),
    /// The channel closed; no more frames will arrive
    Closed,
}

/// Outbound half of a bridge connection
#[async_trait]
pub trait NativeTransport: Send + Sync {
    async fn send(&self, message: Outbound) -> Result<(), TransportError>;
}

/// Encode a message as a length-prefixed frame
pub fn encode_frame(message: &Outbound) -> Result<Vec<u8>, TransportError> {
    let body = serde_json::to_vec(message).map_err(|e| TransportError::Encode {
        reason: e.to_string(),
    })?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, message: &Outbound) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|_| TransportError::ChannelClosed)?;
    writer
        .flush()
        .await
        .map_err(|_| TransportError::ChannelClosed)
}

/// Outcome of reading a single frame
#[derive(Debug)]
pub enum FrameRead {
    Frame(Value),
    /// Frame was received but is not valid JSON; the stream is still usable
    Garbled(String),
    Eof,
}

/// Read the next frame
///
/// A clean end of stream before the length prefix is `Eof`. A truncated or
/// oversized frame also ends the stream since framing can't be recovered.
pub async fn read_frame<R>(reader: &mut R) -> FrameRead
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if reader.read_exact(&mut len_buf).await.is_err() {
        return FrameRead::Eof;
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        tracing::warn!(len, limit = MAX_FRAME_LEN, "Inbound frame too large, closing");
        return FrameRead::Eof;
    }

    let mut body = vec![0u8; len];
    if reader.read_exact(&mut body).await.is_err() {
        tracing::warn!(len, "Inbound frame truncated");
        return FrameRead::Eof;
    }

    match serde_json::from_slice(&body) {
        Ok(value) => FrameRead::Frame(value),
        Err(e) => FrameRead::Garbled(e.to_string()),
    }
}
