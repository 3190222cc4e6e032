//! Length-prefixed framing: big-endian 32-bit length ‖ `postcard`-encoded
//! [`Frame`] payload.
//!
//! `BytesMut` accumulation over `tokio::io::{AsyncRead, AsyncWrite}`.

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, WireError};
use crate::message::Frame;

/// Frames larger than this are rejected outright, bounding how much a
/// misbehaving or malicious peer can make a reader buffer before the
/// length prefix is even fully validated.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Encodes `value` and writes it, length-prefixed, to `writer`. Generic
/// over the payload type so the same big-endian-length ‖ `postcard` shape
/// serves both the cluster transport's [`Frame`] and any other framed
/// protocol on this workspace's wire (e.g. the observer's dashboard feed).
pub async fn write_framed<T: Serialize, W: AsyncWrite + Unpin>(writer: &mut W, value: &T) -> Result<()> {
    let payload = postcard::to_allocvec(value).map_err(|e| WireError::Malformed(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| WireError::FrameTooLarge { len: u32::MAX, max: MAX_FRAME_LEN })?;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge { len, max: MAX_FRAME_LEN });
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed, `postcard`-encoded value from `reader`.
///
/// Returns [`WireError::ConnectionClosed`] if the stream ends cleanly
/// before a full header is read (the only "closed, not an error" case);
/// any other truncation is a `Malformed`/`Io` error.
pub async fn read_framed<T: DeserializeOwned, R: AsyncRead + Unpin>(reader: &mut R) -> Result<T> {
    let mut header = [0_u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge { len, max: MAX_FRAME_LEN });
    }

    let mut body = BytesMut::zeroed(len as usize);
    reader.read_exact(&mut body).await?;

    postcard::from_bytes(&body.chunk()[..len as usize])
        .map_err(|e| WireError::Malformed(e.to_string()))
}

/// Encodes and writes a cluster-transport [`Frame`].
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    write_framed(writer, frame).await
}

/// Reads one cluster-transport [`Frame`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame> {
    read_framed(reader).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_frame_through_a_duplex_stream() {
        let (mut a, mut b) = duplex(4096);

        let frame = Frame::with_corr_id(Message::Heartbeat, "corr-1");
        write_frame(&mut a, &frame).await.unwrap();

        let decoded = read_frame(&mut b).await.unwrap();
        assert_eq!(decoded.v, frame.v);
        assert_eq!(decoded.corr_id, frame.corr_id);
        assert!(matches!(decoded.message, Message::Heartbeat));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_before_reading_the_body() {
        let (mut a, mut b) = duplex(4096);
        a.write_all(&(MAX_FRAME_LEN + 1).to_be_bytes()).await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn clean_close_before_a_header_is_connection_closed() {
        let (a, mut b) = duplex(4096);
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }
}
