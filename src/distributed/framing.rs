//! Length-prefixed message framing
//!
//! Each frame on the stream is:
//!
//! ```text
//! [4 bytes: payload length, big-endian u32][N bytes: payload]
//! ```
//!
//! TCP gives no message boundaries, so [`FrameDecoder`] reassembles frames from
//! arbitrarily chunked input: one byte at a time, several frames per read,
//! or anything in between all produce the same frame sequence.
//!
//! Frames above [`MAX_FRAME_LEN`] are rejected as soon as the prefix is read.
//! After that the stream position is lost, so the connection must be closed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sanity cap on a single payload (100 MiB)
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

pub const LENGTH_PREFIX_LEN: usize = 4;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max 100 MiB)")]
    TooLarge(usize),

    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Prefix a payload with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Incremental frame reassembly
///
/// Feed bytes with [`FrameDecoder::extend`], then drain complete frames with
/// [`FrameDecoder::next_frame`] until it returns `None`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Payload length of the frame in progress, `None` while awaiting a prefix
    expected: Option<usize>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when a frame has been started but not finished.
    pub fn is_mid_frame(&self) -> bool {
        self.expected.is_some() || !self.buf.is_empty()
    }

    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        let len = match self.expected {
            Some(len) => len,
            None => {
                if self.buf.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let len = self.buf.get_u32() as usize;
                if len > MAX_FRAME_LEN {
                    return Err(FrameError::TooLarge(len));
                }
                self.expected = Some(len);
                len
            }
        };

        if self.buf.len() < len {
            return Ok(None);
        }
        self.expected = None;
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

/// Reads whole frames from an async byte stream
pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Next complete payload, or `None` once the peer has closed the stream.
    ///
    /// A partial frame left at end of stream is discarded.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                if self.decoder.is_mid_frame() {
                    tracing::debug!(
                        buffered = self.decoder.buffered(),
                        "stream closed inside a frame, dropping partial data"
                    );
                }
                return Ok(None);
            }
            self.decoder.extend(&self.chunk[..n]);
        }
    }
}

/// Writes whole frames to an async byte stream
///
/// Prefix and payload go out in a single write followed by a flush, so frames
/// from one writer never interleave.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write side.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
