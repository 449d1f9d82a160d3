// MJPEG framing: cut JPEG frames out of a raw camera byte stream
//
// Frames are delimited by SOI (FF D8) and EOI (FF D9). Bytes before the first SOI
// are dropped. When several complete frames are buffered only the newest is
// emitted, so a slow client sees fresh images rather than a growing backlog.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::request::find;
use super::response::mjpeg_part;

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Garbage without any SOI is discarded past this size
pub const MAX_GARBAGE_BYTES: usize = 1024 * 1024;
/// A frame that never terminates is abandoned past this size
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct MjpegFramer {
    buf: Vec<u8>,
}

impl MjpegFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held back waiting for a frame boundary
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append source bytes and return the newest complete frame, if any
    pub fn push(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(data);

        let mut latest = None;
        loop {
            let Some(start) = find(&self.buf, &SOI) else {
                if self.buf.len() > MAX_GARBAGE_BYTES {
                    debug!("Dropping {} bytes without a frame start", self.buf.len());
                    // A trailing FF may be the first half of the next SOI
                    let keep = usize::from(self.buf.last() == Some(&SOI[0]));
                    let end = self.buf.len() - keep;
                    self.buf.drain(..end);
                }
                break;
            };

            if start > 0 {
                self.buf.drain(..start);
            }

            match find(&self.buf[SOI.len()..], &EOI) {
                Some(rel) => {
                    let end = SOI.len() + rel + EOI.len();
                    latest = Some(self.buf.drain(..end).collect());
                }
                None => {
                    if self.buf.len() > MAX_FRAME_BYTES {
                        debug!("Dropping unterminated frame of {} bytes", self.buf.len());
                        self.buf.clear();
                    }
                    break;
                }
            }
        }
        latest
    }
}

/// Copy frames from `source` to `client` as multipart parts
///
/// Ends when the source is exhausted or a write to the client fails.
/// Returns the number of frames sent.
pub async fn stream_frames<R, W>(source: &mut R, client: &mut W) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut framer = MjpegFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut sent = 0;

    loop {
        let n = match source.read(&mut chunk).await {
            Ok(0) => {
                debug!("Video source ended after {} frames", sent);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("Video source read failed: {}", e);
                break;
            }
        };

        if let Some(frame) = framer.push(&chunk[..n]) {
            let part = mjpeg_part(&frame);
            if let Err(e) = write_part(client, &part).await {
                debug!("Client gone after {} frames: {}", sent, e);
                break;
            }
            sent += 1;
        }
    }
    sent
}

async fn write_part<W: AsyncWrite + Unpin>(client: &mut W, part: &[u8]) -> std::io::Result<()> {
    client.write_all(part).await?;
    client.flush().await
}
