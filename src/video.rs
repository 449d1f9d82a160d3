// Camera byte sources for the MJPEG endpoint
//
// The capture processes themselves live outside this crate. Each named stream is
// served by a local MJPEG HTTP streamer; we connect, request its stream, and pass
// the raw bytes on. Upstream HTTP headers and multipart boundaries are just noise
// between frames to the framer.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

pub type VideoStream = Box<dyn AsyncRead + Send + Unpin>;
pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = io::Result<VideoStream>> + Send + 'a>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// A source of JPEG-framed bytes, looked up by stream name
pub trait VideoSource: Send + Sync {
    /// Open a named stream; `Err` means the stream is unavailable (503)
    fn open<'a>(&'a self, name: &'a str) -> OpenFuture<'a>;
}

/// No cameras on this host
#[derive(Debug, Default)]
pub struct NoVideo;

impl VideoSource for NoVideo {
    fn open<'a>(&'a self, name: &'a str) -> OpenFuture<'a> {
        Box::pin(async move {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no video source for '{}'", name),
            ))
        })
    }
}

/// Local MJPEG HTTP streamers, one address per stream name
#[derive(Debug, Clone, Default)]
pub struct UpstreamVideo {
    streams: HashMap<String, SocketAddr>,
    path: String,
}

impl UpstreamVideo {
    pub fn new(streams: impl IntoIterator<Item = (String, SocketAddr)>) -> Self {
        let streams: HashMap<_, _> = streams.into_iter().collect();
        for (name, addr) in &streams {
            info!("Video stream '{}' -> {}", name, addr);
        }
        Self {
            streams,
            path: "/stream".to_string(),
        }
    }

    pub fn has_stream(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }
}

impl VideoSource for UpstreamVideo {
    fn open<'a>(&'a self, name: &'a str) -> OpenFuture<'a> {
        Box::pin(async move {
            let addr = *self.streams.get(name).ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("unknown stream '{}'", name))
            })?;

            let mut upstream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "upstream connect timed out")
                })??;

            let request = format!(
                "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
                self.path,
                addr.ip()
            );
            upstream.write_all(request.as_bytes()).await?;
            debug!("Connected to video upstream {} for '{}'", addr, name);

            Ok(Box::new(upstream) as VideoStream)
        })
    }
}
