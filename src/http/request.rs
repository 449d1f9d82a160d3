// Minimal HTTP/1.1 request reader
//
// One request per connection. We read until the head is complete (blank line),
// then up to Content-Length more bytes of body if the header is present.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Heads larger than this without a terminator are rejected
pub const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Bodies are truncated at this size
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("connection closed before the request line was complete")]
    Incomplete,

    #[error("request head exceeds {} bytes", MAX_HEAD_BYTES)]
    TooLarge,

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path with any query string removed
    pub fn route_path(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }
}

/// Parse a raw request buffer
///
/// Only the request line is mandatory: method and path are its first two
/// whitespace-separated tokens. Headers run to the first blank line; whatever
/// follows is the body.
pub fn parse_request(raw: &[u8]) -> Result<Request, RequestError> {
    let line_end = find(raw, b"\r\n").ok_or(RequestError::MalformedRequestLine)?;
    let request_line = String::from_utf8_lossy(&raw[..line_end]);
    let mut tokens = request_line.split_whitespace();
    let (method, path) = match (tokens.next(), tokens.next()) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string()),
        _ => return Err(RequestError::MalformedRequestLine),
    };

    let (head_end, body) = match find(raw, b"\r\n\r\n") {
        Some(pos) => (pos, raw[pos + 4..].to_vec()),
        None => (raw.len(), Vec::new()),
    };

    let headers = if head_end > line_end + 2 {
        String::from_utf8_lossy(&raw[line_end + 2..head_end])
            .lines()
            .filter_map(|line| {
                let (k, v) = line.split_once(':')?;
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(Request {
        method,
        path,
        headers,
        body,
    })
}

/// Read one request from the connection
pub async fn read_request<S>(stream: &mut S) -> Result<Request, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    // Head
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break Some(pos);
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RequestError::TooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let Some(head_end) = head_end else {
        // Peer closed mid-head: usable only if the request line made it
        if find(&buf, b"\r\n").is_none() {
            return Err(RequestError::Incomplete);
        }
        return parse_request(&buf);
    };

    let mut request = parse_request(&buf)?;

    // Body, when announced
    if let Some(len) = request
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
    {
        let want = len.min(MAX_BODY_BYTES);
        let have = buf.len() - (head_end + 4);
        if have < want {
            let mut rest = vec![0u8; want - have];
            let mut filled = 0;
            while filled < rest.len() {
                let n = stream.read(&mut rest[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            rest.truncate(filled);
            request.body.extend_from_slice(&rest);
        }
        request.body.truncate(want);
    }

    Ok(request)
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
