// HTTP responses; every response closes the connection

/// Status codes this server emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    InternalError = 500,
    ServiceUnavailable = 503,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::InternalError => "Internal Server Error",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

pub const JSON: &str = "application/json";
pub const TEXT: &str = "text/plain";

/// Multipart boundary used by the MJPEG stream
pub const MJPEG_BOUNDARY: &str = "frame";

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: Status, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn json(body: Vec<u8>) -> Self {
        Self::new(Status::Ok, JSON, body)
    }

    pub fn text(status: Status, body: &str) -> Self {
        Self::new(status, TEXT, body)
    }

    pub fn bad_request() -> Self {
        Self::text(Status::BadRequest, "Bad Request")
    }

    pub fn not_found(what: &str) -> Self {
        Self::text(Status::NotFound, &format!("{} not found", what))
    }

    pub fn unavailable() -> Self {
        Self::text(Status::ServiceUnavailable, "no signal")
    }

    /// Serialized status line, headers and body
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nConnection: close\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            self.content_type,
            self.body.len()
        );
        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Head of a multipart/x-mixed-replace response; the body never ends
pub fn mjpeg_head() -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nConnection: close\r\nCache-Control: no-cache, private\r\nPragma: no-cache\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\n\r\n",
        MJPEG_BOUNDARY
    )
    .into_bytes()
}

/// One JPEG frame as a multipart part
pub fn mjpeg_part(frame: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY,
        frame.len()
    );
    let mut out = Vec::with_capacity(head.len() + frame.len() + 2);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(frame);
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_bytes() {
        let resp = Response::json(br#"{"ok":true}"#.to_vec());
        let text = String::from_utf8(resp.to_bytes()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: 11\r\n\r\n{\"ok\":true}"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Response::bad_request().status.code(), 400);
        assert_eq!(Response::not_found("js").status.code(), 404);
        assert_eq!(Response::unavailable().status.code(), 503);
    }

    #[test]
    fn test_mjpeg_part_layout() {
        let part = mjpeg_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let expected_head = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n";
        assert!(part.starts_with(expected_head));
        assert!(part.ends_with(&[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']));
        assert!(String::from_utf8_lossy(&mjpeg_head()).contains("boundary=frame"));
    }
}
