// HTTP control surface
//
// Provides:
// - request: one-shot HTTP/1.1 request reader
// - response: status lines, JSON/text bodies, MJPEG multipart framing
// - assets: static web client files
// - mjpeg: JPEG frame extraction from camera byte streams
// - router: route table, per-connection handler and accept loop

pub mod assets;
pub mod mjpeg;
pub mod request;
pub mod response;
pub mod router;

pub use assets::StaticFiles;
pub use mjpeg::MjpegFramer;
pub use request::{Request, RequestError};
pub use response::{Response, Status};
pub use router::{AppContext, Route, handle_connection, serve};
