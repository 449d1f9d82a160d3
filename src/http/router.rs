// Request routing and the per-connection handler

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::assets::StaticFiles;
use super::mjpeg::stream_frames;
use super::request::{Request, read_request};
use super::response::{Response, Status, mjpeg_head};
use crate::messages::{
    ArmCommand, BaseCommand, CommandReply, JointStateReport, StatusReport, encode,
};
use crate::state::ControlStateStore;
use crate::video::VideoSource;

/// Every route the server knows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    Script(String),
    Status,
    JointState,
    Base,
    Arm,
    Video(String),
    NotFound,
}

impl Route {
    /// Exact (method, path) match; query strings are ignored
    pub fn resolve(method: &str, path: &str) -> Route {
        match (method, path) {
            ("GET", "/") | ("GET", "/index.html") => Route::Index,
            ("GET", "/api/status") => Route::Status,
            ("GET", "/api/joint_state") => Route::JointState,
            ("POST", "/api/base") => Route::Base,
            ("POST", "/api/arm") => Route::Arm,
            ("GET", p) if p.starts_with("/js/") => Route::Script(p["/js/".len()..].to_string()),
            ("GET", p) if p.starts_with("/video/") => {
                Route::Video(p["/video/".len()..].to_string())
            }
            _ => Route::NotFound,
        }
    }
}

/// Shared by every connection task
pub struct AppContext {
    pub store: Arc<ControlStateStore>,
    pub assets: StaticFiles,
    pub video: Arc<dyn VideoSource>,
}

/// Serve one request and close
pub async fn handle_connection<S>(mut stream: S, ctx: Arc<AppContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            debug!("Bad request: {}", e);
            send(&mut stream, Response::bad_request()).await;
            return;
        }
    };

    let route = Route::resolve(&request.method, request.route_path());
    debug!("{} {} -> {:?}", request.method, request.path, route);

    match route {
        Route::Video(name) => serve_video(&mut stream, &ctx, &name).await,
        route => {
            let response = respond(route, &request, &ctx).await;
            send(&mut stream, response).await;
        }
    }
}

async fn respond(route: Route, request: &Request, ctx: &AppContext) -> Response {
    match route {
        Route::Index => match ctx.assets.load("index.html").await {
            Some((data, ctype)) => Response::new(Status::Ok, ctype, data),
            None => Response::not_found("index.html"),
        },
        Route::Script(name) => match ctx.assets.load(&format!("js/{}", name)).await {
            Some((data, ctype)) => Response::new(Status::Ok, ctype, data),
            None => Response::not_found("js"),
        },
        Route::Status => json(&StatusReport::from(&ctx.store.snapshot())),
        Route::JointState => json(&JointStateReport::from(&ctx.store.snapshot())),
        Route::Base => {
            let cmd = BaseCommand::decode(&request.body);
            apply_base(&ctx.store, &cmd);
            json(&CommandReply::OK)
        }
        Route::Arm => {
            let cmd = ArmCommand::decode(&request.body);
            let pose = ctx.store.set_arm(cmd.extend, cmd.gripper, cmd.turret_angle);
            debug!("Arm command applied: {:?}", pose);
            if ctx.store.has_arm_bridge() {
                let store = Arc::clone(&ctx.store);
                tokio::task::spawn_blocking(move || store.forward_arm(&pose));
            }
            json(&CommandReply::OK)
        }
        Route::Video(_) | Route::NotFound => {
            Response::text(Status::NotFound, "404 from default handler")
        }
    }
}

/// Emergency wins over velocity; the parking brake is applied in either case
pub fn apply_base(store: &ControlStateStore, cmd: &BaseCommand) {
    if let Some(engaged) = cmd.parking_brake {
        store.set_parking_brake(engaged);
    }
    if cmd.emergency {
        store.emergency_stop();
    } else {
        store.set_velocity_command(cmd.v_linear, cmd.v_angular);
    }
}

async fn serve_video<S>(stream: &mut S, ctx: &AppContext, name: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut source = match ctx.video.open(name).await {
        Ok(source) => source,
        Err(e) => {
            debug!("Video '{}' unavailable: {}", name, e);
            send(stream, Response::unavailable()).await;
            return;
        }
    };

    if stream.write_all(&mjpeg_head()).await.is_err() {
        return;
    }
    info!("MJPEG stream '{}' started", name);
    let frames = stream_frames(&mut source, stream).await;
    info!("MJPEG stream '{}' ended after {} frames", name, frames);
    let _ = stream.shutdown().await;
}

fn json<T: Serialize>(value: &T) -> Response {
    match encode(value) {
        Ok(body) => Response::json(body),
        Err(e) => {
            error!("JSON encoding failed: {}", e);
            Response::text(Status::InternalError, "encoding error")
        }
    }
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, response: Response) {
    if let Err(e) = stream.write_all(&response.to_bytes()).await {
        debug!("Response write failed: {}", e);
        return;
    }
    let _ = stream.shutdown().await;
}

/// Accept loop: one task per connection, never returns unless accept fails hard
pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>) -> std::io::Result<()> {
    info!("HTTP control server listening on {}", listener.local_addr()?);
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                // Transient (e.g. fd exhaustion); keep accepting
                warn!("Accept failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                continue;
            }
        };
        debug!("Connection from {}", peer);
        let ctx = Arc::clone(&ctx);
        tokio::spawn(handle_connection(socket, ctx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Direction, SimulatedActuator, WheelCommand};
    use crate::video::{NoVideo, OpenFuture, VideoStream};
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    fn context(video: Arc<dyn VideoSource>) -> (Arc<AppContext>, Arc<SimulatedActuator>) {
        let sim = Arc::new(SimulatedActuator::new());
        let ctx = AppContext {
            store: Arc::new(ControlStateStore::new(sim.clone())),
            assets: StaticFiles::new("/nonexistent-www"),
            video,
        };
        (Arc::new(ctx), sim)
    }

    /// Send raw request bytes, return the full raw response
    async fn roundtrip(ctx: &Arc<AppContext>, raw: &[u8]) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server, Arc::clone(ctx)));
        client.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();
        out
    }

    fn status_line(raw: &[u8]) -> String {
        String::from_utf8_lossy(raw).lines().next().unwrap_or_default().to_string()
    }

    fn json_body(raw: &[u8]) -> Value {
        let text = String::from_utf8_lossy(raw);
        let (_, body) = text.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn post(path: &str, body: &str) -> Vec<u8> {
        format!(
            "POST {} HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        )
        .into_bytes()
    }

    #[test]
    fn test_route_table() {
        assert_eq!(Route::resolve("GET", "/"), Route::Index);
        assert_eq!(Route::resolve("GET", "/index.html"), Route::Index);
        assert_eq!(Route::resolve("GET", "/js/main.js"), Route::Script("main.js".into()));
        assert_eq!(Route::resolve("GET", "/api/status"), Route::Status);
        assert_eq!(Route::resolve("GET", "/api/joint_state"), Route::JointState);
        assert_eq!(Route::resolve("POST", "/api/base"), Route::Base);
        assert_eq!(Route::resolve("POST", "/api/arm"), Route::Arm);
        assert_eq!(Route::resolve("GET", "/video/csi"), Route::Video("csi".into()));
        assert_eq!(Route::resolve("GET", "/api/base"), Route::NotFound);
        assert_eq!(Route::resolve("POST", "/api/status"), Route::NotFound);
        assert_eq!(Route::resolve("GET", "/api/status/"), Route::NotFound);
    }

    #[tokio::test]
    async fn test_arm_then_joint_state() {
        let (ctx, _) = context(Arc::new(NoVideo));
        let reply = roundtrip(
            &ctx,
            &post("/api/arm", r#"{"extend":0.5,"gripper":0.2,"turretAngle":370}"#),
        )
        .await;
        assert_eq!(status_line(&reply), "HTTP/1.1 200 OK");
        assert!(reply.ends_with(br#"{"ok":true}"#));

        let state = roundtrip(&ctx, b"GET /api/joint_state HTTP/1.1\r\n\r\n").await;
        let json = json_body(&state);
        assert_eq!(json["arm_ext"].as_f64(), Some(0.5));
        assert_eq!(json["gripper"].as_f64(), Some(0.2));
        assert_eq!(json["turret_deg"].as_f64(), Some(10.0));
    }

    #[tokio::test]
    async fn test_base_command_and_emergency() {
        let (ctx, sim) = context(Arc::new(NoVideo));
        roundtrip(&ctx, &post("/api/base", r#"{"vLinear":0.25,"vAngular":0}"#)).await;
        ctx.store.step(0.02);
        assert_eq!(sim.last_commands()[0], WheelCommand::new(Direction::Forward, 50));

        let reply = roundtrip(&ctx, &post("/api/base", r#"{"emergency":true}"#)).await;
        assert!(reply.ends_with(br#"{"ok":true}"#));
        // Applied immediately, without waiting for a control tick
        assert_eq!(sim.last_commands(), [WheelCommand::STOP; 2]);

        let status = json_body(&roundtrip(&ctx, b"GET /api/status HTTP/1.1\r\n\r\n").await);
        assert_eq!(status["emergency"], Value::Bool(true));
        assert_eq!(status["v"].as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn test_garbage_body_zeroes_velocity() {
        let (ctx, _) = context(Arc::new(NoVideo));
        roundtrip(&ctx, &post("/api/base", r#"{"vLinear":0.4}"#)).await;
        let reply = roundtrip(&ctx, &post("/api/base", "{oops")).await;
        assert_eq!(status_line(&reply), "HTTP/1.1 200 OK");
        assert_eq!(ctx.store.snapshot().command.v, 0.0);
    }

    #[tokio::test]
    async fn test_release_command_stops_wheels() {
        let (ctx, sim) = context(Arc::new(NoVideo));
        roundtrip(&ctx, &post("/api/base", r#"{"vLinear":0.3,"vAngular":0}"#)).await;
        ctx.store.step(0.02);
        assert_eq!(sim.last_commands()[1].direction, Direction::Forward);

        // What the web client sends once keys are released or the page loses focus
        roundtrip(&ctx, &post("/api/base", r#"{"vLinear":0,"vAngular":0}"#)).await;
        ctx.store.step(0.02);
        assert_eq!(sim.last_commands(), [WheelCommand::STOP; 2]);
        assert!(!ctx.store.snapshot().emergency);
    }

    #[tokio::test]
    async fn test_parking_brake_flag() {
        let (ctx, _) = context(Arc::new(NoVideo));
        roundtrip(
            &ctx,
            &post("/api/base", r#"{"vLinear":0.2,"vAngular":0,"parkingBrake":true}"#),
        )
        .await;
        let snap = ctx.store.snapshot();
        assert!(snap.parking_brake);
        assert_eq!(snap.command.v, 0.2);
        assert_eq!(ctx.store.step(0.02), [WheelCommand::STOP; 2]);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown() {
        let (ctx, _) = context(Arc::new(NoVideo));
        let bad = roundtrip(&ctx, b"NONSENSE\r\n\r\n").await;
        assert_eq!(status_line(&bad), "HTTP/1.1 400 Bad Request");
        assert!(String::from_utf8_lossy(&bad).contains("Connection: close"));

        let missing = roundtrip(&ctx, b"GET /nope HTTP/1.1\r\n\r\n").await;
        assert_eq!(status_line(&missing), "HTTP/1.1 404 Not Found");
    }

    #[tokio::test]
    async fn test_script_traversal_rejected() {
        let (ctx, _) = context(Arc::new(NoVideo));
        let reply = roundtrip(&ctx, b"GET /js/../../etc/passwd HTTP/1.1\r\n\r\n").await;
        assert_eq!(status_line(&reply), "HTTP/1.1 404 Not Found");
    }

    #[tokio::test]
    async fn test_video_unavailable() {
        let (ctx, _) = context(Arc::new(NoVideo));
        let reply = roundtrip(&ctx, b"GET /video/csi HTTP/1.1\r\n\r\n").await;
        assert_eq!(status_line(&reply), "HTTP/1.1 503 Service Unavailable");
    }

    /// Serves one fixed byte buffer for any stream name
    struct CannedVideo(Vec<u8>);

    impl VideoSource for CannedVideo {
        fn open<'a>(&'a self, _name: &'a str) -> OpenFuture<'a> {
            let data = self.0.clone();
            Box::pin(async move { Ok(Box::new(std::io::Cursor::new(data)) as VideoStream) })
        }
    }

    #[tokio::test]
    async fn test_video_stream_framing() {
        let mut camera = b"noise".to_vec();
        camera.extend_from_slice(&[0xFF, 0xD8, 0x42, 0xFF, 0xD9]);
        camera.extend_from_slice(b"tail");
        let (ctx, _) = context(Arc::new(CannedVideo(camera)));

        let reply = roundtrip(&ctx, b"GET /video/csi HTTP/1.1\r\n\r\n").await;
        let text = String::from_utf8_lossy(&reply);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: multipart/x-mixed-replace; boundary=frame\r\n"));
        assert_eq!(text.matches("--frame\r\n").count(), 1);
        assert!(reply.ends_with(&[b'\r', b'\n', 0xFF, 0xD8, 0x42, 0xFF, 0xD9, b'\r', b'\n']));
    }
}
