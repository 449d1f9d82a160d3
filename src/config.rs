// Loop rates, PWM timing, pin map, robot geometry and the command-line surface
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

// Control loop frequency (kinematics step + actuator hand-off)
pub const LOOP_HZ: u64 = 50;

// Upper bound on the integration step if the timer falls behind
pub const MAX_STEP: Duration = Duration::from_millis(100);

// Software PWM: phase counter steps per period, and periods per second
pub const PWM_PERIOD: u32 = 100;
pub const PWM_HZ: u32 = 100;

// Differential drive geometry
pub const MAX_WHEEL_LINEAR: f64 = 0.5; // m/s at 100% duty
pub const HALF_TRACK: f64 = 0.15; // m

// Bridge lines: chip, then line offsets [forward, backward] per bridge
pub const GPIO_CHIP: &str = "gpiochip0";
pub const LEFT_PINS: [u32; 2] = [17, 27];
pub const RIGHT_PINS: [u32; 2] = [23, 24];

// HTTP surface
pub const HTTP_PORT: u16 = 8080;
pub const WWW_ROOT: &str = "www";

// Arm microcontroller serial link
pub const ARM_BAUDRATE: u32 = 115_200;

// Local MJPEG streamers fed by the camera capture processes
pub const DEFAULT_VIDEO_STREAMS: [(&str, &str); 2] =
    [("csi", "127.0.0.1:8081"), ("stereo", "127.0.0.1:8082")];

/// Command-line overrides for the runtime
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sanhum-runtime",
    about = "HTTP control runtime for a wheeled robot with a 2-link arm"
)]
pub struct Args {
    /// TCP port for the HTTP control surface
    #[arg(long, default_value_t = HTTP_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Directory holding index.html and js/
    #[arg(long, default_value = WWW_ROOT)]
    pub www_root: PathBuf,

    /// Skip GPIO setup and run with a no-op actuator
    #[arg(long)]
    pub simulate: bool,

    /// Software PWM frequency in Hz
    #[arg(long, default_value_t = PWM_HZ)]
    pub pwm_hz: u32,

    /// GPIO character device holding the bridge lines
    #[arg(long, default_value = GPIO_CHIP)]
    pub gpio_chip: String,

    /// Left bridge pins as FORWARD,BACKWARD
    #[arg(long, value_parser = parse_pin_pair, default_value = "17,27")]
    pub left_pins: [u32; 2],

    /// Right bridge pins as FORWARD,BACKWARD
    #[arg(long, value_parser = parse_pin_pair, default_value = "23,24")]
    pub right_pins: [u32; 2],

    /// Serial port of the arm microcontroller (arm bridge disabled when absent)
    #[arg(long)]
    pub arm_serial: Option<String>,

    #[arg(long, default_value_t = ARM_BAUDRATE)]
    pub arm_baud: u32,

    /// Video stream as NAME=HOST:PORT (repeatable)
    #[arg(long = "video", value_parser = parse_video_stream)]
    pub video: Vec<(String, SocketAddr)>,
}

impl Args {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Configured video streams, falling back to the two local streamers
    pub fn video_streams(&self) -> Vec<(String, SocketAddr)> {
        if !self.video.is_empty() {
            return self.video.clone();
        }
        DEFAULT_VIDEO_STREAMS
            .iter()
            .filter_map(|(name, addr)| Some((name.to_string(), addr.parse().ok()?)))
            .collect()
    }

    /// PWM worker tick interval (one phase counter step)
    pub fn pwm_tick(&self) -> Duration {
        let ticks_per_second = u64::from(self.pwm_hz.max(1)) * u64::from(PWM_PERIOD);
        Duration::from_nanos(1_000_000_000 / ticks_per_second)
    }
}

fn parse_pin_pair(s: &str) -> Result<[u32; 2], String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("expected FORWARD,BACKWARD, got '{}'", s))?;
    let a = a.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let b = b.trim().parse::<u32>().map_err(|e| e.to_string())?;
    if a == b {
        return Err(format!("bridge pins must differ, got {} twice", a));
    }
    Ok([a, b])
}

fn parse_video_stream(s: &str) -> Result<(String, SocketAddr), String> {
    let (name, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=HOST:PORT, got '{}'", s))?;
    let addr = addr.parse::<SocketAddr>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), addr))
}
