// Keyboard teleop over HTTP: W/S drive, A/D turn, R/F speed, SPACE e-stop, P brake, Q quit
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SPEEDS: [f64; 3] = [0.1, 0.25, 0.5]; // m/s
const TURN_SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 150; // Reset velocities after this much time with no input
const SEND_PERIOD: Duration = Duration::from_millis(100); // One connection per command

#[derive(Parser)]
#[command(about = "Keyboard teleop for sanhum-runtime")]
struct Args {
    /// Runtime HTTP address
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Driving robot at http://{}", args.addr);
    info!("Controls: W/S=drive, A/D=turn, R/F=speed, SPACE=e-stop, P=parking brake, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&format!("http://{}/api/base", args.addr)).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(url: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut v = 0.0;
    let mut w = 0.0;
    let mut brake = false;
    // Any drive command would release an emergency stop, so stay silent while latched
    let mut latched = false;
    let mut last_movement_input = Instant::now();
    let mut last_sent = Instant::now();

    loop {
        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        v = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        latched = false;
                    }
                    KeyCode::Char('s') if pressed => {
                        v = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        latched = false;
                    }
                    KeyCode::Char('a') if pressed => {
                        w = TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        latched = false;
                    }
                    KeyCode::Char('d') if pressed => {
                        w = -TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        latched = false;
                    }

                    // Latches on the robot until the next movement key
                    KeyCode::Char(' ') if pressed => {
                        v = 0.0;
                        w = 0.0;
                        latched = true;
                        warn!("Emergency stop, press a movement key to resume");
                        post_json(url, json!({ "emergency": true })).await;
                        continue;
                    }
                    KeyCode::Char('p') if pressed => {
                        brake = !brake;
                        info!("Parking brake: {}", if brake { "ON" } else { "OFF" });
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            v = 0.0;
            w = 0.0;
        }

        if !latched && last_sent.elapsed() >= SEND_PERIOD {
            let cmd = json!({
                "vLinear": v,
                "vAngular": w,
                "parkingBrake": brake
            });
            post_json(url, cmd).await;
            last_sent = Instant::now();
        }
    }

    // Leave the robot still, keeping an emergency stop in place
    if !latched {
        post_json(url, json!({ "vLinear": 0.0, "vAngular": 0.0 })).await;
    }
    Ok(())
}

/// POST a JSON body; failures are logged so a restarting runtime does not end the session
async fn post_json(url: &str, body: Value) {
    let url = url.to_string();
    let result = tokio::task::spawn_blocking(move || ureq::post(&url).send_json(&body)).await;
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("POST failed: {}", e),
        Err(e) => warn!("POST task failed: {}", e),
    }
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
