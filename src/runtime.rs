// Runtime wiring: actuator, arm bridge, 50 Hz control timer, HTTP accept loop
//
// The control timer is the only caller of `step`. HTTP handlers only set targets,
// except emergency stop, which reaches the actuator immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::arm::SerialArmBridge;
use crate::config::{Args, LOOP_HZ, MAX_STEP};
use crate::http::{self, AppContext, StaticFiles};
use crate::motor::{MotorActuator, PwmMotorActuator, SimulatedActuator};
use crate::state::ControlStateStore;
use crate::video::UpstreamVideo;

/// Open the PWM actuator, or a simulated one when asked to or when GPIO is unavailable
///
/// The second element keeps a handle on the PWM worker so it can be stopped on exit.
pub fn open_actuator(args: &Args) -> (Arc<dyn MotorActuator>, Option<Arc<PwmMotorActuator>>) {
    if args.simulate {
        info!("Simulation mode: motor commands are not driven");
        return (Arc::new(SimulatedActuator::new()), None);
    }

    match PwmMotorActuator::open(
        &args.gpio_chip,
        args.left_pins,
        args.right_pins,
        args.pwm_tick(),
    ) {
        Ok(pwm) => {
            let pwm = Arc::new(pwm);
            let actuator: Arc<dyn MotorActuator> = pwm.clone();
            (actuator, Some(pwm))
        }
        Err(e) => {
            warn!("Motor GPIO unavailable ({}), continuing in simulation", e);
            (Arc::new(SimulatedActuator::new()), None)
        }
    }
}

/// Control state with the arm bridge attached when one is configured
pub fn build_store(args: &Args, actuator: Arc<dyn MotorActuator>) -> ControlStateStore {
    let store = ControlStateStore::new(actuator);
    let Some(port) = &args.arm_serial else {
        return store;
    };
    match SerialArmBridge::open(port, args.arm_baud) {
        Ok(bridge) => store.with_arm_bridge(Box::new(bridge)),
        Err(e) => {
            warn!("Arm bridge unavailable on {} ({}), arm commands stay local", port, e);
            store
        }
    }
}

/// Step the drive model at LOOP_HZ with the measured period, never returns
pub async fn control_loop(store: Arc<ControlStateStore>) {
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tick.tick().await;
    let mut last = Instant::now();
    loop {
        tick.tick().await;
        let now = Instant::now();
        // A stalled scheduler must not turn into one huge pose jump
        let dt = now.duration_since(last).min(MAX_STEP);
        last = now;
        store.step(dt.as_secs_f64());
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (actuator, pwm) = open_actuator(&args);
    let store = Arc::new(build_store(&args, actuator));

    let ctx = Arc::new(AppContext {
        store: Arc::clone(&store),
        assets: StaticFiles::new(&args.www_root),
        video: Arc::new(UpstreamVideo::new(args.video_streams())),
    });

    let listener = TcpListener::bind(args.listen_addr()).await?;
    let control = tokio::spawn(control_loop(Arc::clone(&store)));

    info!(
        "Runtime started: {}Hz control loop, {}Hz PWM, web root {:?}",
        LOOP_HZ,
        args.pwm_hz,
        ctx.assets.root()
    );

    let result = tokio::select! {
        r = http::serve(listener, ctx) => r,
        r = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            r
        }
    };

    control.abort();
    store.emergency_stop();
    if let Some(pwm) = pwm {
        pwm.shutdown();
    }
    info!("Motors stopped");

    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_simulate_flag_skips_gpio() {
        let args = Args::parse_from(["sanhum-runtime", "--simulate"]);
        let (actuator, pwm) = open_actuator(&args);
        assert!(actuator.is_simulated());
        assert!(pwm.is_none());
    }

    #[test]
    fn test_gpio_failure_falls_back_to_simulation() {
        let args = Args::parse_from([
            "sanhum-runtime",
            "--gpio-chip",
            "/nonexistent/gpiochip-sanhum",
        ]);
        let (actuator, pwm) = open_actuator(&args);
        assert!(actuator.is_simulated());
        assert!(pwm.is_none());

        // The fallback still accepts drive commands
        let store = ControlStateStore::new(actuator);
        store.set_velocity_command(0.1, 0.0);
        assert!(store.snapshot().simulated);
    }

    #[test]
    fn test_missing_arm_serial_is_not_fatal() {
        let args = Args::parse_from([
            "sanhum-runtime",
            "--simulate",
            "--arm-serial",
            "/dev/does-not-exist-arm",
        ]);
        let (actuator, _) = open_actuator(&args);
        let store = build_store(&args, actuator);
        assert!(!store.has_arm_bridge());
    }

    #[tokio::test]
    async fn test_control_loop_integrates_pose() {
        let store = Arc::new(ControlStateStore::new(Arc::new(SimulatedActuator::new())));
        store.set_velocity_command(0.2, 0.0);

        let task = tokio::spawn(control_loop(Arc::clone(&store)));
        tokio::time::sleep(Duration::from_millis(300)).await;
        task.abort();

        let snap = store.snapshot();
        assert!(snap.pose.x > 0.0, "pose did not advance: {:?}", snap.pose);
        // Never more than the elapsed wall time at 0.2 m/s
        assert!(snap.pose.x < 0.2 * 0.5);
        assert_eq!(snap.pose.y, 0.0);
    }
}
