// Motor actuators for the differential base
//
// The control loop only sees `MotorActuator`. Real hardware gets the software
// PWM worker on GPIO character-device lines; simulation gets a no-op sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use tracing::{info, warn};

use super::gpio::{GpioChip, LineError};
use super::kinematics::{Side, WheelCommand, WheelPair};
use super::pwm::{BridgeLines, SoftwarePwm};
use crate::config::PWM_PERIOD;

/// Sink for per-wheel direction + duty
///
/// `set_motor` must not block: it is called with the control state locked.
pub trait MotorActuator: Send + Sync {
    fn set_motor(&self, side: Side, command: WheelCommand);

    /// Cumulative count of writes where the hardware did not follow the command
    fn actuation_divergence(&self) -> u64 {
        0
    }

    /// True when no hardware is driven
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Accepts commands and drives nothing
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    last: Mutex<WheelPair>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_commands(&self) -> WheelPair {
        *self.last.lock()
    }
}

impl MotorActuator for SimulatedActuator {
    fn set_motor(&self, side: Side, command: WheelCommand) {
        self.last.lock()[side.index()] = command;
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Software PWM on a dedicated thread
pub struct PwmMotorActuator {
    commands: Arc<Mutex<WheelPair>>,
    divergence: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PwmMotorActuator {
    /// Request the bridge lines from `chip` and start the PWM thread
    ///
    /// Pins are line offsets, [forward, backward] per side.
    pub fn open(
        chip: &str,
        left_pins: [u32; 2],
        right_pins: [u32; 2],
        tick: Duration,
    ) -> Result<Self, LineError> {
        info!(
            "Opening motor bridges on {}: left={:?}, right={:?}",
            chip, left_pins, right_pins
        );
        let chip = GpioChip::open(chip)?;
        let left = BridgeLines::new(
            Box::new(chip.output(left_pins[0])?),
            Box::new(chip.output(left_pins[1])?),
        );
        let right = BridgeLines::new(
            Box::new(chip.output(right_pins[0])?),
            Box::new(chip.output(right_pins[1])?),
        );
        Self::with_bridges([left, right], tick)
    }

    /// Start the PWM thread on already-opened bridges
    pub fn with_bridges(bridges: [BridgeLines; 2], tick: Duration) -> Result<Self, LineError> {
        let mut pwm = SoftwarePwm::new(PWM_PERIOD, bridges);
        let divergence = pwm.divergence_counter();
        let commands = Arc::new(Mutex::new([WheelCommand::STOP; 2]));
        let running = Arc::new(AtomicBool::new(true));

        let worker = std::thread::Builder::new()
            .name("pwm".into())
            .spawn({
                let commands = Arc::clone(&commands);
                let running = Arc::clone(&running);
                move || {
                    info!("PWM thread started: {:?} per tick", tick);
                    let sleeper = SpinSleeper::new(100_000);
                    let mut next = Instant::now();
                    while running.load(Ordering::Relaxed) {
                        let current = *commands.lock();
                        pwm.tick(&current);

                        next += tick;
                        let now = Instant::now();
                        if next > now {
                            sleeper.sleep(next - now);
                        } else {
                            // Fell behind; resync instead of bursting
                            next = now;
                        }
                    }
                    pwm.release();
                    info!("PWM thread stopped, all lines low");
                }
            })
            .map_err(LineError::PwmThread)?;

        Ok(Self {
            commands,
            divergence,
            running,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Commands the PWM thread is currently rendering
    pub fn commands(&self) -> WheelPair {
        *self.commands.lock()
    }

    /// Stop the PWM thread and drive all lines low; later calls are no-ops
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("PWM thread panicked during shutdown");
            }
        }
    }
}

impl MotorActuator for PwmMotorActuator {
    fn set_motor(&self, side: Side, command: WheelCommand) {
        self.commands.lock()[side.index()] = command;
    }

    fn actuation_divergence(&self) -> u64 {
        self.divergence.load(Ordering::Relaxed)
    }
}

impl Drop for PwmMotorActuator {
    fn drop(&mut self) {
        // Safety measure: never leave a bridge energized
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::kinematics::Direction;
    use crate::motor::pwm::tests::recorded_bridge;

    #[test]
    fn test_simulated_records_commands() {
        let sim = SimulatedActuator::new();
        let cmd = WheelCommand::new(Direction::Backward, 40);
        sim.set_motor(Side::Right, cmd);
        assert_eq!(sim.last_commands(), [WheelCommand::STOP, cmd]);
        assert!(sim.is_simulated());
        assert_eq!(sim.actuation_divergence(), 0);
    }

    #[test]
    fn test_pwm_thread_applies_and_releases() {
        let (left, fwd, back) = recorded_bridge();
        let (right, _, _) = recorded_bridge();
        let actuator =
            PwmMotorActuator::with_bridges([left, right], Duration::from_micros(50)).unwrap();
        assert!(!actuator.is_simulated());

        actuator.set_motor(Side::Left, WheelCommand::new(Direction::Forward, 100));
        assert_eq!(actuator.commands()[0].duty, 100);

        // Wait until the worker has raised the forward line
        let deadline = Instant::now() + Duration::from_secs(2);
        while !fwd.levels.lock().contains(&true) {
            assert!(Instant::now() < deadline, "PWM thread never drove the line");
            std::thread::sleep(Duration::from_millis(1));
        }

        actuator.shutdown();
        assert_eq!(fwd.levels.lock().last(), Some(&false));
        assert!(back.levels.lock().is_empty());
        assert_eq!(actuator.actuation_divergence(), 0);

        // Second shutdown (as from Drop) is harmless
        actuator.shutdown();
    }
}
