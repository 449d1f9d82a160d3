// Shared control state: drive model, arm pose, diagnostics
//
// Single short-held lock. Wheel commands are handed to the actuator inside the
// lock so an emergency stop can never be overtaken by a stale control tick.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::arm::{ArmBridge, ArmPose};
use crate::motor::{DifferentialDriveModel, MotorActuator, Pose, Side, VelocityCommand, WheelPair};

/// Scalars filled by external collaborators (power monitor, thermal zones)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Diagnostics {
    pub battery_v: Option<f64>,
    pub cpu_load: Option<f64>,
    pub cpu_temp: Option<f64>,
    pub board_temp: Option<f64>,
}

/// Everything the control surface knows about the robot
#[derive(Debug, Clone, Default)]
pub struct RobotState {
    pub drive: DifferentialDriveModel,
    pub arm: ArmPose,
    pub diagnostics: Diagnostics,
}

/// Copy of the state taken under the lock, for telemetry encoding
#[derive(Debug, Clone, Copy)]
pub struct StateSnapshot {
    pub pose: Pose,
    pub command: VelocityCommand,
    pub wheels: WheelPair,
    pub emergency: bool,
    pub parking_brake: bool,
    pub arm: ArmPose,
    pub diagnostics: Diagnostics,
    pub uptime_s: f64,
    pub actuation_divergence: u64,
    pub simulated: bool,
}

pub struct ControlStateStore {
    state: Mutex<RobotState>,
    actuator: Arc<dyn MotorActuator>,
    arm_bridge: Option<Mutex<Box<dyn ArmBridge>>>,
    started_at: Instant,
}

impl ControlStateStore {
    pub fn new(actuator: Arc<dyn MotorActuator>) -> Self {
        Self::with_state(RobotState::default(), actuator)
    }

    pub fn with_state(state: RobotState, actuator: Arc<dyn MotorActuator>) -> Self {
        Self {
            state: Mutex::new(state),
            actuator,
            arm_bridge: None,
            started_at: Instant::now(),
        }
    }

    /// Forward every arm update to the arm microcontroller
    pub fn with_arm_bridge(mut self, bridge: Box<dyn ArmBridge>) -> Self {
        self.arm_bridge = Some(Mutex::new(bridge));
        self
    }

    /// Drive command; also clears a latched emergency stop
    pub fn set_velocity_command(&self, v: f64, w: f64) {
        let mut state = self.state.lock();
        if state.drive.is_emergency() {
            info!("Emergency stop cleared by drive command");
        }
        state.drive.set_velocity_command(v, w);
    }

    /// Latch emergency, zero the target and stop both wheels immediately
    pub fn emergency_stop(&self) {
        let mut state = self.state.lock();
        if !state.drive.is_emergency() {
            warn!("Emergency stop");
        }
        let wheels = state.drive.emergency_stop();
        self.apply(&wheels);
    }

    pub fn set_parking_brake(&self, engaged: bool) {
        let mut state = self.state.lock();
        if state.drive.parking_brake() != engaged {
            info!("Parking brake {}", if engaged { "engaged" } else { "released" });
        }
        state.drive.set_parking_brake(engaged);
    }

    /// One control period: step the model and hand wheel commands to the actuator
    pub fn step(&self, dt: f64) -> WheelPair {
        let mut state = self.state.lock();
        let wheels = state.drive.step(dt);
        self.apply(&wheels);
        wheels
    }

    /// Clamp/normalize and store an arm command; returns the stored pose
    pub fn set_arm(&self, extension: f64, gripper: f64, turret_deg: f64) -> ArmPose {
        let pose = ArmPose::new(extension, gripper, turret_deg);
        self.state.lock().arm = pose;
        pose
    }

    /// Send an arm pose over the bridge, if one is attached. Blocks on serial I/O.
    pub fn forward_arm(&self, pose: &ArmPose) {
        if let Some(bridge) = &self.arm_bridge {
            if let Err(e) = bridge.lock().send(pose) {
                warn!("Arm bridge write failed: {}", e);
            }
        }
    }

    pub fn has_arm_bridge(&self) -> bool {
        self.arm_bridge.is_some()
    }

    pub fn set_diagnostics(&self, diagnostics: Diagnostics) {
        self.state.lock().diagnostics = diagnostics;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock();
        StateSnapshot {
            pose: state.drive.pose(),
            command: state.drive.command(),
            wheels: state.drive.wheels(),
            emergency: state.drive.is_emergency(),
            parking_brake: state.drive.parking_brake(),
            arm: state.arm,
            diagnostics: state.diagnostics,
            uptime_s: self.started_at.elapsed().as_secs_f64(),
            actuation_divergence: self.actuator.actuation_divergence(),
            simulated: self.actuator.is_simulated(),
        }
    }

    fn apply(&self, wheels: &WheelPair) {
        for side in Side::BOTH {
            self.actuator.set_motor(side, wheels[side.index()]);
        }
    }
}
