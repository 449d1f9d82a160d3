// Differential drive kinematics for the two-wheel base
// Converts body velocity commands (v, w) to per-wheel direction + duty and
// integrates the odometry pose.

use std::f64::consts::PI;

use serde::Serialize;

use crate::config::{HALF_TRACK, MAX_WHEEL_LINEAR};

/// Normalized wheel speeds at or below this magnitude are treated as stopped
const DEADBAND: f64 = 1e-3;

/// Rotation sense of one wheel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Stop,
    Forward,
    Backward,
}

/// Which side of the base a motor drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// Direction plus duty cycle in integer percent [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WheelCommand {
    pub direction: Direction,
    pub duty: u8,
}

impl WheelCommand {
    pub const STOP: WheelCommand = WheelCommand {
        direction: Direction::Stop,
        duty: 0,
    };

    pub fn new(direction: Direction, duty: u8) -> Self {
        Self {
            direction,
            duty: duty.min(100),
        }
    }

    /// Map a normalized wheel speed to direction + duty
    pub fn from_normalized(norm: f64) -> Self {
        let norm = if norm.is_nan() { 0.0 } else { norm.clamp(-1.0, 1.0) };
        let direction = if norm > DEADBAND {
            Direction::Forward
        } else if norm < -DEADBAND {
            Direction::Backward
        } else {
            Direction::Stop
        };
        let duty = (norm.abs() * 100.0).round() as u8;
        Self::new(direction, duty)
    }

    /// True when the wheel is not being driven
    pub fn is_idle(&self) -> bool {
        self.direction == Direction::Stop || self.duty == 0
    }
}

/// Commands for both wheels, [left, right]
pub type WheelPair = [WheelCommand; 2];

/// Odometry pose, theta in (-PI, PI]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Body velocity target
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VelocityCommand {
    pub v: f64, // m/s
    pub w: f64, // rad/s
}

/// Holds velocity commands and pose, produces wheel commands
#[derive(Debug, Clone)]
pub struct DifferentialDriveModel {
    max_wheel_linear: f64,
    half_track: f64,
    command: VelocityCommand,
    pose: Pose,
    emergency: bool,
    parking_brake: bool,
    wheels: WheelPair,
}

impl Default for DifferentialDriveModel {
    fn default() -> Self {
        Self::new(MAX_WHEEL_LINEAR, HALF_TRACK)
    }
}

impl DifferentialDriveModel {
    pub fn new(max_wheel_linear: f64, half_track: f64) -> Self {
        Self {
            max_wheel_linear,
            half_track,
            command: VelocityCommand::default(),
            pose: Pose::default(),
            emergency: false,
            parking_brake: false,
            wheels: [WheelCommand::STOP; 2],
        }
    }

    /// Store a new velocity target
    ///
    /// Any drive command also clears a pending emergency stop. There is no
    /// separate reset step.
    pub fn set_velocity_command(&mut self, v: f64, w: f64) {
        self.command = VelocityCommand {
            v: finite_or_zero(v),
            w: finite_or_zero(w),
        };
        self.emergency = false;
    }

    /// Latch the emergency flag, zero the target and stop both wheels now
    pub fn emergency_stop(&mut self) -> WheelPair {
        self.emergency = true;
        self.command = VelocityCommand::default();
        self.wheels = [WheelCommand::STOP; 2];
        self.wheels
    }

    pub fn set_parking_brake(&mut self, engaged: bool) {
        self.parking_brake = engaged;
    }

    /// Advance one control period and return the wheel commands to apply
    pub fn step(&mut self, dt: f64) -> WheelPair {
        if self.emergency || self.parking_brake {
            self.wheels = [WheelCommand::STOP; 2];
            return self.wheels;
        }

        let VelocityCommand { v, w } = self.command;
        let v_left = v - w * self.half_track;
        let v_right = v + w * self.half_track;

        let (n_left, n_right) = if self.max_wheel_linear > 1e-6 {
            (v_left / self.max_wheel_linear, v_right / self.max_wheel_linear)
        } else {
            (0.0, 0.0)
        };

        self.wheels = [
            WheelCommand::from_normalized(n_left),
            WheelCommand::from_normalized(n_right),
        ];

        if dt > 0.0 {
            let theta = self.pose.theta;
            self.pose.x += v * theta.cos() * dt;
            self.pose.y += v * theta.sin() * dt;
            self.pose.theta = wrap_angle(theta + w * dt);
        }

        self.wheels
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn command(&self) -> VelocityCommand {
        self.command
    }

    pub fn wheels(&self) -> WheelPair {
        self.wheels
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn parking_brake(&self) -> bool {
        self.parking_brake
    }
}

/// Wrap an angle in radians into (-PI, PI]
pub fn wrap_angle(theta: f64) -> f64 {
    if !theta.is_finite() {
        return 0.0;
    }
    let mut a = theta % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
