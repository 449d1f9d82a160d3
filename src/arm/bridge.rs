// Serial bridge to the arm microcontroller
//
// Line protocol, one ASCII line per joint: "J <id> <value>\n"
// Angles are sent in tenths of a degree, the gripper in per-mille.

use serialport::{self, SerialPort};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

use super::kinematics::ArmPose;

pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Joint ids understood by the arm firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Joint {
    Turret = 1,
    Shoulder = 2,
    Elbow = 3,
    Wrist = 4,
    Gripper = 5,
}

/// Error types for the arm link
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can forward a solved arm pose to the joints
pub trait ArmBridge: Send {
    fn send(&mut self, pose: &ArmPose) -> Result<(), BridgeError>;
}

/// Writes joint lines to any byte sink
pub struct JointLineWriter<W: Write + Send> {
    sink: W,
}

/// Arm bridge over a serial port
pub type SerialArmBridge = JointLineWriter<Box<dyn SerialPort>>;

impl SerialArmBridge {
    /// Open the serial link to the arm microcontroller
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self, BridgeError> {
        info!("Opening arm bridge on {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self::new(port))
    }
}

impl<W: Write + Send> JointLineWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write + Send> ArmBridge for JointLineWriter<W> {
    fn send(&mut self, pose: &ArmPose) -> Result<(), BridgeError> {
        let mut buf = String::with_capacity(64);
        for (joint, value) in joint_targets(pose) {
            buf.push_str(&format!("J {} {}\n", joint as u8, value));
        }
        debug!("Arm bridge write: {:?}", buf);
        self.sink.write_all(buf.as_bytes())?;
        self.sink.flush()?;
        Ok(())
    }
}

/// Integer joint targets in firmware units
pub fn joint_targets(pose: &ArmPose) -> [(Joint, i16); 5] {
    [
        (Joint::Turret, deci_degrees(pose.turret_deg.to_radians())),
        (Joint::Shoulder, deci_degrees(pose.joints.q2)),
        (Joint::Elbow, deci_degrees(pose.joints.q3)),
        (Joint::Wrist, deci_degrees(pose.joints.q4)),
        (Joint::Gripper, (pose.gripper * 1000.0).round() as i16),
    ]
}

fn deci_degrees(rad: f64) -> i16 {
    let tenths = (rad.to_degrees() * 10.0).round() as i32;
    tenths.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
