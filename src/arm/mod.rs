// Two-link arm on a turret with a gripper
//
// Provides:
// - Extension-driven inverse kinematics (normalized reach -> joint angles)
// - Serial bridge that forwards joint targets to the arm microcontroller

pub mod bridge;
pub mod kinematics;

pub use bridge::{ArmBridge, BridgeError, SerialArmBridge};
pub use kinematics::{ArmPose, JointAngles, normalize_deg, solve_extension};
