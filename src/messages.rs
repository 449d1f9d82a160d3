// JSON payloads exchanged with the web client
//
// Decoding is permissive: a missing or unparseable body, or a field
// of the wrong type, falls back to zero/false. A malformed drive command therefore
// becomes a stop command instead of an error.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::motor::{Direction, Pose, WheelCommand};
use crate::state::StateSnapshot;

// Command from web client -> runtime (POST /api/base)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseCommand {
    pub v_linear: f64,
    pub v_angular: f64,
    pub emergency: bool,
    pub parking_brake: Option<bool>,
}

// Command from web client -> runtime (POST /api/arm)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArmCommand {
    pub extend: f64,
    pub gripper: f64,
    pub turret_angle: f64,
}

impl BaseCommand {
    pub fn decode(body: &[u8]) -> Self {
        let obj = decode_object(body);
        Self {
            v_linear: number(&obj, "vLinear"),
            v_angular: number(&obj, "vAngular"),
            emergency: flag(&obj, "emergency"),
            parking_brake: obj.get("parkingBrake").and_then(Value::as_bool),
        }
    }
}

impl ArmCommand {
    pub fn decode(body: &[u8]) -> Self {
        let obj = decode_object(body);
        Self {
            extend: number(&obj, "extend"),
            gripper: number(&obj, "gripper"),
            turret_angle: number(&obj, "turretAngle"),
        }
    }
}

/// Body parsed as a JSON object, or an empty object
fn decode_object(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(obj)) => obj,
        _ => Map::new(),
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Reply to every accepted command
#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub ok: bool,
}

impl CommandReply {
    pub const OK: CommandReply = CommandReply { ok: true };
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelReport {
    pub direction: Direction,
    pub duty: u8,
}

impl From<&WheelCommand> for WheelReport {
    fn from(cmd: &WheelCommand) -> Self {
        Self {
            direction: cmd.direction,
            duty: cmd.duty,
        }
    }
}

/// GET /api/status
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub pose: Pose,
    pub v: f64,
    pub w: f64,
    pub emergency: bool,
    pub parking_brake: bool,
    pub left: WheelReport,
    pub right: WheelReport,
    pub battery_v: Option<f64>,
    pub cpu: Option<f64>,
    pub temp: Option<f64>,
    pub board_temp: Option<f64>,
    pub uptime: f64,
    pub actuation_divergence: u64,
    pub simulation: bool,
}

impl From<&StateSnapshot> for StatusReport {
    fn from(snap: &StateSnapshot) -> Self {
        Self {
            pose: snap.pose,
            v: snap.command.v,
            w: snap.command.w,
            emergency: snap.emergency,
            parking_brake: snap.parking_brake,
            left: WheelReport::from(&snap.wheels[0]),
            right: WheelReport::from(&snap.wheels[1]),
            battery_v: snap.diagnostics.battery_v,
            cpu: snap.diagnostics.cpu_load,
            temp: snap.diagnostics.cpu_temp,
            board_temp: snap.diagnostics.board_temp,
            uptime: (snap.uptime_s * 10.0).round() / 10.0,
            actuation_divergence: snap.actuation_divergence,
            simulation: snap.simulated,
        }
    }
}

/// Solved joint angles, as the web client's arm view reads them
#[derive(Debug, Clone, Serialize)]
pub struct ArmJoints {
    pub q2: f64,
    pub q3: f64,
    pub q4: f64,
    pub gripper: f64,
    pub turret: f64,
}

/// GET /api/joint_state
#[derive(Debug, Clone, Serialize)]
pub struct JointStateReport {
    pub turret_deg: f64,
    pub arm_ext: f64,
    pub gripper: f64,
    pub arm: ArmJoints,
}

impl From<&StateSnapshot> for JointStateReport {
    fn from(snap: &StateSnapshot) -> Self {
        let arm = &snap.arm;
        Self {
            turret_deg: arm.turret_deg,
            arm_ext: arm.extension,
            gripper: arm.gripper,
            arm: ArmJoints {
                q2: arm.joints.q2,
                q3: arm.joints.q3,
                q4: arm.joints.q4,
                gripper: arm.gripper,
                turret: arm.turret_deg,
            },
        }
    }
}

/// Compact JSON bytes for a response body
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::SimulatedActuator;
    use crate::state::ControlStateStore;
    use std::sync::Arc;

    #[test]
    fn test_decode_base_command() {
        let cmd = BaseCommand::decode(br#"{"vLinear":0.3,"vAngular":-1.2,"emergency":false}"#);
        assert_eq!(cmd.v_linear, 0.3);
        assert_eq!(cmd.v_angular, -1.2);
        assert!(!cmd.emergency);
        assert_eq!(cmd.parking_brake, None);
    }

    #[test]
    fn test_decode_emergency_only() {
        let cmd = BaseCommand::decode(br#"{"emergency":true,"parkingBrake":true}"#);
        assert!(cmd.emergency);
        assert_eq!(cmd.v_linear, 0.0);
        assert_eq!(cmd.parking_brake, Some(true));
    }

    #[test]
    fn test_garbage_becomes_zero_command() {
        assert_eq!(BaseCommand::decode(b""), BaseCommand::default());
        assert_eq!(BaseCommand::decode(b"{not json"), BaseCommand::default());
        assert_eq!(BaseCommand::decode(b"[1,2,3]"), BaseCommand::default());
        assert_eq!(ArmCommand::decode(b"null"), ArmCommand::default());
    }

    #[test]
    fn test_wrong_field_types_fall_back_per_field() {
        let cmd = BaseCommand::decode(br#"{"vLinear":"fast","vAngular":0.5,"emergency":1}"#);
        assert_eq!(cmd.v_linear, 0.0);
        assert_eq!(cmd.v_angular, 0.5);
        assert!(!cmd.emergency);

        // Typo in a key zeroes that field
        let arm = ArmCommand::decode(br#"{"extnd":0.9,"gripper":0.4,"turretAngle":30}"#);
        assert_eq!(arm.extend, 0.0);
        assert_eq!(arm.gripper, 0.4);
        assert_eq!(arm.turret_angle, 30.0);
    }

    #[test]
    fn test_reply_is_compact() {
        assert_eq!(encode(&CommandReply::OK).unwrap(), br#"{"ok":true}"#.to_vec());
    }

    #[test]
    fn test_joint_state_fields() {
        let store = ControlStateStore::new(Arc::new(SimulatedActuator::new()));
        store.set_arm(0.5, 0.2, 370.0);
        let report = JointStateReport::from(&store.snapshot());
        let json: Value = serde_json::from_slice(&encode(&report).unwrap()).unwrap();
        assert_eq!(json["turret_deg"].as_f64(), Some(10.0));
        assert_eq!(json["arm_ext"].as_f64(), Some(0.5));
        assert_eq!(json["gripper"].as_f64(), Some(0.2));
        assert!(json["arm"]["q3"].as_f64().is_some());
    }

    #[test]
    fn test_status_fields() {
        let store = ControlStateStore::new(Arc::new(SimulatedActuator::new()));
        store.set_velocity_command(0.5, 0.0);
        store.step(0.02);
        let report = StatusReport::from(&store.snapshot());
        let json: Value = serde_json::from_slice(&encode(&report).unwrap()).unwrap();
        assert_eq!(json["v"].as_f64(), Some(0.5));
        assert_eq!(json["emergency"], Value::Bool(false));
        assert_eq!(json["left"]["direction"], "forward");
        assert_eq!(json["left"]["duty"], 100);
        assert!((json["pose"]["x"].as_f64().unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(json["battery_v"], Value::Null);
        assert_eq!(json["simulation"], Value::Bool(true));
    }
}
