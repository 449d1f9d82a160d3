// Inverse kinematics for the 2-link arm
// Maps a normalized extension in [0, 1] onto a reach/height envelope and solves
// shoulder, elbow and wrist angles in the arm plane.

/// Link lengths (meters)
pub const L1: f64 = 0.35;
pub const L2: f64 = 0.30;

/// Reach envelope swept by the extension (meters, along the arm plane)
const MIN_REACH: f64 = 0.05;
const MAX_REACH: f64 = L1 + L2 - 0.05;

/// Height envelope: folded arm sits high, extended arm drops below the shoulder
const MIN_HEIGHT: f64 = 0.25;
const MAX_DROP: f64 = -0.10;

/// Margin that keeps the target strictly inside the reachable annulus
const ANNULUS_EPS: f64 = 1e-3;

/// Arm pose reported until the first arm command arrives
pub const DEFAULT_EXTENSION: f64 = 0.5;
pub const DEFAULT_GRIPPER: f64 = 0.3;

/// Joint angles in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointAngles {
    pub q2: f64, // shoulder
    pub q3: f64, // elbow, always in [0, PI]
    pub q4: f64, // wrist
}

/// Solve joint angles for a normalized extension
///
/// `ext` is clamped to [0, 1] first. The interpolated target is pulled into
/// `[|L1 - L2| + eps, L1 + L2 - eps]` before the law of cosines, so `acos`
/// never sees an argument outside [-1, 1].
pub fn solve_extension(ext: f64) -> JointAngles {
    let ext = if ext.is_nan() { 0.0 } else { ext.clamp(0.0, 1.0) };

    let mut x = MIN_REACH + (MAX_REACH - MIN_REACH) * ext;
    let mut z = MIN_HEIGHT + (MAX_DROP - MIN_HEIGHT) * ext;

    let dist = (x * x + z * z).sqrt();
    let r_min = (L1 - L2).abs() + ANNULUS_EPS;
    let r_max = L1 + L2 - ANNULUS_EPS;
    let r = dist.clamp(r_min, r_max);

    if dist > ANNULUS_EPS {
        let k = r / dist;
        x *= k;
        z *= k;
    }

    let cos_q3 = ((x * x + z * z - L1 * L1 - L2 * L2) / (2.0 * L1 * L2)).clamp(-1.0, 1.0);
    let q3 = cos_q3.acos();

    let k1 = L1 + L2 * q3.cos();
    let k2 = L2 * q3.sin();
    let q2 = z.atan2(x) - k2.atan2(k1);

    // Keeps the gripper roughly level; not an orientation solve
    let q4 = -(q2 + q3) * 0.5;

    JointAngles { q2, q3, q4 }
}

/// Commanded arm pose, clamped and normalized on construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmPose {
    pub extension: f64,  // [0, 1]
    pub gripper: f64,    // [0, 1], 0 = open
    pub turret_deg: f64, // (-180, 180]
    pub joints: JointAngles,
}

impl ArmPose {
    pub fn new(extension: f64, gripper: f64, turret_deg: f64) -> Self {
        let extension = clamp_unit(extension);
        Self {
            extension,
            gripper: clamp_unit(gripper),
            turret_deg: normalize_deg(turret_deg),
            joints: solve_extension(extension),
        }
    }
}

impl Default for ArmPose {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION, DEFAULT_GRIPPER, 0.0)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Wrap an angle in degrees into (-180, 180]
pub fn normalize_deg(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let mut a = deg % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOL: f64 = 1e-12;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < TOL,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_folded_reference() {
        let j = solve_extension(0.0);
        assert_close(j.q2, 0.3805729235199613);
        assert_close(j.q3, 2.3495332954167942);
        assert_close(j.q4, -1.3650531094683778);
    }

    #[test]
    fn test_extended_reference() {
        let j = solve_extension(1.0);
        assert_close(j.q2, -0.49744979915779997);
        assert_close(j.q3, 0.7227342478134168);
        assert_close(j.q4, -0.1126422243278084);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(solve_extension(-3.0), solve_extension(0.0));
        assert_eq!(solve_extension(7.5), solve_extension(1.0));
        assert_eq!(solve_extension(f64::NAN), solve_extension(0.0));
    }

    #[test]
    fn test_elbow_stays_in_range() {
        for i in 0..=1000 {
            let ext = i as f64 / 1000.0;
            let j = solve_extension(ext);
            assert!(
                (0.0..=PI).contains(&j.q3),
                "q3={} out of range at ext={}",
                j.q3,
                ext
            );
            assert!(j.q2.is_finite() && j.q4.is_finite());
        }
    }

    #[test]
    fn test_turret_normalization() {
        assert_eq!(normalize_deg(370.0), 10.0);
        assert_eq!(normalize_deg(180.0), 180.0);
        assert_eq!(normalize_deg(-180.0), 180.0);
        assert_eq!(normalize_deg(-190.0), 170.0);
        assert_eq!(normalize_deg(540.0), 180.0);
        assert_eq!(normalize_deg(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_pose_clamps_fields() {
        let pose = ArmPose::new(1.4, -0.2, 370.0);
        assert_eq!(pose.extension, 1.0);
        assert_eq!(pose.gripper, 0.0);
        assert_eq!(pose.turret_deg, 10.0);
        assert_eq!(pose.joints, solve_extension(1.0));
    }

    #[test]
    fn test_forward_kinematics_reaches_target() {
        // Mid-envelope target is inside the annulus, so FK must land on it
        let ext = 0.5;
        let j = solve_extension(ext);
        let x = L1 * j.q2.cos() + L2 * (j.q2 + j.q3).cos();
        let z = L1 * j.q2.sin() + L2 * (j.q2 + j.q3).sin();
        assert!((x - 0.325).abs() < 1e-9, "x={}", x);
        assert!((z - 0.075).abs() < 1e-9, "z={}", z);
    }
}
