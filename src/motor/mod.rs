// Motor control for the differential base
//
// Provides:
// - Differential drive kinematics (body velocity -> wheel direction + duty)
// - Software PWM rendering onto H-bridge GPIO lines
// - Actuator implementations for hardware and simulation

mod driver;
pub mod gpio;
pub mod kinematics;
pub mod pwm;

pub use driver::{MotorActuator, PwmMotorActuator, SimulatedActuator};
pub use gpio::{ChipLine, GpioChip, LineError, OutputLine};
pub use kinematics::{
    DifferentialDriveModel, Direction, Pose, Side, VelocityCommand, WheelCommand, WheelPair,
};
pub use pwm::{BridgeLines, SoftwarePwm};
