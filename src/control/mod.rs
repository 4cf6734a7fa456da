// Control state machine for the 4WS base
//
// Provides:
// - Per-mode throttle/steer accumulators with rate limits and clamps
// - Ackermann 4WS kinematics (steering command -> wheel angles)

pub mod kinematics;

use tracing::info;

use crate::config::{ACCEL_RATE, MAX_PIVOT_RATE, MAX_SPEED, MAX_STEER_4WS, MAX_STEER_CRAB, STEER_RATE};
use crate::messages::{DriveMode, InputState, WheelCommand};
use kinematics::{fourws_angles, WheelAngles, STRAIGHT_DEADBAND_DEG};

pub use kinematics::fourws_angles_with_geometry;

// Pivot mode wheel orientation: a fixed diamond so the wheel tangents form
// a circle about the vehicle center. These values are part of the vehicle
// contract, they match the physical steering stops.
const PIVOT_RIGHT_FRONT: f64 = -135.0;
const PIVOT_RIGHT_REAR: f64 = 135.0;
const PIVOT_LEFT_FRONT: f64 = 45.0;
const PIVOT_LEFT_REAR: f64 = -45.0;

/// Turns latched directional inputs into wheel commands, one per tick.
///
/// The only mutable state is the two accumulators. `throttle` is the drive
/// magnitude (or rotation rate in pivot mode), `steer_angle` the steering
/// command in degrees. Both are bounded by the active mode's limits.
pub struct Controller {
    mode: DriveMode,
    throttle: f64,
    steer_angle: f64,
}

impl Controller {
    pub fn new(mode: DriveMode) -> Self {
        Self {
            mode,
            throttle: 0.0,
            steer_angle: 0.0,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn throttle(&self) -> f64 {
        self.throttle
    }

    pub fn steer_angle(&self) -> f64 {
        self.steer_angle
    }

    /// Switch drive mode. Both accumulators reset to zero so the new mode
    /// never inherits a throttle or steering value computed under the old
    /// mode's limits.
    pub fn set_mode(&mut self, mode: DriveMode) {
        self.mode = mode;
        self.throttle = 0.0;
        self.steer_angle = 0.0;
        info!("Mode changed to {:?}", mode);
    }

    /// Advance the accumulators one tick under the given held inputs and
    /// produce the wheel command to send.
    pub fn tick(&mut self, input: &InputState) -> WheelCommand {
        match self.mode {
            DriveMode::Pivot => self.tick_pivot(input),
            DriveMode::FourWheelSteer | DriveMode::Crab => self.tick_steered(input),
        }
    }

    // Pivot: fixed diamond angles, throttle doubles as rotation rate.
    // CCW while steer_left, CW while steer_right, hard stop on release.
    fn tick_pivot(&mut self, input: &InputState) -> WheelCommand {
        if input.steer_left {
            self.throttle = (self.throttle + ACCEL_RATE).min(MAX_PIVOT_RATE);
        } else if input.steer_right {
            self.throttle = (self.throttle - ACCEL_RATE).max(-MAX_PIVOT_RATE);
        } else {
            // No coasting in a spot turn
            self.throttle = 0.0;
        }

        WheelCommand {
            throttle: self.throttle,
            right_front: PIVOT_RIGHT_FRONT,
            right_rear: PIVOT_RIGHT_REAR,
            left_front: PIVOT_LEFT_FRONT,
            left_rear: PIVOT_LEFT_REAR,
        }
    }

    // 4WS / crab: throttle snaps to zero on release, steering holds its
    // last value until counter-steered.
    fn tick_steered(&mut self, input: &InputState) -> WheelCommand {
        if input.forward {
            self.throttle = (self.throttle + ACCEL_RATE).min(MAX_SPEED);
        } else if input.backward {
            self.throttle = (self.throttle - ACCEL_RATE).max(-MAX_SPEED);
        } else {
            self.throttle = 0.0;
        }

        if input.steer_left {
            self.steer_angle += STEER_RATE;
        } else if input.steer_right {
            self.steer_angle -= STEER_RATE;
        }

        let limit = match self.mode {
            DriveMode::Crab => MAX_STEER_CRAB,
            _ => MAX_STEER_4WS,
        };
        self.steer_angle = self.steer_angle.clamp(-limit, limit);

        let angles = match self.mode {
            DriveMode::Crab => WheelAngles {
                right_front: self.steer_angle,
                right_rear: self.steer_angle,
                left_front: self.steer_angle,
                left_rear: self.steer_angle,
            },
            _ if self.steer_angle.abs() > STRAIGHT_DEADBAND_DEG => fourws_angles(self.steer_angle),
            // Near-zero commands would push noise through the singular
            // geometry, force straight-ahead instead
            _ => WheelAngles::zero(),
        };

        WheelCommand {
            throttle: self.throttle,
            right_front: angles.right_front,
            right_rear: angles.right_rear,
            left_front: angles.left_front,
            left_rear: angles.left_rear,
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(DriveMode::FourWheelSteer)
    }
}
