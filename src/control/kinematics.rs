// Ackermann four-wheel-steer kinematics.
// Converts a steering command (degrees) into per-wheel angles such that all
// four wheels trace concentric arcs about a common turn center. Rear wheels
// counter-steer relative to the front, which is what keeps 4WS cornering
// crab-free.

use crate::config::{TRACK_MM, WHEELBASE_MM};

/// Below this command magnitude (degrees) the geometry is treated as
/// straight-ahead: tan() near zero makes the turn radius blow up and the
/// resulting angles are numeric noise.
pub const STRAIGHT_DEADBAND_DEG: f64 = 0.1;

/// Per-wheel steering angles in degrees.
/// Positive = wheel steered left (CCW viewed from above).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelAngles {
    pub right_front: f64,
    pub right_rear: f64,
    pub left_front: f64,
    pub left_rear: f64,
}

impl WheelAngles {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns angles as [RF, RR, LF, LR], the wire field order.
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.right_front,
            self.right_rear,
            self.left_front,
            self.left_rear,
        ]
    }
}

/// Compute 4WS wheel angles for steering command `cmd_deg` with the
/// vehicle's fixed geometry.
pub fn fourws_angles(cmd_deg: f64) -> WheelAngles {
    fourws_angles_with_geometry(cmd_deg, WHEELBASE_MM, TRACK_MM)
}

/// Compute 4WS wheel angles with explicit wheelbase and track.
///
/// The turn center sits on the lateral axis through the vehicle center, so
/// each wheel is offset half a wheelbase longitudinally and half a track
/// laterally from it. Inner wheels (same side as the turn) get the larger
/// angle, outer wheels the smaller one, and the rear of each side mirrors
/// the front with opposite sign. The convention is symmetric: mirroring the
/// command mirrors the angles side-for-side.
pub fn fourws_angles_with_geometry(cmd_deg: f64, wheelbase: f64, track: f64) -> WheelAngles {
    if cmd_deg.abs() <= STRAIGHT_DEADBAND_DEG {
        return WheelAngles::zero();
    }

    let half_base = wheelbase / 2.0;
    let half_track = track / 2.0;

    // Turn radius magnitude about the vehicle center
    let radius = (half_base / cmd_deg.to_radians().tan()).abs();

    let ang_in = half_base.atan2(radius - half_track).to_degrees();
    let ang_out = half_base.atan2(radius + half_track).to_degrees();

    if cmd_deg > 0.0 {
        // Left turn: left side is inner, fronts steer left, rears counter
        WheelAngles {
            left_front: ang_in,
            left_rear: -ang_in,
            right_front: ang_out,
            right_rear: -ang_out,
        }
    } else {
        // Right turn: right side is inner, fronts steer right
        WheelAngles {
            right_front: -ang_in,
            right_rear: ang_in,
            left_front: -ang_out,
            left_rear: ang_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn straight_ahead_is_exactly_zero() {
        for cmd in [0.0, 0.05, -0.05, 0.1, -0.1] {
            let angles = fourws_angles(cmd);
            assert_eq!(angles, WheelAngles::zero(), "cmd={cmd}");
        }
    }

    #[test]
    fn deadband_edge_engages_geometry() {
        let angles = fourws_angles(0.11);
        assert!(angles.left_front > 0.0);
    }

    #[test]
    fn left_turn_inner_angle_dominates() {
        // 45 deg with L = W = 1050: R = 525, inner = atan2(525, 0) = 90 deg,
        // outer = atan2(525, 1050) ~= 26.57 deg
        let angles = fourws_angles(45.0);

        assert!((angles.left_front - 90.0).abs() < 1e-6);
        assert!((angles.right_front - 26.565_051_177_077_99).abs() < 1e-6);
        assert!(angles.left_front.abs() > angles.right_front.abs());
    }

    #[test]
    fn rear_wheels_counter_steer() {
        let angles = fourws_angles(30.0);
        assert!((angles.left_front + angles.left_rear).abs() < EPS);
        assert!((angles.right_front + angles.right_rear).abs() < EPS);
        assert!(angles.left_front > 0.0 && angles.left_rear < 0.0);
    }

    #[test]
    fn right_turn_mirrors_left_turn() {
        let left = fourws_angles(20.0);
        let right = fourws_angles(-20.0);

        assert!((left.left_front + right.right_front).abs() < EPS);
        assert!((left.left_rear + right.right_rear).abs() < EPS);
        assert!((left.right_front + right.left_front).abs() < EPS);
        assert!((left.right_rear + right.left_rear).abs() < EPS);
    }

    #[test]
    fn front_wheels_point_into_the_turn() {
        let left = fourws_angles(10.0);
        assert!(left.left_front > 0.0 && left.right_front > 0.0);

        let right = fourws_angles(-10.0);
        assert!(right.left_front < 0.0 && right.right_front < 0.0);
    }
}
