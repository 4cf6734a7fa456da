// Message and event types shared between the control loop, the link and
// whatever front-end drives them.

use serde::{Deserialize, Serialize};

/// Drive mode of the 4WS base. Switching mode zeroes the control
/// accumulators, see [`crate::control::Controller::set_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Ackermann four-wheel steering, rear wheels counter-steer.
    FourWheelSteer,
    /// All wheels parallel, pure lateral translation.
    Crab,
    /// Wheels fixed in a diamond, spot rotation.
    Pivot,
}

/// Held directional inputs, latched by the front-end between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub steer_left: bool,
    pub steer_right: bool,
}

impl InputState {
    pub fn released() -> Self {
        Self::default()
    }
}

/// One tick's worth of actuation: throttle plus four wheel angles in
/// degrees. Positive angle = wheel steered left (CCW from above).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WheelCommand {
    pub throttle: f64,
    pub right_front: f64,
    pub right_rear: f64,
    pub left_front: f64,
    pub left_rear: f64,
}

/// Telemetry decoded from one 24-byte payload: five fixed-point channels
/// (raw i32 / 100) and the vehicle's error code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub values: [f64; 5],
    pub error_code: i32,
}

/// Notifications published by the link for front-end consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeleopEvent {
    Log(String),
    ConnectionChanged(bool),
    Telemetry {
        frame: TelemetryFrame,
        /// Time since the previous decoded frame.
        interval_ms: f64,
    },
    /// Exact wire payload of an outbound command.
    PacketSent(String),
}
