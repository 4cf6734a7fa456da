// Teleoperation controller for a four-wheel-steer ground vehicle.
//
// The core is the non-visual control plane: the TCP link lifecycle with
// connect timeout and receive watchdog, the outbound command encoding and
// inbound telemetry framing, and the per-mode control state machine that
// turns held directional inputs into wheel commands. Front-ends drive it
// through `runtime::Teleop` and subscribe to `messages::TeleopEvent`.

pub mod config;
pub mod control;
pub mod link;
pub mod messages;
pub mod runtime;

pub use link::{ConnectionState, LinkError, VehicleLink};
pub use messages::{DriveMode, InputState, TelemetryFrame, TeleopEvent, WheelCommand};
pub use runtime::Teleop;
