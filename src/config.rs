// Timeouts, rate limits and vehicle geometry
use std::time::Duration;

// Control loop frequency
pub const LOOP_HZ: u64 = 50;

// Bound on a single connect attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

// Receive watchdog: drop the link if no telemetry bytes arrive for this long
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(2);

// Accumulator rates, units per control tick
pub const ACCEL_RATE: f64 = 2.0;
pub const STEER_RATE: f64 = 2.0;

// Clamp limits
pub const MAX_SPEED: f64 = 100.0;
// 89 deg, deliberately short of the 90 deg tan() singularity
pub const MAX_STEER_4WS: f64 = 89.0;
pub const MAX_STEER_CRAB: f64 = 135.0;
pub const MAX_PIVOT_RATE: f64 = 50.0;

// Vehicle geometry, millimeters
pub const WHEELBASE_MM: f64 = 1050.0;
pub const TRACK_MM: f64 = 1050.0;

// Telemetry framing: 2-byte magic followed by six big-endian i32
pub const FRAME_HEADER: [u8; 2] = [0xFE, 0xFE];
pub const FRAME_PAYLOAD_LEN: usize = 24;
pub const FRAME_LEN: usize = FRAME_HEADER.len() + FRAME_PAYLOAD_LEN;
