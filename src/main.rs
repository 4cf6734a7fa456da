// Terminal operator console: WASD drive/steer, 1/2/3 drive mode, Q quit.
// Raw terminals report no key-release events, so held keys are latched and
// expire after a short timeout without repeats.

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fourws_teleop::{DriveMode, Teleop, TeleopEvent};

/// Keys count as released after this long without a press or repeat
const HOLD_TIMEOUT: Duration = Duration::from_millis(150);

#[derive(Parser, Debug)]
#[command(about = "Teleoperation console for a 4WS ground vehicle")]
struct Args {
    /// Vehicle controller IP address
    ip: String,

    /// Vehicle controller TCP port
    port: u16,

    /// Control loop rate in Hz
    #[arg(long, default_value_t = fourws_teleop::config::LOOP_HZ)]
    hz: u64,

    /// Print decoded telemetry as JSON lines
    #[arg(long)]
    json_telemetry: bool,
}

#[derive(Default)]
struct HeldKeys {
    forward: Option<Instant>,
    backward: Option<Instant>,
    left: Option<Instant>,
    right: Option<Instant>,
}

impl HeldKeys {
    fn flags(&self, now: Instant) -> (bool, bool, bool, bool) {
        let held = |t: &Option<Instant>| t.is_some_and(|at| now.duration_since(at) < HOLD_TIMEOUT);
        (
            held(&self.forward),
            held(&self.backward),
            held(&self.left),
            held(&self.right),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();

    let mut teleop = Teleop::new();
    let events = teleop.subscribe();
    spawn_event_printer(events, args.json_telemetry);

    teleop.connect(&args.ip, args.port).await?;
    info!("Controls: W/S=drive, A/D=steer, 1=4WS 2=crab 3=pivot, Q=quit");

    enable_raw_mode()?;
    let result = run_console(&mut teleop, args.hz).await;
    disable_raw_mode()?;

    teleop.disconnect().await;
    result
}

async fn run_console(
    teleop: &mut Teleop,
    hz: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut keys = HeldKeys::default();
    let mut tick = interval(Duration::from_millis(1000 / hz.max(1)));

    loop {
        tick.tick().await;

        // Drain pending key events without blocking the loop
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
                    continue;
                }
                let now = Instant::now();
                match code {
                    KeyCode::Char('w') | KeyCode::Up => keys.forward = Some(now),
                    KeyCode::Char('s') | KeyCode::Down => keys.backward = Some(now),
                    KeyCode::Char('a') | KeyCode::Left => keys.left = Some(now),
                    KeyCode::Char('d') | KeyCode::Right => keys.right = Some(now),
                    KeyCode::Char('1') => teleop.set_mode(DriveMode::FourWheelSteer),
                    KeyCode::Char('2') => teleop.set_mode(DriveMode::Crab),
                    KeyCode::Char('3') => teleop.set_mode(DriveMode::Pivot),
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    _ => {}
                }
            }
        }

        let (forward, backward, left, right) = keys.flags(Instant::now());
        teleop.set_input(forward, backward, left, right);

        teleop.tick().await;
        if !teleop.is_connected() {
            warn!("Link is down, exiting");
            return Ok(());
        }
    }
}

fn spawn_event_printer(
    mut events: tokio::sync::broadcast::Receiver<TeleopEvent>,
    json_telemetry: bool,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TeleopEvent::Log(msg)) => info!("link: {msg}"),
                Ok(TeleopEvent::ConnectionChanged(up)) => {
                    info!("link {}", if up { "up" } else { "down" });
                }
                Ok(TeleopEvent::Telemetry { frame, interval_ms }) => {
                    if json_telemetry {
                        match serde_json::to_string(&frame) {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!("telemetry serialization failed: {e}"),
                        }
                    } else {
                        info!(
                            "telemetry {:?} err={} ({interval_ms:.0}ms)",
                            frame.values, frame.error_code
                        );
                    }
                }
                Ok(TeleopEvent::PacketSent(payload)) => {
                    tracing::debug!("sent {payload}");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event printer lagged, {n} events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
