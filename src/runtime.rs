// Teleop runtime: glues the control state machine to the vehicle link.
// One tick() per control period; the front-end latches inputs and mode
// between ticks and subscribes to link events.

use tokio::sync::broadcast;

use crate::control::Controller;
use crate::link::{LinkError, VehicleLink};
use crate::messages::{DriveMode, InputState, TeleopEvent, WheelCommand};

pub struct Teleop {
    controller: Controller,
    input: InputState,
    link: VehicleLink,
}

impl Teleop {
    pub fn new() -> Self {
        Self {
            controller: Controller::default(),
            input: InputState::released(),
            link: VehicleLink::new(),
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.controller.mode()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Subscribe to log/connection/telemetry/packet notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TeleopEvent> {
        self.link.subscribe()
    }

    /// Select the drive mode, zeroing the control accumulators.
    pub fn set_mode(&mut self, mode: DriveMode) {
        self.controller.set_mode(mode);
    }

    /// Latch the held directional inputs for the next tick.
    pub fn set_input(&mut self, forward: bool, backward: bool, left: bool, right: bool) {
        self.input = InputState {
            forward,
            backward,
            steer_left: left,
            steer_right: right,
        };
    }

    pub async fn connect(&mut self, ip: &str, port: u16) -> Result<(), LinkError> {
        self.link.connect(ip, port).await
    }

    pub async fn disconnect(&mut self) {
        self.link.disconnect().await;
    }

    /// One control cycle: run the watchdog, and while connected advance the
    /// accumulators and send the resulting wheel command. The accumulators
    /// do not advance while disconnected.
    pub async fn tick(&mut self) -> Option<WheelCommand> {
        self.link.check_watchdog().await;
        if !self.link.is_connected() {
            return None;
        }

        let cmd = self.controller.tick(&self.input);
        self.link.send(&cmd).await;
        Some(cmd)
    }
}

impl Default for Teleop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tick_is_a_no_op_while_disconnected() {
        let mut teleop = Teleop::new();
        teleop.set_input(true, false, false, false);
        assert!(teleop.tick().await.is_none());
    }

    #[tokio::test]
    async fn tick_sends_commands_reflecting_held_input() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut teleop = Teleop::new();
        teleop.connect("127.0.0.1", port).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        teleop.set_input(true, false, false, false);
        let cmd = teleop.tick().await.unwrap();
        assert_eq!(cmd.throttle, 2.0);

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"2.0,0.0,0.0,0.0,0.0;");

        teleop.disconnect().await;
    }

    #[tokio::test]
    async fn mode_selection_persists_across_disconnect() {
        let mut teleop = Teleop::new();
        teleop.set_mode(DriveMode::Crab);
        teleop.disconnect().await;
        assert_eq!(teleop.mode(), DriveMode::Crab);
    }
}
