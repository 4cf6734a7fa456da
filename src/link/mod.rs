// TCP link to the vehicle controller
//
// Owns the socket, the background receive task and the receive watchdog.
// Outbound commands are ASCII lines, inbound telemetry is 26-byte binary
// frames, see `protocol`.

pub mod protocol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{CONNECT_TIMEOUT, WATCHDOG_TIMEOUT};
use crate::messages::{TeleopEvent, WheelCommand};
use protocol::FrameDecoder;

/// Event channel capacity. Lagging subscribers lose old notifications,
/// which is acceptable for an observability stream.
const EVENT_CAPACITY: usize = 64;

/// Error types for the vehicle link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Connection timed out after {}s", CONNECT_TIMEOUT.as_secs())]
    ConnectTimeout,

    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("Remote closed the connection")]
    RemoteClosed,

    #[error("No telemetry for {}s", WATCHDOG_TIMEOUT.as_secs())]
    WatchdogTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// TCP client link with connect timeout, receive watchdog and a broadcast
/// notification channel.
///
/// The control tick and the receive task share only the watchdog timestamp
/// (atomic millis since the link epoch, single writer) and the event
/// channel; the write half stays with the tick, the read half moves into
/// the receive task.
pub struct VehicleLink {
    state: ConnectionState,
    writer: Option<OwnedWriteHalf>,
    rx_task: Option<JoinHandle<()>>,
    epoch: Instant,
    last_rx_ms: Arc<AtomicU64>,
    events: broadcast::Sender<TeleopEvent>,
    connect_timeout: Duration,
    watchdog_timeout: Duration,
}

impl VehicleLink {
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT, WATCHDOG_TIMEOUT)
    }

    /// Create with custom timeouts (used by tests and bench rigs).
    pub fn with_timeouts(connect_timeout: Duration, watchdog_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: ConnectionState::Disconnected,
            writer: None,
            rx_task: None,
            epoch: Instant::now(),
            last_rx_ms: Arc::new(AtomicU64::new(0)),
            events,
            connect_timeout,
            watchdog_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Subscribe to link notifications. Every subscriber sees every event
    /// from the point of subscription, delivered from whatever task emits
    /// them.
    pub fn subscribe(&self) -> broadcast::Receiver<TeleopEvent> {
        self.events.subscribe()
    }

    /// Open the TCP connection, racing the attempt against the connect
    /// timeout. On success the receive loop starts as a background task.
    /// Failures are cleaned up and returned; retrying is the caller's call.
    pub async fn connect(&mut self, ip: &str, port: u16) -> Result<(), LinkError> {
        self.disconnect().await;
        self.state = ConnectionState::Connecting;

        let stream = match timeout(self.connect_timeout, TcpStream::connect((ip, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = ConnectionState::Disconnected;
                let err = LinkError::Connect(e);
                self.log(err.to_string());
                return Err(err);
            }
            Err(_) => {
                // The connect future is dropped here, tearing the socket down
                self.state = ConnectionState::Disconnected;
                self.log(LinkError::ConnectTimeout.to_string());
                return Err(LinkError::ConnectTimeout);
            }
        };

        let (read_half, write_half) = stream.into_split();
        self.writer = Some(write_half);
        self.touch_watchdog();
        self.state = ConnectionState::Connected;

        self.emit(TeleopEvent::ConnectionChanged(true));
        self.log(format!("Connected to {ip}:{port}"));

        self.rx_task = Some(tokio::spawn(receive_loop(
            read_half,
            self.epoch,
            Arc::clone(&self.last_rx_ms),
            self.events.clone(),
        )));

        Ok(())
    }

    /// Tear the link down. Idempotent: only an actual transition emits the
    /// connection-changed notification. The receive task is aborted rather
    /// than awaited so an unresponsive remote cannot block teardown, and
    /// close-time errors are swallowed.
    pub async fn disconnect(&mut self) {
        if let Some(task) = self.rx_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            self.emit(TeleopEvent::ConnectionChanged(false));
            self.log("Disconnected".to_string());
        }
    }

    /// Encode and send one wheel command. Does nothing unless connected.
    /// A write failure is handled locally: log, then disconnect.
    pub async fn send(&mut self, cmd: &WheelCommand) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let payload = protocol::encode_command(cmd);
        match writer.write_all(payload.as_bytes()).await {
            Ok(()) => {
                debug!("Sent {payload}");
                self.emit(TeleopEvent::PacketSent(payload));
            }
            Err(e) => {
                self.log(LinkError::Send(e).to_string());
                self.disconnect().await;
            }
        }
    }

    /// Liveness check, called once per control tick whether or not a send
    /// happens. Disconnects if the remote closed the stream or if no
    /// telemetry bytes have arrived within the watchdog timeout.
    pub async fn check_watchdog(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }

        if self.rx_task.as_ref().is_some_and(|t| t.is_finished()) {
            self.log(LinkError::RemoteClosed.to_string());
            self.disconnect().await;
            return;
        }

        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last_ms = self.last_rx_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last_ms) > self.watchdog_timeout.as_millis() as u64 {
            self.log(LinkError::WatchdogTimeout.to_string());
            self.disconnect().await;
        }
    }

    fn touch_watchdog(&self) {
        self.last_rx_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn emit(&self, event: TeleopEvent) {
        // Err just means nobody is subscribed right now
        let _ = self.events.send(event);
    }

    fn log(&self, msg: String) {
        info!("{msg}");
        self.emit(TeleopEvent::Log(msg));
    }
}

impl Default for VehicleLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Background receive loop, one per connection. Reads whatever is
/// available, feeds the frame decoder and stamps the watchdog clock on
/// every read that yields at least one byte. A bad frame is logged and
/// skipped; only a closed stream or a read error ends the loop, which the
/// next watchdog check turns into a disconnect.
async fn receive_loop(
    mut read_half: OwnedReadHalf,
    epoch: Instant,
    last_rx_ms: Arc<AtomicU64>,
    events: broadcast::Sender<TeleopEvent>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];
    let mut last_frame_at = Instant::now();

    loop {
        let n = match read_half.read(&mut buf).await {
            // Zero bytes means the remote end closed the stream
            Ok(0) => {
                debug!("Receive loop: remote closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("Receive loop read error: {e}");
                let _ = events.send(TeleopEvent::Log(format!("Receive error: {e}")));
                break;
            }
        };

        last_rx_ms.store(epoch.elapsed().as_millis() as u64, Ordering::Relaxed);

        for decoded in decoder.push(&buf[..n]) {
            match decoded {
                Ok(frame) => {
                    let now = Instant::now();
                    let interval_ms = now.duration_since(last_frame_at).as_secs_f64() * 1000.0;
                    last_frame_at = now;
                    let _ = events.send(TeleopEvent::Telemetry { frame, interval_ms });
                }
                Err(e) => {
                    // Corrupt frame: drop it, keep the connection
                    warn!("Dropping telemetry frame: {e}");
                    let _ = events.send(TeleopEvent::Log(format!("Bad telemetry frame: {e}")));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FRAME_HEADER;
    use tokio::net::TcpListener;

    async fn local_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn frame_bytes(values: [f64; 5], error_code: i32) -> Vec<u8> {
        let mut out = FRAME_HEADER.to_vec();
        for v in values {
            out.extend_from_slice(&((v * 100.0).round() as i32).to_be_bytes());
        }
        out.extend_from_slice(&error_code.to_be_bytes());
        out
    }

    /// Drain events until one matches, panicking after `max` non-matches.
    async fn expect_event<F: Fn(&TeleopEvent) -> bool>(
        rx: &mut broadcast::Receiver<TeleopEvent>,
        pred: F,
    ) -> TeleopEvent {
        for _ in 0..32 {
            let ev = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if pred(&ev) {
                return ev;
            }
        }
        panic!("expected event never arrived");
    }

    #[tokio::test]
    async fn connect_to_dead_port_fails_and_stays_disconnected() {
        let (listener, port) = local_listener().await;
        drop(listener);

        let mut link = VehicleLink::new();
        let result = link.connect("127.0.0.1", port).await;

        assert!(matches!(result, Err(LinkError::Connect(_))));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn exhausted_connect_timeout_reports_timeout() {
        let (_listener, port) = local_listener().await;

        let mut link = VehicleLink::with_timeouts(Duration::ZERO, WATCHDOG_TIMEOUT);
        let result = link.connect("127.0.0.1", port).await;

        assert!(matches!(result, Err(LinkError::ConnectTimeout)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_notifies_and_send_writes_exact_payload() {
        let (listener, port) = local_listener().await;

        let mut link = VehicleLink::new();
        let mut events = link.subscribe();
        link.connect("127.0.0.1", port).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let ev = expect_event(&mut events, |e| {
            matches!(e, TeleopEvent::ConnectionChanged(true))
        })
        .await;
        assert!(matches!(ev, TeleopEvent::ConnectionChanged(true)));

        let cmd = WheelCommand {
            throttle: 10.0,
            right_front: 1.5,
            right_rear: -1.5,
            left_front: 2.5,
            left_rear: -2.5,
        };
        link.send(&cmd).await;

        let mut got = vec![0u8; 64];
        let n = server.read(&mut got).await.unwrap();
        assert_eq!(&got[..n], b"10.0,1.5,-1.5,2.5,-2.5;");

        let ev = expect_event(&mut events, |e| matches!(e, TeleopEvent::PacketSent(_))).await;
        match ev {
            TeleopEvent::PacketSent(payload) => assert_eq!(payload, "10.0,1.5,-1.5,2.5,-2.5;"),
            other => panic!("unexpected event {other:?}"),
        }

        link.disconnect().await;
    }

    #[tokio::test]
    async fn telemetry_is_decoded_and_published_despite_leading_garbage() {
        let (listener, port) = local_listener().await;

        let mut link = VehicleLink::new();
        let mut events = link.subscribe();
        link.connect("127.0.0.1", port).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let mut bytes = vec![0xAA, 0xBB, 0xCC];
        bytes.extend(frame_bytes([1.0, 2.0, 3.0, 4.0, 5.0], 9));
        server.write_all(&bytes).await.unwrap();

        let ev = expect_event(&mut events, |e| matches!(e, TeleopEvent::Telemetry { .. })).await;
        match ev {
            TeleopEvent::Telemetry { frame, .. } => {
                assert!((frame.values[0] - 1.0).abs() < 0.01);
                assert!((frame.values[4] - 5.0).abs() < 0.01);
                assert_eq!(frame.error_code, 9);
            }
            other => panic!("unexpected event {other:?}"),
        }

        link.disconnect().await;
    }

    #[tokio::test]
    async fn remote_close_disconnects_on_next_tick() {
        let (listener, port) = local_listener().await;

        let mut link = VehicleLink::new();
        let mut events = link.subscribe();
        link.connect("127.0.0.1", port).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        drop(server);

        // Give the receive loop a moment to observe the close
        for _ in 0..50 {
            link.check_watchdog().await;
            if !link.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!link.is_connected());

        expect_event(&mut events, |e| {
            matches!(e, TeleopEvent::ConnectionChanged(false))
        })
        .await;
    }

    #[tokio::test]
    async fn silent_remote_trips_watchdog_exactly_once() {
        let (listener, port) = local_listener().await;

        let mut link = VehicleLink::with_timeouts(CONNECT_TIMEOUT, Duration::from_millis(50));
        let mut events = link.subscribe();
        link.connect("127.0.0.1", port).await.unwrap();
        // Server accepts but never sends a byte
        let (_server, _) = listener.accept().await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        link.check_watchdog().await;
        assert!(!link.is_connected());

        // Further ticks must not emit another transition
        link.check_watchdog().await;
        link.disconnect().await;

        let mut down_events = 0;
        while let Ok(ev) = events.try_recv() {
            if matches!(ev, TeleopEvent::ConnectionChanged(false)) {
                down_events += 1;
            }
        }
        assert_eq!(down_events, 1);
    }

    #[tokio::test]
    async fn incoming_bytes_feed_the_watchdog() {
        let (listener, port) = local_listener().await;

        let mut link = VehicleLink::with_timeouts(CONNECT_TIMEOUT, Duration::from_millis(100));
        link.connect("127.0.0.1", port).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        // Trickle bytes faster than the watchdog timeout
        for _ in 0..5 {
            server.write_all(&[0xFE]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
            link.check_watchdog().await;
            assert!(link.is_connected());
        }

        link.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut link = VehicleLink::new();
        let mut events = link.subscribe();

        link.disconnect().await;
        link.disconnect().await;

        assert!(events.try_recv().is_err());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }
}
