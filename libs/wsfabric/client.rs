//! WebSocket connection runtime
//!
//! One receive task per connection. The task owns the socket, answers
//! protocol pings, pushes periodic heartbeat frames, and drives the
//! venue-specific `SocketHandler`. All listener fan-out happens
//! synchronously inside `on_frame`; handlers must not block.

use crate::config::WsConfig;
use crate::error::{Result, WsError};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Connection lifecycle: Disconnected -> Connecting -> Connected ->
/// {Reconnecting | Disconnected}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
        }
    }
}

/// Venue-specific protocol glue driven by the connection runtime.
pub trait SocketHandler: Send + 'static {
    /// Frames to send right after the socket opens: auth first, then the
    /// full subscription replay.
    fn on_connect(&mut self) -> Vec<String>;

    /// Process one inbound text frame. Returned frames are written back to
    /// the wire (pong replies, heartbeat echoes).
    fn on_frame(&mut self, text: &str) -> Vec<String>;

    /// Invoked when the connection drops, before any reconnect attempt.
    fn on_disconnect(&mut self) {}
}

/// Handle to a spawned connection task.
pub struct WsHandle {
    outbound_tx: mpsc::UnboundedSender<String>,
    state: Arc<AtomicU8>,
    should_reconnect: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    tag: &'static str,
}

impl WsHandle {
    /// Queue a frame for sending. Frames queued while disconnected are
    /// flushed after the next successful (re)connect.
    pub fn send(&self, frame: String) -> Result<()> {
        self.outbound_tx
            .send(frame)
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Stop reconnecting and close the socket. Idempotent.
    pub async fn disconnect(&mut self) {
        self.should_reconnect.store(false, Ordering::Release);
        // Wake the task so it notices the flag without waiting for traffic.
        let _ = self.outbound_tx.send(String::new());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("[{}] Disconnected", self.tag);
    }

    /// Flag shared with the connection task; storing `false` stops
    /// reconnection after the current connection ends.
    pub fn should_reconnect_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_reconnect)
    }
}

/// Connection runtime entry point.
pub struct WsClient;

impl WsClient {
    /// Spawn the connection task and return its handle.
    pub fn spawn<H: SocketHandler>(tag: &'static str, config: WsConfig, handler: H) -> WsHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8()));
        let should_reconnect = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(run_connection(
            tag,
            config,
            handler,
            outbound_rx,
            Arc::clone(&state),
            Arc::clone(&should_reconnect),
        ));

        WsHandle {
            outbound_tx,
            state,
            should_reconnect,
            task: Some(task),
            tag,
        }
    }
}

async fn run_connection<H: SocketHandler>(
    tag: &'static str,
    config: WsConfig,
    mut handler: H,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    state: Arc<AtomicU8>,
    should_reconnect: Arc<AtomicBool>,
) {
    let mut attempt: usize = 0;

    loop {
        if !should_reconnect.load(Ordering::Acquire) {
            break;
        }

        state.store(
            if attempt == 0 {
                ConnectionState::Connecting.as_u8()
            } else {
                ConnectionState::Reconnecting.as_u8()
            },
            Ordering::Release,
        );

        // First attempt uses the current endpoint; retries rotate.
        let url = if attempt == 0 {
            config.endpoints.current().to_string()
        } else {
            config.endpoints.advance().to_string()
        };

        match connect_async(&url).await {
            Ok((ws_stream, _)) => {
                info!("[{}] Connected to {}", tag, url);
                state.store(ConnectionState::Connected.as_u8(), Ordering::Release);
                attempt = 0;

                let result = drive_socket(
                    tag,
                    ws_stream,
                    &config,
                    &mut handler,
                    &mut outbound_rx,
                    &should_reconnect,
                )
                .await;

                state.store(ConnectionState::Disconnected.as_u8(), Ordering::Release);
                handler.on_disconnect();

                match result {
                    Ok(()) => debug!("[{}] Connection closed cleanly", tag),
                    Err(e) => warn!("[{}] Connection error: {}", tag, e),
                }
            }
            Err(e) => {
                error!("[{}] Failed to connect to {}: {}", tag, url, e);
                state.store(ConnectionState::Disconnected.as_u8(), Ordering::Release);
            }
        }

        if !should_reconnect.load(Ordering::Acquire) {
            break;
        }

        attempt += 1;
        let Some(delay) = config.reconnect.delay_for(attempt) else {
            warn!(
                "[{}] Reconnection attempts exhausted ({}), giving up",
                tag, config.reconnect.max_attempts
            );
            break;
        };

        info!("[{}] Reconnecting in {:?} (attempt {})", tag, delay, attempt);
        if !interruptible_sleep(delay, &should_reconnect).await {
            break;
        }
    }

    state.store(ConnectionState::Disconnected.as_u8(), Ordering::Release);
    debug!("[{}] Connection task exiting", tag);
}

/// Sleep for `duration`, waking early when the reconnect flag drops.
/// Returns `false` when interrupted.
async fn interruptible_sleep(duration: Duration, should_reconnect: &Arc<AtomicBool>) -> bool {
    let check = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        if !should_reconnect.load(Ordering::Acquire) {
            return false;
        }
        let step = check.min(duration - elapsed);
        tokio::time::sleep(step).await;
        elapsed += step;
    }
    true
}

async fn drive_socket<H: SocketHandler>(
    tag: &'static str,
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &WsConfig,
    handler: &mut H,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    should_reconnect: &Arc<AtomicBool>,
) -> Result<()> {
    let (mut write, mut read) = ws_stream.split();

    for frame in handler.on_connect() {
        write
            .send(Message::Text(frame))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;
    }

    let mut heartbeat = config
        .heartbeat
        .as_ref()
        .map(|(interval, payload)| (tokio::time::interval(*interval), payload.clone()));
    if let Some((ref mut timer, _)) = heartbeat {
        // The first interval tick fires immediately; skip it.
        timer.tick().await;
    }

    loop {
        if !should_reconnect.load(Ordering::Acquire) {
            let _ = write.close().await;
            return Ok(());
        }

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for reply in handler.on_frame(&text) {
                            write
                                .send(Message::Text(reply))
                                .await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        write
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(WsError::ConnectionClosed("close frame".into()));
                    }
                    Some(Ok(_)) => {
                        // Binary / pong frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        return Err(WsError::WebSocket(e.to_string()));
                    }
                    None => {
                        return Err(WsError::ConnectionClosed("stream ended".into()));
                    }
                }
            }

            frame = outbound_rx.recv() => {
                match frame {
                    // Empty frames are wake-ups from `disconnect`.
                    Some(frame) if frame.is_empty() => continue,
                    Some(frame) => {
                        write
                            .send(Message::Text(frame))
                            .await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    None => {
                        return Err(WsError::ConnectionClosed("handle dropped".into()));
                    }
                }
            }

            payload = async {
                match heartbeat.as_mut() {
                    Some((timer, payload)) => {
                        timer.tick().await;
                        payload.clone()
                    }
                    None => std::future::pending().await,
                }
            } => {
                debug!("[{}] Heartbeat", tag);
                write
                    .send(Message::Text(payload))
                    .await
                    .map_err(|e| WsError::SendFailed(e.to_string()))?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
    }

    #[tokio::test]
    async fn test_interruptible_sleep_runs_to_completion() {
        let flag = Arc::new(AtomicBool::new(true));
        let done = interruptible_sleep(Duration::from_millis(30), &flag).await;
        assert!(done);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_wakes_on_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        let flag_clone = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag_clone.store(false, Ordering::Release);
        });
        let done = interruptible_sleep(Duration::from_secs(10), &flag).await;
        assert!(!done);
    }
}
