use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Reconnection attempts exhausted after {0} tries")]
    ReconnectExhausted(usize),
}

pub type Result<T> = std::result::Result<T, WsError>;
