// Error types for the SignalBridge services
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
