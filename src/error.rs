use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoWatchError {
    #[error("WebSocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid price {0:?}")]
    InvalidPrice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed task is no longer running")]
    FeedClosed,

    #[error("Notification failed: {0}")]
    Notify(String),
}

pub type Result<T> = std::result::Result<T, CryptoWatchError>;
