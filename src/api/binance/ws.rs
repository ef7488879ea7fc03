use crate::market::Symbol;
use crate::error::CryptoWatchError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures_util::{future, FutureExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;

/// Envelope of a combined-stream frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub stream: Option<String>,
    pub data: Option<TickerPayload>,
}

/// `<symbol>@ticker` payload. Only `s` and `c` feed the price pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerPayload {
    #[serde(rename = "e")]
    pub event_type: Option<String>,
    #[serde(rename = "E")]
    pub event_time: Option<i64>,
    #[serde(rename = "s")]
    pub symbol: Option<String>,
    #[serde(rename = "c")]
    pub close_price: Option<String>,
    #[serde(rename = "o")]
    pub open_price: Option<String>,
    #[serde(rename = "h")]
    pub high_price: Option<String>,
    #[serde(rename = "l")]
    pub low_price: Option<String>,
    #[serde(rename = "v")]
    pub volume: Option<String>,
    #[serde(rename = "q")]
    pub quote_volume: Option<String>,
}

/// Combined stream URL for `symbols`, e.g.
/// `wss://host/stream?streams=btcusdt@ticker/ethusdt@ticker`.
pub fn stream_url<'a, I>(base_url: &str, symbols: I) -> String
where
    I: IntoIterator<Item = &'a Symbol>,
{
    let streams = symbols
        .into_iter()
        .map(|s| format!("{}@ticker", s.as_str()))
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/stream?streams={}", base_url.trim_end_matches('/'), streams)
}

/// Text frames of one streaming session. The stream ends when the peer
/// closes; an `Err` item is a transport failure.
pub type FrameStream = BoxStream<'static, Result<String, CryptoWatchError>>;

/// Opens streaming sessions. The feed manager owns at most one at a time.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: String) -> BoxFuture<'static, Result<FrameStream, CryptoWatchError>>;
}

/// Connector backed by a real WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: String) -> BoxFuture<'static, Result<FrameStream, CryptoWatchError>> {
        async move {
            info!("Connecting to Binance WebSocket: {}", url);
            let (ws_stream, _) = connect_async(&url).await?;
            info!("Successfully connected to WebSocket");

            let frames = ws_stream
                .take_while(|message| {
                    let open = !matches!(message, Ok(tungstenite::protocol::Message::Close(_)));
                    if !open {
                        info!("WebSocket connection closed by peer");
                    }
                    future::ready(open)
                })
                .filter_map(|message| {
                    future::ready(match message {
                        Ok(tungstenite::protocol::Message::Text(text)) => Some(Ok(text)),
                        Ok(tungstenite::protocol::Message::Binary(bytes)) => {
                            match String::from_utf8(bytes) {
                                Ok(text) => Some(Ok(text)),
                                Err(e) => {
                                    warn!("Dropping non-UTF-8 binary frame: {}", e);
                                    None
                                }
                            }
                        }
                        Ok(other) => {
                            debug!("Ignoring control frame: {:?}", other);
                            None
                        }
                        Err(e) => Some(Err(CryptoWatchError::from(e))),
                    })
                })
                .boxed();

            Ok(frames)
        }
        .boxed()
    }
}
