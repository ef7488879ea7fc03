use crate::error::{CryptoWatchError, Result};
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

/// Trading status reported by `exchangeInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolStatus {
    Trading,
    Halted,
    Break,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: SymbolStatus,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<serde_json::Value>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Entry of `ticker/24hr`. Figures are string-encoded decimals.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: String,
    pub price_change_percent: String,
    pub price_change: String,
    pub volume: String,
}

/// Request/response client for static symbol metadata.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn exchange_info(&self) -> Result<ExchangeInfo> {
        let info: ExchangeInfo = self.get_json("/api/v3/exchangeInfo").await?;
        info!("Fetched exchange info for {} symbols", info.symbols.len());
        Ok(info)
    }

    pub async fn ticker_24h(&self) -> Result<Vec<Ticker24h>> {
        let tickers: Vec<Ticker24h> = self.get_json("/api/v3/ticker/24hr").await?;
        info!("Fetched 24h tickers for {} symbols", tickers.len());
        Ok(tickers)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CryptoWatchError::HttpStatus { status, body });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
