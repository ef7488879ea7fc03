use crate::api::binance::rest::{ExchangeInfo, MetadataClient, SymbolStatus, Ticker24h};
use crate::market::Symbol;
use crate::error::{CryptoWatchError, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::{BTreeSet, HashMap};

/// Static metadata plus the latest 24h snapshot for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinInfo {
    pub symbol: Symbol,
    /// `BASE/QUOTE`
    pub name: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: SymbolStatus,
    pub permissions: Vec<String>,
    pub price: Option<f64>,
    pub price_change_percent: Option<f64>,
    pub price_change: Option<f64>,
    pub volume: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Case-insensitive match on symbol, base or quote asset
    pub search: String,
    pub status: Option<SymbolStatus>,
    pub quote_asset: Option<String>,
}

impl CatalogFilter {
    fn matches(&self, coin: &CoinInfo) -> bool {
        let term = self.search.trim().to_lowercase();
        let search_ok = term.is_empty()
            || coin.symbol.as_str().contains(&term)
            || coin.base_asset.to_lowercase().contains(&term)
            || coin.quote_asset.to_lowercase().contains(&term);
        let status_ok = self.status.as_ref().map_or(true, |s| *s == coin.status);
        let quote_ok = self
            .quote_asset
            .as_ref()
            .map_or(true, |q| q.eq_ignore_ascii_case(&coin.quote_asset));
        search_ok && status_ok && quote_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub total: usize,
    pub trading: usize,
    pub with_prices: usize,
}

/// Symbol catalog fed by the metadata endpoint. A failed refresh keeps
/// whatever was loaded before and records the error for a manual retry.
#[derive(Debug, Default)]
pub struct CoinCatalog {
    coins: HashMap<Symbol, CoinInfo>,
    loading: bool,
    error: Option<String>,
}

fn parse_figure(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl CoinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load symbols, then the 24h snapshot.
    pub async fn refresh(&mut self, client: &MetadataClient) -> Result<()> {
        self.loading = true;
        self.error = None;

        let result = async {
            let info = client.exchange_info().await?;
            self.load_symbols(info);
            let tickers = client.ticker_24h().await?;
            self.apply_tickers(&tickers);
            Ok::<(), CryptoWatchError>(())
        }
        .await;

        self.loading = false;
        if let Err(e) = &result {
            warn!("Failed to refresh coin catalog: {}", e);
            self.error = Some(e.to_string());
        }
        result
    }

    /// Reload only the 24h snapshot for symbols already in the catalog.
    pub async fn refresh_prices(&mut self, client: &MetadataClient) -> Result<()> {
        match client.ticker_24h().await {
            Ok(tickers) => {
                self.apply_tickers(&tickers);
                self.error = None;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to refresh 24h prices: {}", e);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Merge `exchangeInfo` symbols. Snapshot figures already loaded survive.
    pub fn load_symbols(&mut self, info: ExchangeInfo) {
        for s in info.symbols {
            let symbol = Symbol::new(&s.symbol);
            let name = format!("{}/{}", s.base_asset, s.quote_asset);
            let coin = self.coins.entry(symbol.clone()).or_insert_with(|| CoinInfo {
                symbol,
                name: String::new(),
                base_asset: String::new(),
                quote_asset: String::new(),
                status: SymbolStatus::Other,
                permissions: Vec::new(),
                price: None,
                price_change_percent: None,
                price_change: None,
                volume: None,
                last_updated: None,
            });
            coin.name = name;
            coin.base_asset = s.base_asset;
            coin.quote_asset = s.quote_asset;
            coin.status = s.status;
            coin.permissions = s.permissions;
        }
        info!("Catalog holds {} symbols", self.coins.len());
    }

    /// Join snapshot figures onto known symbols. Returns how many matched.
    pub fn apply_tickers(&mut self, tickers: &[Ticker24h]) -> usize {
        let now = Utc::now();
        let mut matched = 0;
        for ticker in tickers {
            if let Some(coin) = self.coins.get_mut(ticker.symbol.to_lowercase().as_str()) {
                coin.price = parse_figure(&ticker.last_price);
                coin.price_change_percent = parse_figure(&ticker.price_change_percent);
                coin.price_change = parse_figure(&ticker.price_change);
                coin.volume = parse_figure(&ticker.volume);
                coin.last_updated = Some(now);
                matched += 1;
            }
        }
        matched
    }

    pub fn get(&self, symbol: &str) -> Option<&CoinInfo> {
        self.coins.get(symbol)
    }

    /// Matching coins ordered by symbol.
    pub fn filtered(&self, filter: &CatalogFilter) -> Vec<&CoinInfo> {
        let mut coins: Vec<&CoinInfo> = self.coins.values().filter(|c| filter.matches(c)).collect();
        coins.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        coins
    }

    pub fn quote_assets(&self) -> BTreeSet<&str> {
        self.coins.values().map(|c| c.quote_asset.as_str()).collect()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            total: self.coins.len(),
            trading: self
                .coins
                .values()
                .filter(|c| c.status == SymbolStatus::Trading)
                .count(),
            with_prices: self.coins.values().filter(|c| c.price.is_some()).count(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
