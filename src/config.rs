use crate::market::alerts::{AlertConfig, NotificationMethods};
use crate::market::Symbol;
use crate::error::{CryptoWatchError, Result};
use crate::feed::backoff::BackoffPolicy;
use std::collections::BTreeSet;
use std::env;

pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443";
pub const BINANCE_REST_URL: &str = "https://api.binance.com";

pub const DEFAULT_SYMBOLS: [&str; 5] = ["btcusdt", "ethusdt", "adausdt", "dogeusdt", "solusdt"];

/// Process-wide settings for a monitoring session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the combined-stream endpoint (no trailing `/stream`)
    pub ws_base_url: String,
    /// Base URL of the REST metadata endpoint
    pub rest_base_url: String,
    pub backoff: BackoffPolicy,
    pub alerts: AlertConfig,
    /// Capacity of the consumer-facing event channel
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_base_url: BINANCE_WS_URL.to_string(),
            rest_base_url: BINANCE_REST_URL.to_string(),
            backoff: BackoffPolicy::default(),
            alerts: AlertConfig {
                threshold_percent: 2.0,
                enabled_symbols: DEFAULT_SYMBOLS.iter().map(|s| Symbol::new(s)).collect(),
                methods: NotificationMethods {
                    visual: true,
                    sound: false,
                },
            },
            event_buffer: 100,
        }
    }
}

impl Config {
    /// Defaults overlaid with `CRYPTOWATCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CRYPTOWATCH_WS_URL") {
            config.ws_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("CRYPTOWATCH_REST_URL") {
            config.rest_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("CRYPTOWATCH_SYMBOLS") {
            let symbols: BTreeSet<Symbol> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Symbol::new)
                .collect();
            if symbols.is_empty() {
                return Err(CryptoWatchError::Config(
                    "CRYPTOWATCH_SYMBOLS lists no symbols".to_string(),
                ));
            }
            config.alerts.enabled_symbols = symbols;
        }
        if let Some(raw) = lookup("CRYPTOWATCH_THRESHOLD") {
            let threshold: f64 = raw.trim().parse().map_err(|_| {
                CryptoWatchError::Config(format!("CRYPTOWATCH_THRESHOLD is not a number: {raw}"))
            })?;
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(CryptoWatchError::Config(format!(
                    "CRYPTOWATCH_THRESHOLD must be a non-negative percentage: {raw}"
                )));
            }
            config.alerts.threshold_percent = threshold;
        }
        if let Some(raw) = lookup("CRYPTOWATCH_SOUND") {
            config.alerts.methods.sound = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(CryptoWatchError::Config(format!(
                        "CRYPTOWATCH_SOUND is not a boolean: {raw}"
                    )))
                }
            };
        }

        Ok(config)
    }
}
