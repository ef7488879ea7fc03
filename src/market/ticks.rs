use crate::api::binance::ws::StreamMessage;
use crate::market::Symbol;
use crate::error::{CryptoWatchError, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::warn;

/// One inbound price update for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: f64,
    pub event_time: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: impl Into<Symbol>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            event_time: Utc::now(),
        }
    }
}

/// Parse a string-encoded decimal price from the wire.
pub fn parse_price(raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
        _ => Err(CryptoWatchError::InvalidPrice(raw.to_string())),
    }
}

/// Turn a combined-stream frame into a tick.
///
/// Frames without both a symbol and a current price are ignored. A price
/// that does not parse drops the frame with a warning.
pub fn normalize(message: &StreamMessage) -> Option<PriceTick> {
    let data = message.data.as_ref()?;
    let (symbol, raw_price) = match (&data.symbol, &data.close_price) {
        (Some(symbol), Some(price)) if !symbol.trim().is_empty() => (symbol, price),
        _ => return None,
    };

    let price = match parse_price(raw_price) {
        Ok(price) => price,
        Err(e) => {
            warn!("Dropping tick for {}: {}", symbol, e);
            return None;
        }
    };

    let event_time = data
        .event_time
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    Some(PriceTick {
        symbol: Symbol::new(symbol),
        price,
        event_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: &str) -> StreamMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ticker_frame_becomes_tick() {
        let msg = message(
            r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","E":1700000000000,
                "s":"BTCUSDT","c":"37123.45","o":"36000.00","h":"37500.00","l":"35900.00",
                "v":"1234.5","q":"45678901.2"}}"#,
        );
        let tick = normalize(&msg).unwrap();
        assert_eq!(tick.symbol.as_str(), "btcusdt");
        assert!((tick.price - 37123.45).abs() < 1e-9);
        assert_eq!(tick.event_time.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn frames_missing_symbol_or_price_are_ignored() {
        assert!(normalize(&message(r#"{"result":null,"id":1}"#)).is_none());
        assert!(normalize(&message(r#"{"stream":"x","data":{"s":"BTCUSDT"}}"#)).is_none());
        assert!(normalize(&message(r#"{"stream":"x","data":{"c":"1.0"}}"#)).is_none());
    }

    #[test]
    fn unparsable_price_is_dropped() {
        let msg = message(r#"{"stream":"x","data":{"s":"BTCUSDT","c":"not-a-price"}}"#);
        assert!(normalize(&msg).is_none());
        assert!(parse_price("NaN").is_err());
        assert!(parse_price("-1").is_err());
    }

    #[test]
    fn missing_event_time_falls_back_to_now() {
        let before = Utc::now();
        let tick = normalize(&message(r#"{"data":{"s":"ethusdt","c":"2000"}}"#)).unwrap();
        assert!(tick.event_time >= before);
    }
}
