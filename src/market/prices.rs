use crate::market::ticks::PriceTick;
use crate::market::Symbol;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Latest observed state for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub symbol: Symbol,
    pub price: f64,
    /// Price of the immediately preceding tick; `None` until a second tick arrives
    pub previous_price: Option<f64>,
    pub change_percent: f64,
    pub last_updated: DateTime<Utc>,
}

/// Percentage move from `previous` to `current`. Zero when there is nothing
/// meaningful to compare against.
pub fn change_percent(previous: Option<f64>, current: f64) -> f64 {
    match previous {
        Some(prev) if prev != 0.0 => (current - prev) / prev * 100.0,
        _ => 0.0,
    }
}

#[derive(Debug, Default)]
pub struct PriceStore {
    records: HashMap<Symbol, PriceRecord>,
    last_updated: Option<DateTime<Utc>>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick and return the updated record. Unknown symbols are created.
    pub fn apply_tick(&mut self, tick: &PriceTick) -> PriceRecord {
        let now = Utc::now();
        let record = self.upsert(tick, now);
        self.last_updated = Some(now);
        record
    }

    /// Apply a batch of ticks in order, stamping the store once.
    pub fn apply_many(&mut self, ticks: &[PriceTick]) -> Vec<PriceRecord> {
        let now = Utc::now();
        let records = ticks.iter().map(|tick| self.upsert(tick, now)).collect();
        if !ticks.is_empty() {
            self.last_updated = Some(now);
        }
        records
    }

    fn upsert(&mut self, tick: &PriceTick, now: DateTime<Utc>) -> PriceRecord {
        let previous_price = self.records.get(&tick.symbol).map(|r| r.price);
        let record = PriceRecord {
            symbol: tick.symbol.clone(),
            price: tick.price,
            previous_price,
            change_percent: change_percent(previous_price, tick.price),
            last_updated: now,
        };
        self.records.insert(tick.symbol.clone(), record.clone());
        record
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceRecord> {
        self.records.get(symbol)
    }

    pub fn all(&self) -> impl Iterator<Item = &PriceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.last_updated = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_is_relative_to_the_previous_tick() {
        let mut store = PriceStore::new();
        let changes: Vec<f64> = [100.0, 110.0, 99.0]
            .iter()
            .map(|&p| store.apply_tick(&PriceTick::new("btcusdt", p)).change_percent)
            .collect();

        assert_eq!(changes[0], 0.0);
        assert!((changes[1] - 10.0).abs() < 0.05);
        assert!((changes[2] + 10.0).abs() < 0.05);
    }

    #[test]
    fn first_tick_has_no_previous_price() {
        let mut store = PriceStore::new();
        let first = store.apply_tick(&PriceTick::new("ethusdt", 2000.0));
        assert_eq!(first.previous_price, None);

        let second = store.apply_tick(&PriceTick::new("ethusdt", 2010.0));
        assert_eq!(second.previous_price, Some(2000.0));
    }

    #[test]
    fn one_record_per_symbol() {
        let mut store = PriceStore::new();
        store.apply_tick(&PriceTick::new("BTCUSDT", 1.0));
        store.apply_tick(&PriceTick::new("btcusdt", 2.0));
        store.apply_tick(&PriceTick::new("ethusdt", 3.0));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("btcusdt").unwrap().price, 2.0);
        assert!(store.last_updated().is_some());
    }

    #[test]
    fn zero_previous_price_yields_no_change() {
        assert_eq!(change_percent(Some(0.0), 5.0), 0.0);
        assert_eq!(change_percent(None, 5.0), 0.0);
    }

    #[test]
    fn batch_and_reset() {
        let mut store = PriceStore::new();
        let records = store.apply_many(&[
            PriceTick::new("btcusdt", 100.0),
            PriceTick::new("btcusdt", 105.0),
        ]);
        assert_eq!(records.len(), 2);
        assert!((records[1].change_percent - 5.0).abs() < 1e-9);

        store.reset();
        assert!(store.is_empty());
        assert!(store.last_updated().is_none());
    }
}
