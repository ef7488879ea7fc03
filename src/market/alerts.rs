use crate::market::prices::PriceRecord;
use crate::market::Symbol;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};

pub const ALERT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationMethods {
    pub visual: bool,
    pub sound: bool,
}

/// User-editable alert settings, held in memory for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Minimum absolute percentage move that raises an alert (inclusive)
    pub threshold_percent: f64,
    pub enabled_symbols: BTreeSet<Symbol>,
    pub methods: NotificationMethods,
}

impl AlertConfig {
    pub fn is_enabled(&self, symbol: &Symbol) -> bool {
        self.enabled_symbols.contains(symbol)
    }

    pub fn set_threshold(&mut self, threshold_percent: f64) {
        self.threshold_percent = threshold_percent;
    }

    /// Returns true if the symbol set changed.
    pub fn add_symbol(&mut self, symbol: &str) -> bool {
        self.enabled_symbols.insert(Symbol::new(symbol))
    }

    /// Returns true if the symbol set changed.
    pub fn remove_symbol(&mut self, symbol: &str) -> bool {
        self.enabled_symbols.remove(&Symbol::new(symbol))
    }

    pub fn set_methods(&mut self, methods: NotificationMethods) {
        self.methods = methods;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: u64,
    pub symbol: Symbol,
    pub previous_price: f64,
    pub current_price: f64,
    pub change_percent: f64,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// Whether `record` qualifies for an alert under `config`.
///
/// Needs a comparable previous price, an enabled symbol, and an absolute
/// move at or above the threshold.
pub fn crosses_threshold(record: &PriceRecord, config: &AlertConfig) -> bool {
    match record.previous_price {
        Some(prev) if prev != 0.0 => {
            config.is_enabled(&record.symbol)
                && record.change_percent.abs() >= config.threshold_percent
        }
        _ => false,
    }
}

/// Evaluates price records and keeps the newest-first alert history.
///
/// Every qualifying record yields its own alert; there is no cooldown.
#[derive(Debug)]
pub struct AlertEngine {
    history: VecDeque<AlertRecord>,
    capacity: usize,
    next_id: u64,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::with_capacity(ALERT_HISTORY_LIMIT)
    }
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            next_id: 1,
        }
    }

    pub fn evaluate(&mut self, record: &PriceRecord, config: &AlertConfig) -> Option<AlertRecord> {
        if !crosses_threshold(record, config) {
            return None;
        }
        let previous_price = record.previous_price?;
        Some(self.record(
            record.symbol.clone(),
            previous_price,
            record.price,
            record.change_percent,
        ))
    }

    /// Insert a new alert at the front, evicting the oldest past capacity.
    pub fn record(
        &mut self,
        symbol: Symbol,
        previous_price: f64,
        current_price: f64,
        change_percent: f64,
    ) -> AlertRecord {
        let alert = AlertRecord {
            id: self.next_id,
            symbol,
            previous_price,
            current_price,
            change_percent,
            timestamp: Utc::now(),
            read: false,
        };
        self.next_id += 1;

        self.history.push_front(alert.clone());
        self.history.truncate(self.capacity);
        alert
    }

    /// Newest first.
    pub fn list(&self) -> impl Iterator<Item = &AlertRecord> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.history.iter().filter(|a| !a.read).count()
    }

    /// Returns false if no alert with `id` is retained.
    pub fn mark_read(&mut self, id: u64) -> bool {
        match self.history.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        self.history.iter_mut().for_each(|a| a.read = true);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::prices::PriceStore;
    use crate::market::ticks::PriceTick;

    fn config(threshold: f64, symbols: &[&str]) -> AlertConfig {
        AlertConfig {
            threshold_percent: threshold,
            enabled_symbols: symbols.iter().map(|s| Symbol::new(s)).collect(),
            methods: NotificationMethods {
                visual: true,
                sound: false,
            },
        }
    }

    fn run(prices: &[f64], cfg: &AlertConfig) -> Vec<AlertRecord> {
        let mut store = PriceStore::new();
        let mut engine = AlertEngine::new();
        prices
            .iter()
            .filter_map(|&p| {
                let record = store.apply_tick(&PriceTick::new("btcusdt", p));
                engine.evaluate(&record, cfg)
            })
            .collect()
    }

    #[test]
    fn three_percent_move_alerts_once() {
        let alerts = run(&[100.0, 103.0], &config(2.0, &["btcusdt"]));
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].change_percent - 3.0).abs() < 1e-9);
        assert_eq!(alerts[0].previous_price, 100.0);
        assert_eq!(alerts[0].current_price, 103.0);
        assert!(!alerts[0].read);
    }

    #[test]
    fn one_percent_move_is_below_threshold() {
        assert!(run(&[100.0, 101.0], &config(2.0, &["btcusdt"])).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(run(&[100.0, 98.0], &config(2.0, &["btcusdt"])).len(), 1);
    }

    #[test]
    fn first_tick_never_alerts() {
        let mut store = PriceStore::new();
        let mut engine = AlertEngine::new();
        let record = store.apply_tick(&PriceTick::new("btcusdt", 100.0));
        assert!(engine.evaluate(&record, &config(0.0, &["btcusdt"])).is_none());
    }

    #[test]
    fn disabled_symbols_do_not_alert() {
        assert!(run(&[100.0, 150.0], &config(2.0, &["ethusdt"])).is_empty());
    }

    #[test]
    fn repeated_crossings_each_alert() {
        let alerts = run(&[100.0, 105.0, 100.0, 105.0], &config(2.0, &["btcusdt"]));
        assert_eq!(alerts.len(), 3);
    }

    #[test]
    fn lower_threshold_never_yields_fewer_alerts() {
        let prices = [100.0, 101.5, 99.0, 99.5, 104.0, 103.9, 98.0, 98.0, 110.0];
        let mut previous = usize::MAX;
        for threshold in [0.0, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 50.0] {
            let count = run(&prices, &config(threshold, &["btcusdt"])).len();
            assert!(count <= previous, "threshold {threshold} gave {count} > {previous}");
            previous = count;
        }
    }

    #[test]
    fn history_keeps_the_newest_fifty() {
        let mut engine = AlertEngine::new();
        for i in 0..60 {
            engine.record(Symbol::new("btcusdt"), 100.0, 100.0 + i as f64, i as f64);
            assert!(engine.len() <= ALERT_HISTORY_LIMIT);
        }

        let ids: Vec<u64> = engine.list().map(|a| a.id).collect();
        let expected: Vec<u64> = (11..=60).rev().collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn read_flags() {
        let mut engine = AlertEngine::new();
        let first = engine.record(Symbol::new("btcusdt"), 1.0, 2.0, 100.0);
        engine.record(Symbol::new("ethusdt"), 1.0, 2.0, 100.0);
        assert_eq!(engine.unread_count(), 2);

        assert!(engine.mark_read(first.id));
        assert!(!engine.mark_read(999));
        assert_eq!(engine.unread_count(), 1);

        engine.mark_all_read();
        assert_eq!(engine.unread_count(), 0);

        engine.clear();
        assert!(engine.is_empty());
    }

    #[test]
    fn settings_report_symbol_changes() {
        let mut cfg = config(2.0, &["btcusdt"]);
        assert!(cfg.add_symbol("ETHUSDT"));
        assert!(!cfg.add_symbol("ethusdt"));
        assert!(cfg.remove_symbol("BTCUSDT"));
        assert!(!cfg.remove_symbol("btcusdt"));
        assert!(cfg.is_enabled(&Symbol::new("ethusdt")));
    }
}
