use crate::market::Symbol;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetPrice {
    pub id: u64,
    pub price: f64,
    pub kind: TargetKind,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl TargetPrice {
    pub fn is_reached(&self, price: f64) -> bool {
        match self.kind {
            TargetKind::Above => price >= self.price,
            TargetKind::Below => price <= self.price,
        }
    }
}

/// Target price for a percentage offset from `current`: up for `Above`,
/// down for `Below`.
pub fn target_from_percent(current: f64, percent: f64, kind: TargetKind) -> f64 {
    match kind {
        TargetKind::Above => current * (1.0 + percent / 100.0),
        TargetKind::Below => current * (1.0 - percent / 100.0),
    }
}

/// Per-symbol price targets. Reached targets fire once and go inactive.
#[derive(Debug)]
pub struct TargetBook {
    targets: HashMap<Symbol, Vec<TargetPrice>>,
    next_id: u64,
}

impl Default for TargetBook {
    fn default() -> Self {
        Self {
            targets: HashMap::new(),
            next_id: 1,
        }
    }
}

impl TargetBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, symbol: &Symbol, price: f64, kind: TargetKind) -> TargetPrice {
        let target = TargetPrice {
            id: self.next_id,
            price,
            kind,
            active: true,
            created_at: Utc::now(),
        };
        self.next_id += 1;
        self.targets
            .entry(symbol.clone())
            .or_default()
            .push(target.clone());
        target
    }

    /// Move or re-arm an existing target. Returns false if it does not exist.
    pub fn update(&mut self, symbol: &Symbol, id: u64, price: f64, kind: TargetKind) -> bool {
        match self.find_mut(symbol, id) {
            Some(target) => {
                target.price = price;
                target.kind = kind;
                target.active = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, symbol: &Symbol, id: u64) -> bool {
        let Some(list) = self.targets.get_mut(symbol) else {
            return false;
        };
        let before = list.len();
        list.retain(|t| t.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.targets.remove(symbol);
        }
        removed
    }

    /// Flip a target's active flag. Returns the new state.
    pub fn toggle(&mut self, symbol: &Symbol, id: u64) -> Option<bool> {
        self.find_mut(symbol, id).map(|target| {
            target.active = !target.active;
            target.active
        })
    }

    pub fn for_symbol(&self, symbol: &Symbol) -> &[TargetPrice] {
        self.targets.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Active targets reached by `price`; each is deactivated before return.
    pub fn check(&mut self, symbol: &Symbol, price: f64) -> Vec<TargetPrice> {
        let Some(list) = self.targets.get_mut(symbol) else {
            return Vec::new();
        };
        let mut reached = Vec::new();
        for target in list.iter_mut().filter(|t| t.active && t.is_reached(price)) {
            target.active = false;
            reached.push(target.clone());
        }
        reached
    }

    fn find_mut(&mut self, symbol: &Symbol, id: u64) -> Option<&mut TargetPrice> {
        self.targets
            .get_mut(symbol)
            .and_then(|list| list.iter_mut().find(|t| t.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_targets_fire_once() {
        let btc = Symbol::new("btcusdt");
        let mut book = TargetBook::new();
        let above = book.add(&btc, 110.0, TargetKind::Above);
        book.add(&btc, 90.0, TargetKind::Below);

        assert!(book.check(&btc, 100.0).is_empty());

        let hit = book.check(&btc, 110.0);
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, above.id);
        assert!(book.check(&btc, 120.0).is_empty());

        assert_eq!(book.check(&btc, 89.0).len(), 1);
    }

    #[test]
    fn toggle_update_remove() {
        let eth = Symbol::new("ethusdt");
        let mut book = TargetBook::new();
        let target = book.add(&eth, 2000.0, TargetKind::Above);

        assert_eq!(book.toggle(&eth, target.id), Some(false));
        assert!(book.check(&eth, 2500.0).is_empty());

        assert!(book.update(&eth, target.id, 2600.0, TargetKind::Above));
        assert!(book.check(&eth, 2500.0).is_empty());
        assert_eq!(book.check(&eth, 2600.0).len(), 1);

        assert!(book.remove(&eth, target.id));
        assert!(!book.remove(&eth, target.id));
        assert!(book.for_symbol(&eth).is_empty());
        assert_eq!(book.toggle(&eth, target.id), None);
    }

    #[test]
    fn percentage_targets() {
        assert!((target_from_percent(100.0, 5.0, TargetKind::Above) - 105.0).abs() < 1e-9);
        assert!((target_from_percent(100.0, 2.0, TargetKind::Below) - 98.0).abs() < 1e-9);
    }
}
