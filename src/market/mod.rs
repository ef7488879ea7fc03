pub mod alerts;
pub mod prices;
pub mod targets;
pub mod ticks;

use std::borrow::Borrow;
use std::fmt;

/// Canonical lower-case identifier of a tradeable pair, e.g. `btcusdt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Self {
        Symbol(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange-style spelling (`BTCUSDT`) for display.
    pub fn display_name(&self) -> String {
        self.0.to_uppercase()
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Symbol::new(raw)
    }
}

impl From<String> for Symbol {
    fn from(raw: String) -> Self {
        Symbol::new(&raw)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_case_normalized() {
        assert_eq!(Symbol::new(" BTCUSDT "), Symbol::new("btcusdt"));
        assert_eq!(Symbol::from("EthUsdt").as_str(), "ethusdt");
        assert_eq!(Symbol::new("solusdt").display_name(), "SOLUSDT");
    }
}
