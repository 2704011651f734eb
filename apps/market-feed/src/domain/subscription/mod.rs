//! Watchlist Subscription Set
//!
//! Tracks the symbols the caller currently wants subscribed. The set
//! survives reconnects: every time a connection is established the full
//! set is re-sent, so staged changes made while offline take effect then.
//!
//! Symbols are case-sensitive and unique. Insertion order is preserved so
//! the full resend is deterministic.

/// A symbol string (stock ticker).
pub type Symbol = String;

/// Ordered set of desired symbols.
///
/// # Example
///
/// ```rust
/// use market_feed::domain::subscription::SubscriptionSet;
///
/// let mut set = SubscriptionSet::new();
/// assert!(set.insert("AAPL"));
/// assert!(!set.insert("AAPL"));
/// assert!(set.insert("MSFT"));
///
/// assert!(set.remove("AAPL"));
/// assert!(!set.remove("TSLA"));
/// assert_eq!(set.to_vec(), vec!["MSFT".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    symbols: Vec<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }

    /// Add a symbol. Returns `false` if it was already present.
    pub fn insert(&mut self, symbol: impl Into<Symbol>) -> bool {
        let symbol = symbol.into();
        if self.contains(&symbol) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    /// Remove a symbol. Returns `false` if it was not present.
    pub fn remove(&mut self, symbol: &str) -> bool {
        let before = self.symbols.len();
        self.symbols.retain(|s| s != symbol);
        self.symbols.len() != before
    }

    /// Check whether a symbol is in the set.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }

    /// Copy the symbols out in insertion order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Symbol> {
        self.symbols.clone()
    }
}

impl<S: Into<Symbol>> FromIterator<S> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for symbol in iter {
            set.insert(symbol);
        }
        set
    }
}

impl<S: Into<Symbol>> Extend<S> for SubscriptionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for symbol in iter {
            self.insert(symbol);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_is_empty() {
        let set = SubscriptionSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = SubscriptionSet::new();
        assert!(set.insert("AAPL"));
        assert!(!set.insert("AAPL"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn symbols_are_case_sensitive() {
        let mut set = SubscriptionSet::new();
        assert!(set.insert("aapl"));
        assert!(set.insert("AAPL"));
        assert_eq!(set.len(), 2);
        assert!(!set.contains("Aapl"));
    }

    #[test]
    fn remove_unknown_symbol_is_noop() {
        let mut set: SubscriptionSet = ["AAPL"].into_iter().collect();
        assert!(!set.remove("TSLA"));
        assert_eq!(set.to_vec(), vec!["AAPL"]);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut set = SubscriptionSet::new();
        set.extend(["MSFT", "AAPL", "GOOGL", "AAPL"]);
        set.remove("AAPL");
        set.insert("AAPL");

        let symbols: Vec<_> = set.iter().collect();
        assert_eq!(symbols, vec!["MSFT", "GOOGL", "AAPL"]);
    }
}
