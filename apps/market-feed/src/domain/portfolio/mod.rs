//! Portfolio Valuation
//!
//! Running market value and gain/loss for a set of positions. Positions
//! are revalued as live price updates arrive; totals are recomputed on
//! every change.
//!
//! All arithmetic is checked. A change whose valuation overflows is
//! rejected with [`PortfolioError::Overflow`] and the last good valuation
//! is kept. Percentages that cannot be represented fall back to zero.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::streaming::PriceUpdate;
use crate::domain::subscription::Symbol;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Portfolio valuation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortfolioError {
    /// The valuation does not fit in a `Decimal`.
    #[error("valuation of {symbol} overflowed")]
    Overflow {
        /// Symbol whose change was rejected.
        symbol: Symbol,
    },
}

/// `delta / base` in percent, or zero when `base` is zero or the result
/// does not fit.
fn percent_of(delta: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    delta
        .checked_div(base)
        .and_then(|ratio| ratio.checked_mul(HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// A single holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Shares held.
    pub shares: Decimal,
    /// Last known price.
    pub current_price: Decimal,
    /// Average cost per share.
    pub avg_cost: Decimal,
    /// `shares * current_price`.
    pub market_value: Decimal,
    /// `shares * avg_cost`.
    pub cost_basis: Decimal,
    /// `(current_price - avg_cost) * shares`.
    pub gain_loss: Decimal,
    /// Gain/loss relative to average cost, in percent. Zero when the
    /// average cost is zero.
    pub gain_loss_percent: Decimal,
}

impl Position {
    /// Value a holding at `current_price`.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if market value, cost basis or
    /// gain/loss does not fit in a `Decimal`.
    pub fn new(
        symbol: impl Into<Symbol>,
        shares: Decimal,
        current_price: Decimal,
        avg_cost: Decimal,
    ) -> Result<Self, PortfolioError> {
        let symbol = symbol.into();
        let overflow = || PortfolioError::Overflow {
            symbol: symbol.clone(),
        };

        let market_value = shares.checked_mul(current_price).ok_or_else(overflow)?;
        let cost_basis = shares.checked_mul(avg_cost).ok_or_else(overflow)?;
        let price_delta = current_price.checked_sub(avg_cost).ok_or_else(overflow)?;
        let gain_loss = price_delta.checked_mul(shares).ok_or_else(overflow)?;

        Ok(Self {
            gain_loss_percent: percent_of(price_delta, avg_cost),
            symbol,
            shares,
            current_price,
            avg_cost,
            market_value,
            cost_basis,
            gain_loss,
        })
    }

    /// Revalue at a new price.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if the new valuation does not
    /// fit.
    pub fn repriced(&self, price: Decimal) -> Result<Self, PortfolioError> {
        Self::new(self.symbol.clone(), self.shares, price, self.avg_cost)
    }
}

/// Aggregate figures across all positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioTotals {
    /// Sum of market values.
    pub total_value: Decimal,
    /// Sum of cost bases.
    pub total_cost: Decimal,
    /// `total_value - total_cost`.
    pub total_gain_loss: Decimal,
    /// Gain/loss relative to total cost, in percent. Zero when there is no
    /// cost basis.
    pub total_gain_loss_percent: Decimal,
}

impl PortfolioTotals {
    fn of<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Self> {
        let (total_value, total_cost) = positions.into_iter().try_fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(value, cost), p| {
                Some((
                    value.checked_add(p.market_value)?,
                    cost.checked_add(p.cost_basis)?,
                ))
            },
        )?;

        let total_gain_loss = total_value.checked_sub(total_cost)?;
        let total_gain_loss_percent = if total_cost > Decimal::ZERO {
            percent_of(total_gain_loss, total_cost)
        } else {
            Decimal::ZERO
        };

        Some(Self {
            total_value,
            total_cost,
            total_gain_loss,
            total_gain_loss_percent,
        })
    }
}

/// Portfolio calculator keyed by symbol.
///
/// # Example
///
/// ```rust
/// use market_feed::domain::portfolio::PortfolioCalculator;
/// use rust_decimal::Decimal;
///
/// let mut portfolio = PortfolioCalculator::new();
/// portfolio
///     .update_position("AAPL", Decimal::from(10), Decimal::from(110), Decimal::from(100))
///     .unwrap();
///
/// let totals = portfolio.totals();
/// assert_eq!(totals.total_value, Decimal::from(1100));
/// assert_eq!(totals.total_gain_loss, Decimal::from(100));
/// assert_eq!(totals.total_gain_loss_percent, Decimal::from(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PortfolioCalculator {
    positions: BTreeMap<Symbol, Position>,
    totals: PortfolioTotals,
}

impl PortfolioCalculator {
    /// Create an empty portfolio.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a position and recompute totals.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if the position or the new
    /// totals do not fit. The portfolio is left unchanged.
    pub fn update_position(
        &mut self,
        symbol: impl Into<Symbol>,
        shares: Decimal,
        current_price: Decimal,
        avg_cost: Decimal,
    ) -> Result<&Position, PortfolioError> {
        let position = Position::new(symbol, shares, current_price, avg_cost)?;
        let symbol = position.symbol.clone();
        self.commit(position)?;
        Ok(&self.positions[&symbol])
    }

    /// Revalue a held symbol at a new price.
    ///
    /// Returns `Ok(false)` when the symbol is not held.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if the new valuation does not
    /// fit. The last good valuation is kept.
    pub fn apply_price(&mut self, symbol: &str, price: Decimal) -> Result<bool, PortfolioError> {
        let Some(position) = self.positions.get(symbol) else {
            return Ok(false);
        };
        let repriced = position.repriced(price)?;
        self.commit(repriced)?;
        Ok(true)
    }

    /// Revalue from a live price update.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_price`].
    pub fn apply_update(&mut self, update: &PriceUpdate) -> Result<bool, PortfolioError> {
        self.apply_price(&update.symbol, update.price)
    }

    /// Drop a position.
    ///
    /// If the remaining positions' totals overflow (only possible with
    /// mixed long and short holdings) the previous totals are kept.
    pub fn remove_position(&mut self, symbol: &str) -> Option<Position> {
        let removed = self.positions.remove(symbol)?;
        match PortfolioTotals::of(self.positions.values()) {
            Some(totals) => self.totals = totals,
            None => tracing::warn!(symbol, "Portfolio totals overflowed, keeping previous"),
        }
        Some(removed)
    }

    /// Look up a position.
    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// All positions, ordered by symbol.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Current totals.
    #[must_use]
    pub const fn totals(&self) -> PortfolioTotals {
        self.totals
    }

    /// Store `position` only if the resulting totals fit.
    fn commit(&mut self, position: Position) -> Result<(), PortfolioError> {
        let others = self
            .positions
            .values()
            .filter(|p| p.symbol != position.symbol);
        let Some(totals) = PortfolioTotals::of(others.chain(std::iter::once(&position))) else {
            return Err(PortfolioError::Overflow {
                symbol: position.symbol,
            });
        };

        self.positions.insert(position.symbol.clone(), position);
        self.totals = totals;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
