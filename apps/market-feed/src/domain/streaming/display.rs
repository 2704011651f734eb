//! Display Formatting
//!
//! String transformations applied to feed data before it reaches a
//! status board: price and change labels, compact volume, and large-move
//! alerts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::PriceUpdate;
use crate::domain::subscription::Symbol;

/// Default absolute percent move that raises a price alert.
pub const DEFAULT_ALERT_THRESHOLD_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

const THOUSAND: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
const MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Direction of a price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    /// Non-negative change.
    Up,
    /// Negative change.
    Down,
}

impl PriceDirection {
    /// Direction of a signed change; zero counts as up.
    #[must_use]
    pub fn of(change: Decimal) -> Self {
        if change.is_sign_negative() && !change.is_zero() {
            Self::Down
        } else {
            Self::Up
        }
    }

    /// Arrow glyph for change labels.
    #[must_use]
    pub const fn arrow(&self) -> &'static str {
        match self {
            Self::Up => "▲",
            Self::Down => "▼",
        }
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn round1(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Format a price as `$123.45`.
#[must_use]
pub fn format_price(price: Decimal) -> String {
    format!("${:.2}", round2(price))
}

/// Format a change as `▲ $1.23 (0.95%)`.
#[must_use]
pub fn format_change(change: Decimal, change_percent: Decimal) -> String {
    let direction = PriceDirection::of(change);
    format!(
        "{} ${:.2} ({:.2}%)",
        direction.arrow(),
        round2(change.abs()),
        round2(change_percent)
    )
}

/// Format a volume compactly: `1.5M`, `2.3K`, or the plain number.
#[must_use]
pub fn format_volume(volume: Decimal) -> String {
    if volume >= MILLION {
        format!("{:.1}M", round1(volume / MILLION))
    } else if volume >= THOUSAND {
        format!("{:.1}K", round1(volume / THOUSAND))
    } else {
        volume.normalize().to_string()
    }
}

// =============================================================================
// Price Alerts
// =============================================================================

/// A large price move worth surfacing to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceAlert {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Price after the move.
    pub price: Decimal,
    /// Percent change that triggered the alert.
    pub change_percent: Decimal,
    /// Direction of the move.
    pub direction: PriceDirection,
}

impl PriceAlert {
    /// Raise an alert when `|change_percent|` is strictly above `threshold`.
    #[must_use]
    pub fn detect(update: &PriceUpdate, threshold: Decimal) -> Option<Self> {
        if update.change_percent.abs() <= threshold {
            return None;
        }

        let direction = if update.change_percent > Decimal::ZERO {
            PriceDirection::Up
        } else {
            PriceDirection::Down
        };

        Some(Self {
            symbol: update.symbol.clone(),
            price: update.price,
            change_percent: update.change_percent,
            direction,
        })
    }

    /// Alert headline, e.g. `📈 AAPL`.
    #[must_use]
    pub fn title(&self) -> String {
        let icon = match self.direction {
            PriceDirection::Up => "📈",
            PriceDirection::Down => "📉",
        };
        format!("{icon} {}", self.symbol)
    }

    /// Alert body, e.g. `Price moved 6.20% to $123.45`.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Price moved {:.2}% to {}",
            round2(self.change_percent),
            format_price(self.price)
        )
    }
}
