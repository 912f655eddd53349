//! Venue-facing market data and order types.

use crate::quantity::BaseQuantity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Direction of an order as submitted to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite side, used when unwinding.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Direction of a held position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position in this direction.
    #[must_use]
    pub const fn entry_order(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    #[must_use]
    pub const fn exit_order(self) -> OrderSide {
        self.entry_order().opposite()
    }

    /// +1 for long, -1 for short; multiplies price moves into PnL.
    #[must_use]
    pub fn pnl_sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => -Decimal::ONE,
        }
    }
}

/// Order type requested from the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// Account snapshot read before every sizing decision.
///
/// Refreshed from the venue per call; never cached across decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    pub used_margin: Decimal,
    pub available_margin: Decimal,
}

impl AccountState {
    #[must_use]
    pub fn new(balance: Decimal, used_margin: Decimal) -> Self {
        Self {
            balance,
            used_margin,
            available_margin: balance - used_margin,
        }
    }
}

/// Per-instrument trading constraints, immutable for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub symbol: String,
    /// Base units represented by one exchange contract.
    pub contract_value: Decimal,
    /// Smallest quantity increment, in base units.
    pub lot_step: Decimal,
    /// Smallest price increment.
    pub price_step: Decimal,
    /// Smallest order size the venue accepts, in base units.
    pub min_size: Decimal,
    pub max_leverage: u8,
}

/// Best book prices plus the venue's published price band.
///
/// Short-lived: valid for a single order-placement attempt.
#[derive(Debug, Clone, Copy)]
pub struct PriceLimits {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub max_buy_price: Decimal,
    pub min_sell_price: Decimal,
    pub as_of: Instant,
}

impl PriceLimits {
    /// True once the snapshot is older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.as_of.elapsed() > max_age
    }

    /// Bid/ask spread as a fraction of the mid price.
    #[must_use]
    pub fn spread_pct(&self) -> Decimal {
        let mid = (self.best_bid + self.best_ask) / Decimal::TWO;
        if mid <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.best_ask - self.best_bid) / mid
    }

    /// Clamps `price` inside the venue band for the given side.
    #[must_use]
    pub fn clamp(&self, side: OrderSide, price: Decimal) -> Decimal {
        match side {
            OrderSide::Buy => price.min(self.max_buy_price),
            OrderSide::Sell => price.max(self.min_sell_price),
        }
    }

    /// True when `price` lies inside the band for the given side.
    #[must_use]
    pub fn contains(&self, side: OrderSide, price: Decimal) -> bool {
        match side {
            OrderSide::Buy => price <= self.max_buy_price,
            OrderSide::Sell => price >= self.min_sell_price,
        }
    }
}

/// A position as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: PositionSide,
    pub size: BaseQuantity,
    pub entry_price: Decimal,
    pub unrealized_pnl: Option<Decimal>,
}

/// An order as handed to the gateway for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: BaseQuantity,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Decimal>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub client_order_id: String,
}

/// Venue-reported lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    #[must_use]
    pub const fn has_fills(self) -> bool {
        matches!(self, Self::PartiallyFilled | Self::Filled)
    }
}

/// Acknowledgement returned by the venue for a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: BaseQuantity,
    pub avg_fill_price: Option<Decimal>,
}

/// Acknowledgement for a bracket (linked take-profit + stop-loss) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgoOrderAck {
    pub algo_order_id: String,
}

/// Result of polling an order's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: BaseQuantity,
    pub avg_fill_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> PriceLimits {
        PriceLimits {
            best_bid: dec!(99.9),
            best_ask: dec!(100.1),
            max_buy_price: dec!(105),
            min_sell_price: dec!(95),
            as_of: Instant::now(),
        }
    }

    #[test]
    fn account_state_derives_available_margin() {
        let account = AccountState::new(dec!(1000), dec!(300));
        assert_eq!(account.available_margin, dec!(700));
    }

    #[test]
    fn position_side_order_mapping() {
        assert_eq!(PositionSide::Long.entry_order(), OrderSide::Buy);
        assert_eq!(PositionSide::Long.exit_order(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.entry_order(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.exit_order(), OrderSide::Buy);
    }

    #[test]
    fn clamp_caps_buy_at_max_buy_price() {
        let limits = limits();
        assert_eq!(limits.clamp(OrderSide::Buy, dec!(110)), dec!(105));
        assert_eq!(limits.clamp(OrderSide::Buy, dec!(100)), dec!(100));
    }

    #[test]
    fn clamp_floors_sell_at_min_sell_price() {
        let limits = limits();
        assert_eq!(limits.clamp(OrderSide::Sell, dec!(90)), dec!(95));
        assert_eq!(limits.clamp(OrderSide::Sell, dec!(98)), dec!(98));
    }

    #[test]
    fn contains_checks_side_specific_bound() {
        let limits = limits();
        assert!(limits.contains(OrderSide::Buy, dec!(105)));
        assert!(!limits.contains(OrderSide::Buy, dec!(105.1)));
        assert!(limits.contains(OrderSide::Sell, dec!(95)));
        assert!(!limits.contains(OrderSide::Sell, dec!(94.9)));
    }

    #[test]
    fn spread_pct_uses_mid_price() {
        let limits = limits();
        // Spread 0.2 on mid 100 = 0.2%
        assert_eq!(limits.spread_pct(), dec!(0.002));
    }

    #[test]
    fn fresh_snapshot_is_not_stale() {
        let limits = limits();
        assert!(!limits.is_stale(Duration::from_secs(1)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }
}
