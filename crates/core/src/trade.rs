//! Sized orders, tracked positions, and terminal trade records.

use crate::market::PositionSide;
use crate::quantity::BaseQuantity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output of the sizing pipeline, consumed immediately by the order router.
///
/// `quantity` is always in base-asset units, never contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: BaseQuantity,
    pub notional_usd: Decimal,
    pub margin_usd: Decimal,
    pub leverage: u8,
    /// Absolute stop-loss price for the bracket order.
    pub stop_loss: Decimal,
    /// Absolute take-profit price for the bracket order.
    pub take_profit: Decimal,
}

/// An open position tracked by the monitor.
///
/// Owned exclusively by the position monitor from fill confirmation until
/// closure; no other component mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub size: BaseQuantity,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
    /// Venue id of the linked bracket/OCO order, if one was placed.
    pub linked_exit_order_id: Option<String>,
}

impl Position {
    /// Unrealized PnL at the given mark price, before commission.
    #[must_use]
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        (mark_price - self.entry_price) * self.size.value() * self.side.pnl_sign()
    }

    /// Seconds the position has been open as of `now`.
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_seconds()
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    ProfitHarvest,
    TimeLimit,
    Manual,
}

impl ExitReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::ProfitHarvest => "profit_harvest",
            Self::TimeLimit => "time_limit",
            Self::Manual => "manual",
        }
    }
}

/// Terminal record emitted exactly once per closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: BaseQuantity,
    pub gross_pnl: Decimal,
    pub commission: Decimal,
    pub net_pnl: Decimal,
    pub duration_secs: i64,
    pub reason: ExitReason,
}

impl TradeResult {
    /// Assembles a trade record from entry/exit fills.
    ///
    /// `gross = (exit - entry) x size x direction`;
    /// `commission = (entry + exit) x size x fee_rate`.
    #[must_use]
    pub fn from_fills(
        position: &Position,
        exit_price: Decimal,
        size: BaseQuantity,
        fee_rate: Decimal,
        closed_at: DateTime<Utc>,
        reason: ExitReason,
    ) -> Self {
        let gross_pnl =
            (exit_price - position.entry_price) * size.value() * position.side.pnl_sign();
        let commission = (position.entry_price + exit_price) * size.value() * fee_rate;
        Self {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size,
            gross_pnl,
            commission,
            net_pnl: gross_pnl - commission,
            duration_secs: position.age_secs(closed_at),
            reason,
        }
    }

    #[must_use]
    pub fn is_profit(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide) -> Position {
        Position {
            id: "pos-1".to_string(),
            symbol: "BTC-PERP".to_string(),
            side,
            size: BaseQuantity::new(dec!(0.01)),
            entry_price: dec!(50000),
            stop_loss: dec!(49000),
            take_profit: dec!(51500),
            opened_at: Utc::now(),
            linked_exit_order_id: None,
        }
    }

    #[test]
    fn long_unrealized_pnl_follows_price_up() {
        let pos = position(PositionSide::Long);
        assert_eq!(pos.unrealized_pnl(dec!(50500)), dec!(5));
        assert_eq!(pos.unrealized_pnl(dec!(49500)), dec!(-5));
    }

    #[test]
    fn short_unrealized_pnl_follows_price_down() {
        let pos = position(PositionSide::Short);
        assert_eq!(pos.unrealized_pnl(dec!(49500)), dec!(5));
        assert_eq!(pos.unrealized_pnl(dec!(50500)), dec!(-5));
    }

    #[test]
    fn trade_result_long_pnl_and_commission() {
        let pos = position(PositionSide::Long);
        let closed_at = pos.opened_at + TimeDelta::seconds(90);
        let trade = TradeResult::from_fills(
            &pos,
            dec!(50500),
            pos.size,
            dec!(0.0005),
            closed_at,
            ExitReason::ProfitHarvest,
        );

        // gross = 500 * 0.01 = 5
        assert_eq!(trade.gross_pnl, dec!(5));
        // commission = (50000 + 50500) * 0.01 * 0.0005 = 0.5025
        assert_eq!(trade.commission, dec!(0.5025));
        assert_eq!(trade.net_pnl, dec!(4.4975));
        assert_eq!(trade.duration_secs, 90);
        assert!(trade.is_profit());
    }

    #[test]
    fn trade_result_short_loss() {
        let pos = position(PositionSide::Short);
        let closed_at = pos.opened_at + TimeDelta::seconds(30);
        let trade = TradeResult::from_fills(
            &pos,
            dec!(50500),
            pos.size,
            Decimal::ZERO,
            closed_at,
            ExitReason::StopLoss,
        );

        assert_eq!(trade.gross_pnl, dec!(-5));
        assert_eq!(trade.net_pnl, dec!(-5));
        assert!(!trade.is_profit());
    }

    #[test]
    fn exit_reason_strings() {
        assert_eq!(ExitReason::ProfitHarvest.as_str(), "profit_harvest");
        assert_eq!(ExitReason::TimeLimit.as_str(), "time_limit");
    }
}
