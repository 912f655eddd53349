//! Raw venue payloads and their conversion into core types.
//!
//! The venue quotes every price and size as a JSON string; conversion to
//! `Decimal` happens here, once, with malformed values surfaced as
//! `VenueError::Malformed` rather than silently defaulted.

use perp_trade_core::{
    AccountState, BaseQuantity, InstrumentMeta, OrderAck, OrderStatus, OrderStatusReport,
    PositionSide, PriceLimits, VenueError, VenuePosition,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Instant;

pub(crate) fn parse_decimal(value: &str, field: &str) -> Result<Decimal, VenueError> {
    Decimal::from_str_exact(value)
        .map_err(|e| VenueError::malformed(format!("{field} = {value:?}: {e}")))
}

fn parse_opt_decimal(value: Option<&str>, field: &str) -> Result<Option<Decimal>, VenueError> {
    value.map(|v| parse_decimal(v, field)).transpose()
}

// =============================================================================
// Account
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAccount {
    balance: String,
    used_margin: String,
}

impl RawAccount {
    pub(crate) fn into_account(self) -> Result<AccountState, VenueError> {
        let balance = parse_decimal(&self.balance, "balance")?;
        let used_margin = parse_decimal(&self.used_margin, "used_margin")?;
        Ok(AccountState::new(balance, used_margin))
    }
}

// =============================================================================
// Positions
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPositionsResponse {
    positions: Option<Vec<RawPosition>>,
}

impl RawPositionsResponse {
    pub(crate) fn into_positions(self) -> Result<Vec<VenuePosition>, VenueError> {
        self.positions
            .unwrap_or_default()
            .into_iter()
            .map(RawPosition::into_position)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPosition {
    symbol: String,
    side: String,
    size: String,
    entry_price: String,
    unrealized_pnl: Option<String>,
}

impl RawPosition {
    fn into_position(self) -> Result<VenuePosition, VenueError> {
        let side = match self.side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            other => {
                return Err(VenueError::malformed(format!(
                    "unknown position side {other:?}"
                )))
            }
        };
        Ok(VenuePosition {
            symbol: self.symbol,
            side,
            size: BaseQuantity::new(parse_decimal(&self.size, "size")?),
            entry_price: parse_decimal(&self.entry_price, "entry_price")?,
            unrealized_pnl: parse_opt_decimal(self.unrealized_pnl.as_deref(), "unrealized_pnl")?,
        })
    }
}

// =============================================================================
// Instruments
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawInstrument {
    symbol: String,
    contract_value: String,
    lot_step: String,
    price_step: String,
    min_size: String,
    max_leverage: u8,
}

impl RawInstrument {
    pub(crate) fn into_meta(self) -> Result<InstrumentMeta, VenueError> {
        Ok(InstrumentMeta {
            symbol: self.symbol,
            contract_value: parse_decimal(&self.contract_value, "contract_value")?,
            lot_step: parse_decimal(&self.lot_step, "lot_step")?,
            price_step: parse_decimal(&self.price_step, "price_step")?,
            min_size: parse_decimal(&self.min_size, "min_size")?,
            max_leverage: self.max_leverage,
        })
    }
}

// =============================================================================
// Price limits
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPriceLimit {
    best_bid: String,
    best_ask: String,
    max_buy: String,
    min_sell: String,
}

impl RawPriceLimit {
    pub(crate) fn into_limits(self) -> Result<PriceLimits, VenueError> {
        Ok(PriceLimits {
            best_bid: parse_decimal(&self.best_bid, "best_bid")?,
            best_ask: parse_decimal(&self.best_ask, "best_ask")?,
            max_buy_price: parse_decimal(&self.max_buy, "max_buy")?,
            min_sell_price: parse_decimal(&self.min_sell, "min_sell")?,
            as_of: Instant::now(),
        })
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOrderAck {
    order_id: String,
    client_order_id: Option<String>,
    status: String,
    filled_qty: Option<String>,
    avg_price: Option<String>,
}

pub(crate) fn parse_status(status: &str) -> Result<OrderStatus, VenueError> {
    match status {
        "new" | "live" => Ok(OrderStatus::New),
        "partially_filled" => Ok(OrderStatus::PartiallyFilled),
        "filled" => Ok(OrderStatus::Filled),
        "canceled" | "cancelled" => Ok(OrderStatus::Canceled),
        "rejected" => Ok(OrderStatus::Rejected),
        other => Err(VenueError::malformed(format!(
            "unknown order status {other:?}"
        ))),
    }
}

impl RawOrderAck {
    pub(crate) fn into_ack(self, client_order_id: String) -> Result<OrderAck, VenueError> {
        let filled = parse_opt_decimal(self.filled_qty.as_deref(), "filled_qty")?
            .unwrap_or(Decimal::ZERO);
        Ok(OrderAck {
            order_id: self.order_id,
            client_order_id: self.client_order_id.unwrap_or(client_order_id),
            status: parse_status(&self.status)?,
            filled_quantity: BaseQuantity::new(filled),
            avg_fill_price: parse_opt_decimal(self.avg_price.as_deref(), "avg_price")?,
        })
    }

    pub(crate) fn into_report(self) -> Result<OrderStatusReport, VenueError> {
        let filled = parse_opt_decimal(self.filled_qty.as_deref(), "filled_qty")?
            .unwrap_or(Decimal::ZERO);
        Ok(OrderStatusReport {
            order_id: self.order_id,
            status: parse_status(&self.status)?,
            filled_quantity: BaseQuantity::new(filled),
            avg_fill_price: parse_opt_decimal(self.avg_price.as_deref(), "avg_price")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAlgoOrderAck {
    pub(crate) algo_order_id: String,
}

// =============================================================================
// Rejection payloads
// =============================================================================

/// Error body the venue attaches to non-2xx order responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawRejection {
    pub(crate) code: Option<u32>,
    pub(crate) msg: Option<String>,
    pub(crate) max_buy: Option<String>,
    pub(crate) min_sell: Option<String>,
}

/// Venue rejection codes with dedicated handling.
const CODE_PRICE_BAND: u32 = 30014;
const CODE_MIN_SIZE: u32 = 30022;
const CODE_INSUFFICIENT_BALANCE: u32 = 30031;

/// Classifies a rejection body into a typed venue error.
///
/// Price-band rejections carry the band bounds when the payload includes
/// them as structured fields, otherwise the bounds are scraped from the
/// message text so the caller can still correct the price.
pub(crate) fn classify_rejection(status: u16, body: &str) -> VenueError {
    let rejection: Option<RawRejection> = serde_json::from_str(body).ok();
    let message = rejection
        .as_ref()
        .and_then(|r| r.msg.clone())
        .unwrap_or_else(|| body.to_string());
    let lower = message.to_lowercase();

    let is_price_band = rejection
        .as_ref()
        .and_then(|r| r.code)
        .map(|c| c == CODE_PRICE_BAND)
        .unwrap_or(false)
        || (lower.contains("price") && (lower.contains("band") || lower.contains("limit")));

    if is_price_band {
        let structured_max = rejection
            .as_ref()
            .and_then(|r| r.max_buy.as_deref())
            .and_then(|v| Decimal::from_str_exact(v).ok());
        let structured_min = rejection
            .as_ref()
            .and_then(|r| r.min_sell.as_deref())
            .and_then(|v| Decimal::from_str_exact(v).ok());
        let max_buy = structured_max.or_else(|| number_after(&lower, "max buy price"));
        let min_sell = structured_min.or_else(|| number_after(&lower, "min sell price"));
        return VenueError::price_band(max_buy, min_sell, message);
    }

    let code = rejection.as_ref().and_then(|r| r.code);
    if code == Some(CODE_MIN_SIZE) || (lower.contains("minimum") && lower.contains("size")) {
        return VenueError::min_size(message);
    }
    if code == Some(CODE_INSUFFICIENT_BALANCE) || lower.contains("insufficient") {
        return VenueError::InsufficientBalance {
            required: Decimal::ZERO,
            available: Decimal::ZERO,
        };
    }
    if status == 429 {
        return VenueError::RateLimit {
            retry_after_secs: None,
        };
    }
    if status >= 500 {
        return VenueError::Network(format!("venue {status}: {message}"));
    }
    VenueError::rejected(message)
}

/// Extracts the first decimal number following `keyword` in `text`.
fn number_after(text: &str, keyword: &str) -> Option<Decimal> {
    let start = text.find(keyword)? + keyword.len();
    let rest = &text[start..];
    let begin = rest.find(|c: char| c.is_ascii_digit())?;
    let number: String = rest[begin..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str_exact(number.trim_end_matches('.')).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn account_payload_parses() {
        let raw = RawAccount {
            balance: "1000.5".to_string(),
            used_margin: "250".to_string(),
        };
        let account = raw.into_account().unwrap();
        assert_eq!(account.balance, dec!(1000.5));
        assert_eq!(account.available_margin, dec!(750.5));
    }

    #[test]
    fn malformed_decimal_is_typed_error() {
        let raw = RawAccount {
            balance: "abc".to_string(),
            used_margin: "0".to_string(),
        };
        let err = raw.into_account().unwrap_err();
        assert!(matches!(err, VenueError::Malformed(_)));
    }

    #[test]
    fn unknown_position_side_rejected() {
        let raw: RawPositionsResponse = serde_json::from_str(
            r#"{"positions":[{"symbol":"BTC-PERP","side":"sideways","size":"1","entry_price":"100"}]}"#,
        )
        .unwrap();
        assert!(raw.into_positions().is_err());
    }

    #[test]
    fn order_status_strings() {
        assert_eq!(parse_status("filled").unwrap(), OrderStatus::Filled);
        assert_eq!(parse_status("live").unwrap(), OrderStatus::New);
        assert_eq!(parse_status("cancelled").unwrap(), OrderStatus::Canceled);
        assert!(parse_status("weird").is_err());
    }

    // ==================== Rejection Classification ====================

    #[test]
    fn price_band_from_structured_fields() {
        let body = r#"{"code":30014,"msg":"order price exceeds limit","max_buy":"100.10"}"#;
        let err = classify_rejection(400, body);
        match err {
            VenueError::PriceBand { max_buy, .. } => {
                assert_eq!(max_buy, Some(dec!(100.10)));
            }
            other => panic!("expected PriceBand, got {other:?}"),
        }
    }

    #[test]
    fn price_band_bounds_scraped_from_message() {
        let body = r#"{"code":30014,"msg":"rejected: max buy price 100.10, min sell price 99.20"}"#;
        let err = classify_rejection(400, body);
        match err {
            VenueError::PriceBand { max_buy, min_sell, .. } => {
                assert_eq!(max_buy, Some(dec!(100.10)));
                assert_eq!(min_sell, Some(dec!(99.20)));
            }
            other => panic!("expected PriceBand, got {other:?}"),
        }
    }

    #[test]
    fn price_band_without_bounds_still_classified() {
        let body = r#"{"msg":"order price outside band"}"#;
        let err = classify_rejection(400, body);
        match err {
            VenueError::PriceBand { max_buy, min_sell, .. } => {
                assert!(max_buy.is_none());
                assert!(min_sell.is_none());
            }
            other => panic!("expected PriceBand, got {other:?}"),
        }
    }

    #[test]
    fn min_size_classified_by_code() {
        let body = r#"{"code":30022,"msg":"order size too small"}"#;
        assert!(matches!(
            classify_rejection(400, body),
            VenueError::MinSize { .. }
        ));
    }

    #[test]
    fn min_size_classified_by_message() {
        let body = r#"{"msg":"quantity below minimum order size"}"#;
        assert!(matches!(
            classify_rejection(400, body),
            VenueError::MinSize { .. }
        ));
    }

    #[test]
    fn insufficient_balance_classified() {
        let body = r#"{"code":30031,"msg":"insufficient balance"}"#;
        assert!(matches!(
            classify_rejection(400, body),
            VenueError::InsufficientBalance { .. }
        ));
    }

    #[test]
    fn server_errors_are_network() {
        assert!(matches!(
            classify_rejection(503, "gateway unavailable"),
            VenueError::Network(_)
        ));
    }

    #[test]
    fn unknown_rejection_falls_through() {
        let body = r#"{"msg":"order would self-trade"}"#;
        assert!(matches!(
            classify_rejection(400, body),
            VenueError::Rejected(_)
        ));
    }

    #[test]
    fn number_after_handles_trailing_punctuation() {
        assert_eq!(
            number_after("max buy price 100.10, then", "max buy price"),
            Some(dec!(100.10))
        );
        assert_eq!(number_after("no digits here", "max buy price"), None);
    }
}
