//! Typed order quantities.
//!
//! Venues quote instrument sizes in two different units: base-asset units
//! (coins) and exchange contracts. Mixing the two silently is the most
//! expensive bug class in this domain, so both get their own wrapper type
//! and conversion goes through exactly one function in each direction.

use crate::market::InstrumentMeta;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A quantity expressed in base-asset units (e.g. BTC, not contracts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseQuantity(Decimal);

/// A quantity expressed in exchange contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractQuantity(Decimal);

impl BaseQuantity {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the raw decimal value in base units.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Converts to contracts using the instrument's contract value
    /// (base units per contract).
    #[must_use]
    pub fn to_contracts(self, meta: &InstrumentMeta) -> ContractQuantity {
        ContractQuantity(self.0 / meta.contract_value)
    }

    /// Rounds down to the nearest multiple of `lot_step`.
    ///
    /// Returns zero when the quantity is smaller than one step.
    #[must_use]
    pub fn round_to_lot(self, lot_step: Decimal) -> Self {
        if lot_step <= Decimal::ZERO {
            return self;
        }
        Self((self.0 / lot_step).floor() * lot_step)
    }

    /// Notional value in quote currency at the given price.
    #[must_use]
    pub fn notional_at(self, price: Decimal) -> Decimal {
        self.0 * price
    }
}

impl ContractQuantity {
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the raw decimal value in contracts.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }

    /// Converts back to base-asset units using the instrument's contract
    /// value (base units per contract).
    #[must_use]
    pub fn to_base(self, meta: &InstrumentMeta) -> BaseQuantity {
        BaseQuantity(self.0 * meta.contract_value)
    }
}

impl std::fmt::Display for BaseQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ContractQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}c", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn meta(contract_value: Decimal) -> InstrumentMeta {
        InstrumentMeta {
            symbol: "BTC-PERP".to_string(),
            contract_value,
            lot_step: dec!(0.001),
            price_step: dec!(0.1),
            min_size: dec!(0.001),
            max_leverage: 50,
        }
    }

    #[test]
    fn base_and_contract_differ_when_contract_value_not_one() {
        let meta = meta(dec!(0.01));
        let base = BaseQuantity::new(dec!(0.5));
        let contracts = base.to_contracts(&meta);

        assert_ne!(base.value(), contracts.value());
        assert_eq!(contracts.value(), dec!(50));
    }

    #[test]
    fn base_and_contract_equal_when_contract_value_is_one() {
        let meta = meta(dec!(1));
        let base = BaseQuantity::new(dec!(0.5));
        assert_eq!(base.to_contracts(&meta).value(), base.value());
    }

    #[test]
    fn conversion_round_trips() {
        let meta = meta(dec!(0.001));
        let base = BaseQuantity::new(dec!(0.125));
        assert_eq!(base.to_contracts(&meta).to_base(&meta), base);
    }

    #[test]
    fn notional_is_quantity_times_price() {
        let qty = BaseQuantity::new(dec!(0.005));
        assert_eq!(qty.notional_at(dec!(50000)), dec!(250));
    }

    #[test]
    fn round_to_lot_rounds_down() {
        let qty = BaseQuantity::new(dec!(0.0057));
        assert_eq!(qty.round_to_lot(dec!(0.001)).value(), dec!(0.005));
    }

    #[test]
    fn round_to_lot_exact_multiple_unchanged() {
        let qty = BaseQuantity::new(dec!(0.005));
        assert_eq!(qty.round_to_lot(dec!(0.001)).value(), dec!(0.005));
    }

    #[test]
    fn round_to_lot_below_one_step_is_zero() {
        let qty = BaseQuantity::new(dec!(0.0004));
        assert!(qty.round_to_lot(dec!(0.001)).is_zero());
    }

    #[test]
    fn round_to_lot_zero_step_is_identity() {
        let qty = BaseQuantity::new(dec!(0.1234));
        assert_eq!(qty.round_to_lot(Decimal::ZERO), qty);
    }
}
