//! Position sizing under layered risk ceilings.
//!
//! Turns a signal plus a fresh account snapshot into a margin-safe,
//! exchange-compliant order size. The pipeline is strictly monotonic:
//! after the base notional is selected, every subsequent step may only
//! shrink the amount at stake, and each binding cap is logged so the
//! decision chain can be reconstructed from the logs.

use crate::breaker::CircuitBreaker;
use perp_trade_core::{
    AccountState, BaseQuantity, Confidence, EffectiveParams, InstrumentMeta, PositionSide, Signal,
    SizingConfig, SizingResult, TradeError,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Pure sizing computation plus the circuit-breaker entry gate.
pub struct RiskSizer {
    config: SizingConfig,
    breaker: Arc<CircuitBreaker>,
}

impl RiskSizer {
    #[must_use]
    pub fn new(config: SizingConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self { config, breaker }
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Computes a risk-bounded order size for the signal.
    ///
    /// # Errors
    ///
    /// - `Suspended` when the symbol is in cool-down or a global stop is
    ///   active
    /// - `ConfigInvalid` when no balance tier covers the account
    /// - `InsufficientMargin` when the caps leave nothing tradeable
    /// - `PositionTooSmall` when the rounded quantity cannot reach the
    ///   instrument minimum within the caps
    pub fn compute_size(
        &self,
        account: &AccountState,
        signal: &Signal,
        meta: &InstrumentMeta,
        params: &EffectiveParams,
    ) -> Result<SizingResult, TradeError> {
        self.breaker.check(&signal.symbol)?;

        if signal.price <= Decimal::ZERO {
            return Err(TradeError::config_invalid(format!(
                "signal price {} is not positive",
                signal.price
            )));
        }

        // Balance tier and base notional.
        let tier = self
            .config
            .tier_for(account.balance)
            .ok_or_else(|| TradeError::config_invalid("no balance tier configured"))?;
        let profile = &tier.profile;
        let mut notional = tier.base_notional(account.balance);

        // Per-symbol multiplier.
        notional *= params.notional_multiplier;

        // Signal strength. A conflicted signal gets the reduced multiplier
        // regardless of its headline confidence.
        let strength = if signal.has_conflict {
            self.config.conflict_multiplier
        } else {
            self.confidence_multiplier(signal.confidence_bucket())
        };
        notional = (notional * strength).min(profile.max_notional);

        // Inverse volatility scaling, bounded to the configured band.
        let vol = &self.config.volatility;
        if vol.enabled {
            if let Some(atr_pct) = signal.atr_pct {
                if atr_pct > Decimal::ZERO {
                    let multiplier = (vol.baseline_atr_pct / atr_pct)
                        .clamp(vol.min_multiplier, vol.max_multiplier);
                    notional = (notional * multiplier).min(profile.max_notional);
                }
            }
        }

        // Notional to margin.
        let leverage = self.config.leverage.min(meta.max_leverage).max(1);
        let leverage_dec = Decimal::from(leverage);
        let mut margin = notional / leverage_dec;
        let requested_margin = margin;

        // Margin caps, in order. Tightest wins; each binding cap is logged.
        let cap_portfolio =
            (account.balance * profile.max_margin_pct - account.used_margin).max(Decimal::ZERO);
        let cap_available = account.available_margin.max(Decimal::ZERO);
        let cap_stop_loss = if params.stop_loss_fraction > Decimal::ZERO {
            account.balance * profile.max_loss_per_trade_pct / params.stop_loss_fraction
        } else {
            margin
        };
        let cap_safety = account.balance * self.config.max_margin_safety_pct;

        margin = Self::shrink(margin, cap_portfolio, &signal.symbol, "max_margin_pct");
        margin = Self::shrink(margin, cap_available, &signal.symbol, "available_margin");
        margin = Self::shrink(margin, cap_stop_loss, &signal.symbol, "max_loss_per_trade");
        margin = Self::shrink(margin, cap_safety, &signal.symbol, "margin_safety");

        let tightest_cap = cap_portfolio
            .min(cap_available)
            .min(cap_stop_loss)
            .min(cap_safety);
        if margin <= Decimal::ZERO {
            return Err(TradeError::InsufficientMargin {
                required: requested_margin,
                available: tightest_cap,
            });
        }

        // Profile notional bounds, expressed in margin terms. The floor
        // never overrides a harder cap from above.
        let floor = profile.min_notional / leverage_dec;
        let ceiling = profile.max_notional / leverage_dec;
        if margin < floor {
            if floor > tightest_cap {
                return Err(TradeError::InsufficientMargin {
                    required: floor,
                    available: tightest_cap,
                });
            }
            margin = floor;
        }
        margin = margin.min(ceiling);

        // Margin to base quantity, rounded down to the lot step.
        let raw_quantity = margin * leverage_dec / signal.price;
        let mut quantity = BaseQuantity::new(raw_quantity).round_to_lot(meta.lot_step);

        if quantity.value() < meta.min_size {
            // Raise to exactly the venue minimum, then re-check the caps;
            // the minimum must never become a back door past them.
            let min_quantity = BaseQuantity::new(meta.min_size);
            let min_margin = min_quantity.notional_at(signal.price) / leverage_dec;
            if min_margin > tightest_cap
                || min_quantity.notional_at(signal.price) > profile.max_notional
            {
                return Err(TradeError::PositionTooSmall {
                    quantity: quantity.value(),
                    min_size: meta.min_size,
                });
            }
            tracing::debug!(
                symbol = %signal.symbol,
                raised_to = %meta.min_size,
                "rounded quantity below venue minimum, raising to min size"
            );
            quantity = min_quantity;
        }

        let notional_usd = quantity.notional_at(signal.price);
        let margin_usd = notional_usd / leverage_dec;
        let (stop_loss, take_profit) = exit_prices(signal.side, signal.price, params);

        tracing::info!(
            symbol = %signal.symbol,
            side = ?signal.side,
            quantity = %quantity,
            notional_usd = %notional_usd,
            margin_usd = %margin_usd,
            leverage,
            "sized position"
        );

        Ok(SizingResult {
            symbol: signal.symbol.clone(),
            side: signal.side,
            quantity,
            notional_usd,
            margin_usd,
            leverage,
            stop_loss,
            take_profit,
        })
    }

    fn confidence_multiplier(&self, bucket: Confidence) -> Decimal {
        let multipliers = &self.config.confidence_multipliers;
        match bucket {
            Confidence::Weak => multipliers.weak,
            Confidence::Medium => multipliers.medium,
            Confidence::Strong => multipliers.strong,
            Confidence::VeryStrong => multipliers.very_strong,
        }
    }

    fn shrink(margin: Decimal, cap: Decimal, symbol: &str, cap_name: &str) -> Decimal {
        if margin > cap {
            tracing::debug!(symbol, cap = cap_name, from = %margin, to = %cap, "margin shrunk by cap");
            cap
        } else {
            margin
        }
    }
}

/// Absolute stop-loss and take-profit prices from the entry reference.
pub(crate) fn exit_prices(
    side: PositionSide,
    price: Decimal,
    params: &EffectiveParams,
) -> (Decimal, Decimal) {
    match side {
        PositionSide::Long => (
            price * (Decimal::ONE - params.stop_loss_fraction),
            price * (Decimal::ONE + params.take_profit_fraction),
        ),
        PositionSide::Short => (
            price * (Decimal::ONE + params.stop_loss_fraction),
            price * (Decimal::ONE - params.take_profit_fraction),
        ),
    }
}
