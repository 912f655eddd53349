//! Layered trading configuration.
//!
//! Parameters live in typed structs with a global base layer plus sparse
//! per-regime and per-symbol overrides. Resolution happens exactly once per
//! decision through [`AppConfig::resolve`]; nothing reaches into raw maps at
//! call sites.

use crate::error::TradeError;
use crate::signal::Regime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Risk profiles and balance tiers
// =============================================================================

/// How a tier derives its base notional from the account balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotionalBasis {
    /// Same base notional across the whole tier.
    Fixed(Decimal),
    /// Linear interpolation between the tier's balance endpoints.
    Interpolated {
        at_lower: Decimal,
        at_upper: Decimal,
    },
}

/// Risk ceilings applied to every trade sized under this profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub basis: NotionalBasis,
    pub min_notional: Decimal,
    pub max_notional: Decimal,
    pub max_open_positions: usize,
    /// Fraction of balance all open margin may occupy (e.g. 0.6 = 60%).
    pub max_margin_pct: Decimal,
    /// Fraction of balance a single full stop-out may cost.
    pub max_loss_per_trade_pct: Decimal,
}

/// One row of the balance-tiered profile table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceTier {
    pub min_balance: Decimal,
    /// Exclusive upper bound; `None` for the unbounded top tier.
    pub max_balance: Option<Decimal>,
    pub profile: RiskProfile,
}

impl BalanceTier {
    #[must_use]
    pub fn contains(&self, balance: Decimal) -> bool {
        balance >= self.min_balance && self.max_balance.map_or(true, |max| balance < max)
    }

    /// Base notional for the given balance within this tier.
    #[must_use]
    pub fn base_notional(&self, balance: Decimal) -> Decimal {
        match self.profile.basis {
            NotionalBasis::Fixed(notional) => notional,
            NotionalBasis::Interpolated { at_lower, at_upper } => match self.max_balance {
                Some(max) if max > self.min_balance => {
                    let t = ((balance - self.min_balance) / (max - self.min_balance))
                        .clamp(Decimal::ZERO, Decimal::ONE);
                    at_lower + (at_upper - at_lower) * t
                }
                // Unbounded tier: nothing to interpolate toward.
                _ => at_lower,
            },
        }
    }
}

// =============================================================================
// Sizing
// =============================================================================

/// Notional multiplier per confidence bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceMultipliers {
    pub weak: Decimal,
    pub medium: Decimal,
    pub strong: Decimal,
    pub very_strong: Decimal,
}

impl Default for ConfidenceMultipliers {
    fn default() -> Self {
        Self {
            weak: Decimal::new(5, 1),         // 0.5
            medium: Decimal::new(8, 1),       // 0.8
            strong: Decimal::ONE,             // 1.0
            very_strong: Decimal::new(125, 2), // 1.25
        }
    }
}

/// Inverse volatility scaling of the base notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityScaling {
    pub enabled: bool,
    /// ATR as a fraction of price considered "normal".
    pub baseline_atr_pct: Decimal,
    pub min_multiplier: Decimal,
    pub max_multiplier: Decimal,
}

impl Default for VolatilityScaling {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_atr_pct: Decimal::new(15, 3), // 1.5%
            min_multiplier: Decimal::new(5, 1),    // 0.5
            max_multiplier: Decimal::new(15, 1),   // 1.5
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub tiers: Vec<BalanceTier>,
    pub leverage: u8,
    /// Final safety cap on margin as a fraction of balance.
    pub max_margin_safety_pct: Decimal,
    /// Stop distance as a fraction of entry price.
    pub stop_loss_fraction: Decimal,
    /// Take-profit distance as a fraction of entry price.
    pub take_profit_fraction: Decimal,
    pub confidence_multipliers: ConfidenceMultipliers,
    /// Multiplier applied instead of the bucket one when sub-indicators
    /// conflict with the headline direction.
    pub conflict_multiplier: Decimal,
    pub volatility: VolatilityScaling,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            leverage: 5,
            max_margin_safety_pct: Decimal::new(25, 2), // 0.25
            stop_loss_fraction: Decimal::new(2, 2),     // 0.02
            take_profit_fraction: Decimal::new(3, 2),   // 0.03
            confidence_multipliers: ConfidenceMultipliers::default(),
            conflict_multiplier: Decimal::new(6, 1), // 0.6
            volatility: VolatilityScaling::default(),
        }
    }
}

impl SizingConfig {
    /// Selects the tier bracketing `balance`, falling back to the last
    /// tier when the balance exceeds every bound.
    #[must_use]
    pub fn tier_for(&self, balance: Decimal) -> Option<&BalanceTier> {
        self.tiers
            .iter()
            .find(|tier| tier.contains(balance))
            .or_else(|| self.tiers.last())
    }
}

fn default_tiers() -> Vec<BalanceTier> {
    vec![
        BalanceTier {
            min_balance: Decimal::ZERO,
            max_balance: Some(Decimal::from(1_000)),
            profile: RiskProfile {
                basis: NotionalBasis::Fixed(Decimal::from(250)),
                min_notional: Decimal::from(10),
                max_notional: Decimal::from(500),
                max_open_positions: 3,
                max_margin_pct: Decimal::new(6, 1),        // 0.6
                max_loss_per_trade_pct: Decimal::new(2, 2), // 0.02
            },
        },
        BalanceTier {
            min_balance: Decimal::from(1_000),
            max_balance: Some(Decimal::from(10_000)),
            profile: RiskProfile {
                basis: NotionalBasis::Interpolated {
                    at_lower: Decimal::from(250),
                    at_upper: Decimal::from(1_500),
                },
                min_notional: Decimal::from(50),
                max_notional: Decimal::from(2_500),
                max_open_positions: 5,
                max_margin_pct: Decimal::new(6, 1),
                max_loss_per_trade_pct: Decimal::new(2, 2),
            },
        },
        BalanceTier {
            min_balance: Decimal::from(10_000),
            max_balance: None,
            profile: RiskProfile {
                basis: NotionalBasis::Fixed(Decimal::from(2_000)),
                min_notional: Decimal::from(100),
                max_notional: Decimal::from(8_000),
                max_open_positions: 8,
                max_margin_pct: Decimal::new(5, 1), // 0.5
                max_loss_per_trade_pct: Decimal::new(15, 3), // 0.015
            },
        },
    ]
}

// =============================================================================
// Order routing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Prefer resting maker orders over immediate market execution.
    pub prefer_maker: bool,
    /// Base maker offset as a fraction of price.
    pub maker_offset_pct: Decimal,
    /// Derive the offset from the live spread instead of the fixed value.
    pub adaptive_offset: bool,
    /// Spread below which the adaptive offset collapses to zero.
    pub spread_zero_pct: Decimal,
    /// Spread below which the adaptive offset is halved.
    pub spread_half_pct: Decimal,
    /// Maximum age of a price-limit snapshot before refresh.
    pub price_max_age_ms: u64,
    /// Instantaneous volatility above which maker placement is disabled.
    pub max_volatility_pct: Decimal,
    /// Attempt ceiling for transient venue failures.
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// How long a resting limit order may wait for its fill before the
    /// router cancels it and falls back to a market order.
    pub fill_timeout_ms: u64,
    /// Round-trip fee rate applied to both fills of a trade.
    pub commission_rate: Decimal,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            prefer_maker: true,
            maker_offset_pct: Decimal::new(5, 4), // 0.0005
            adaptive_offset: true,
            spread_zero_pct: Decimal::new(1, 5), // 0.00001
            spread_half_pct: Decimal::new(1, 4), // 0.0001
            price_max_age_ms: 1_000,
            max_volatility_pct: Decimal::new(5, 3), // 0.005
            max_attempts: 3,
            retry_base_delay_ms: 200,
            fill_timeout_ms: 5_000,
            commission_rate: Decimal::new(5, 4), // 0.0005
        }
    }
}

impl OrderConfig {
    #[must_use]
    pub fn price_max_age(&self) -> Duration {
        Duration::from_millis(self.price_max_age_ms)
    }

    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }
}

// =============================================================================
// Position monitoring
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Unrealized PnL that triggers an early profit exit.
    pub harvest_threshold_usd: Decimal,
    /// Window after open during which harvesting applies.
    pub harvest_window_secs: u64,
    pub max_holding_secs: u64,
    /// Size discrepancy vs. the venue tolerated before a position is
    /// considered already closed externally.
    pub phantom_tolerance_pct: Decimal,
    /// Minimum age before a discrepant position may be dropped.
    pub phantom_grace_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            harvest_threshold_usd: Decimal::TWO,
            harvest_window_secs: 180,
            max_holding_secs: 3_600,
            phantom_tolerance_pct: Decimal::new(5, 2), // 0.05
            phantom_grace_secs: 30,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// Circuit breaker
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub max_consecutive_losses: u32,
    pub cooldown_secs: u64,
    /// Realized daily loss that halts all new entries.
    pub max_daily_loss_usd: Decimal,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 3,
            cooldown_secs: 1_800,
            max_daily_loss_usd: Decimal::from(100),
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
    /// Instrument metadata cache TTL.
    pub instrument_ttl_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.example".to_string(),
            requests_per_minute: 120,
            timeout_secs: 10,
            instrument_ttl_secs: 300,
        }
    }
}

// =============================================================================
// Overrides and resolution
// =============================================================================

/// Sparse parameter overrides; used for both symbol and regime layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub notional_multiplier: Option<Decimal>,
    pub maker_offset_pct: Option<Decimal>,
    pub harvest_threshold_usd: Option<Decimal>,
    pub harvest_window_secs: Option<u64>,
    pub max_holding_secs: Option<u64>,
    pub stop_loss_fraction: Option<Decimal>,
    pub take_profit_fraction: Option<Decimal>,
}

/// Parameters after layering, fixed for one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveParams {
    pub notional_multiplier: Decimal,
    pub maker_offset_pct: Decimal,
    pub harvest_threshold_usd: Decimal,
    pub harvest_window: Duration,
    pub max_holding: Duration,
    pub stop_loss_fraction: Decimal,
    pub take_profit_fraction: Decimal,
}

impl EffectiveParams {
    fn apply(&mut self, overrides: &Overrides) {
        if let Some(v) = overrides.notional_multiplier {
            self.notional_multiplier = v;
        }
        if let Some(v) = overrides.maker_offset_pct {
            self.maker_offset_pct = v;
        }
        if let Some(v) = overrides.harvest_threshold_usd {
            self.harvest_threshold_usd = v;
        }
        if let Some(v) = overrides.harvest_window_secs {
            self.harvest_window = Duration::from_secs(v);
        }
        if let Some(v) = overrides.max_holding_secs {
            self.max_holding = Duration::from_secs(v);
        }
        if let Some(v) = overrides.stop_loss_fraction {
            self.stop_loss_fraction = v;
        }
        if let Some(v) = overrides.take_profit_fraction {
            self.take_profit_fraction = v;
        }
    }
}

// =============================================================================
// Application config
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub sizing: SizingConfig,
    pub orders: OrderConfig,
    pub monitor: MonitorConfig,
    pub breaker: BreakerConfig,
    pub symbol_overrides: HashMap<String, Overrides>,
    pub regime_overrides: HashMap<Regime, Overrides>,
}

impl AppConfig {
    /// Layers base parameters with regime then symbol overrides.
    ///
    /// Symbol overrides win over regime overrides; both win over the base.
    #[must_use]
    pub fn resolve(&self, symbol: &str, regime: Regime) -> EffectiveParams {
        let mut params = EffectiveParams {
            notional_multiplier: Decimal::ONE,
            maker_offset_pct: self.orders.maker_offset_pct,
            harvest_threshold_usd: self.monitor.harvest_threshold_usd,
            harvest_window: Duration::from_secs(self.monitor.harvest_window_secs),
            max_holding: Duration::from_secs(self.monitor.max_holding_secs),
            stop_loss_fraction: self.sizing.stop_loss_fraction,
            take_profit_fraction: self.sizing.take_profit_fraction,
        };
        if let Some(overrides) = self.regime_overrides.get(&regime) {
            params.apply(overrides);
        }
        if let Some(overrides) = self.symbol_overrides.get(symbol) {
            params.apply(overrides);
        }
        params
    }

    /// Rejects configurations that would make sizing unsound.
    ///
    /// # Errors
    ///
    /// Returns `TradeError::ConfigInvalid` on the first violated invariant.
    pub fn validate(&self) -> Result<(), TradeError> {
        if self.sizing.tiers.is_empty() {
            return Err(TradeError::config_invalid("no balance tiers configured"));
        }
        for (i, tier) in self.sizing.tiers.iter().enumerate() {
            let profile = &tier.profile;
            if profile.min_notional > profile.max_notional {
                return Err(TradeError::config_invalid(format!(
                    "tier {i}: min_notional {} exceeds max_notional {}",
                    profile.min_notional, profile.max_notional
                )));
            }
            if let Some(max) = tier.max_balance {
                if max <= tier.min_balance {
                    return Err(TradeError::config_invalid(format!(
                        "tier {i}: max_balance {} not above min_balance {}",
                        max, tier.min_balance
                    )));
                }
            }
            if profile.max_margin_pct <= Decimal::ZERO || profile.max_margin_pct > Decimal::ONE {
                return Err(TradeError::config_invalid(format!(
                    "tier {i}: max_margin_pct {} outside (0, 1]",
                    profile.max_margin_pct
                )));
            }
        }
        if self.sizing.leverage == 0 {
            return Err(TradeError::config_invalid("leverage must be at least 1"));
        }
        if self.sizing.stop_loss_fraction <= Decimal::ZERO {
            return Err(TradeError::config_invalid(
                "stop_loss_fraction must be positive",
            ));
        }
        if self.orders.max_attempts == 0 {
            return Err(TradeError::config_invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }
}
