//! Inbound trading signals.
//!
//! Signals arrive from an upstream producer (out of scope here) as a
//! direction plus a confidence score; the engine turns them into sized,
//! risk-bounded orders.

use crate::market::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market behavior classification used to select parameter overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trending,
    Ranging,
    Choppy,
}

/// Confidence bucket derived from the raw signal score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl Confidence {
    /// Buckets a raw score in `[0, 1]` into a confidence level.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 0.45 {
            Self::Weak
        } else if score < 0.65 {
            Self::Medium
        } else if score < 0.85 {
            Self::Strong
        } else {
            Self::VeryStrong
        }
    }
}

/// A directional trading signal handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: PositionSide,
    /// Raw score in `[0, 1]`; bucketed via [`Confidence::from_score`].
    pub confidence: f64,
    /// Reference price at signal time.
    pub price: Decimal,
    /// True when sub-indicators disagree with the headline direction.
    pub has_conflict: bool,
    pub regime: Regime,
    /// Realized volatility (ATR as a fraction of price), when available.
    pub atr_pct: Option<Decimal>,
}

impl Signal {
    #[must_use]
    pub fn confidence_bucket(&self) -> Confidence {
        Confidence::from_score(self.confidence)
    }
}
