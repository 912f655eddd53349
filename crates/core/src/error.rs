//! Typed error taxonomy for sizing and venue interaction.
//!
//! Expected failure modes are values, not panics: sizing and routing return
//! `Result<T, TradeError>` to the caller, and every venue response maps to a
//! `VenueError` variant with its own retry policy.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the venue or the transport underneath it.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    /// Order price rejected as outside the venue's published band.
    ///
    /// Carries the band bounds when the rejection payload included them,
    /// so the router can recompute a price just inside the band.
    #[error("price outside venue band: {message}")]
    PriceBand {
        max_buy: Option<Decimal>,
        min_sell: Option<Decimal>,
        message: String,
    },

    /// Order quantity below the venue's minimum size.
    #[error("order below venue minimum size: {message}")]
    MinSize { message: String },

    /// Venue rate limit hit.
    #[error("rate limit exceeded")]
    RateLimit { retry_after_secs: Option<u64> },

    /// Request exceeded its bounded timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Not enough balance to accept the order.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Any other order rejection.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Response payload could not be interpreted. Fatal for the symbol.
    #[error("malformed venue payload: {0}")]
    Malformed(String),
}

impl VenueError {
    pub fn price_band(
        max_buy: Option<Decimal>,
        min_sell: Option<Decimal>,
        message: impl Into<String>,
    ) -> Self {
        Self::PriceBand {
            max_buy,
            min_sell,
            message: message.into(),
        }
    }

    pub fn min_size(message: impl Into<String>) -> Self {
        Self::MinSize {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// True for failures worth retrying with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }

    /// True for failures that must propagate without any retry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InsufficientBalance { .. } | Self::Malformed(_))
    }

    /// Suggested delay before the next attempt, if one applies.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_secs } => Some(retry_after_secs.unwrap_or(1)),
            Self::Timeout(_) | Self::Network(_) => Some(1),
            _ => None,
        }
    }
}

/// Errors returned by the sizing and execution engine.
#[derive(Debug, Clone, Error)]
pub enum TradeError {
    /// Configuration rejected at load time. Aborts startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Margin caps left nothing to trade with. Signal dropped.
    #[error("insufficient margin: required {required}, available {available}")]
    InsufficientMargin {
        required: Decimal,
        available: Decimal,
    },

    /// Sized quantity fell below the instrument minimum. Signal dropped.
    #[error("position too small: {quantity} below minimum {min_size}")]
    PositionTooSmall {
        quantity: Decimal,
        min_size: Decimal,
    },

    /// New entries suspended by the circuit breaker or emergency stop.
    #[error("entries suspended for {symbol}: {reason}")]
    Suspended { symbol: String, reason: String },

    /// Venue interaction failed after exhausting its retry policy.
    #[error(transparent)]
    Venue(#[from] VenueError),

    /// Tracked position no longer exists on the venue.
    #[error("tracked position no longer on venue: {symbol}")]
    PhantomPosition { symbol: String },
}

impl TradeError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    pub fn suspended(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Suspended {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// True when the signal was merely dropped and trading can continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientMargin { .. }
                | Self::PositionTooSmall { .. }
                | Self::Suspended { .. }
                | Self::PhantomPosition { .. }
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, TradeError>;
