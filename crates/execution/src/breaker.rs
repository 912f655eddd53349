//! Circuit breaker for repeated losses and drawdown.
//!
//! Tracks consecutive losses per symbol and suspends new entries on an
//! instrument once the configured streak is hit. Symbols are independent:
//! a cool-down on one never blocks another. Two global guards sit on top,
//! a manual emergency stop and a daily realized-loss limit.
//!
//! Technical failures (venue errors, "no position to reduce") are never
//! recorded as losses; only settled trades move the counters.

use parking_lot::RwLock;
use perp_trade_core::{BreakerConfig, TradeError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct SymbolState {
    consecutive_losses: u32,
    suspended_until: Option<Instant>,
}

/// Per-symbol loss breaker with global emergency guards.
pub struct CircuitBreaker {
    config: BreakerConfig,
    symbols: RwLock<HashMap<String, SymbolState>>,
    daily_pnl: RwLock<Decimal>,
    last_reset_day: RwLock<u64>,
    halted: AtomicBool,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("daily_pnl", &*self.daily_pnl.read())
            .field("halted", &self.halted.load(Ordering::SeqCst))
            .field("tracked_symbols", &self.symbols.read().len())
            .finish()
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            symbols: RwLock::new(HashMap::new()),
            daily_pnl: RwLock::new(Decimal::ZERO),
            last_reset_day: RwLock::new(Self::current_day()),
            halted: AtomicBool::new(false),
        }
    }

    fn current_day() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0)
    }

    fn maybe_reset_day(&self) {
        let today = Self::current_day();
        let mut last = self.last_reset_day.write();
        if *last != today {
            *last = today;
            *self.daily_pnl.write() = Decimal::ZERO;
        }
    }

    /// Records the outcome of a settled trade.
    ///
    /// A profit resets the symbol's streak; a loss increments it and, at
    /// the configured threshold, suspends the symbol for the cool-down and
    /// resets the counter.
    pub fn record_result(&self, symbol: &str, is_profit: bool) {
        let mut symbols = self.symbols.write();
        let state = symbols.entry(symbol.to_string()).or_default();

        if is_profit {
            state.consecutive_losses = 0;
            return;
        }

        state.consecutive_losses += 1;
        if state.consecutive_losses >= self.config.max_consecutive_losses {
            state.suspended_until = Some(Instant::now() + self.config.cooldown());
            state.consecutive_losses = 0;
            tracing::warn!(
                symbol,
                cooldown_secs = self.config.cooldown_secs,
                "loss streak hit threshold, suspending entries"
            );
        }
    }

    /// Accumulates realized PnL into the daily drawdown guard.
    pub fn record_pnl(&self, net_pnl: Decimal) {
        self.maybe_reset_day();
        let mut pnl = self.daily_pnl.write();
        *pnl += net_pnl;
        if -*pnl >= self.config.max_daily_loss_usd {
            tracing::warn!(
                daily_pnl = %*pnl,
                limit = %self.config.max_daily_loss_usd,
                "daily loss limit reached, all new entries halted"
            );
        }
    }

    /// True while the symbol's cool-down is running. Auto-clears once the
    /// cool-down elapses.
    #[must_use]
    pub fn is_suspended(&self, symbol: &str) -> bool {
        self.suspension_remaining(symbol).is_some()
    }

    /// Remaining cool-down for the symbol, if any.
    #[must_use]
    pub fn suspension_remaining(&self, symbol: &str) -> Option<Duration> {
        let mut symbols = self.symbols.write();
        let state = symbols.get_mut(symbol)?;
        let until = state.suspended_until?;
        let now = Instant::now();
        if now < until {
            Some(until - now)
        } else {
            state.suspended_until = None;
            None
        }
    }

    /// Checks every entry guard for the symbol.
    ///
    /// # Errors
    ///
    /// Returns `TradeError::Suspended` naming the guard that blocked:
    /// emergency stop, daily loss limit, or the symbol's cool-down.
    pub fn check(&self, symbol: &str) -> Result<(), TradeError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(TradeError::suspended(symbol, "emergency stop active"));
        }

        self.maybe_reset_day();
        let daily_pnl = *self.daily_pnl.read();
        if -daily_pnl >= self.config.max_daily_loss_usd {
            return Err(TradeError::suspended(
                symbol,
                format!("daily loss limit reached ({daily_pnl})"),
            ));
        }

        if let Some(remaining) = self.suspension_remaining(symbol) {
            return Err(TradeError::suspended(
                symbol,
                format!("cooldown, {}s remaining", remaining.as_secs()),
            ));
        }

        Ok(())
    }

    /// Halts all new entries until [`CircuitBreaker::resume`].
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        tracing::warn!("emergency stop engaged");
    }

    /// Lifts a manual halt.
    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
        tracing::info!("emergency stop released");
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        *self.daily_pnl.read()
    }

    /// Current loss streak for a symbol.
    #[must_use]
    pub fn consecutive_losses(&self, symbol: &str) -> u32 {
        self.symbols
            .read()
            .get(symbol)
            .map_or(0, |s| s.consecutive_losses)
    }
}
