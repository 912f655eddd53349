//! Position lifecycle monitoring.
//!
//! The monitor is the sole owner and mutator of open positions. Each tick
//! it evaluates exit rules in a fixed order (venue bracket fill, then
//! early profit harvest, then maximum holding time) and the first match
//! wins, so a fast small profit is taken ahead of a stale time-based exit.
//! Exit evaluation per position is serialized through an in-flight flag;
//! two close attempts can never race.

use crate::breaker::CircuitBreaker;
use crate::router::OrderRouter;
use chrono::Utc;
use perp_trade_core::{
    EffectiveParams, ExchangeGateway, ExitReason, MonitorConfig, OrderStatus, Position,
    TradeError, TradeRecorder, TradeResult,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

struct TrackedPosition {
    position: Position,
    /// Parameters resolved once at entry; regime shifts mid-position do
    /// not retroactively change its exit rules.
    params: EffectiveParams,
    in_flight: bool,
}

enum Outcome {
    Hold,
    Closed(TradeResult),
    Dropped,
}

/// Owns open positions from fill confirmation to closure.
pub struct PositionMonitor {
    gateway: Arc<dyn ExchangeGateway>,
    router: Arc<OrderRouter>,
    breaker: Arc<CircuitBreaker>,
    recorder: Option<Arc<dyn TradeRecorder>>,
    config: MonitorConfig,
    commission_rate: Decimal,
    positions: RwLock<HashMap<String, TrackedPosition>>,
}

impl PositionMonitor {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        router: Arc<OrderRouter>,
        breaker: Arc<CircuitBreaker>,
        recorder: Option<Arc<dyn TradeRecorder>>,
        config: MonitorConfig,
        commission_rate: Decimal,
    ) -> Self {
        Self {
            gateway,
            router,
            breaker,
            recorder,
            config,
            commission_rate,
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a filled position for monitoring.
    ///
    /// Callers must only hand over positions whose entry fill is
    /// confirmed.
    pub async fn track(&self, position: Position, params: EffectiveParams) {
        tracing::info!(
            symbol = %position.symbol,
            id = %position.id,
            size = %position.size,
            entry_price = %position.entry_price,
            "tracking position"
        );
        self.positions.write().await.insert(
            position.symbol.clone(),
            TrackedPosition {
                position,
                params,
                in_flight: false,
            },
        );
    }

    /// Number of currently tracked positions.
    pub async fn open_count(&self) -> usize {
        self.positions.read().await.len()
    }

    /// Snapshot of tracked positions.
    pub async fn open_positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .await
            .values()
            .map(|t| t.position.clone())
            .collect()
    }

    /// Runs one exit evaluation for the symbol.
    ///
    /// Returns the trade when the position closed this tick. A position
    /// already mid-close is skipped (`Ok(None)`), as are untracked
    /// symbols.
    ///
    /// # Errors
    ///
    /// Propagates venue errors; the position stays tracked and is
    /// re-evaluated next tick.
    pub async fn evaluate_symbol(&self, symbol: &str) -> Result<Option<TradeResult>, TradeError> {
        let Some((position, params)) = self.begin(symbol).await else {
            return Ok(None);
        };

        let outcome = self.evaluate_inner(&position, &params).await;
        match outcome {
            Ok(Outcome::Closed(trade)) => {
                self.positions.write().await.remove(symbol);
                self.settle(&trade).await;
                Ok(Some(trade))
            }
            Ok(Outcome::Dropped) => {
                self.positions.write().await.remove(symbol);
                Ok(None)
            }
            Ok(Outcome::Hold) => {
                self.release(symbol).await;
                Ok(None)
            }
            Err(e) => {
                self.release(symbol).await;
                Err(e)
            }
        }
    }

    /// Spawns the monitoring loop driving every tracked symbol on the
    /// poll interval. Each symbol evaluates on its own task; a slow close
    /// on one never delays the others.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.poll_interval());
            loop {
                interval.tick().await;
                let symbols: Vec<String> =
                    monitor.positions.read().await.keys().cloned().collect();
                for symbol in symbols {
                    let monitor = Arc::clone(&monitor);
                    tokio::spawn(async move {
                        if let Err(e) = monitor.evaluate_symbol(&symbol).await {
                            tracing::error!(symbol = %symbol, error = %e, "exit evaluation failed");
                        }
                    });
                }
            }
        })
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    async fn evaluate_inner(
        &self,
        position: &Position,
        params: &EffectiveParams,
    ) -> Result<Outcome, TradeError> {
        // Rule 1: the venue-side bracket may have already done the work.
        if let Some(algo_id) = &position.linked_exit_order_id {
            match self.gateway.order_status(&position.symbol, algo_id).await {
                Ok(report) if report.status == OrderStatus::Filled => {
                    if let Some(exit_price) = report.avg_fill_price {
                        let reason = classify_bracket_exit(position, exit_price);
                        tracing::info!(
                            symbol = %position.symbol,
                            exit_price = %exit_price,
                            reason = reason.as_str(),
                            "bracket order filled on venue"
                        );
                        let trade = TradeResult::from_fills(
                            position,
                            exit_price,
                            position.size,
                            self.commission_rate,
                            Utc::now(),
                            reason,
                        );
                        return Ok(Outcome::Closed(trade));
                    }
                    // No fill price to settle against; the phantom path
                    // clears this entry once the venue drops the position.
                    tracing::warn!(
                        symbol = %position.symbol,
                        algo_order_id = %algo_id,
                        "bracket filled but venue omitted the fill price"
                    );
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::debug!(symbol = %position.symbol, error = %e, "bracket status poll failed");
                }
                Err(e) => {
                    tracing::warn!(symbol = %position.symbol, error = %e, "bracket status poll rejected");
                }
            }
        }

        let now = Utc::now();
        let age_secs = position.age_secs(now).max(0) as u64;

        // Rule 2: harvest a fast small profit inside the entry window.
        let limits = match self.gateway.get_price_limits(&position.symbol).await {
            Ok(limits) => limits,
            Err(e) if e.is_transient() => {
                tracing::debug!(symbol = %position.symbol, error = %e, "no mark price this tick");
                return Ok(Outcome::Hold);
            }
            Err(e) => return Err(e.into()),
        };
        let mark = (limits.best_bid + limits.best_ask) / Decimal::TWO;
        let unrealized = position.unrealized_pnl(mark);

        if unrealized >= params.harvest_threshold_usd
            && age_secs <= params.harvest_window.as_secs()
        {
            tracing::info!(
                symbol = %position.symbol,
                unrealized = %unrealized,
                threshold = %params.harvest_threshold_usd,
                age_secs,
                "harvesting early profit"
            );
            return self.close_checked(position, ExitReason::ProfitHarvest).await;
        }

        // Rule 3: stale positions go, profitable or not.
        if age_secs >= params.max_holding.as_secs() {
            tracing::info!(
                symbol = %position.symbol,
                age_secs,
                limit_secs = params.max_holding.as_secs(),
                "maximum holding time exceeded"
            );
            return self.close_checked(position, ExitReason::TimeLimit).await;
        }

        Ok(Outcome::Hold)
    }

    /// Re-validates the tracked size against the venue, then closes.
    ///
    /// A position the venue no longer reports (or reports at a wildly
    /// different size) past the grace period was closed externally; it is
    /// dropped without an order rather than surfaced as an error.
    async fn close_checked(
        &self,
        position: &Position,
        reason: ExitReason,
    ) -> Result<Outcome, TradeError> {
        let venue_positions = self
            .gateway
            .get_open_positions(Some(&position.symbol))
            .await?;
        let venue = venue_positions
            .iter()
            .find(|p| p.side == position.side && p.size.is_positive());

        let age_secs = position.age_secs(Utc::now()).max(0) as u64;
        let past_grace = age_secs > self.config.phantom_grace_secs;

        let Some(venue) = venue else {
            if past_grace {
                tracing::warn!(
                    symbol = %position.symbol,
                    id = %position.id,
                    "position no longer on venue, dropping from tracking"
                );
                return Ok(Outcome::Dropped);
            }
            // The venue may simply lag a just-opened position.
            return Ok(Outcome::Hold);
        };

        let tracked = position.size.value();
        let discrepancy = if tracked > Decimal::ZERO {
            (venue.size.value() - tracked).abs() / tracked
        } else {
            Decimal::ONE
        };
        if discrepancy > self.config.phantom_tolerance_pct && past_grace {
            tracing::warn!(
                symbol = %position.symbol,
                tracked = %tracked,
                on_venue = %venue.size,
                "venue size diverged past tolerance, dropping from tracking"
            );
            return Ok(Outcome::Dropped);
        }

        let trade = self.router.close(position, venue.size, reason).await?;
        Ok(Outcome::Closed(trade))
    }

    async fn settle(&self, trade: &TradeResult) {
        self.breaker.record_result(&trade.symbol, trade.is_profit());
        self.breaker.record_pnl(trade.net_pnl);
        if let Some(recorder) = &self.recorder {
            recorder.record(trade).await;
        }
    }

    // =========================================================================
    // In-flight bookkeeping
    // =========================================================================

    async fn begin(&self, symbol: &str) -> Option<(Position, EffectiveParams)> {
        let mut positions = self.positions.write().await;
        let tracked = positions.get_mut(symbol)?;
        if tracked.in_flight {
            return None;
        }
        tracked.in_flight = true;
        Some((tracked.position.clone(), tracked.params.clone()))
    }

    async fn release(&self, symbol: &str) {
        if let Some(tracked) = self.positions.write().await.get_mut(symbol) {
            tracked.in_flight = false;
        }
    }
}

/// Decides which bracket leg a venue-side exit corresponds to.
fn classify_bracket_exit(position: &Position, exit_price: Decimal) -> ExitReason {
    let to_take_profit = (exit_price - position.take_profit).abs();
    let to_stop_loss = (exit_price - position.stop_loss).abs();
    if to_take_profit <= to_stop_loss {
        ExitReason::TakeProfit
    } else {
        ExitReason::StopLoss
    }
}
