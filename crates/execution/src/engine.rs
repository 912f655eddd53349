//! Signal-to-position facade.
//!
//! Wires the sizing, routing, and monitoring components into the single
//! entry point the upstream signal producer calls: refresh the account,
//! size the trade, get it filled, protect it with a bracket, and hand it
//! to the monitor.

use crate::breaker::CircuitBreaker;
use crate::monitor::PositionMonitor;
use crate::router::{OrderPreference, OrderRouter};
use crate::sizer::{exit_prices, RiskSizer};
use chrono::Utc;
use perp_trade_core::{
    AppConfig, ExchangeGateway, Position, Signal, TradeError, TradeRecorder,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The trading engine: converts signals into monitored, risk-bounded
/// positions.
pub struct TradingEngine {
    gateway: Arc<dyn ExchangeGateway>,
    config: AppConfig,
    sizer: RiskSizer,
    router: Arc<OrderRouter>,
    monitor: Arc<PositionMonitor>,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for TradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine").finish_non_exhaustive()
    }
}

impl TradingEngine {
    /// Builds an engine over the gateway.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` when the configuration fails validation;
    /// an unsound profile table must never reach a live sizing decision.
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        config: AppConfig,
        recorder: Option<Arc<dyn TradeRecorder>>,
    ) -> Result<Self, TradeError> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        let router = Arc::new(OrderRouter::new(
            Arc::clone(&gateway),
            config.orders.clone(),
        ));
        let sizer = RiskSizer::new(config.sizing.clone(), Arc::clone(&breaker));
        let monitor = Arc::new(PositionMonitor::new(
            Arc::clone(&gateway),
            Arc::clone(&router),
            Arc::clone(&breaker),
            recorder,
            config.monitor.clone(),
            config.orders.commission_rate,
        ));

        Ok(Self {
            gateway,
            config,
            sizer,
            router,
            monitor,
            breaker,
        })
    }

    /// Turns a signal into an open, monitored position.
    ///
    /// The position only enters monitoring once its entry fill is
    /// confirmed; the bracket order is placed off the actual fill price.
    /// A failed bracket placement degrades to monitor-driven exits rather
    /// than failing the entry.
    ///
    /// # Errors
    ///
    /// Recoverable errors (`Suspended`, `InsufficientMargin`,
    /// `PositionTooSmall`) mean the signal was dropped with no order
    /// placed; venue errors surface after their retry policy ran out.
    pub async fn handle_signal(
        &self,
        signal: &Signal,
        preference: OrderPreference,
    ) -> Result<Position, TradeError> {
        let account = self.gateway.get_account().await?;
        let meta = self.gateway.get_instrument(&signal.symbol).await?;
        let params = self.config.resolve(&signal.symbol, signal.regime);

        let tier = self
            .config
            .sizing
            .tier_for(account.balance)
            .ok_or_else(|| TradeError::config_invalid("no balance tier configured"))?;
        if self.monitor.open_count().await >= tier.profile.max_open_positions {
            return Err(TradeError::suspended(
                &signal.symbol,
                format!(
                    "open position limit reached ({})",
                    tier.profile.max_open_positions
                ),
            ));
        }

        let sizing = self.sizer.compute_size(&account, signal, &meta, &params)?;
        let handle = self
            .router
            .open(&sizing, preference, &params, &meta, signal.atr_pct)
            .await?;

        // Protect the fill, not the signal price.
        let (stop_loss, take_profit) = exit_prices(signal.side, handle.fill_price, &params);
        let linked_exit_order_id = match self
            .gateway
            .place_bracket(
                &signal.symbol,
                signal.side.exit_order(),
                handle.quantity,
                take_profit,
                stop_loss,
            )
            .await
        {
            Ok(ack) => Some(ack.algo_order_id),
            Err(e) => {
                tracing::warn!(
                    symbol = %signal.symbol,
                    error = %e,
                    "bracket placement failed, relying on monitor-driven exits"
                );
                None
            }
        };

        let position = Position {
            id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            size: handle.quantity,
            entry_price: handle.fill_price,
            stop_loss,
            take_profit,
            opened_at: Utc::now(),
            linked_exit_order_id,
        };

        self.monitor.track(position.clone(), params).await;
        Ok(position)
    }

    /// Starts the background monitoring loop.
    #[must_use]
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        self.monitor.spawn()
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<PositionMonitor> {
        &self.monitor
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}
