//! Order routing with price-band correction and maker/taker fallback.
//!
//! The router owns the path from a sized decision to a confirmed fill:
//! limit placement off the maker side of the book, clamping into the
//! venue's price band, a single corrected retry when the venue still
//! rejects on the band, and a mandatory market fallback so a signal never
//! goes unexecuted. Transient venue failures retry with bounded
//! exponential backoff; fatal ones propagate untouched.

use perp_trade_core::{
    BaseQuantity, EffectiveParams, ExchangeGateway, ExitReason, InstrumentMeta, OrderAck,
    OrderConfig, OrderKind, OrderRequest, OrderSide, OrderStatus, Position, PriceLimits,
    SizingResult, TradeError, TradeResult, VenueError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Poll cadence while waiting for a resting order to reach a terminal state.
const FILL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Caller's preference for how an entry should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPreference {
    Market,
    Limit,
}

/// A confirmed entry fill.
#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: BaseQuantity,
    pub fill_price: Decimal,
    pub kind: OrderKind,
    pub latency: Duration,
    pub submitted_at: DateTime<Utc>,
}

enum FillWait {
    Filled { price: Option<Decimal> },
    Dead,
    TimedOut,
}

/// Drives the gateway until an order is filled or definitively failed.
pub struct OrderRouter {
    gateway: Arc<dyn ExchangeGateway>,
    config: OrderConfig,
}

impl OrderRouter {
    #[must_use]
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: OrderConfig) -> Self {
        Self { gateway, config }
    }

    /// Opens a position per the sizing decision.
    ///
    /// The limit path falls back to market execution when the band cannot
    /// be determined, the corrected retry fails, or the resting order does
    /// not fill within the configured window. Market-path min-size
    /// rejections surface as errors; the router never resizes an order.
    ///
    /// # Errors
    ///
    /// Propagates venue errors that exhausted their retry policy and all
    /// fatal rejections.
    pub async fn open(
        &self,
        sizing: &SizingResult,
        preference: OrderPreference,
        params: &EffectiveParams,
        meta: &InstrumentMeta,
        volatility: Option<Decimal>,
    ) -> Result<OrderHandle, TradeError> {
        if !sizing.quantity.is_positive() {
            return Err(TradeError::config_invalid(format!(
                "order quantity {} is not positive",
                sizing.quantity
            )));
        }
        let reference_price = sizing.notional_usd / sizing.quantity.value();
        if reference_price <= Decimal::ZERO {
            return Err(TradeError::config_invalid(
                "reference price is not positive",
            ));
        }

        let side = sizing.side.entry_order();
        match preference {
            OrderPreference::Market => {
                self.market_order(&sizing.symbol, side, sizing.quantity, false, reference_price)
                    .await
            }
            OrderPreference::Limit => {
                self.limit_entry(sizing, side, params, meta, volatility, reference_price)
                    .await
            }
        }
    }

    /// Closes a position with a reduce-only market order.
    ///
    /// Cancels the linked bracket first so the exit cannot race its own
    /// sibling, then executes for `venue_size` (the size the venue
    /// reports, which is authoritative over the tracked one).
    ///
    /// # Errors
    ///
    /// Propagates venue errors from cancel-and-close after retries.
    pub async fn close(
        &self,
        position: &Position,
        venue_size: BaseQuantity,
        reason: ExitReason,
    ) -> Result<TradeResult, TradeError> {
        if let Some(algo_id) = &position.linked_exit_order_id {
            if let Err(e) = self.gateway.cancel_order(&position.symbol, algo_id).await {
                // The bracket may have been consumed or expired already;
                // the close itself still proceeds.
                tracing::warn!(
                    symbol = %position.symbol,
                    algo_order_id = %algo_id,
                    error = %e,
                    "failed to cancel linked bracket order"
                );
            }
        }

        let handle = self
            .market_order(
                &position.symbol,
                position.side.exit_order(),
                venue_size,
                true,
                position.entry_price,
            )
            .await?;

        let trade = TradeResult::from_fills(
            position,
            handle.fill_price,
            venue_size,
            self.config.commission_rate,
            Utc::now(),
            reason,
        );

        tracing::info!(
            symbol = %trade.symbol,
            reason = reason.as_str(),
            exit_price = %trade.exit_price,
            net_pnl = %trade.net_pnl,
            duration_secs = trade.duration_secs,
            "position closed"
        );

        Ok(trade)
    }

    // =========================================================================
    // Market path
    // =========================================================================

    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: BaseQuantity,
        reduce_only: bool,
        reference_price: Decimal,
    ) -> Result<OrderHandle, TradeError> {
        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Market,
            quantity,
            price: None,
            post_only: false,
            reduce_only,
            client_order_id: Uuid::new_v4().to_string(),
        };

        let submitted_at = Utc::now();
        let started = Instant::now();
        let ack = self.submit_with_retry(request).await?;
        let latency = started.elapsed();

        let fill_price = match self.await_fill(symbol, &ack).await? {
            FillWait::Filled { price } => price
                .or(ack.avg_fill_price)
                .unwrap_or(reference_price),
            FillWait::Dead => {
                return Err(TradeError::Venue(VenueError::rejected(format!(
                    "market order {} died without filling",
                    ack.order_id
                ))))
            }
            FillWait::TimedOut => {
                return Err(TradeError::Venue(VenueError::Timeout(format!(
                    "market order {} not confirmed in time",
                    ack.order_id
                ))))
            }
        };

        let handle = OrderHandle {
            order_id: ack.order_id,
            client_order_id: ack.client_order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            fill_price,
            kind: OrderKind::Market,
            latency,
            submitted_at,
        };
        self.log_fill(&handle, reference_price);
        Ok(handle)
    }

    // =========================================================================
    // Limit path
    // =========================================================================

    async fn limit_entry(
        &self,
        sizing: &SizingResult,
        side: OrderSide,
        params: &EffectiveParams,
        meta: &InstrumentMeta,
        volatility: Option<Decimal>,
        reference_price: Decimal,
    ) -> Result<OrderHandle, TradeError> {
        let symbol = &sizing.symbol;

        // Without a usable band there is nothing to compute a maker price
        // against; the signal still has to execute.
        let limits = match self.fresh_price_limits(symbol).await {
            Ok(limits) => limits,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "no price band available, routing as market");
                return self
                    .market_order(symbol, side, sizing.quantity, false, reference_price)
                    .await;
            }
        };

        let stale = limits.is_stale(self.config.price_max_age());
        let too_volatile = volatility
            .map(|v| v > self.config.max_volatility_pct)
            .unwrap_or(false);
        let post_only = self.config.prefer_maker && !stale && !too_volatile;
        if self.config.prefer_maker && !post_only {
            tracing::debug!(
                symbol = %symbol,
                stale,
                too_volatile,
                "maker-only placement disabled for this order"
            );
        }

        let offset = self.maker_offset(&limits, params);
        let raw_price = match side {
            OrderSide::Buy => limits.best_ask * (Decimal::ONE - offset),
            OrderSide::Sell => limits.best_bid * (Decimal::ONE + offset),
        };
        let price = limits.clamp(side, round_to_step(raw_price, meta.price_step, side));
        if price <= Decimal::ZERO {
            return self
                .market_order(symbol, side, sizing.quantity, false, reference_price)
                .await;
        }

        let request = OrderRequest {
            symbol: symbol.clone(),
            side,
            kind: OrderKind::Limit,
            quantity: sizing.quantity,
            price: Some(price),
            post_only,
            reduce_only: false,
            client_order_id: Uuid::new_v4().to_string(),
        };

        match self.try_limit(request.clone(), reference_price).await {
            Ok(Some(handle)) => Ok(handle),
            Ok(None) => {
                // Resting order died or timed out; take liquidity instead.
                self.market_order(symbol, side, sizing.quantity, false, reference_price)
                    .await
            }
            Err(TradeError::Venue(VenueError::PriceBand {
                max_buy, min_sell, ..
            })) => {
                self.banded_retry(
                    request,
                    side,
                    meta,
                    max_buy,
                    min_sell,
                    reference_price,
                )
                .await
            }
            Err(e) => Err(e),
        }
    }

    /// Single corrected resubmission just inside the venue band, then the
    /// mandatory market fallback.
    async fn banded_retry(
        &self,
        mut request: OrderRequest,
        side: OrderSide,
        meta: &InstrumentMeta,
        max_buy: Option<Decimal>,
        min_sell: Option<Decimal>,
        reference_price: Decimal,
    ) -> Result<OrderHandle, TradeError> {
        let corrected = match side {
            OrderSide::Buy => max_buy.map(|bound| bound - meta.price_step),
            OrderSide::Sell => min_sell.map(|bound| bound + meta.price_step),
        };

        let Some(corrected) = corrected.filter(|p| *p > Decimal::ZERO) else {
            tracing::warn!(
                symbol = %request.symbol,
                "price-band rejection carried no usable bound, routing as market"
            );
            return self
                .market_order(
                    &request.symbol,
                    side,
                    request.quantity,
                    false,
                    reference_price,
                )
                .await;
        };

        tracing::info!(
            symbol = %request.symbol,
            rejected_price = %request.price.unwrap_or_default(),
            corrected_price = %corrected,
            bound = %match side {
                OrderSide::Buy => max_buy.unwrap_or_default(),
                OrderSide::Sell => min_sell.unwrap_or_default(),
            },
            "retrying limit order just inside the venue band"
        );

        request.price = Some(corrected);
        request.client_order_id = Uuid::new_v4().to_string();

        match self.try_limit(request.clone(), reference_price).await {
            Ok(Some(handle)) => Ok(handle),
            Ok(None) => {
                self.market_order(
                    &request.symbol,
                    side,
                    request.quantity,
                    false,
                    reference_price,
                )
                .await
            }
            Err(e) => {
                // One corrected attempt only; anything after falls through
                // to market unless the failure is fatal.
                if matches!(&e, TradeError::Venue(v) if v.is_fatal()) {
                    return Err(e);
                }
                tracing::warn!(
                    symbol = %request.symbol,
                    error = %e,
                    "corrected limit retry failed, routing as market"
                );
                self.market_order(
                    &request.symbol,
                    side,
                    request.quantity,
                    false,
                    reference_price,
                )
                .await
            }
        }
    }

    /// Submits a limit order and waits out its fill window.
    ///
    /// `Ok(None)` means the order is gone without a fill (canceled,
    /// rejected post-only, or timed out and canceled) and the caller
    /// should fall back.
    async fn try_limit(
        &self,
        request: OrderRequest,
        reference_price: Decimal,
    ) -> Result<Option<OrderHandle>, TradeError> {
        let symbol = request.symbol.clone();
        let side = request.side;
        let quantity = request.quantity;
        let price = request.price.unwrap_or_default();

        let submitted_at = Utc::now();
        let started = Instant::now();
        let ack = self.submit_with_retry(request).await?;
        let latency = started.elapsed();

        match self.await_fill(&symbol, &ack).await? {
            FillWait::Filled { price: fill } => {
                let handle = OrderHandle {
                    order_id: ack.order_id,
                    client_order_id: ack.client_order_id,
                    symbol,
                    side,
                    quantity,
                    fill_price: fill.or(ack.avg_fill_price).unwrap_or(price),
                    kind: OrderKind::Limit,
                    latency,
                    submitted_at,
                };
                self.log_fill(&handle, reference_price);
                Ok(Some(handle))
            }
            FillWait::Dead => {
                tracing::debug!(symbol = %symbol, order_id = %ack.order_id, "limit order died unfilled");
                Ok(None)
            }
            FillWait::TimedOut => {
                if let Err(e) = self.gateway.cancel_order(&symbol, &ack.order_id).await {
                    tracing::warn!(
                        symbol = %symbol,
                        order_id = %ack.order_id,
                        error = %e,
                        "failed to cancel unfilled limit order"
                    );
                }
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Shared plumbing
    // =========================================================================

    /// Fetches the price band, refreshing once if the snapshot is stale.
    async fn fresh_price_limits(&self, symbol: &str) -> Result<PriceLimits, TradeError> {
        let limits = self.gateway.get_price_limits(symbol).await?;
        if limits.is_stale(self.config.price_max_age()) {
            tracing::debug!(symbol, "price snapshot stale, refreshing once");
            return Ok(self.gateway.get_price_limits(symbol).await?);
        }
        Ok(limits)
    }

    fn maker_offset(&self, limits: &PriceLimits, params: &EffectiveParams) -> Decimal {
        if !self.config.adaptive_offset {
            return params.maker_offset_pct;
        }
        let spread = limits.spread_pct();
        if spread < self.config.spread_zero_pct {
            Decimal::ZERO
        } else if spread < self.config.spread_half_pct {
            params.maker_offset_pct / Decimal::TWO
        } else {
            params.maker_offset_pct
        }
    }

    /// Submits an order, retrying transient failures with exponential
    /// backoff up to the configured attempt ceiling.
    async fn submit_with_retry(&self, request: OrderRequest) -> Result<OrderAck, TradeError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.gateway.place_order(request.clone()).await {
                Ok(ack) if ack.status == OrderStatus::Rejected => {
                    return Err(TradeError::Venue(VenueError::rejected(format!(
                        "order {} rejected by venue",
                        ack.order_id
                    ))));
                }
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let backoff = self.config.retry_base_delay() * 2u32.pow(attempt - 1);
                    // A rate-limited venue names its own wait; otherwise
                    // the exponential schedule applies.
                    let delay = match &e {
                        VenueError::RateLimit {
                            retry_after_secs: Some(secs),
                        } => backoff.max(Duration::from_secs(*secs)),
                        _ => backoff,
                    };
                    tracing::warn!(
                        symbol = %request.symbol,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient venue failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Polls until the order reaches a terminal state or the fill window
    /// closes.
    async fn await_fill(&self, symbol: &str, ack: &OrderAck) -> Result<FillWait, TradeError> {
        if ack.status == OrderStatus::Filled {
            return Ok(FillWait::Filled {
                price: ack.avg_fill_price,
            });
        }
        if matches!(ack.status, OrderStatus::Canceled | OrderStatus::Rejected) {
            return Ok(FillWait::Dead);
        }

        let deadline = Instant::now() + self.config.fill_timeout();
        loop {
            if Instant::now() >= deadline {
                return Ok(FillWait::TimedOut);
            }
            tokio::time::sleep(FILL_POLL_INTERVAL).await;

            match self.gateway.order_status(symbol, &ack.order_id).await {
                Ok(report) => match report.status {
                    OrderStatus::Filled => {
                        return Ok(FillWait::Filled {
                            price: report.avg_fill_price,
                        })
                    }
                    OrderStatus::Canceled | OrderStatus::Rejected => return Ok(FillWait::Dead),
                    OrderStatus::New | OrderStatus::PartiallyFilled => {}
                },
                Err(e) if e.is_transient() => {
                    tracing::debug!(symbol, error = %e, "transient error polling order status");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn log_fill(&self, handle: &OrderHandle, reference_price: Decimal) {
        // Positive slippage = worse than the reference for this side.
        let slippage = match handle.side {
            OrderSide::Buy => handle.fill_price - reference_price,
            OrderSide::Sell => reference_price - handle.fill_price,
        };
        tracing::info!(
            symbol = %handle.symbol,
            side = ?handle.side,
            kind = ?handle.kind,
            quantity = %handle.quantity,
            fill_price = %handle.fill_price,
            reference_price = %reference_price,
            slippage = %slippage,
            latency_ms = handle.latency.as_millis() as u64,
            client_order_id = %handle.client_order_id,
            "order filled"
        );
    }
}

/// Rounds a price onto the instrument grid, toward the passive side.
fn round_to_step(price: Decimal, step: Decimal, side: OrderSide) -> Decimal {
    if step <= Decimal::ZERO {
        return price;
    }
    let units = price / step;
    match side {
        OrderSide::Buy => units.floor() * step,
        OrderSide::Sell => units.ceil() * step,
    }
}
