//! Scripted in-memory gateway for exercising the engine without a venue.

use async_trait::async_trait;
use parking_lot::Mutex;
use perp_trade_core::{
    AccountState, AlgoOrderAck, BaseQuantity, ExchangeGateway, InstrumentMeta, OrderAck,
    OrderRequest, OrderSide, OrderStatus, OrderStatusReport, PriceLimits, TradeRecorder,
    TradeResult, VenueError, VenuePosition,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Gateway double whose responses are scripted per call.
///
/// Queues are consumed front-to-back; when a queue is empty the mock falls
/// back to a benign default (an instant fill at the default price) so
/// tests only script the calls they care about.
pub(crate) struct MockGateway {
    account: Mutex<AccountState>,
    instrument: Mutex<InstrumentMeta>,
    limits: Mutex<PriceLimits>,
    limit_errors: Mutex<VecDeque<VenueError>>,
    place_results: Mutex<VecDeque<Result<OrderAck, VenueError>>>,
    placed: Mutex<Vec<OrderRequest>>,
    status_results: Mutex<VecDeque<Result<OrderStatusReport, VenueError>>>,
    held_orders: Mutex<HashSet<String>>,
    cancels: Mutex<Vec<(String, String)>>,
    brackets: Mutex<Vec<(String, OrderSide, BaseQuantity, Decimal, Decimal)>>,
    bracket_errors: Mutex<VecDeque<VenueError>>,
    positions: Mutex<Vec<VenuePosition>>,
    default_fill_price: Mutex<Decimal>,
    order_seq: AtomicU64,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        Self {
            account: Mutex::new(AccountState::new(dec!(1000), Decimal::ZERO)),
            instrument: Mutex::new(InstrumentMeta {
                symbol: "BTC-PERP".to_string(),
                contract_value: dec!(1),
                lot_step: dec!(0.001),
                price_step: dec!(0.01),
                min_size: dec!(0.001),
                max_leverage: 50,
            }),
            limits: Mutex::new(PriceLimits {
                best_bid: dec!(49999),
                best_ask: dec!(50001),
                max_buy_price: dec!(52500),
                min_sell_price: dec!(47500),
                as_of: Instant::now(),
            }),
            limit_errors: Mutex::new(VecDeque::new()),
            place_results: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            status_results: Mutex::new(VecDeque::new()),
            held_orders: Mutex::new(HashSet::new()),
            cancels: Mutex::new(Vec::new()),
            brackets: Mutex::new(Vec::new()),
            bracket_errors: Mutex::new(VecDeque::new()),
            positions: Mutex::new(Vec::new()),
            default_fill_price: Mutex::new(dec!(50000)),
            order_seq: AtomicU64::new(1),
        }
    }

    fn next_order_id(&self) -> String {
        format!("ord-{}", self.order_seq.fetch_add(1, Ordering::SeqCst))
    }

    // ==================== Scripting ====================

    pub(crate) fn set_account(&self, balance: Decimal, used_margin: Decimal) {
        *self.account.lock() = AccountState::new(balance, used_margin);
    }

    pub(crate) fn set_limits(
        &self,
        best_bid: Decimal,
        best_ask: Decimal,
        max_buy: Decimal,
        min_sell: Decimal,
    ) {
        *self.limits.lock() = PriceLimits {
            best_bid,
            best_ask,
            max_buy_price: max_buy,
            min_sell_price: min_sell,
            as_of: Instant::now(),
        };
    }

    pub(crate) fn fail_limits(&self, error: VenueError) {
        self.limit_errors.lock().push_back(error);
    }

    /// Queues an instantly-filled order at the given price.
    pub(crate) fn push_fill(&self, price: Decimal) {
        let order_id = self.next_order_id();
        self.place_results.lock().push_back(Ok(OrderAck {
            order_id,
            client_order_id: String::new(),
            status: OrderStatus::Filled,
            filled_quantity: BaseQuantity::ZERO,
            avg_fill_price: Some(price),
        }));
    }

    /// Queues a resting (unfilled) acknowledgement with a fixed id.
    pub(crate) fn push_resting(&self, order_id: &str) {
        self.place_results.lock().push_back(Ok(OrderAck {
            order_id: order_id.to_string(),
            client_order_id: String::new(),
            status: OrderStatus::New,
            filled_quantity: BaseQuantity::ZERO,
            avg_fill_price: None,
        }));
    }

    pub(crate) fn push_place_error(&self, error: VenueError) {
        self.place_results.lock().push_back(Err(error));
    }

    pub(crate) fn push_status(&self, report: OrderStatusReport) {
        self.status_results.lock().push_back(Ok(report));
    }

    /// Makes status polls for this order report it unfilled forever.
    pub(crate) fn hold_status(&self, order_id: &str) {
        self.held_orders.lock().insert(order_id.to_string());
    }

    pub(crate) fn set_positions(&self, positions: Vec<VenuePosition>) {
        *self.positions.lock() = positions;
    }

    pub(crate) fn fail_bracket(&self, error: VenueError) {
        self.bracket_errors.lock().push_back(error);
    }

    // ==================== Assertions ====================

    pub(crate) fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }

    pub(crate) fn cancels(&self) -> Vec<(String, String)> {
        self.cancels.lock().clone()
    }

    pub(crate) fn brackets(&self) -> Vec<(String, OrderSide, BaseQuantity, Decimal, Decimal)> {
        self.brackets.lock().clone()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_account(&self) -> Result<AccountState, VenueError> {
        Ok(*self.account.lock())
    }

    async fn get_open_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<VenuePosition>, VenueError> {
        let positions = self.positions.lock().clone();
        Ok(match symbol {
            Some(symbol) => positions.into_iter().filter(|p| p.symbol == symbol).collect(),
            None => positions,
        })
    }

    async fn get_instrument(&self, _symbol: &str) -> Result<InstrumentMeta, VenueError> {
        Ok(self.instrument.lock().clone())
    }

    async fn get_price_limits(&self, _symbol: &str) -> Result<PriceLimits, VenueError> {
        if let Some(error) = self.limit_errors.lock().pop_front() {
            return Err(error);
        }
        Ok(*self.limits.lock())
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, VenueError> {
        self.placed.lock().push(request.clone());
        match self.place_results.lock().pop_front() {
            Some(Ok(mut ack)) => {
                ack.client_order_id = request.client_order_id;
                ack.filled_quantity = request.quantity;
                Ok(ack)
            }
            Some(Err(error)) => Err(error),
            None => Ok(OrderAck {
                order_id: self.next_order_id(),
                client_order_id: request.client_order_id,
                status: OrderStatus::Filled,
                filled_quantity: request.quantity,
                avg_fill_price: Some(*self.default_fill_price.lock()),
            }),
        }
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), VenueError> {
        self.cancels
            .lock()
            .push((symbol.to_string(), order_id.to_string()));
        Ok(())
    }

    async fn place_bracket(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: BaseQuantity,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Result<AlgoOrderAck, VenueError> {
        if let Some(error) = self.bracket_errors.lock().pop_front() {
            return Err(error);
        }
        self.brackets
            .lock()
            .push((symbol.to_string(), side, quantity, take_profit, stop_loss));
        Ok(AlgoOrderAck {
            algo_order_id: format!("algo-{}", self.order_seq.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn order_status(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport, VenueError> {
        if self.held_orders.lock().contains(order_id) {
            return Ok(OrderStatusReport {
                order_id: order_id.to_string(),
                status: OrderStatus::New,
                filled_quantity: BaseQuantity::ZERO,
                avg_fill_price: None,
            });
        }
        match self.status_results.lock().pop_front() {
            Some(result) => result,
            None => Ok(OrderStatusReport {
                order_id: order_id.to_string(),
                status: OrderStatus::Filled,
                filled_quantity: BaseQuantity::ZERO,
                avg_fill_price: Some(*self.default_fill_price.lock()),
            }),
        }
    }
}

/// Recorder double that keeps every emitted trade for assertions.
#[derive(Default)]
pub(crate) struct RecordingSink {
    trades: Mutex<Vec<TradeResult>>,
}

impl RecordingSink {
    pub(crate) fn trades(&self) -> Vec<TradeResult> {
        self.trades.lock().clone()
    }
}

#[async_trait]
impl TradeRecorder for RecordingSink {
    async fn record(&self, trade: &TradeResult) {
        self.trades.lock().push(trade.clone());
    }
}
