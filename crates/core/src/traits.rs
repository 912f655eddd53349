//! Capability traits at the engine's seams.

use crate::error::VenueError;
use crate::market::{
    AccountState, AlgoOrderAck, InstrumentMeta, OrderAck, OrderRequest, OrderSide,
    OrderStatusReport, PriceLimits, VenuePosition,
};
use crate::quantity::BaseQuantity;
use crate::trade::TradeResult;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// The venue's REST/WebSocket surface, consumed by the engine.
///
/// Every method is an awaited I/O operation with a bounded timeout;
/// implementations map transport failures to [`VenueError`] variants so the
/// caller can apply the right retry policy.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn get_account(&self) -> Result<AccountState, VenueError>;

    async fn get_open_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<VenuePosition>, VenueError>;

    async fn get_instrument(&self, symbol: &str) -> Result<InstrumentMeta, VenueError>;

    async fn get_price_limits(&self, symbol: &str) -> Result<PriceLimits, VenueError>;

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, VenueError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), VenueError>;

    /// Places a linked take-profit + stop-loss pair for an open position.
    async fn place_bracket(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: BaseQuantity,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Result<AlgoOrderAck, VenueError>;

    async fn order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport, VenueError>;
}

/// Downstream sink for terminal trade records (ledger, CSV, database).
///
/// The engine emits each [`TradeResult`] exactly once; durable storage is
/// the recorder's problem.
#[async_trait]
pub trait TradeRecorder: Send + Sync {
    async fn record(&self, trade: &TradeResult);
}
