//! Position sizing, order routing, and position lifecycle management.
//!
//! The engine turns upstream trading signals into risk-bounded, monitored
//! venue positions:
//!
//! - [`RiskSizer`] converts balance, leverage, and market regime into a
//!   margin-safe, exchange-compliant order size
//! - [`OrderRouter`] gets the order filled, correcting prices into the
//!   venue band and falling back between maker and taker execution
//! - [`PositionMonitor`] owns open positions and closes them on bracket
//!   fills, early profit harvests, or holding-time limits
//! - [`CircuitBreaker`] suspends entries per symbol after repeated losses
//!   and globally on drawdown or emergency stop
//! - [`TradingEngine`] wires the four together behind one
//!   `handle_signal` call
//!
//! # Example
//!
//! ```ignore
//! use perp_trade_core::{ConfigLoader, Signal};
//! use perp_trade_execution::{OrderPreference, TradingEngine};
//! use perp_trade_gateway::RestGateway;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let gateway = Arc::new(RestGateway::new(config.gateway.clone())?);
//!     let engine = TradingEngine::new(gateway, config, None)?;
//!     let _monitor = engine.spawn_monitor();
//!
//!     let signal: Signal = todo!("receive from the signal producer");
//!     let position = engine.handle_signal(&signal, OrderPreference::Limit).await?;
//!     println!("opened {} at {}", position.symbol, position.entry_price);
//!
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod engine;
pub mod monitor;
pub mod router;
pub mod sizer;

#[cfg(test)]
pub(crate) mod testutil;

pub use breaker::CircuitBreaker;
pub use engine::TradingEngine;
pub use monitor::PositionMonitor;
pub use router::{OrderHandle, OrderPreference, OrderRouter};
pub use sizer::RiskSizer;
