//! Venue REST integration for the perp trading client.
//!
//! This crate provides:
//! - A rate-limited REST client implementing the `ExchangeGateway` trait
//! - Conversion of raw venue payloads into core domain types
//! - Classification of venue rejections into the typed error taxonomy,
//!   including price-band bound extraction for corrected retries
//!
//! # Example
//!
//! ```ignore
//! use perp_trade_core::{ExchangeGateway, GatewayConfig};
//! use perp_trade_gateway::RestGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = RestGateway::new(GatewayConfig::default())?;
//!
//!     let account = gateway.get_account().await?;
//!     println!("balance: {}", account.balance);
//!
//!     let limits = gateway.get_price_limits("BTC-PERP").await?;
//!     println!("band: [{}, {}]", limits.min_sell_price, limits.max_buy_price);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error handling
//!
//! Non-2xx responses are decoded into `VenueError` variants with distinct
//! retry policies: rate limits and timeouts are transient, price-band and
//! min-size rejections carry enough context for a corrected resubmission,
//! and insufficient-balance or malformed payloads are fatal.

pub mod client;
mod types;

pub use client::RestGateway;
