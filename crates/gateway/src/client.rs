//! Venue REST client implementing the exchange capability.
//!
//! Every call waits on a token-bucket rate limiter, runs under the
//! configured request timeout, and maps transport or rejection failures to
//! typed [`VenueError`] variants so callers can apply the right retry
//! policy.

use crate::types::{
    classify_rejection, RawAccount, RawAlgoOrderAck, RawInstrument, RawOrderAck, RawPriceLimit,
    RawPositionsResponse,
};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::RwLock;
use perp_trade_core::{
    AccountState, AlgoOrderAck, BaseQuantity, ExchangeGateway, GatewayConfig, InstrumentMeta,
    OrderAck, OrderKind, OrderRequest, OrderSide, OrderStatusReport, PriceLimits, VenueError,
    VenuePosition,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST implementation of [`ExchangeGateway`].
pub struct RestGateway {
    config: GatewayConfig,
    http: Client,
    rate_limiter: Arc<DirectLimiter>,
    /// Instrument metadata cache with TTL; metadata is immutable per
    /// session but the venue can re-list instruments intraday.
    instruments: RwLock<HashMap<String, (InstrumentMeta, Instant)>>,
}

impl std::fmt::Debug for RestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGateway")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl RestGateway {
    /// Creates a gateway from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VenueError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.requests_per_minute).unwrap_or(nonzero!(60u32)),
        );
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            instruments: RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Validates a symbol for safe use in request paths.
    fn validate_symbol(symbol: &str) -> Result<&str, VenueError> {
        if symbol.is_empty() || symbol.len() > 64 {
            return Err(VenueError::rejected(format!(
                "invalid symbol length: {}",
                symbol.len()
            )));
        }
        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(VenueError::rejected(format!(
                "invalid symbol characters: {symbol}"
            )));
        }
        Ok(symbol)
    }

    fn map_transport(e: &reqwest::Error) -> VenueError {
        if e.is_timeout() {
            VenueError::Timeout(e.to_string())
        } else {
            VenueError::Network(e.to_string())
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Self::map_transport(&e))?;

        Self::handle_response(response).await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Self::map_transport(&e))?;

        Self::handle_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("DELETE {url}");

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| Self::map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status.as_u16(), &text));
        }
        Ok(())
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, VenueError> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(VenueError::RateLimit {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status.as_u16(), &text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| VenueError::malformed(e.to_string()))
    }

    fn cached_instrument(&self, symbol: &str) -> Option<InstrumentMeta> {
        let ttl = Duration::from_secs(self.config.instrument_ttl_secs);
        let cache = self.instruments.read();
        cache
            .get(symbol)
            .filter(|(_, fetched)| fetched.elapsed() < ttl)
            .map(|(meta, _)| meta.clone())
    }
}

#[async_trait]
impl ExchangeGateway for RestGateway {
    async fn get_account(&self) -> Result<AccountState, VenueError> {
        let raw: RawAccount = self.get("/api/v1/account").await?;
        raw.into_account()
    }

    async fn get_open_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<VenuePosition>, VenueError> {
        let path = match symbol {
            Some(symbol) => {
                let symbol = Self::validate_symbol(symbol)?;
                format!("/api/v1/positions?symbol={symbol}")
            }
            None => "/api/v1/positions".to_string(),
        };
        let raw: RawPositionsResponse = self.get(&path).await?;
        raw.into_positions()
    }

    async fn get_instrument(&self, symbol: &str) -> Result<InstrumentMeta, VenueError> {
        let symbol = Self::validate_symbol(symbol)?;
        if let Some(meta) = self.cached_instrument(symbol) {
            return Ok(meta);
        }

        let raw: RawInstrument = self.get(&format!("/api/v1/instruments/{symbol}")).await?;
        let meta = raw.into_meta()?;
        self.instruments
            .write()
            .insert(symbol.to_string(), (meta.clone(), Instant::now()));
        Ok(meta)
    }

    async fn get_price_limits(&self, symbol: &str) -> Result<PriceLimits, VenueError> {
        let symbol = Self::validate_symbol(symbol)?;
        let raw: RawPriceLimit = self.get(&format!("/api/v1/price-limit/{symbol}")).await?;
        raw.into_limits()
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, VenueError> {
        let symbol = Self::validate_symbol(&request.symbol)?;

        let side = match request.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let kind = match request.kind {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
        };
        let client_order_id = request.client_order_id.clone();
        let mut body = json!({
            "symbol": symbol,
            "side": side,
            "type": kind,
            "qty": request.quantity.value().to_string(),
            "post_only": request.post_only,
            "reduce_only": request.reduce_only,
            "client_order_id": request.client_order_id,
        });
        if let Some(price) = request.price {
            body["price"] = json!(price.to_string());
        }

        let raw: RawOrderAck = self.post("/api/v1/orders", &body).await?;
        raw.into_ack(client_order_id)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), VenueError> {
        let symbol = Self::validate_symbol(symbol)?;
        self.delete(&format!("/api/v1/orders/{symbol}/{order_id}"))
            .await
    }

    async fn place_bracket(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: BaseQuantity,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Result<AlgoOrderAck, VenueError> {
        let symbol = Self::validate_symbol(symbol)?;
        let side = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let body = json!({
            "symbol": symbol,
            "side": side,
            "qty": quantity.value().to_string(),
            "take_profit": take_profit.to_string(),
            "stop_loss": stop_loss.to_string(),
        });

        let raw: RawAlgoOrderAck = self.post("/api/v1/algo-orders", &body).await?;
        Ok(AlgoOrderAck {
            algo_order_id: raw.algo_order_id,
        })
    }

    async fn order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport, VenueError> {
        let symbol = Self::validate_symbol(symbol)?;
        let raw: RawOrderAck = self
            .get(&format!("/api/v1/orders/{symbol}/{order_id}"))
            .await?;
        raw.into_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: String) -> RestGateway {
        RestGateway::new(GatewayConfig {
            base_url,
            requests_per_minute: 600,
            timeout_secs: 5,
            instrument_ttl_secs: 300,
        })
        .unwrap()
    }

    fn order_request(kind: OrderKind, price: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            symbol: "BTC-PERP".to_string(),
            side: OrderSide::Buy,
            kind,
            quantity: BaseQuantity::new(dec!(0.005)),
            price,
            post_only: false,
            reduce_only: false,
            client_order_id: "cid-1".to_string(),
        }
    }

    // ==================== Symbol Validation ====================

    #[test]
    fn validate_symbol_accepts_normal_symbols() {
        assert!(RestGateway::validate_symbol("BTC-PERP").is_ok());
        assert!(RestGateway::validate_symbol("ETH_USDT").is_ok());
    }

    #[test]
    fn validate_symbol_rejects_path_traversal() {
        assert!(RestGateway::validate_symbol("../account").is_err());
        assert!(RestGateway::validate_symbol("a/b").is_err());
        assert!(RestGateway::validate_symbol("").is_err());
    }

    // ==================== Endpoint Round Trips ====================

    #[tokio::test]
    async fn account_endpoint_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balance": "1000",
                "used_margin": "100"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let account = gateway.get_account().await.unwrap();
        assert_eq!(account.balance, dec!(1000));
        assert_eq!(account.available_margin, dec!(900));
    }

    #[tokio::test]
    async fn positions_endpoint_filters_by_symbol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/positions"))
            .and(query_param("symbol", "BTC-PERP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "positions": [{
                    "symbol": "BTC-PERP",
                    "side": "long",
                    "size": "0.005",
                    "entry_price": "50000"
                }]
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let positions = gateway.get_open_positions(Some("BTC-PERP")).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size.value(), dec!(0.005));
    }

    #[tokio::test]
    async fn instrument_metadata_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/instruments/BTC-PERP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "BTC-PERP",
                "contract_value": "0.001",
                "lot_step": "0.001",
                "price_step": "0.1",
                "min_size": "0.001",
                "max_leverage": 50
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let first = gateway.get_instrument("BTC-PERP").await.unwrap();
        let second = gateway.get_instrument("BTC-PERP").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.lot_step, dec!(0.001));
    }

    #[tokio::test]
    async fn price_limits_endpoint_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/price-limit/BTC-PERP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "best_bid": "49999",
                "best_ask": "50001",
                "max_buy": "52500",
                "min_sell": "47500"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let limits = gateway.get_price_limits("BTC-PERP").await.unwrap();
        assert_eq!(limits.max_buy_price, dec!(52500));
        assert!(!limits.is_stale(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn place_order_maps_fill() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": "ord-1",
                "status": "filled",
                "filled_qty": "0.005",
                "avg_price": "50000.5"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let ack = gateway
            .place_order(order_request(OrderKind::Market, None))
            .await
            .unwrap();
        assert_eq!(ack.order_id, "ord-1");
        assert_eq!(ack.client_order_id, "cid-1");
        assert_eq!(ack.avg_fill_price, Some(dec!(50000.5)));
        assert!(ack.status.has_fills());
    }

    #[tokio::test]
    async fn price_band_rejection_carries_bounds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 30014,
                "msg": "order price exceeds limit",
                "max_buy": "100.10"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let err = gateway
            .place_order(order_request(OrderKind::Limit, Some(dec!(100.40))))
            .await
            .unwrap_err();
        match err {
            VenueError::PriceBand { max_buy, .. } => assert_eq!(max_buy, Some(dec!(100.10))),
            other => panic!("expected PriceBand, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_maps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/account"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let err = gateway.get_account().await.unwrap_err();
        match err {
            VenueError::RateLimit { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(3));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bracket_order_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/algo-orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "algo_order_id": "algo-7"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let ack = gateway
            .place_bracket(
                "BTC-PERP",
                OrderSide::Sell,
                BaseQuantity::new(dec!(0.005)),
                dec!(51500),
                dec!(49000),
            )
            .await
            .unwrap();
        assert_eq!(ack.algo_order_id, "algo-7");
    }

    #[tokio::test]
    async fn order_status_endpoint_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/orders/BTC-PERP/ord-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": "ord-1",
                "status": "partially_filled",
                "filled_qty": "0.002"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(server.uri());
        let report = gateway.order_status("BTC-PERP", "ord-1").await.unwrap();
        assert_eq!(report.filled_quantity.value(), dec!(0.002));
        assert!(!report.status.is_terminal());
    }
}
