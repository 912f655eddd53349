pub mod config;
pub mod config_loader;
pub mod error;
pub mod market;
pub mod quantity;
pub mod signal;
pub mod trade;
pub mod traits;

pub use config::{
    AppConfig, BalanceTier, BreakerConfig, EffectiveParams, GatewayConfig, MonitorConfig,
    NotionalBasis, OrderConfig, Overrides, RiskProfile, SizingConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{Result, TradeError, VenueError};
pub use market::{
    AccountState, AlgoOrderAck, InstrumentMeta, OrderAck, OrderKind, OrderRequest, OrderSide,
    OrderStatus, OrderStatusReport, PositionSide, PriceLimits, VenuePosition,
};
pub use quantity::{BaseQuantity, ContractQuantity};
pub use signal::{Confidence, Regime, Signal};
pub use trade::{ExitReason, Position, SizingResult, TradeResult};
pub use traits::{ExchangeGateway, TradeRecorder};
