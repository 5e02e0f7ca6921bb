//! Pluggable policy managers and their typed configurations.
//!
//! Each manager kind exposes one capability trait covering only the phase
//! hooks relevant to it. Typed configs are converted once at run start into
//! live boxed managers and invoked in a fixed phase order per date:
//! `pre-data -> pre-execution (portfolio, then risk) -> execution ->
//! post-execution (stream)`. A kind absent from configuration is a no-op at
//! its phase.

pub mod execution;
pub mod market_data;
pub mod portfolio;
pub mod risk;
pub mod stream;

pub use execution::{ExecutionConfig, FillAlgorithm, FillManager};
pub use market_data::{FieldTransform, MarketDataConfig, TransformManager};
pub use portfolio::{AllocationManager, PortfolioConfig};
pub use risk::{ExposureManager, RiskConfig};
pub use stream::{RollInterval, RollManager, StreamConfig};

use chrono::NaiveDate;

use crate::domain::account::Account;
use crate::domain::execution::Direction;
use crate::domain::market::MarketSnapshot;
use crate::domain::schedule::{TradeId, TradeSchedule, TransitionReason};
use crate::domain::trade_rule::TradeIntent;

/// Read-only state a pre-execution review sees.
pub struct ReviewContext<'a> {
    pub account: &'a Account,
    pub schedule: &'a TradeSchedule,
    pub snapshot: &'a MarketSnapshot,
}

/// Outcome of a portfolio or risk review of one intent.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentDecision {
    Accept,
    /// Cap the intent's notional at the given value.
    Resize(f64),
    Veto(TransitionReason),
}

/// Shapes or augments the market snapshot before rule evaluation.
pub trait MarketDataManager {
    fn shape(&mut self, snapshot: &mut MarketSnapshot);
}

/// Chooses the fill algorithm applied to quoted prices.
pub trait ExecutionManager {
    fn fill_price(&self, direction: Direction, quoted: f64) -> f64;
}

/// Enforces allocation constraints on candidate intents.
pub trait PortfolioManager {
    fn review(&self, intent: &TradeIntent, notional: f64, ctx: &ReviewContext<'_>)
        -> IntentDecision;
}

/// Enforces risk limits on candidate intents.
pub trait RiskManager {
    fn review(&self, intent: &TradeIntent, notional: f64, ctx: &ReviewContext<'_>)
        -> IntentDecision;
}

/// A roll the stream manager wants applied to an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollDirective {
    pub trade_id: TradeId,
    pub new_expiry: Option<NaiveDate>,
}

/// Decides when open positions roll into replacements.
pub trait StreamManager {
    fn rolls_due(&self, date: NaiveDate, schedule: &TradeSchedule) -> Vec<RollDirective>;
}

/// One typed configuration per manager kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerConfig {
    MarketData(MarketDataConfig),
    Execution(ExecutionConfig),
    Portfolio(PortfolioConfig),
    Risk(RiskConfig),
    Stream(StreamConfig),
}

/// The live manager chain for one run. Constructed once from the configs;
/// the last config of a kind wins.
#[derive(Default)]
pub struct ManagerSet {
    pub market_data: Option<Box<dyn MarketDataManager>>,
    pub execution: Option<Box<dyn ExecutionManager>>,
    pub portfolio: Option<Box<dyn PortfolioManager>>,
    pub risk: Option<Box<dyn RiskManager>>,
    pub stream: Option<Box<dyn StreamManager>>,
}

impl ManagerSet {
    pub fn from_configs(configs: &[ManagerConfig]) -> Self {
        let mut set = ManagerSet::default();
        for config in configs {
            match config {
                ManagerConfig::MarketData(cfg) => {
                    set.market_data = Some(Box::new(TransformManager::new(cfg.clone())));
                }
                ManagerConfig::Execution(cfg) => {
                    set.execution = Some(Box::new(FillManager::new(*cfg)));
                }
                ManagerConfig::Portfolio(cfg) => {
                    set.portfolio = Some(Box::new(AllocationManager::new(*cfg)));
                }
                ManagerConfig::Risk(cfg) => {
                    set.risk = Some(Box::new(ExposureManager::new(*cfg)));
                }
                ManagerConfig::Stream(cfg) => {
                    set.stream = Some(Box::new(RollManager::new(*cfg)));
                }
            }
        }
        set
    }
}
