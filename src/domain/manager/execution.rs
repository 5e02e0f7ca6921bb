//! Execution manager: fill algorithm and slippage applied to quoted prices.

use crate::domain::execution::Direction;
use crate::domain::manager::ExecutionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAlgorithm {
    /// One fill at the quoted price moved by the full slippage.
    Immediate,
    /// Sliced fill averaging toward the quote; half the configured slippage.
    Vwap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    pub algorithm: FillAlgorithm,
    /// Slippage in percent of the quoted price.
    pub slippage_pct: f64,
}

pub struct FillManager {
    config: ExecutionConfig,
}

impl FillManager {
    pub fn new(config: ExecutionConfig) -> Self {
        FillManager { config }
    }

    fn effective_slippage(&self) -> f64 {
        match self.config.algorithm {
            FillAlgorithm::Immediate => self.config.slippage_pct,
            FillAlgorithm::Vwap => self.config.slippage_pct / 2.0,
        }
    }
}

impl ExecutionManager for FillManager {
    /// Slippage always worsens the fill: buys pay up, sells receive less.
    fn fill_price(&self, direction: Direction, quoted: f64) -> f64 {
        let slip = self.effective_slippage() / 100.0;
        match direction {
            Direction::Buy => quoted * (1.0 + slip),
            Direction::Sell => quoted * (1.0 - slip),
        }
    }
}
