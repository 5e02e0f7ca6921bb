//! Portfolio manager: allocation constraints on candidate intents.

use crate::domain::manager::{IntentDecision, PortfolioManager, ReviewContext};
use crate::domain::schedule::TransitionReason;
use crate::domain::trade_rule::TradeIntent;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortfolioConfig {
    /// Veto intents once this many positions are open.
    pub max_open_positions: Option<usize>,
    /// Cap a single intent's notional at this fraction of account cash.
    pub max_allocation_pct: Option<f64>,
}

pub struct AllocationManager {
    config: PortfolioConfig,
}

impl AllocationManager {
    pub fn new(config: PortfolioConfig) -> Self {
        AllocationManager { config }
    }
}

impl PortfolioManager for AllocationManager {
    fn review(
        &self,
        _intent: &TradeIntent,
        notional: f64,
        ctx: &ReviewContext<'_>,
    ) -> IntentDecision {
        if let Some(max_open) = self.config.max_open_positions {
            let open = ctx.schedule.open_ids().len();
            if open >= max_open {
                return IntentDecision::Veto(TransitionReason::PortfolioVeto(format!(
                    "{open} positions open, limit {max_open}"
                )));
            }
        }

        if let Some(pct) = self.config.max_allocation_pct {
            let cap = ctx.account.cash_balance() * pct;
            if notional > cap {
                return IntentDecision::Resize(cap);
            }
        }

        IntentDecision::Accept
    }
}
