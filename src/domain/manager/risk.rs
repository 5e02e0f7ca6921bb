//! Risk manager: position-size and exposure limits on candidate intents.

use crate::domain::manager::{IntentDecision, ReviewContext, RiskManager};
use crate::domain::schedule::TransitionReason;
use crate::domain::trade_rule::TradeIntent;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskConfig {
    /// Veto any single intent sized above this notional.
    pub max_position_notional: Option<f64>,
    /// Clamp intents so open notional across all positions stays under this;
    /// veto when no headroom remains.
    pub max_total_exposure: Option<f64>,
}

pub struct ExposureManager {
    config: RiskConfig,
}

impl ExposureManager {
    pub fn new(config: RiskConfig) -> Self {
        ExposureManager { config }
    }
}

impl RiskManager for ExposureManager {
    fn review(
        &self,
        _intent: &TradeIntent,
        notional: f64,
        ctx: &ReviewContext<'_>,
    ) -> IntentDecision {
        if let Some(max_notional) = self.config.max_position_notional {
            if notional > max_notional {
                return IntentDecision::Veto(TransitionReason::RiskViolation(format!(
                    "position notional {notional} exceeds limit {max_notional}"
                )));
            }
        }

        if let Some(max_exposure) = self.config.max_total_exposure {
            let open_exposure: f64 = ctx
                .schedule
                .open_ids()
                .iter()
                .filter_map(|id| ctx.schedule.record(*id).ok())
                .map(|r| r.notional)
                .sum();
            let headroom = max_exposure - open_exposure;
            if headroom <= 0.0 {
                return IntentDecision::Veto(TransitionReason::RiskViolation(format!(
                    "open exposure {open_exposure} already at limit {max_exposure}"
                )));
            }
            if notional > headroom {
                return IntentDecision::Resize(headroom);
            }
        }

        IntentDecision::Accept
    }
}
