//! Simulation input settings: trade template, rule groups, run options.

use chrono::NaiveDate;

use crate::domain::account::Account;
use crate::domain::execution::ExecutionRule;
use crate::domain::manager::ManagerConfig;
use crate::domain::market::Currency;
use crate::domain::trade_rule::TradeRule;

/// Base trade template every intent is instantiated from.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeDataSettings {
    pub underlying: String,
    pub currency: Currency,
    pub default_notional: f64,
}

/// One rule group: its declared rules plus the execution rule that sizes
/// any intent the group's open rules propose.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRuleSettings {
    pub rules: Vec<TradeRule>,
    pub execution: ExecutionRule,
}

impl TradeRuleSettings {
    pub fn open_rules(&self) -> impl Iterator<Item = &TradeRule> {
        self.rules.iter().filter(|r| !r.action.closes())
    }

    pub fn close_rules(&self) -> impl Iterator<Item = &TradeRule> {
        self.rules.iter().filter(|r| r.action.closes())
    }
}

/// What to do when a date has no snapshot or a required FX rate is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataGapPolicy {
    /// Carry prior state forward, record the gap, continue.
    #[default]
    SkipDate,
    /// Stop the run at the gap with a terminal error marker.
    Abort,
}

/// Everything one simulation run consumes.
#[derive(Debug, Clone)]
pub struct SimulationInput {
    dates: Vec<NaiveDate>,
    pub account: Account,
    pub trade_data: TradeDataSettings,
    pub rule_settings: Vec<TradeRuleSettings>,
    pub manager_configs: Vec<ManagerConfig>,
    pub data_gap_policy: DataGapPolicy,
}

impl SimulationInput {
    /// Dates are sorted and deduplicated here so the run processes a strictly
    /// increasing sequence exactly once.
    pub fn new(
        dates: Vec<NaiveDate>,
        account: Account,
        trade_data: TradeDataSettings,
        rule_settings: Vec<TradeRuleSettings>,
        manager_configs: Vec<ManagerConfig>,
        data_gap_policy: DataGapPolicy,
    ) -> Self {
        let mut dates = dates;
        dates.sort_unstable();
        dates.dedup();
        SimulationInput {
            dates,
            account,
            trade_data,
            rule_settings,
            manager_configs,
            data_gap_policy,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::comparison::{ComparisonField, Operator, Value};
    use crate::domain::execution::{Direction, Instrument, LegTemplate, SizingPolicy};
    use crate::domain::trade_rule::{Condition, ConditionLogic, RuleAction};

    fn rule(name: &str, action: RuleAction) -> TradeRule {
        TradeRule {
            name: name.into(),
            action,
            logic: ConditionLogic::All,
            conditions: vec![Condition {
                left: ComparisonField::Static {
                    value: Value::Number(1.0),
                },
                op: Operator::Eq,
                right: ComparisonField::Static {
                    value: Value::Number(1.0),
                },
            }],
        }
    }

    fn group() -> TradeRuleSettings {
        TradeRuleSettings {
            rules: vec![
                rule("enter", RuleAction::Open),
                rule("exit", RuleAction::Close),
                rule("stop", RuleAction::StopLoss),
                rule("target", RuleAction::TakeProfit),
            ],
            execution: ExecutionRule {
                sizing: SizingPolicy::FixedNotional(100.0),
                legs: vec![LegTemplate {
                    instrument: Instrument::Spot,
                    direction: Direction::Buy,
                }],
            },
        }
    }

    #[test]
    fn rule_classes_split_by_action() {
        let group = group();
        let open: Vec<&str> = group.open_rules().map(|r| r.name.as_str()).collect();
        let close: Vec<&str> = group.close_rules().map(|r| r.name.as_str()).collect();
        assert_eq!(open, vec!["enter"]);
        assert_eq!(close, vec!["exit", "stop", "target"]);
    }

    #[test]
    fn input_sorts_and_dedups_dates() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let input = SimulationInput::new(
            vec![d(3), d(1), d(2), d(1), d(3)],
            Account::new(Currency::Usd, 1000.0),
            TradeDataSettings {
                underlying: "SPX".into(),
                currency: Currency::Usd,
                default_notional: 1.0,
            },
            vec![],
            vec![],
            DataGapPolicy::SkipDate,
        );
        assert_eq!(input.dates(), &[d(1), d(2), d(3)]);
    }

    #[test]
    fn gap_policy_defaults_to_skip() {
        assert_eq!(DataGapPolicy::default(), DataGapPolicy::SkipDate);
    }
}
