//! Pre-run input validation.
//!
//! Everything here fails before the first simulated date: malformed rules,
//! impossible sizings and inconsistent settings are configuration errors,
//! never mid-run surprises.

use std::collections::BTreeSet;

use crate::domain::error::TradesimError;
use crate::domain::execution::SizingPolicy;
use crate::domain::settings::SimulationInput;

pub fn validate_input(input: &SimulationInput) -> Result<(), TradesimError> {
    if input.account.initial_balance <= 0.0 {
        return Err(TradesimError::ConfigInvalid {
            section: "account".into(),
            key: "initial_balance".into(),
            reason: "initial balance must be positive".into(),
        });
    }
    if input.trade_data.default_notional <= 0.0 {
        return Err(TradesimError::ConfigInvalid {
            section: "trade".into(),
            key: "notional".into(),
            reason: "default notional must be positive".into(),
        });
    }

    let mut open_rule_names: BTreeSet<&str> = BTreeSet::new();
    for (index, group) in input.rule_settings.iter().enumerate() {
        for rule in &group.rules {
            rule.validate()?;
        }
        if group.open_rules().next().is_none() {
            return Err(TradesimError::ConfigInvalid {
                section: format!("group {index}"),
                key: "rules".into(),
                reason: "group declares no open rule".into(),
            });
        }
        for rule in group.open_rules() {
            if !open_rule_names.insert(&rule.name) {
                return Err(TradesimError::ConfigInvalid {
                    section: format!("group {index}"),
                    key: "rules".into(),
                    reason: format!("duplicate open rule name '{}'", rule.name),
                });
            }
        }

        if group.execution.legs.is_empty() {
            return Err(TradesimError::ConfigInvalid {
                section: format!("group {index}"),
                key: "legs".into(),
                reason: "execution rule has no legs".into(),
            });
        }
        validate_sizing(index, group.execution.sizing)?;
    }
    Ok(())
}

fn validate_sizing(index: usize, sizing: SizingPolicy) -> Result<(), TradesimError> {
    let invalid = |reason: String| TradesimError::ConfigInvalid {
        section: format!("group {index}"),
        key: "sizing".into(),
        reason,
    };
    match sizing {
        SizingPolicy::FixedNotional(notional) if notional <= 0.0 => Err(invalid(format!(
            "fixed notional must be positive, got {notional}"
        ))),
        SizingPolicy::PercentOfAccount(pct) if pct <= 0.0 || pct > 1.0 => Err(invalid(format!(
            "account percentage must be in (0, 1], got {pct}"
        ))),
        SizingPolicy::SpreadTarget {
            reference_notional, ..
        } if reference_notional <= 0.0 => Err(invalid(format!(
            "spread reference notional must be positive, got {reference_notional}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Account;
    use crate::domain::comparison::{ComparisonField, Operator, Value};
    use crate::domain::execution::{Direction, ExecutionRule, Instrument, LegTemplate};
    use crate::domain::market::Currency;
    use crate::domain::settings::{DataGapPolicy, TradeDataSettings, TradeRuleSettings};
    use crate::domain::trade_rule::{Condition, ConditionLogic, RuleAction, TradeRule};

    fn rule(name: &str) -> TradeRule {
        TradeRule {
            name: name.into(),
            action: RuleAction::Open,
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

    fn group(rule_name: &str, sizing: SizingPolicy) -> TradeRuleSettings {
        TradeRuleSettings {
            rules: vec![rule(rule_name)],
            execution: ExecutionRule {
                sizing,
                legs: vec![LegTemplate {
                    instrument: Instrument::Spot,
                    direction: Direction::Buy,
                }],
            },
        }
    }

    fn input(groups: Vec<TradeRuleSettings>) -> SimulationInput {
        SimulationInput::new(
            vec![],
            Account::new(Currency::Usd, 1_000_000.0),
            TradeDataSettings {
                underlying: "SPX".into(),
                currency: Currency::Usd,
                default_notional: 100.0,
            },
            groups,
            vec![],
            DataGapPolicy::SkipDate,
        )
    }

    #[test]
    fn valid_input_passes() {
        let input = input(vec![group("dip", SizingPolicy::FixedNotional(100.0))]);
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn non_positive_balance_fails() {
        let mut input = input(vec![group("dip", SizingPolicy::FixedNotional(100.0))]);
        input.account = Account::new(Currency::Usd, 0.0);
        assert!(matches!(
            validate_input(&input).unwrap_err(),
            TradesimError::ConfigInvalid { .. }
        ));
    }

    #[test]
    fn duplicate_open_rule_names_fail() {
        let input = input(vec![
            group("dip", SizingPolicy::FixedNotional(100.0)),
            group("dip", SizingPolicy::FixedNotional(200.0)),
        ]);
        let err = validate_input(&input).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn group_without_open_rule_fails() {
        let mut bad = group("dip", SizingPolicy::FixedNotional(100.0));
        bad.rules[0].action = RuleAction::Close;
        let err = validate_input(&input(vec![bad])).unwrap_err();
        assert!(err.to_string().contains("no open rule"));
    }

    #[test]
    fn empty_legs_fail() {
        let mut bad = group("dip", SizingPolicy::FixedNotional(100.0));
        bad.execution.legs.clear();
        let err = validate_input(&input(vec![bad])).unwrap_err();
        assert!(err.to_string().contains("no legs"));
    }

    #[test]
    fn sizing_bounds() {
        for sizing in [
            SizingPolicy::FixedNotional(0.0),
            SizingPolicy::FixedNotional(-5.0),
            SizingPolicy::PercentOfAccount(0.0),
            SizingPolicy::PercentOfAccount(1.5),
            SizingPolicy::SpreadTarget {
                target_cost: 0.0,
                reference_notional: 0.0,
            },
        ] {
            let err = validate_input(&input(vec![group("dip", sizing)])).unwrap_err();
            assert!(
                matches!(err, TradesimError::ConfigInvalid { .. }),
                "sizing {sizing:?} should be rejected"
            );
        }

        assert!(validate_input(&input(vec![group(
            "dip",
            SizingPolicy::PercentOfAccount(1.0)
        )]))
        .is_ok());
    }

    #[test]
    fn malformed_rule_arity_fails() {
        let mut bad = group("dip", SizingPolicy::FixedNotional(100.0));
        bad.rules[0].logic = ConditionLogic::Xor;
        let err = validate_input(&input(vec![bad])).unwrap_err();
        assert!(matches!(err, TradesimError::RuleInvalid { .. }));
    }
}
