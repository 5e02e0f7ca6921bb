//! Trade rules: conditions, combinators and per-date intent proposal.
//!
//! A rule is a named set of [`Condition`]s joined by a combinator, classed by
//! the action it drives (open a trade, or close / stop out / take profit on
//! an open one). Rules never mutate state; proposing is a pure function of
//! the evaluation context to zero-or-one intent per open rule per date,
//! emitted in declaration order.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::domain::comparison::{compare, ComparisonField, EvalContext, Operator};
use crate::domain::error::TradesimError;
use crate::domain::market::Currency;
use crate::domain::settings::TradeRuleSettings;

/// What a triggered rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Open,
    Close,
    StopLoss,
    TakeProfit,
}

impl RuleAction {
    /// Close-class actions apply to open positions rather than proposing new
    /// trades.
    pub fn closes(&self) -> bool {
        matches!(
            self,
            RuleAction::Close | RuleAction::StopLoss | RuleAction::TakeProfit
        )
    }
}

/// How a rule's conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionLogic {
    /// Every condition must hold (short-circuits on the first false).
    All,
    /// At least one condition must hold (short-circuits on the first true).
    Any,
    /// Exactly one condition, negated.
    Not,
    /// Exactly two conditions, exclusive-or.
    Xor,
}

/// A single relational check between two resolved fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: ComparisonField,
    pub op: Operator,
    pub right: ComparisonField,
}

impl Condition {
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<bool, TradesimError> {
        let left = self.left.resolve(ctx)?;
        let right = self.right.resolve(ctx)?;
        compare(&left, self.op, &right)
    }
}

/// A named, action-classed rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRule {
    pub name: String,
    pub action: RuleAction,
    pub logic: ConditionLogic,
    pub conditions: Vec<Condition>,
}

impl TradeRule {
    /// Arity and shape checks, run before the simulation starts.
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.conditions.is_empty() {
            return Err(TradesimError::RuleInvalid {
                rule: self.name.clone(),
                reason: "rule has no conditions".into(),
            });
        }
        match self.logic {
            ConditionLogic::Not if self.conditions.len() != 1 => Err(TradesimError::RuleInvalid {
                rule: self.name.clone(),
                reason: format!(
                    "NOT requires exactly one condition, found {}",
                    self.conditions.len()
                ),
            }),
            ConditionLogic::Xor if self.conditions.len() != 2 => Err(TradesimError::RuleInvalid {
                rule: self.name.clone(),
                reason: format!(
                    "XOR requires exactly two conditions, found {}",
                    self.conditions.len()
                ),
            }),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<bool, TradesimError> {
        match self.logic {
            ConditionLogic::All => {
                for condition in &self.conditions {
                    if !condition.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionLogic::Any => {
                for condition in &self.conditions {
                    if condition.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConditionLogic::Not => {
                self.validate()?;
                Ok(!self.conditions[0].evaluate(ctx)?)
            }
            ConditionLogic::Xor => {
                self.validate()?;
                let a = self.conditions[0].evaluate(ctx)?;
                let b = self.conditions[1].evaluate(ctx)?;
                Ok(a ^ b)
            }
        }
    }
}

/// A proposed trade awaiting manager review and execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    /// Name of the rule that fired.
    pub rule: String,
    /// Index of the rule group whose execution rule sizes this intent.
    pub group: usize,
    pub date: NaiveDate,
    pub underlying: String,
    pub currency: Currency,
    /// Set by portfolio/risk resize; overrides the sizing policy's notional.
    pub notional_override: Option<f64>,
}

/// A rule disabled mid-run by an evaluation error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFailure {
    pub rule: String,
    pub date: NaiveDate,
    pub error: String,
}

/// Evaluate every enabled open-class rule for one date.
///
/// Intents come out in declaration order: group order first, rule order
/// within the group. A rule that fails to evaluate is reported once and must
/// be disabled by the caller for the rest of the run; the remaining rules
/// continue.
pub fn propose_intents(
    groups: &[TradeRuleSettings],
    disabled: &BTreeSet<String>,
    ctx: &EvalContext<'_>,
) -> (Vec<TradeIntent>, Vec<RuleFailure>) {
    let mut intents = Vec::new();
    let mut failures = Vec::new();

    for (group_index, group) in groups.iter().enumerate() {
        for rule in group.open_rules() {
            if disabled.contains(&rule.name) {
                continue;
            }
            match rule.evaluate(ctx) {
                Ok(true) => intents.push(TradeIntent {
                    rule: rule.name.clone(),
                    group: group_index,
                    date: ctx.date,
                    underlying: ctx.base_trade.underlying.clone(),
                    currency: ctx.base_trade.currency,
                    notional_override: None,
                }),
                Ok(false) => {}
                Err(err) => failures.push(RuleFailure {
                    rule: rule.name.clone(),
                    date: ctx.date,
                    error: err.to_string(),
                }),
            }
        }
    }

    (intents, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Account;
    use crate::domain::comparison::Value;
    use crate::domain::execution::{Direction, ExecutionRule, Instrument, LegTemplate, SizingPolicy};
    use crate::domain::market::{MarketSnapshot, SPOT_PRICE};
    use crate::domain::schedule::TradeSchedule;
    use crate::domain::settings::TradeDataSettings;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn price_below(name: &str, limit: f64) -> TradeRule {
        TradeRule {
            name: name.into(),
            action: RuleAction::Open,
            logic: ConditionLogic::All,
            conditions: vec![Condition {
                left: ComparisonField::Market {
                    field: SPOT_PRICE.into(),
                },
                op: Operator::Lt,
                right: ComparisonField::Static {
                    value: Value::Number(limit),
                },
            }],
        }
    }

    fn spot_group(rules: Vec<TradeRule>) -> TradeRuleSettings {
        TradeRuleSettings {
            rules,
            execution: ExecutionRule {
                sizing: SizingPolicy::FixedNotional(100.0),
                legs: vec![LegTemplate {
                    instrument: Instrument::Spot,
                    direction: Direction::Buy,
                }],
            },
        }
    }

    struct Fixture {
        snapshot: MarketSnapshot,
        account: Account,
        schedule: TradeSchedule,
        base_trade: TradeDataSettings,
    }

    impl Fixture {
        fn at_price(price: f64) -> Self {
            Fixture {
                snapshot: MarketSnapshot::new(date()).with_value(SPOT_PRICE, price),
                account: Account::new(Currency::Usd, 1_000_000.0),
                schedule: TradeSchedule::new(),
                base_trade: TradeDataSettings {
                    underlying: "SPX".into(),
                    currency: Currency::Usd,
                    default_notional: 100.0,
                },
            }
        }

        fn ctx(&self) -> EvalContext<'_> {
            EvalContext {
                date: date(),
                snapshot: &self.snapshot,
                account: &self.account,
                schedule: &self.schedule,
                base_trade: &self.base_trade,
            }
        }
    }

    #[test]
    fn all_logic_short_circuits() {
        let fx = Fixture::at_price(49.0);
        let mut rule = price_below("dip", 50.0);
        rule.conditions.push(Condition {
            left: ComparisonField::Market {
                field: SPOT_PRICE.into(),
            },
            op: Operator::Gt,
            right: ComparisonField::Static {
                value: Value::Number(40.0),
            },
        });
        assert!(rule.evaluate(&fx.ctx()).unwrap());

        rule.conditions[1].op = Operator::Lt;
        assert!(!rule.evaluate(&fx.ctx()).unwrap());
    }

    #[test]
    fn any_logic() {
        let fx = Fixture::at_price(49.0);
        let rule = TradeRule {
            name: "either".into(),
            action: RuleAction::Open,
            logic: ConditionLogic::Any,
            conditions: vec![
                price_below("a", 10.0).conditions.remove(0),
                price_below("b", 50.0).conditions.remove(0),
            ],
        };
        assert!(rule.evaluate(&fx.ctx()).unwrap());
    }

    #[test]
    fn not_logic_and_arity() {
        let fx = Fixture::at_price(49.0);
        let mut rule = price_below("inverted", 50.0);
        rule.logic = ConditionLogic::Not;
        assert!(!rule.evaluate(&fx.ctx()).unwrap());

        rule.conditions.push(rule.conditions[0].clone());
        assert!(rule.validate().is_err());
        assert!(rule.evaluate(&fx.ctx()).is_err());
    }

    #[test]
    fn xor_logic_and_arity() {
        let fx = Fixture::at_price(49.0);
        let rule = TradeRule {
            name: "one_of".into(),
            action: RuleAction::Open,
            logic: ConditionLogic::Xor,
            conditions: vec![
                price_below("a", 50.0).conditions.remove(0), // true
                price_below("b", 10.0).conditions.remove(0), // false
            ],
        };
        assert!(rule.evaluate(&fx.ctx()).unwrap());

        let both_true = TradeRule {
            conditions: vec![
                price_below("a", 50.0).conditions.remove(0),
                price_below("b", 60.0).conditions.remove(0),
            ],
            ..rule.clone()
        };
        assert!(!both_true.evaluate(&fx.ctx()).unwrap());

        let wrong_arity = TradeRule {
            conditions: vec![price_below("a", 50.0).conditions.remove(0)],
            ..rule
        };
        assert!(wrong_arity.validate().is_err());
    }

    #[test]
    fn empty_rule_is_invalid() {
        let rule = TradeRule {
            name: "hollow".into(),
            action: RuleAction::Open,
            logic: ConditionLogic::All,
            conditions: vec![],
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn propose_emits_one_intent_per_triggered_rule() {
        let fx = Fixture::at_price(49.0);
        let groups = vec![spot_group(vec![price_below("dip", 50.0)])];
        let (intents, failures) = propose_intents(&groups, &BTreeSet::new(), &fx.ctx());

        assert!(failures.is_empty());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].rule, "dip");
        assert_eq!(intents[0].group, 0);
        assert_eq!(intents[0].date, date());
        assert_eq!(intents[0].notional_override, None);
    }

    #[test]
    fn propose_preserves_declaration_order() {
        let fx = Fixture::at_price(49.0);
        let groups = vec![
            spot_group(vec![price_below("first", 50.0), price_below("second", 60.0)]),
            spot_group(vec![price_below("third", 70.0)]),
        ];
        let (intents, _) = propose_intents(&groups, &BTreeSet::new(), &fx.ctx());

        let names: Vec<&str> = intents.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(intents[2].group, 1);
    }

    #[test]
    fn propose_skips_untriggered_and_disabled() {
        let fx = Fixture::at_price(49.0);
        let groups = vec![spot_group(vec![
            price_below("fires", 50.0),
            price_below("quiet", 10.0),
            price_below("disabled", 50.0),
        ])];
        let disabled: BTreeSet<String> = ["disabled".to_string()].into();
        let (intents, failures) = propose_intents(&groups, &disabled, &fx.ctx());

        assert!(failures.is_empty());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].rule, "fires");
    }

    #[test]
    fn propose_reports_failing_rule_and_continues() {
        let fx = Fixture::at_price(49.0);
        let broken = TradeRule {
            name: "broken".into(),
            action: RuleAction::Open,
            logic: ConditionLogic::All,
            conditions: vec![Condition {
                left: ComparisonField::Market {
                    field: SPOT_PRICE.into(),
                },
                op: Operator::Lt,
                right: ComparisonField::Today { offset: None },
            }],
        };
        let groups = vec![spot_group(vec![broken, price_below("ok", 50.0)])];
        let (intents, failures) = propose_intents(&groups, &BTreeSet::new(), &fx.ctx());

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, "broken");
        assert!(failures[0].error.contains("cannot compare"));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].rule, "ok");
    }

    #[test]
    fn close_class_actions() {
        assert!(!RuleAction::Open.closes());
        assert!(RuleAction::Close.closes());
        assert!(RuleAction::StopLoss.closes());
        assert!(RuleAction::TakeProfit.closes());
    }
}
