//! Execution rule engine: leg expansion, sizing and fill pricing.
//!
//! Consumes an accepted intent plus the execution rule bound to its group and
//! produces one sized, priced leg per template. Sizing policies:
//!
//! - fixed: the literal notional
//! - percent-of-account: account cash in the account currency times the
//!   configured fraction
//! - spread-target: one common notional solved so the legs' net premium
//!   equals the target cost; used when writing options with no margin posted
//!
//! A Sell leg outside a spread-target rule would require margin the account
//! does not model and is refused up front.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::account::Account;
use crate::domain::error::TradesimError;
use crate::domain::manager::ExecutionManager;
use crate::domain::market::{Currency, MarketSnapshot, CALL_PRICE, EXPIRY, PUT_PRICE, SPOT_PRICE};
use crate::domain::trade_rule::TradeIntent;

/// Net-premium tolerance for the spread-target solve.
const SPREAD_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Sign of the cashflow a fill in this direction posts: buying pays,
    /// selling receives.
    pub fn premium_sign(&self) -> f64 {
        match self {
            Direction::Buy => -1.0,
            Direction::Sell => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Spot,
    Call,
    Put,
}

impl Instrument {
    /// Snapshot field the instrument is priced from.
    pub fn price_field(&self) -> &'static str {
        match self {
            Instrument::Spot => SPOT_PRICE,
            Instrument::Call => CALL_PRICE,
            Instrument::Put => PUT_PRICE,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, Instrument::Call | Instrument::Put)
    }
}

/// One leg requested by an execution rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegTemplate {
    pub instrument: Instrument,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingPolicy {
    /// The literal notional.
    FixedNotional(f64),
    /// `account cash * fraction`, evaluated at execution time.
    PercentOfAccount(f64),
    /// Solve a common leg notional so the net premium hits `target_cost`.
    /// `reference_notional` sizes the degenerate zero-net-premium case.
    SpreadTarget {
        target_cost: f64,
        reference_notional: f64,
    },
}

/// Sizing policy plus the leg list it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRule {
    pub sizing: SizingPolicy,
    pub legs: Vec<LegTemplate>,
}

/// A sized, priced fill ready to be booked into the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedLeg {
    pub instrument: Instrument,
    pub direction: Direction,
    pub notional: f64,
    pub price: f64,
    pub currency: Currency,
    pub expiry: Option<NaiveDate>,
}

/// Notional the pre-execution managers review, before prices are known.
///
/// Fixed and percent-of-account are exact; spread-target reports its
/// reference notional.
pub fn provisional_notional(rule: &ExecutionRule, account: &Account) -> f64 {
    match rule.sizing {
        SizingPolicy::FixedNotional(notional) => notional,
        SizingPolicy::PercentOfAccount(pct) => account.cash_balance() * pct,
        SizingPolicy::SpreadTarget {
            reference_notional, ..
        } => reference_notional,
    }
}

/// Refuse direction/sizing combinations that would need margin.
pub fn margin_check(rule_name: &str, rule: &ExecutionRule) -> Result<(), TradesimError> {
    if matches!(rule.sizing, SizingPolicy::SpreadTarget { .. }) {
        return Ok(());
    }
    if let Some(leg) = rule
        .legs
        .iter()
        .find(|leg| leg.direction == Direction::Sell)
    {
        return Err(TradesimError::MarginViolation {
            rule: rule_name.to_string(),
            reason: format!(
                "sell {:?} leg without spread-target sizing posts no margin",
                leg.instrument
            ),
        });
    }
    Ok(())
}

/// Expand an accepted intent into executed legs.
///
/// Prices come from the snapshot, routed through the execution manager's
/// fill algorithm when one is configured. Option legs are stamped with the
/// snapshot's expiry date when present.
pub fn execute_intent(
    intent: &TradeIntent,
    rule: &ExecutionRule,
    snapshot: &MarketSnapshot,
    account: &Account,
    fill: Option<&dyn ExecutionManager>,
) -> Result<Vec<ExecutedLeg>, TradesimError> {
    margin_check(&intent.rule, rule)?;

    let mut fills = Vec::with_capacity(rule.legs.len());
    for leg in &rule.legs {
        let quoted = snapshot.value(leg.instrument.price_field()).ok_or_else(|| {
            TradesimError::UnresolvedField {
                source_kind: "market",
                field: leg.instrument.price_field().to_string(),
            }
        })?;
        let price = match fill {
            Some(manager) => manager.fill_price(leg.direction, quoted),
            None => quoted,
        };
        fills.push((leg, price));
    }

    let notional = solve_notional(intent, rule, account, &fills)?;

    let expiry = snapshot.date_field(EXPIRY);
    Ok(fills
        .into_iter()
        .map(|(leg, price)| ExecutedLeg {
            instrument: leg.instrument,
            direction: leg.direction,
            notional,
            price,
            currency: intent.currency,
            expiry: if leg.instrument.is_option() {
                expiry
            } else {
                None
            },
        })
        .collect())
}

fn solve_notional(
    intent: &TradeIntent,
    rule: &ExecutionRule,
    account: &Account,
    fills: &[(&LegTemplate, f64)],
) -> Result<f64, TradesimError> {
    let solved = match rule.sizing {
        SizingPolicy::FixedNotional(notional) => notional,
        SizingPolicy::PercentOfAccount(pct) => account.cash_balance() * pct,
        SizingPolicy::SpreadTarget {
            target_cost,
            reference_notional,
        } => solve_spread(intent, target_cost, reference_notional, fills)?,
    };

    Ok(match intent.notional_override {
        Some(cap) => solved.min(cap),
        None => solved,
    })
}

/// Closed-form solve for the common leg notional of a spread.
///
/// Net premium per unit is the sum of signed leg prices; the notional is
/// `target / net`. A zero net premium only reaches a zero target, at the
/// reference notional.
fn solve_spread(
    intent: &TradeIntent,
    target_cost: f64,
    reference_notional: f64,
    fills: &[(&LegTemplate, f64)],
) -> Result<f64, TradesimError> {
    let net_per_unit: f64 = fills
        .iter()
        .map(|(leg, price)| leg.direction.premium_sign() * price)
        .sum();

    if net_per_unit.abs() < SPREAD_EPSILON {
        if target_cost.abs() < SPREAD_EPSILON {
            return Ok(reference_notional);
        }
        return Err(TradesimError::UnresolvableSpread {
            rule: intent.rule.clone(),
            date: intent.date,
            reason: format!("legs net to zero premium, target {target_cost} is unreachable"),
        });
    }

    let notional = target_cost / net_per_unit;
    if notional <= 0.0 {
        return Err(TradesimError::UnresolvableSpread {
            rule: intent.rule.clone(),
            date: intent.date,
            reason: format!(
                "net premium {net_per_unit} per unit cannot reach target {target_cost} \
                 at a positive notional"
            ),
        });
    }
    Ok(notional)
}
