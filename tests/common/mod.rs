#![allow(dead_code)]

use chrono::NaiveDate;

use tradesim::adapters::memory_adapter::InMemoryMarketData;
use tradesim::domain::account::Account;
use tradesim::domain::comparison::{ComparisonField, Operator, Value};
use tradesim::domain::execution::{
    Direction, ExecutionRule, Instrument, LegTemplate, SizingPolicy,
};
use tradesim::domain::manager::ManagerConfig;
use tradesim::domain::market::{Currency, MarketSnapshot, CALL_PRICE, PUT_PRICE, SPOT_PRICE};
use tradesim::domain::schedule::{TradeRecord, TradeSchedule, TradeState};
use tradesim::domain::settings::{
    DataGapPolicy, SimulationInput, TradeDataSettings, TradeRuleSettings,
};
use tradesim::domain::trade_rule::{Condition, ConditionLogic, RuleAction, TradeRule};

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn jan(day: u32) -> NaiveDate {
    ymd(2024, 1, day)
}

/// One snapshot per (day-of-January, spot price).
pub fn spot_series(prices: &[(u32, f64)]) -> InMemoryMarketData {
    let mut provider = InMemoryMarketData::new();
    for &(day, price) in prices {
        provider.insert(MarketSnapshot::new(jan(day)).with_value(SPOT_PRICE, price));
    }
    provider
}

/// Snapshots carrying spot plus option premiums.
pub fn option_series(rows: &[(u32, f64, f64, f64)]) -> InMemoryMarketData {
    let mut provider = InMemoryMarketData::new();
    for &(day, spot, call, put) in rows {
        provider.insert(
            MarketSnapshot::new(jan(day))
                .with_value(SPOT_PRICE, spot)
                .with_value(CALL_PRICE, call)
                .with_value(PUT_PRICE, put),
        );
    }
    provider
}

pub fn price_condition(op: Operator, level: f64) -> Condition {
    Condition {
        left: ComparisonField::Market {
            field: SPOT_PRICE.into(),
        },
        op,
        right: ComparisonField::Static {
            value: Value::Number(level),
        },
    }
}

pub fn open_rule(name: &str, op: Operator, level: f64) -> TradeRule {
    TradeRule {
        name: name.into(),
        action: RuleAction::Open,
        logic: ConditionLogic::All,
        conditions: vec![price_condition(op, level)],
    }
}

pub fn close_rule(name: &str, op: Operator, level: f64) -> TradeRule {
    TradeRule {
        name: name.into(),
        action: RuleAction::Close,
        logic: ConditionLogic::All,
        conditions: vec![price_condition(op, level)],
    }
}

pub fn buy_spot(sizing: SizingPolicy) -> ExecutionRule {
    ExecutionRule {
        sizing,
        legs: vec![LegTemplate {
            instrument: Instrument::Spot,
            direction: Direction::Buy,
        }],
    }
}

pub fn collar(target_cost: f64, reference_notional: f64) -> ExecutionRule {
    ExecutionRule {
        sizing: SizingPolicy::SpreadTarget {
            target_cost,
            reference_notional,
        },
        legs: vec![
            LegTemplate {
                instrument: Instrument::Call,
                direction: Direction::Buy,
            },
            LegTemplate {
                instrument: Instrument::Put,
                direction: Direction::Sell,
            },
        ],
    }
}

pub fn usd_input(
    dates: Vec<NaiveDate>,
    groups: Vec<TradeRuleSettings>,
    managers: Vec<ManagerConfig>,
) -> SimulationInput {
    SimulationInput::new(
        dates,
        Account::new(Currency::Usd, 1_000_000.0),
        TradeDataSettings {
            underlying: "SPX".into(),
            currency: Currency::Usd,
            default_notional: 100.0,
        },
        groups,
        managers,
        DataGapPolicy::SkipDate,
    )
}

/// Sum of realized cashflows dated `date`, in the trade currency (tests use
/// a single currency throughout).
pub fn flows_on(schedule: &TradeSchedule, date: NaiveDate) -> f64 {
    schedule
        .records()
        .iter()
        .flat_map(|record| {
            record
                .transitions
                .iter()
                .filter(|t| t.date == date)
                .filter_map(move |t| transition_flow(record, t.state))
        })
        .sum()
}

fn transition_flow(record: &TradeRecord, state: TradeState) -> Option<f64> {
    let sign = match record.direction {
        Direction::Buy => -1.0,
        Direction::Sell => 1.0,
    };
    match state {
        TradeState::Open => Some(sign * record.open_price? * record.notional),
        TradeState::Closed | TradeState::Expired | TradeState::Rolled => {
            Some(-sign * record.close_price? * record.notional)
        }
        _ => None,
    }
}

pub fn states_of(record: &TradeRecord) -> Vec<TradeState> {
    record.transitions.iter().map(|t| t.state).collect()
}
