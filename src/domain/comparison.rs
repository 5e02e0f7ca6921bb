//! Comparison evaluator: typed field resolution and relational operators.
//!
//! One side of a comparison is a [`ComparisonField`] — a closed union over
//! the places a value can come from (trade template, market snapshot, the
//! current date, portfolio state, or a literal). Each variant has exactly one
//! resolver against an explicit [`EvalContext`]; resolution is side-effect
//! free. Operands compare only within the same [`Value`] kind: numbers
//! exactly, dates by calendar order, text lexicographically.

use chrono::{Duration, Months, NaiveDate};

use crate::domain::account::Account;
use crate::domain::error::TradesimError;
use crate::domain::market::MarketSnapshot;
use crate::domain::schedule::TradeSchedule;
use crate::domain::settings::TradeDataSettings;

/// A resolved operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Date(_) => "date",
            Value::Text(_) => "text",
        }
    }
}

/// Relational operator applied to two resolved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    Days,
    Weeks,
    Months,
    Years,
}

/// Calendar offset applied to a resolved date operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOffset {
    pub amount: i32,
    pub unit: OffsetUnit,
}

impl DateOffset {
    pub fn apply(&self, date: NaiveDate) -> Result<NaiveDate, TradesimError> {
        let out_of_range = || TradesimError::RuleInvalid {
            rule: String::new(),
            reason: format!("date offset {} out of range", self.amount),
        };
        match self.unit {
            OffsetUnit::Days => Ok(date + Duration::days(i64::from(self.amount))),
            OffsetUnit::Weeks => Ok(date + Duration::days(7 * i64::from(self.amount))),
            OffsetUnit::Months => shift_months(date, self.amount).ok_or_else(out_of_range),
            OffsetUnit::Years => {
                let months = self.amount.checked_mul(12).ok_or_else(out_of_range)?;
                shift_months(date, months).ok_or_else(out_of_range)
            }
        }
    }
}

fn shift_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    }
}

/// Where one side of a comparison is resolved from.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonField {
    /// A field of the base trade template (`underlying`, `currency`,
    /// `notional`).
    Trade { field: String },
    /// A numeric or date field of the current market snapshot.
    Market { field: String },
    /// The evaluation date, optionally shifted.
    Today { offset: Option<DateOffset> },
    /// Aggregate portfolio state (`open_positions`, `cash`).
    Portfolio { field: String },
    /// A literal value.
    Static { value: Value },
}

/// Read-only context a comparison resolves against.
pub struct EvalContext<'a> {
    pub date: NaiveDate,
    pub snapshot: &'a MarketSnapshot,
    pub account: &'a Account,
    pub schedule: &'a TradeSchedule,
    pub base_trade: &'a TradeDataSettings,
}

impl ComparisonField {
    pub fn resolve(&self, ctx: &EvalContext<'_>) -> Result<Value, TradesimError> {
        match self {
            ComparisonField::Trade { field } => resolve_trade_field(field, ctx),
            ComparisonField::Market { field } => resolve_market_field(field, ctx),
            ComparisonField::Today { offset } => {
                let date = match offset {
                    Some(off) => off.apply(ctx.date)?,
                    None => ctx.date,
                };
                Ok(Value::Date(date))
            }
            ComparisonField::Portfolio { field } => resolve_portfolio_field(field, ctx),
            ComparisonField::Static { value } => Ok(value.clone()),
        }
    }
}

fn resolve_trade_field(field: &str, ctx: &EvalContext<'_>) -> Result<Value, TradesimError> {
    match field {
        "underlying" => Ok(Value::Text(ctx.base_trade.underlying.clone())),
        "currency" => Ok(Value::Text(ctx.base_trade.currency.code().to_string())),
        "notional" => Ok(Value::Number(ctx.base_trade.default_notional)),
        _ => Err(TradesimError::UnresolvedField {
            source_kind: "trade",
            field: field.to_string(),
        }),
    }
}

fn resolve_market_field(field: &str, ctx: &EvalContext<'_>) -> Result<Value, TradesimError> {
    if let Some(value) = ctx.snapshot.value(field) {
        return Ok(Value::Number(value));
    }
    if let Some(date) = ctx.snapshot.date_field(field) {
        return Ok(Value::Date(date));
    }
    Err(TradesimError::UnresolvedField {
        source_kind: "market",
        field: field.to_string(),
    })
}

fn resolve_portfolio_field(field: &str, ctx: &EvalContext<'_>) -> Result<Value, TradesimError> {
    match field {
        "open_positions" => Ok(Value::Number(ctx.schedule.open_ids().len() as f64)),
        "cash" => Ok(Value::Number(ctx.account.cash_balance())),
        _ => Err(TradesimError::UnresolvedField {
            source_kind: "portfolio",
            field: field.to_string(),
        }),
    }
}

/// Apply `op` to two resolved values.
///
/// Numeric comparison is exact; no tolerance is applied.
pub fn compare(left: &Value, op: Operator, right: &Value) -> Result<bool, TradesimError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => {
            return Err(TradesimError::TypeMismatch {
                left: left.kind(),
                op: op.symbol().to_string(),
                right: right.kind(),
            });
        }
    };

    // NaN operands never satisfy any operator except Ne.
    let ordering = match ordering {
        Some(ord) => ord,
        None => return Ok(op == Operator::Ne),
    };

    Ok(match op {
        Operator::Eq => ordering.is_eq(),
        Operator::Ne => ordering.is_ne(),
        Operator::Lt => ordering.is_lt(),
        Operator::Le => ordering.is_le(),
        Operator::Gt => ordering.is_gt(),
        Operator::Ge => ordering.is_ge(),
    })
}
