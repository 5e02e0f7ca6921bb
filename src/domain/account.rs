//! Account ledger: per-currency cash, daily settlement, history.
//!
//! The account never owns position data — open positions live in the trade
//! schedule and are only referenced here. All mutation happens in
//! [`settle_date`], exactly once per simulated date and strictly after the
//! schedule updates for that date: realized cashflows for every transition
//! dated that day are posted (converted through the snapshot FX rate when
//! the trade currency differs from the account currency), then remaining
//! open positions are marked to market for the history row. Marking is
//! reporting only and never touches cash.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::error::TradesimError;
use crate::domain::market::{Currency, MarketSnapshot};
use crate::domain::schedule::{TradeRecord, TradeSchedule, TradeState};

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub currency: Currency,
    pub initial_balance: f64,
    balances: BTreeMap<Currency, f64>,
}

impl Account {
    pub fn new(currency: Currency, initial_balance: f64) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(currency, initial_balance);
        Account {
            currency,
            initial_balance,
            balances,
        }
    }

    /// Cash in the account currency.
    pub fn cash_balance(&self) -> f64 {
        self.balance(self.currency)
    }

    pub fn balance(&self, currency: Currency) -> f64 {
        self.balances.get(&currency).copied().unwrap_or(0.0)
    }

    pub fn balances(&self) -> &BTreeMap<Currency, f64> {
        &self.balances
    }

    fn post(&mut self, currency: Currency, amount: f64) {
        *self.balances.entry(currency).or_insert(0.0) += amount;
    }
}

/// One settled date in the account history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub date: NaiveDate,
    pub balances: BTreeMap<Currency, f64>,
    /// Open positions valued at that day's snapshot, in the account currency.
    pub mark_to_market: f64,
    /// Cash in the account currency plus mark-to-market.
    pub equity: f64,
}

/// Per-date account snapshots, one row per settled date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountHistory {
    pub snapshots: Vec<AccountSnapshot>,
}

impl AccountHistory {
    pub fn push(&mut self, snapshot: AccountSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn last(&self) -> Option<&AccountSnapshot> {
        self.snapshots.last()
    }
}

/// Realized cashflow of one transition, in the trade currency.
///
/// Opening pays (buy) or receives (sell) the fill premium; closing,
/// expiring and rolling out reverse the direction at the close price.
fn transition_cashflow(record: &TradeRecord, state: TradeState) -> Option<f64> {
    let sign = record.direction.premium_sign();
    match state {
        TradeState::Open => {
            let price = record.open_price?;
            Some(sign * price * record.notional)
        }
        TradeState::Closed | TradeState::Expired | TradeState::Rolled => {
            let price = record.close_price?;
            Some(-sign * price * record.notional)
        }
        _ => None,
    }
}

/// Settle one date: post every cashflow dated `date`, then mark open
/// positions to market.
///
/// Flows are converted and summed before any balance moves, so a missing FX
/// rate leaves the account untouched.
pub fn settle_date(
    account: &mut Account,
    schedule: &TradeSchedule,
    snapshot: &MarketSnapshot,
    date: NaiveDate,
) -> Result<AccountSnapshot, TradesimError> {
    let mut posted = 0.0;
    for record in schedule.records() {
        for transition in record.transitions.iter().filter(|t| t.date == date) {
            let Some(flow) = transition_cashflow(record, transition.state) else {
                continue;
            };
            let rate = snapshot.rate(record.currency, account.currency).ok_or(
                TradesimError::MissingRate {
                    date,
                    from: record.currency,
                    to: account.currency,
                },
            )?;
            posted += flow * rate;
        }
    }

    let mark_to_market = mark_open_positions(account, schedule, snapshot, date)?;

    account.post(account.currency, posted);
    let cash = account.cash_balance();
    Ok(AccountSnapshot {
        date,
        balances: account.balances().clone(),
        mark_to_market,
        equity: cash + mark_to_market,
    })
}

fn mark_open_positions(
    account: &Account,
    schedule: &TradeSchedule,
    snapshot: &MarketSnapshot,
    date: NaiveDate,
) -> Result<f64, TradesimError> {
    let mut total = 0.0;
    for record in schedule.records().iter().filter(|r| r.is_open()) {
        // A bought leg is an asset, a written leg a liability.
        let side = -record.direction.premium_sign();
        let price = snapshot
            .value(record.instrument.price_field())
            .or(record.open_price)
            .unwrap_or(0.0);
        let rate = snapshot.rate(record.currency, account.currency).ok_or(
            TradesimError::MissingRate {
                date,
                from: record.currency,
                to: account.currency,
            },
        )?;
        total += side * price * record.notional * rate;
    }
    Ok(total)
}
