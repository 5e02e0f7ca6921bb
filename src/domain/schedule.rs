//! Trade schedule: the append-only ledger of trade lifecycle transitions.
//!
//! One [`TradeRecord`] per leg, keyed by a dense [`TradeId`]. Every state
//! change appends a date-stamped [`Transition`]; nothing is ever deleted or
//! rewritten, so the schedule is the single source of truth for what trades
//! exist and in what state. Transitions outside the lifecycle state machine
//! are refused.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::domain::error::TradesimError;
use crate::domain::execution::{Direction, ExecutedLeg, Instrument};
use crate::domain::market::Currency;

pub type TradeId = u64;

/// Lifecycle states.
///
/// `Proposed -> {Accepted, Rejected}`, `Accepted -> Executed`,
/// `Executed -> Open`, `Open -> {Closed, Rolled, Expired}`. A roll creates a
/// replacement record that enters directly at `Open`, linked to its
/// predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Proposed,
    Accepted,
    Rejected,
    Executed,
    Open,
    Closed,
    Rolled,
    Expired,
}

impl TradeState {
    pub fn can_transition(self, next: TradeState) -> bool {
        matches!(
            (self, next),
            (TradeState::Proposed, TradeState::Accepted)
                | (TradeState::Proposed, TradeState::Rejected)
                | (TradeState::Accepted, TradeState::Executed)
                | (TradeState::Executed, TradeState::Open)
                | (TradeState::Open, TradeState::Closed)
                | (TradeState::Open, TradeState::Rolled)
                | (TradeState::Open, TradeState::Expired)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeState::Rejected | TradeState::Closed | TradeState::Expired
        )
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeState::Proposed => "proposed",
            TradeState::Accepted => "accepted",
            TradeState::Rejected => "rejected",
            TradeState::Executed => "executed",
            TradeState::Open => "open",
            TradeState::Closed => "closed",
            TradeState::Rolled => "rolled",
            TradeState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Why a transition happened, recorded on the transition itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// A close-class rule fired; carries the rule name.
    Rule(String),
    RiskViolation(String),
    PortfolioVeto(String),
    MarginViolation(String),
    Expiry,
    Roll,
    /// The run halted mid-date; pending proposals are swept with this.
    Halt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub date: NaiveDate,
    pub state: TradeState,
    pub reason: Option<TransitionReason>,
}

/// One leg's full lifecycle: economic terms plus the transition log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub id: TradeId,
    /// Name of the rule that proposed the trade.
    pub rule: String,
    pub underlying: String,
    pub instrument: Instrument,
    pub direction: Direction,
    pub currency: Currency,
    pub notional: f64,
    pub open_date: Option<NaiveDate>,
    pub open_price: Option<f64>,
    pub close_date: Option<NaiveDate>,
    pub close_price: Option<f64>,
    pub expiry: Option<NaiveDate>,
    pub rolled_from: Option<TradeId>,
    pub rolled_into: Option<TradeId>,
    pub transitions: Vec<Transition>,
}

impl TradeRecord {
    /// Current state: the last transition. Records are created with at least
    /// one transition, so this never panics.
    pub fn state(&self) -> TradeState {
        self.transitions
            .last()
            .map(|t| t.state)
            .expect("trade record created without a transition")
    }

    pub fn is_open(&self) -> bool {
        self.state() == TradeState::Open
    }
}

/// The append-only ledger, keyed by dense trade ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeSchedule {
    records: Vec<TradeRecord>,
}

impl TradeSchedule {
    pub fn new() -> Self {
        TradeSchedule::default()
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn record(&self, id: TradeId) -> Result<&TradeRecord, TradesimError> {
        self.records
            .get(id as usize)
            .ok_or(TradesimError::UnknownTrade { id })
    }

    fn record_mut(&mut self, id: TradeId) -> Result<&mut TradeRecord, TradesimError> {
        self.records
            .get_mut(id as usize)
            .ok_or(TradesimError::UnknownTrade { id })
    }

    /// Ids of all currently open trades, ascending.
    pub fn open_ids(&self) -> Vec<TradeId> {
        self.records
            .iter()
            .filter(|r| r.is_open())
            .map(|r| r.id)
            .collect()
    }

    /// Book a new proposal; the record starts in `Proposed`.
    pub fn propose(
        &mut self,
        date: NaiveDate,
        rule: &str,
        underlying: &str,
        instrument: Instrument,
        direction: Direction,
        currency: Currency,
    ) -> TradeId {
        let id = self.records.len() as TradeId;
        self.records.push(TradeRecord {
            id,
            rule: rule.to_string(),
            underlying: underlying.to_string(),
            instrument,
            direction,
            currency,
            notional: 0.0,
            open_date: None,
            open_price: None,
            close_date: None,
            close_price: None,
            expiry: None,
            rolled_from: None,
            rolled_into: None,
            transitions: vec![Transition {
                date,
                state: TradeState::Proposed,
                reason: None,
            }],
        });
        id
    }

    /// Append a transition, enforcing the state machine.
    pub fn transition(
        &mut self,
        id: TradeId,
        date: NaiveDate,
        state: TradeState,
        reason: Option<TransitionReason>,
    ) -> Result<(), TradesimError> {
        let record = self.record_mut(id)?;
        let current = record.state();
        if !current.can_transition(state) {
            return Err(TradesimError::InvalidTransition {
                id,
                from: current.to_string(),
                to: state.to_string(),
            });
        }
        record.transitions.push(Transition {
            date,
            state,
            reason,
        });
        Ok(())
    }

    /// Book a fill: `Accepted -> Executed -> Open` on the fill date, stamping
    /// the economic terms.
    pub fn mark_executed(
        &mut self,
        id: TradeId,
        date: NaiveDate,
        leg: &ExecutedLeg,
    ) -> Result<(), TradesimError> {
        self.transition(id, date, TradeState::Executed, None)?;
        self.transition(id, date, TradeState::Open, None)?;
        let record = self.record_mut(id)?;
        record.notional = leg.notional;
        record.open_date = Some(date);
        record.open_price = Some(leg.price);
        record.expiry = leg.expiry;
        Ok(())
    }

    /// Close or expire an open trade at the given price.
    pub fn close(
        &mut self,
        id: TradeId,
        date: NaiveDate,
        state: TradeState,
        price: f64,
        reason: Option<TransitionReason>,
    ) -> Result<(), TradesimError> {
        debug_assert!(matches!(
            state,
            TradeState::Closed | TradeState::Expired | TradeState::Rolled
        ));
        self.transition(id, date, state, reason)?;
        let record = self.record_mut(id)?;
        record.close_date = Some(date);
        record.close_price = Some(price);
        Ok(())
    }

    /// Roll an open trade: the old record moves to `Rolled` at `close_price`,
    /// a replacement inherits its economic terms and enters directly at
    /// `Open` on the roll date, both linked through the roll chain.
    pub fn roll(
        &mut self,
        id: TradeId,
        date: NaiveDate,
        close_price: f64,
        open_price: f64,
        new_expiry: Option<NaiveDate>,
    ) -> Result<TradeId, TradesimError> {
        self.close(
            id,
            date,
            TradeState::Rolled,
            close_price,
            Some(TransitionReason::Roll),
        )?;

        let old = self.record(id)?.clone();
        let new_id = self.records.len() as TradeId;
        self.records.push(TradeRecord {
            id: new_id,
            rule: old.rule.clone(),
            underlying: old.underlying.clone(),
            instrument: old.instrument,
            direction: old.direction,
            currency: old.currency,
            notional: old.notional,
            open_date: Some(date),
            open_price: Some(open_price),
            close_date: None,
            close_price: None,
            expiry: new_expiry.or(old.expiry),
            rolled_from: Some(id),
            rolled_into: None,
            transitions: vec![Transition {
                date,
                state: TradeState::Open,
                reason: Some(TransitionReason::Roll),
            }],
        });
        self.record_mut(id)?.rolled_into = Some(new_id);
        Ok(new_id)
    }
}
