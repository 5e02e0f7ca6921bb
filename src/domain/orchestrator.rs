//! Simulation orchestrator: the deterministic date-stepped loop.
//!
//! Owns one run context (account, schedule, live managers) and drives the
//! per-date pipeline: refresh snapshot -> signal overlay -> market-data
//! shaping -> close/stop/take-profit sweep -> expiry sweep -> propose
//! intents -> portfolio/risk review -> execution -> stream rolls -> ledger
//! settle. Identical inputs always produce an identical (schedule, history)
//! pair; no state outlives the run.

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::account::{settle_date, Account, AccountHistory};
use crate::domain::comparison::EvalContext;
use crate::domain::config_validation::validate_input;
use crate::domain::error::TradesimError;
use crate::domain::execution::{execute_intent, margin_check, provisional_notional};
use crate::domain::manager::{IntentDecision, ManagerSet, ReviewContext};
use crate::domain::market::{Currency, MarketSnapshot};
use crate::domain::schedule::{TradeId, TradeSchedule, TradeState, TransitionReason};
use crate::domain::settings::{DataGapPolicy, SimulationInput};
use crate::domain::trade_rule::{propose_intents, RuleFailure, TradeIntent};
use crate::ports::data_port::{MarketDataProvider, SignalDataProvider};

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The run stopped early; state up to and including `date` is valid.
    Halted { date: NaiveDate, error: String },
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub outcome: RunOutcome,
    pub schedule: TradeSchedule,
    pub history: AccountHistory,
    pub skipped_dates: Vec<NaiveDate>,
    pub rule_failures: Vec<RuleFailure>,
}

/// Run one simulation to completion (or halt).
///
/// Fatal configuration problems surface as `Err` before the first date;
/// per-date problems are handled by policy and recorded in the result.
pub fn run(
    input: &SimulationInput,
    provider: &dyn MarketDataProvider,
    signals: Option<&dyn SignalDataProvider>,
) -> Result<SimulationResult, TradesimError> {
    validate_input(input)?;

    let mut account = input.account.clone();
    let mut schedule = TradeSchedule::new();
    let mut history = AccountHistory::default();
    let mut managers = ManagerSet::from_configs(&input.manager_configs);
    let mut disabled: BTreeSet<String> = BTreeSet::new();
    let mut rule_failures: Vec<RuleFailure> = Vec::new();
    let mut skipped_dates: Vec<NaiveDate> = Vec::new();
    let mut outcome = RunOutcome::Completed;

    // Close-class rules are looked up through the group that declared the
    // opening rule.
    let group_of_rule: BTreeMap<String, usize> = input
        .rule_settings
        .iter()
        .enumerate()
        .flat_map(|(index, group)| {
            group
                .open_rules()
                .map(move |rule| (rule.name.clone(), index))
        })
        .collect();

    info!(
        "starting run: {} dates, {} rule groups, initial balance {} {}",
        input.dates().len(),
        input.rule_settings.len(),
        account.initial_balance,
        account.currency,
    );

    for &date in input.dates() {
        let mut snapshot = match provider.snapshot(date) {
            Ok(snapshot) => snapshot,
            Err(TradesimError::DataGap { .. }) => match input.data_gap_policy {
                DataGapPolicy::SkipDate => {
                    warn!("no snapshot for {date}, skipping");
                    skipped_dates.push(date);
                    continue;
                }
                DataGapPolicy::Abort => {
                    outcome = RunOutcome::Halted {
                        date,
                        error: format!("no market data for {date}"),
                    };
                    break;
                }
            },
            Err(err) => return Err(err),
        };

        if let Some(provider) = signals {
            snapshot.merge_signals(&provider.signals(date));
        }
        if let Some(manager) = managers.market_data.as_mut() {
            manager.shape(&mut snapshot);
        }

        if let Some(missing) = missing_rate(&account, &schedule, input, &snapshot) {
            match input.data_gap_policy {
                DataGapPolicy::SkipDate => {
                    warn!("no {}/{} rate on {date}, skipping", missing.0, missing.1);
                    skipped_dates.push(date);
                    continue;
                }
                DataGapPolicy::Abort => {
                    outcome = RunOutcome::Halted {
                        date,
                        error: format!("no {}/{} rate on {date}", missing.0, missing.1),
                    };
                    break;
                }
            }
        }

        close_sweep(
            input,
            &group_of_rule,
            &mut schedule,
            &account,
            &snapshot,
            date,
            &mut disabled,
            &mut rule_failures,
        )?;
        expiry_sweep(&mut schedule, &snapshot, date)?;

        let ctx = EvalContext {
            date,
            snapshot: &snapshot,
            account: &account,
            schedule: &schedule,
            base_trade: &input.trade_data,
        };
        let (intents, failures) = propose_intents(&input.rule_settings, &disabled, &ctx);
        for failure in failures {
            warn!("rule {} disabled: {}", failure.rule, failure.error);
            disabled.insert(failure.rule.clone());
            rule_failures.push(failure);
        }
        debug!("{date}: {} intents proposed", intents.len());

        let mut halt: Option<String> = None;
        for mut intent in intents {
            let execution_rule = &input.rule_settings[intent.group].execution;
            let leg_ids: Vec<TradeId> = execution_rule
                .legs
                .iter()
                .map(|leg| {
                    schedule.propose(
                        date,
                        &intent.rule,
                        &intent.underlying,
                        leg.instrument,
                        leg.direction,
                        intent.currency,
                    )
                })
                .collect();

            // Pre-execution review: portfolio first, then risk. An earlier
            // intent's execution has already consumed its headroom.
            let mut notional = provisional_notional(execution_rule, &account);
            let mut veto: Option<TransitionReason> = None;

            let portfolio_decision = managers.portfolio.as_ref().map(|manager| {
                manager.review(
                    &intent,
                    notional,
                    &ReviewContext {
                        account: &account,
                        schedule: &schedule,
                        snapshot: &snapshot,
                    },
                )
            });
            if let Some(decision) = portfolio_decision {
                apply_decision(decision, &mut notional, &mut intent, &mut veto);
            }
            if veto.is_none() {
                let risk_decision = managers.risk.as_ref().map(|manager| {
                    manager.review(
                        &intent,
                        notional,
                        &ReviewContext {
                            account: &account,
                            schedule: &schedule,
                            snapshot: &snapshot,
                        },
                    )
                });
                if let Some(decision) = risk_decision {
                    apply_decision(decision, &mut notional, &mut intent, &mut veto);
                }
            }
            if let Some(reason) = veto {
                warn!("{date}: intent {} vetoed", intent.rule);
                for id in leg_ids {
                    schedule.transition(id, date, TradeState::Rejected, Some(reason.clone()))?;
                }
                continue;
            }

            // Margin is checked before acceptance so the rejection is a
            // legal Proposed -> Rejected transition.
            if let Err(err) = margin_check(&intent.rule, execution_rule) {
                warn!("{date}: {err}");
                let reason = TransitionReason::MarginViolation(err.to_string());
                for id in leg_ids {
                    schedule.transition(id, date, TradeState::Rejected, Some(reason.clone()))?;
                }
                continue;
            }

            match execute_intent(
                &intent,
                execution_rule,
                &snapshot,
                &account,
                managers.execution.as_deref(),
            ) {
                Ok(legs) => {
                    for (id, leg) in leg_ids.iter().zip(&legs) {
                        schedule.transition(*id, date, TradeState::Accepted, None)?;
                        schedule.mark_executed(*id, date, leg)?;
                    }
                }
                Err(err) => {
                    // Unresolvable spreads (and any other sizing failure)
                    // abort the rest of this date's execution step.
                    warn!("{date}: execution failed: {err}");
                    let reason = TransitionReason::Halt(err.to_string());
                    for id in leg_ids {
                        schedule.transition(id, date, TradeState::Rejected, Some(reason.clone()))?;
                    }
                    halt = Some(err.to_string());
                    break;
                }
            }
        }

        if halt.is_none() {
            if let Some(stream) = managers.stream.as_ref() {
                for directive in stream.rolls_due(date, &schedule) {
                    let record = schedule.record(directive.trade_id)?;
                    let price = snapshot
                        .value(record.instrument.price_field())
                        .or(record.open_price)
                        .unwrap_or(0.0);
                    let new_id =
                        schedule.roll(directive.trade_id, date, price, price, directive.new_expiry)?;
                    debug!(
                        "{date}: rolled trade {} into {}",
                        directive.trade_id, new_id
                    );
                }
            }
        }

        let row = settle_date(&mut account, &schedule, &snapshot, date)?;
        debug!("{date}: cash {} {}", row.equity, account.currency);
        history.push(row);

        if let Some(error) = halt {
            outcome = RunOutcome::Halted { date, error };
            break;
        }
    }

    info!(
        "run finished: {} trades, {} dates settled, outcome {:?}",
        schedule.records().len(),
        history.snapshots.len(),
        outcome,
    );

    Ok(SimulationResult {
        outcome,
        schedule,
        history,
        skipped_dates,
        rule_failures,
    })
}

fn apply_decision(
    decision: IntentDecision,
    notional: &mut f64,
    intent: &mut TradeIntent,
    veto: &mut Option<TransitionReason>,
) {
    match decision {
        IntentDecision::Accept => {}
        IntentDecision::Resize(capped) => {
            *notional = capped;
            intent.notional_override = Some(capped);
        }
        IntentDecision::Veto(reason) => *veto = Some(reason),
    }
}

/// First (from, to) pair the date needs but the snapshot cannot convert.
fn missing_rate(
    account: &Account,
    schedule: &TradeSchedule,
    input: &SimulationInput,
    snapshot: &MarketSnapshot,
) -> Option<(Currency, Currency)> {
    let mut needed: BTreeSet<Currency> = BTreeSet::new();
    needed.insert(input.trade_data.currency);
    for id in schedule.open_ids() {
        if let Ok(record) = schedule.record(id) {
            needed.insert(record.currency);
        }
    }
    needed
        .into_iter()
        .find(|ccy| !snapshot.has_rate(*ccy, account.currency))
        .map(|ccy| (ccy, account.currency))
}

/// Evaluate close-class rules against every open position, oldest first.
/// The first rule that fires closes the position at that day's market.
#[allow(clippy::too_many_arguments)]
fn close_sweep(
    input: &SimulationInput,
    group_of_rule: &BTreeMap<String, usize>,
    schedule: &mut TradeSchedule,
    account: &Account,
    snapshot: &MarketSnapshot,
    date: NaiveDate,
    disabled: &mut BTreeSet<String>,
    rule_failures: &mut Vec<RuleFailure>,
) -> Result<(), TradesimError> {
    let mut to_close: Vec<(TradeId, String, f64)> = Vec::new();

    for id in schedule.open_ids() {
        let record = schedule.record(id)?;
        let Some(&group_index) = group_of_rule.get(&record.rule) else {
            continue;
        };
        let ctx = EvalContext {
            date,
            snapshot,
            account,
            schedule,
            base_trade: &input.trade_data,
        };
        for rule in input.rule_settings[group_index].close_rules() {
            if disabled.contains(&rule.name) {
                continue;
            }
            match rule.evaluate(&ctx) {
                Ok(true) => {
                    let price = snapshot
                        .value(record.instrument.price_field())
                        .or(record.open_price)
                        .unwrap_or(0.0);
                    to_close.push((id, rule.name.clone(), price));
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("rule {} disabled: {err}", rule.name);
                    disabled.insert(rule.name.clone());
                    rule_failures.push(RuleFailure {
                        rule: rule.name.clone(),
                        date,
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    for (id, rule_name, price) in to_close {
        schedule.close(
            id,
            date,
            TradeState::Closed,
            price,
            Some(TransitionReason::Rule(rule_name)),
        )?;
    }
    Ok(())
}

/// Expire open positions whose expiry has arrived, settling at that day's
/// market price for the instrument.
fn expiry_sweep(
    schedule: &mut TradeSchedule,
    snapshot: &MarketSnapshot,
    date: NaiveDate,
) -> Result<(), TradesimError> {
    let mut to_expire: Vec<(TradeId, f64)> = Vec::new();
    for id in schedule.open_ids() {
        let record = schedule.record(id)?;
        if record.expiry.is_some_and(|expiry| expiry <= date) {
            let price = snapshot
                .value(record.instrument.price_field())
                .or(record.open_price)
                .unwrap_or(0.0);
            to_expire.push((id, price));
        }
    }
    for (id, price) in to_expire {
        schedule.close(
            id,
            date,
            TradeState::Expired,
            price,
            Some(TransitionReason::Expiry),
        )?;
    }
    Ok(())
}
