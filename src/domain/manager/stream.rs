//! Stream manager: decides when open positions roll into replacements.
//!
//! A roll is independent of trade/execution rule duplication: the
//! replacement inherits the old position's economic terms, with a new expiry
//! shifted by the configured tenor.

use chrono::{Datelike, Months, NaiveDate};

use crate::domain::manager::{RollDirective, StreamManager};
use crate::domain::schedule::TradeSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollInterval {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl RollInterval {
    /// Has the interval elapsed between open date and the current date?
    fn elapsed(&self, opened: NaiveDate, current: NaiveDate) -> bool {
        match self {
            RollInterval::Daily => current > opened,
            RollInterval::Weekly => (current - opened).num_days() >= 7,
            RollInterval::Monthly => {
                (current.year(), current.month()) != (opened.year(), opened.month())
            }
            RollInterval::Quarterly => {
                let quarter = |d: NaiveDate| (d.year(), (d.month0()) / 3);
                quarter(current) != quarter(opened)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub roll_interval: RollInterval,
    /// Months between a roll date and the replacement's expiry.
    pub expiry_offset_months: u32,
}

pub struct RollManager {
    config: StreamConfig,
}

impl RollManager {
    pub fn new(config: StreamConfig) -> Self {
        RollManager { config }
    }
}

impl StreamManager for RollManager {
    fn rolls_due(&self, date: NaiveDate, schedule: &TradeSchedule) -> Vec<RollDirective> {
        let mut directives = Vec::new();
        for id in schedule.open_ids() {
            let Ok(record) = schedule.record(id) else {
                continue;
            };
            let Some(opened) = record.open_date else {
                continue;
            };
            if self.config.roll_interval.elapsed(opened, date) {
                directives.push(RollDirective {
                    trade_id: id,
                    new_expiry: date.checked_add_months(Months::new(self.config.expiry_offset_months)),
                });
            }
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{Direction, ExecutedLeg, Instrument};
    use crate::domain::market::Currency;
    use crate::domain::schedule::TradeState;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule_with_open(open_date: NaiveDate) -> TradeSchedule {
        let mut schedule = TradeSchedule::new();
        let id = schedule.propose(
            open_date,
            "carry",
            "SPX",
            Instrument::Call,
            Direction::Buy,
            Currency::Usd,
        );
        schedule
            .transition(id, open_date, TradeState::Accepted, None)
            .unwrap();
        schedule
            .mark_executed(
                id,
                open_date,
                &ExecutedLeg {
                    instrument: Instrument::Call,
                    direction: Direction::Buy,
                    notional: 100.0,
                    price: 5.0,
                    currency: Currency::Usd,
                    expiry: Some(ymd(2024, 6, 21)),
                },
            )
            .unwrap();
        schedule
    }

    #[test]
    fn interval_elapsed() {
        let opened = ymd(2024, 1, 15);
        assert!(!RollInterval::Daily.elapsed(opened, opened));
        assert!(RollInterval::Daily.elapsed(opened, ymd(2024, 1, 16)));

        assert!(!RollInterval::Weekly.elapsed(opened, ymd(2024, 1, 21)));
        assert!(RollInterval::Weekly.elapsed(opened, ymd(2024, 1, 22)));

        assert!(!RollInterval::Monthly.elapsed(opened, ymd(2024, 1, 31)));
        assert!(RollInterval::Monthly.elapsed(opened, ymd(2024, 2, 1)));

        assert!(!RollInterval::Quarterly.elapsed(opened, ymd(2024, 3, 31)));
        assert!(RollInterval::Quarterly.elapsed(opened, ymd(2024, 4, 1)));
    }

    #[test]
    fn no_rolls_before_interval() {
        let manager = RollManager::new(StreamConfig {
            roll_interval: RollInterval::Monthly,
            expiry_offset_months: 3,
        });
        let schedule = schedule_with_open(ymd(2024, 1, 15));
        assert!(manager.rolls_due(ymd(2024, 1, 31), &schedule).is_empty());
    }

    #[test]
    fn roll_due_with_shifted_expiry() {
        let manager = RollManager::new(StreamConfig {
            roll_interval: RollInterval::Monthly,
            expiry_offset_months: 3,
        });
        let schedule = schedule_with_open(ymd(2024, 1, 15));

        let directives = manager.rolls_due(ymd(2024, 2, 1), &schedule);
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].trade_id, 0);
        assert_eq!(directives[0].new_expiry, Some(ymd(2024, 5, 1)));
    }

    #[test]
    fn closed_positions_do_not_roll() {
        let manager = RollManager::new(StreamConfig {
            roll_interval: RollInterval::Daily,
            expiry_offset_months: 1,
        });
        let mut schedule = schedule_with_open(ymd(2024, 1, 15));
        schedule
            .close(0, ymd(2024, 1, 16), TradeState::Closed, 5.0, None)
            .unwrap();

        assert!(manager.rolls_due(ymd(2024, 1, 17), &schedule).is_empty());
    }
}
