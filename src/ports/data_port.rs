//! Market and signal data port traits.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::error::TradesimError;
use crate::domain::market::MarketSnapshot;

/// Source of per-date market snapshots.
///
/// Implementations signal a missing date with [`TradesimError::DataGap`];
/// the orchestrator's gap policy decides what happens next.
pub trait MarketDataProvider {
    fn snapshot(&self, date: NaiveDate) -> Result<MarketSnapshot, TradesimError>;

    /// Dates the provider has data for, ascending.
    fn dates(&self) -> Vec<NaiveDate>;
}

/// Optional overlay of user-supplied signal series, merged into the
/// snapshot before rule evaluation.
pub trait SignalDataProvider {
    fn signals(&self, date: NaiveDate) -> BTreeMap<String, f64>;
}
