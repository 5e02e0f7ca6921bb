//! In-memory providers for tests and demos.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::error::TradesimError;
use crate::domain::market::MarketSnapshot;
use crate::ports::data_port::{MarketDataProvider, SignalDataProvider};

#[derive(Default)]
pub struct InMemoryMarketData {
    snapshots: BTreeMap<NaiveDate, MarketSnapshot>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: MarketSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: MarketSnapshot) {
        self.snapshots.insert(snapshot.date, snapshot);
    }
}

impl MarketDataProvider for InMemoryMarketData {
    fn snapshot(&self, date: NaiveDate) -> Result<MarketSnapshot, TradesimError> {
        self.snapshots
            .get(&date)
            .cloned()
            .ok_or(TradesimError::DataGap { date })
    }

    fn dates(&self) -> Vec<NaiveDate> {
        self.snapshots.keys().copied().collect()
    }
}

#[derive(Default)]
pub struct InMemorySignals {
    series: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl InMemorySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, name: &str, value: f64) {
        self.series
            .entry(date)
            .or_default()
            .insert(name.to_string(), value);
    }
}

impl SignalDataProvider for InMemorySignals {
    fn signals(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.series.get(&date).cloned().unwrap_or_default()
    }
}
