//! Per-date market state: named price fields, date fields and FX rates.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Snapshot field holding the spot price of the configured underlying.
pub const SPOT_PRICE: &str = "price";
/// Snapshot field holding the at-the-money call premium per unit.
pub const CALL_PRICE: &str = "call_price";
/// Snapshot field holding the at-the-money put premium per unit.
pub const PUT_PRICE: &str = "put_price";
/// Snapshot date field holding the next option expiry.
pub const EXPIRY: &str = "expiry";

/// Settlement currencies the simulation can book cash in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "JPY")]
    Jpy,
    #[serde(rename = "AUD")]
    Aud,
    #[serde(rename = "CHF")]
    Chf,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Aud => "AUD",
            Currency::Chf => "CHF",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            "JPY" => Some(Currency::Jpy),
            "AUD" => Some(Currency::Aud),
            "CHF" => Some(Currency::Chf),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Immutable per-date view of market levels.
///
/// Numeric fields are a flat namespace (`price`, `call_price`, signal
/// overlays, manager-derived fields); date fields carry calendar points such
/// as the next option expiry. FX rates are keyed by (from, to) pair and
/// looked up with an inverse fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub date: NaiveDate,
    values: BTreeMap<String, f64>,
    date_fields: BTreeMap<String, NaiveDate>,
    fx_rates: BTreeMap<(Currency, Currency), f64>,
}

impl MarketSnapshot {
    pub fn new(date: NaiveDate) -> Self {
        MarketSnapshot {
            date,
            values: BTreeMap::new(),
            date_fields: BTreeMap::new(),
            fx_rates: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn with_date_field(mut self, name: &str, value: NaiveDate) -> Self {
        self.date_fields.insert(name.to_string(), value);
        self
    }

    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Self {
        self.fx_rates.insert((from, to), rate);
        self
    }

    pub fn set_value(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn date_field(&self, name: &str) -> Option<NaiveDate> {
        self.date_fields.get(name).copied()
    }

    /// FX rate converting one unit of `from` into `to`.
    ///
    /// Identity for same-currency, direct pair first, then inverse pair.
    pub fn rate(&self, from: Currency, to: Currency) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        if let Some(rate) = self.fx_rates.get(&(from, to)) {
            return Some(*rate);
        }
        self.fx_rates
            .get(&(to, from))
            .filter(|r| **r != 0.0)
            .map(|r| 1.0 / r)
    }

    pub fn has_rate(&self, from: Currency, to: Currency) -> bool {
        self.rate(from, to).is_some()
    }

    /// Merge a signal overlay into the numeric namespace. Overlay values win
    /// over provider values of the same name.
    pub fn merge_signals(&mut self, overlay: &BTreeMap<String, f64>) {
        for (name, value) in overlay {
            self.values.insert(name.clone(), *value);
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
