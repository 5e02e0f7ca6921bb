//! CSV market-data adapter.
//!
//! Wide format, one row per date: a `date` column (`YYYY-MM-DD`), numeric
//! level columns (`price`, `call_price`, signal series...), an optional
//! `expiry` date column, and FX-rate columns named `<from>_<to>` where both
//! halves are currency codes (e.g. `eur_usd` = value of 1 EUR in USD).

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::error::TradesimError;
use crate::domain::market::{Currency, MarketSnapshot, EXPIRY};
use crate::ports::data_port::MarketDataProvider;

#[derive(Debug)]
pub struct CsvMarketData {
    snapshots: BTreeMap<NaiveDate, MarketSnapshot>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Date,
    Expiry,
    Rate(Currency, Currency),
    Value,
}

impl CsvMarketData {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TradesimError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_reader(content.as_bytes())
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, TradesimError> {
        let parse_error = |reason: String| TradesimError::ConfigParse {
            file: "market data csv".into(),
            reason,
        };

        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| parse_error(format!("missing header row: {e}")))?
            .clone();

        let columns: Vec<(String, Column)> = headers
            .iter()
            .map(|name| {
                let kind = classify_column(name);
                (name.to_string(), kind)
            })
            .collect();
        if !columns
            .iter()
            .any(|(_, kind)| matches!(kind, Column::Date))
        {
            return Err(parse_error("missing 'date' column".into()));
        }

        let mut snapshots = BTreeMap::new();
        for record in rdr.records() {
            let record = record.map_err(|e| parse_error(format!("csv parse error: {e}")))?;

            let mut date: Option<NaiveDate> = None;
            let mut expiry: Option<NaiveDate> = None;
            let mut values: Vec<(String, f64)> = Vec::new();
            let mut rates: Vec<(Currency, Currency, f64)> = Vec::new();

            for ((name, kind), raw) in columns.iter().zip(record.iter()) {
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                match kind {
                    Column::Date => {
                        date = Some(parse_date(raw).map_err(|e| parse_error(e))?);
                    }
                    Column::Expiry => {
                        expiry = Some(parse_date(raw).map_err(|e| parse_error(e))?);
                    }
                    Column::Rate(from, to) => {
                        let rate: f64 = raw.parse().map_err(|_| {
                            parse_error(format!("invalid rate '{raw}' in column {name}"))
                        })?;
                        rates.push((*from, *to, rate));
                    }
                    Column::Value => {
                        let value: f64 = raw.parse().map_err(|_| {
                            parse_error(format!("invalid value '{raw}' in column {name}"))
                        })?;
                        values.push((name.clone(), value));
                    }
                }
            }

            let date = date.ok_or_else(|| parse_error("row without a date".into()))?;
            let mut snapshot = MarketSnapshot::new(date);
            for (name, value) in values {
                snapshot.set_value(&name, value);
            }
            if let Some(expiry) = expiry {
                snapshot = snapshot.with_date_field(EXPIRY, expiry);
            }
            for (from, to, rate) in rates {
                snapshot = snapshot.with_rate(from, to, rate);
            }
            snapshots.insert(date, snapshot);
        }

        Ok(CsvMarketData { snapshots })
    }
}

fn classify_column(name: &str) -> Column {
    if name == "date" {
        return Column::Date;
    }
    if name == EXPIRY {
        return Column::Expiry;
    }
    if let Some((from, to)) = name.split_once('_') {
        if let (Some(from), Some(to)) = (Currency::from_code(from), Currency::from_code(to)) {
            return Column::Rate(from, to);
        }
    }
    Column::Value
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("invalid date '{raw}'"))
}

impl MarketDataProvider for CsvMarketData {
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
