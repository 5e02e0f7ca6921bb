//! Versioned report envelope for external consumers.
//!
//! The schedule and history structs serialize with declared field order;
//! the envelope adds a format version so metric computation and storage
//! layers can consume runs without ambiguity.

use serde::Serialize;

use crate::domain::error::TradesimError;
use crate::domain::orchestrator::SimulationResult;

/// Bump when the serialized shape of the report changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct SimulationReport<'a> {
    pub format_version: u32,
    #[serde(flatten)]
    pub result: &'a SimulationResult,
}

impl<'a> SimulationReport<'a> {
    pub fn new(result: &'a SimulationResult) -> Self {
        SimulationReport {
            format_version: FORMAT_VERSION,
            result,
        }
    }

    pub fn to_json(&self) -> Result<String, TradesimError> {
        serde_json::to_string_pretty(self).map_err(|err| TradesimError::Report {
            reason: err.to_string(),
        })
    }
}
