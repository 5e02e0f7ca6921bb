//! Domain error types.

use chrono::NaiveDate;

use crate::domain::market::Currency;

/// A parse error with position information for condition parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for tradesim.
#[derive(Debug, thiserror::Error)]
pub enum TradesimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid rule {rule}: {reason}")]
    RuleInvalid { rule: String, reason: String },

    #[error("unresolved {source_kind} field {field}")]
    UnresolvedField {
        source_kind: &'static str,
        field: String,
    },

    #[error("cannot compare {left} {op} {right}")]
    TypeMismatch {
        left: &'static str,
        op: String,
        right: &'static str,
    },

    #[error("no market data for {date}")]
    DataGap { date: NaiveDate },

    #[error("no {from}/{to} rate on {date}")]
    MissingRate {
        date: NaiveDate,
        from: Currency,
        to: Currency,
    },

    #[error("spread sizing for rule {rule} on {date} is unresolvable: {reason}")]
    UnresolvableSpread {
        rule: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("rule {rule} requires margin the account does not model: {reason}")]
    MarginViolation { rule: String, reason: String },

    #[error("trade {id} cannot transition {from} -> {to}")]
    InvalidTransition { id: u64, from: String, to: String },

    #[error("unknown trade id {id}")]
    UnknownTrade { id: u64 },

    #[error("failed to serialize report: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TradesimError> for std::process::ExitCode {
    fn from(err: &TradesimError) -> Self {
        let code: u8 = match err {
            TradesimError::Io(_) | TradesimError::Report { .. } => 1,
            TradesimError::ConfigParse { .. }
            | TradesimError::ConfigMissing { .. }
            | TradesimError::ConfigInvalid { .. } => 2,
            TradesimError::RuleParse(_)
            | TradesimError::RuleInvalid { .. }
            | TradesimError::UnresolvedField { .. }
            | TradesimError::TypeMismatch { .. } => 3,
            TradesimError::DataGap { .. } | TradesimError::MissingRate { .. } => 4,
            TradesimError::UnresolvableSpread { .. }
            | TradesimError::MarginViolation { .. }
            | TradesimError::InvalidTransition { .. }
            | TradesimError::UnknownTrade { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
