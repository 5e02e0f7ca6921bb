//! CLI definition and dispatch.
//!
//! Wires the adapters to the simulation core: an INI file describes the
//! account, trade template, rule groups and managers; a CSV file supplies
//! the market data; the run result is written as a versioned JSON report.

use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::account::Account;
use crate::domain::config_validation::validate_input;
use crate::domain::error::TradesimError;
use crate::domain::execution::{Direction, ExecutionRule, Instrument, LegTemplate, SizingPolicy};
use crate::domain::manager::{
    ExecutionConfig, FieldTransform, FillAlgorithm, ManagerConfig, MarketDataConfig,
    PortfolioConfig, RiskConfig, RollInterval, StreamConfig,
};
use crate::domain::market::Currency;
use crate::domain::orchestrator;
use crate::domain::output::SimulationReport;
use crate::domain::rule_parser::parse_condition;
use crate::domain::settings::{
    DataGapPolicy, SimulationInput, TradeDataSettings, TradeRuleSettings,
};
use crate::domain::trade_rule::{ConditionLogic, RuleAction, TradeRule};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataProvider;

#[derive(Parser, Debug)]
#[command(name = "tradesim", about = "Rule-driven trading strategy simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulation
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Market data CSV
        #[arg(short, long)]
        data: PathBuf,
        /// Report destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a simulation configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            (&err).into()
        }
    }
}

fn execute(cli: Cli) -> Result<(), TradesimError> {
    match cli.command {
        Command::Run {
            config,
            data,
            output,
        } => {
            let config = load_config(&config)?;
            let provider = CsvMarketData::from_path(&data)?;
            let input = build_input(&config, provider.dates())?;

            let result = orchestrator::run(&input, &provider, None)?;
            let report = SimulationReport::new(&result).to_json()?;
            match output {
                Some(path) => {
                    fs::write(&path, report)?;
                    info!("report written to {}", path.display());
                }
                None => println!("{report}"),
            }
            Ok(())
        }
        Command::Validate { config } => {
            let config = load_config(&config)?;
            let input = build_input(&config, vec![])?;
            validate_input(&input)?;
            println!(
                "ok: {} rule group(s), {} manager(s)",
                input.rule_settings.len(),
                input.manager_configs.len()
            );
            Ok(())
        }
    }
}

fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, TradesimError> {
    FileConfigAdapter::from_file(path).map_err(|err| TradesimError::ConfigParse {
        file: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Assemble a [`SimulationInput`] from a parsed config file. The date grid
/// is the provider's, optionally clipped by `[simulation] start_date` /
/// `end_date`.
pub fn build_input(
    config: &dyn ConfigPort,
    provider_dates: Vec<chrono::NaiveDate>,
) -> Result<SimulationInput, TradesimError> {
    let account = build_account(config)?;
    let trade_data = build_trade_data(config, account.currency)?;
    let rule_settings = build_rule_settings(config)?;
    let manager_configs = build_manager_configs(config)?;
    let data_gap_policy = build_gap_policy(config)?;

    let start = parse_optional_date(config, "simulation", "start_date")?;
    let end = parse_optional_date(config, "simulation", "end_date")?;
    let dates: Vec<chrono::NaiveDate> = provider_dates
        .into_iter()
        .filter(|d| start.is_none_or(|s| *d >= s))
        .filter(|d| end.is_none_or(|e| *d <= e))
        .collect();

    Ok(SimulationInput::new(
        dates,
        account,
        trade_data,
        rule_settings,
        manager_configs,
        data_gap_policy,
    ))
}

pub fn build_account(config: &dyn ConfigPort) -> Result<Account, TradesimError> {
    let code = config
        .get_string("account", "currency")
        .ok_or_else(|| TradesimError::ConfigMissing {
            section: "account".into(),
            key: "currency".into(),
        })?;
    let currency = Currency::from_code(&code).ok_or_else(|| TradesimError::ConfigInvalid {
        section: "account".into(),
        key: "currency".into(),
        reason: format!("unknown currency '{code}'"),
    })?;
    let initial_balance = config.get_double("account", "initial_balance", 0.0);
    Ok(Account::new(currency, initial_balance))
}

pub fn build_trade_data(
    config: &dyn ConfigPort,
    account_currency: Currency,
) -> Result<TradeDataSettings, TradesimError> {
    let underlying =
        config
            .get_string("trade", "underlying")
            .ok_or_else(|| TradesimError::ConfigMissing {
                section: "trade".into(),
                key: "underlying".into(),
            })?;
    let currency = match config.get_string("trade", "currency") {
        Some(code) => Currency::from_code(&code).ok_or_else(|| TradesimError::ConfigInvalid {
            section: "trade".into(),
            key: "currency".into(),
            reason: format!("unknown currency '{code}'"),
        })?,
        None => account_currency,
    };
    let default_notional = config.get_double("trade", "notional", 1.0);
    Ok(TradeDataSettings {
        underlying,
        currency,
        default_notional,
    })
}

/// One `[group.<name>]` section per rule group, scanned in section order.
pub fn build_rule_settings(
    config: &dyn ConfigPort,
) -> Result<Vec<TradeRuleSettings>, TradesimError> {
    let mut groups = Vec::new();
    for section in config.sections() {
        let Some(group_name) = section.strip_prefix("group.") else {
            continue;
        };

        let mut rules = Vec::new();
        for (key, action) in [
            ("open", RuleAction::Open),
            ("close", RuleAction::Close),
            ("stoploss", RuleAction::StopLoss),
            ("takeprofit", RuleAction::TakeProfit),
        ] {
            if let Some(text) = config.get_string(&section, key) {
                let name = format!("{group_name}.{key}");
                rules.push(parse_rule(&name, action, &text)?);
            }
        }

        let execution = build_execution_rule(config, &section)?;
        groups.push(TradeRuleSettings { rules, execution });
    }
    Ok(groups)
}

/// Parse one rule value: an optional `all:`/`any:`/`not:`/`xor:` prefix,
/// then `;`-separated conditions.
pub fn parse_rule(name: &str, action: RuleAction, text: &str) -> Result<TradeRule, TradesimError> {
    let text = text.trim();
    let (logic, body) = match text.split_once(':') {
        Some((prefix, rest)) => match prefix.trim() {
            "all" => (ConditionLogic::All, rest),
            "any" => (ConditionLogic::Any, rest),
            "not" => (ConditionLogic::Not, rest),
            "xor" => (ConditionLogic::Xor, rest),
            _ => (ConditionLogic::All, text),
        },
        None => (ConditionLogic::All, text),
    };

    let mut conditions = Vec::new();
    for part in body.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        conditions.push(parse_condition(part)?);
    }

    let rule = TradeRule {
        name: name.to_string(),
        action,
        logic,
        conditions,
    };
    rule.validate()?;
    Ok(rule)
}

pub fn build_execution_rule(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<ExecutionRule, TradesimError> {
    let invalid = |key: &str, reason: String| TradesimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    };

    let sizing_text =
        config
            .get_string(section, "sizing")
            .ok_or_else(|| TradesimError::ConfigMissing {
                section: section.to_string(),
                key: "sizing".into(),
            })?;
    let sizing = parse_sizing(&sizing_text).map_err(|reason| invalid("sizing", reason))?;

    let legs_text =
        config
            .get_string(section, "legs")
            .ok_or_else(|| TradesimError::ConfigMissing {
                section: section.to_string(),
                key: "legs".into(),
            })?;
    let mut legs = Vec::new();
    for part in legs_text.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        legs.push(parse_leg(part).map_err(|reason| invalid("legs", reason))?);
    }

    Ok(ExecutionRule { sizing, legs })
}

fn parse_sizing(text: &str) -> Result<SizingPolicy, String> {
    let text = text.trim();
    let mut parts = text.split(':').map(str::trim);
    let kind = parts.next().unwrap_or_default();
    let number = |raw: Option<&str>, what: &str| -> Result<f64, String> {
        raw.ok_or_else(|| format!("missing {what} in '{text}'"))?
            .parse()
            .map_err(|_| format!("invalid {what} in '{text}'"))
    };
    match kind {
        "fixed" => Ok(SizingPolicy::FixedNotional(number(
            parts.next(),
            "notional",
        )?)),
        "pct" => Ok(SizingPolicy::PercentOfAccount(number(
            parts.next(),
            "fraction",
        )?)),
        "spread" => {
            let target_cost = number(parts.next(), "target cost")?;
            let reference_notional = number(parts.next(), "reference notional")?;
            Ok(SizingPolicy::SpreadTarget {
                target_cost,
                reference_notional,
            })
        }
        _ => Err(format!(
            "unknown sizing '{text}' (expected fixed:N, pct:F or spread:TARGET:REF)"
        )),
    }
}

fn parse_leg(text: &str) -> Result<LegTemplate, String> {
    let (direction, instrument) = text
        .split_once(':')
        .ok_or_else(|| format!("leg '{text}' is not direction:instrument"))?;
    let direction = match direction.trim() {
        "buy" => Direction::Buy,
        "sell" => Direction::Sell,
        other => return Err(format!("unknown direction '{other}'")),
    };
    let instrument = match instrument.trim() {
        "spot" => Instrument::Spot,
        "call" => Instrument::Call,
        "put" => Instrument::Put,
        other => return Err(format!("unknown instrument '{other}'")),
    };
    Ok(LegTemplate {
        instrument,
        direction,
    })
}

pub fn build_manager_configs(
    config: &dyn ConfigPort,
) -> Result<Vec<ManagerConfig>, TradesimError> {
    let mut configs = Vec::new();

    if config.sections().contains(&"market_data".to_string()) {
        configs.push(ManagerConfig::MarketData(build_market_data_config(config)?));
    }
    if config.sections().contains(&"execution".to_string()) {
        let algorithm = match config
            .get_string("execution", "algorithm")
            .unwrap_or_else(|| "immediate".into())
            .as_str()
        {
            "immediate" => FillAlgorithm::Immediate,
            "vwap" => FillAlgorithm::Vwap,
            other => {
                return Err(TradesimError::ConfigInvalid {
                    section: "execution".into(),
                    key: "algorithm".into(),
                    reason: format!("unknown algorithm '{other}'"),
                });
            }
        };
        configs.push(ManagerConfig::Execution(ExecutionConfig {
            algorithm,
            slippage_pct: config.get_double("execution", "slippage_pct", 0.0),
        }));
    }
    if config.sections().contains(&"portfolio".to_string()) {
        configs.push(ManagerConfig::Portfolio(PortfolioConfig {
            max_open_positions: positive_int(config, "portfolio", "max_open_positions"),
            max_allocation_pct: positive_double(config, "portfolio", "max_allocation_pct"),
        }));
    }
    if config.sections().contains(&"risk".to_string()) {
        configs.push(ManagerConfig::Risk(RiskConfig {
            max_position_notional: positive_double(config, "risk", "max_position_notional"),
            max_total_exposure: positive_double(config, "risk", "max_total_exposure"),
        }));
    }
    if config.sections().contains(&"stream".to_string()) {
        let roll_interval = match config
            .get_string("stream", "roll_interval")
            .unwrap_or_else(|| "monthly".into())
            .as_str()
        {
            "daily" => RollInterval::Daily,
            "weekly" => RollInterval::Weekly,
            "monthly" => RollInterval::Monthly,
            "quarterly" => RollInterval::Quarterly,
            other => {
                return Err(TradesimError::ConfigInvalid {
                    section: "stream".into(),
                    key: "roll_interval".into(),
                    reason: format!("unknown interval '{other}'"),
                });
            }
        };
        configs.push(ManagerConfig::Stream(StreamConfig {
            roll_interval,
            expiry_offset_months: config.get_int("stream", "expiry_offset_months", 1).max(0)
                as u32,
        }));
    }

    Ok(configs)
}

fn build_market_data_config(
    config: &dyn ConfigPort,
) -> Result<MarketDataConfig, TradesimError> {
    let invalid = |key: &str, reason: String| TradesimError::ConfigInvalid {
        section: "market_data".into(),
        key: key.to_string(),
        reason,
    };
    let mut transforms = Vec::new();

    if let Some(text) = config.get_string("market_data", "rolling_mean") {
        for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let pieces: Vec<&str> = part.split(':').map(str::trim).collect();
            if pieces.len() != 3 {
                return Err(invalid(
                    "rolling_mean",
                    format!("'{part}' is not field:window:output"),
                ));
            }
            let window: usize = pieces[1]
                .parse()
                .map_err(|_| invalid("rolling_mean", format!("invalid window in '{part}'")))?;
            transforms.push(FieldTransform::RollingMean {
                field: pieces[0].to_string(),
                window,
                output: pieces[2].to_string(),
            });
        }
    }
    if let Some(text) = config.get_string("market_data", "scale") {
        for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let pieces: Vec<&str> = part.split(':').map(str::trim).collect();
            if pieces.len() != 3 {
                return Err(invalid(
                    "scale",
                    format!("'{part}' is not field:factor:output"),
                ));
            }
            let factor: f64 = pieces[1]
                .parse()
                .map_err(|_| invalid("scale", format!("invalid factor in '{part}'")))?;
            transforms.push(FieldTransform::Scale {
                field: pieces[0].to_string(),
                factor,
                output: pieces[2].to_string(),
            });
        }
    }

    Ok(MarketDataConfig { transforms })
}

fn positive_int(config: &dyn ConfigPort, section: &str, key: &str) -> Option<usize> {
    let value = config.get_int(section, key, -1);
    (value >= 0).then_some(value as usize)
}

fn positive_double(config: &dyn ConfigPort, section: &str, key: &str) -> Option<f64> {
    let value = config.get_double(section, key, f64::NAN);
    value.is_finite().then_some(value)
}

fn build_gap_policy(config: &dyn ConfigPort) -> Result<DataGapPolicy, TradesimError> {
    match config
        .get_string("simulation", "data_gap_policy")
        .as_deref()
    {
        None | Some("skip") => Ok(DataGapPolicy::SkipDate),
        Some("abort") => Ok(DataGapPolicy::Abort),
        Some(other) => Err(TradesimError::ConfigInvalid {
            section: "simulation".into(),
            key: "data_gap_policy".into(),
            reason: format!("unknown policy '{other}' (expected skip or abort)"),
        }),
    }
}

fn parse_optional_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<chrono::NaiveDate>, TradesimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| TradesimError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("invalid date '{raw}' (expected YYYY-MM-DD)"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_INI: &str = r#"
[simulation]
data_gap_policy = skip

[account]
currency = USD
initial_balance = 1000000

[trade]
underlying = SPX
notional = 100

[group.dip]
open = market:price < 50
close = market:price > 60
sizing = fixed:100
legs = buy:spot

[risk]
max_position_notional = 500000
"#;

    fn config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn build_account_from_ini() {
        let account = build_account(&config(VALID_INI)).unwrap();
        assert_eq!(account.currency, Currency::Usd);
        assert!((account.initial_balance - 1_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn build_account_rejects_unknown_currency() {
        let bad = VALID_INI.replace("currency = USD", "currency = DOGE");
        assert!(matches!(
            build_account(&config(&bad)).unwrap_err(),
            TradesimError::ConfigInvalid { .. }
        ));
    }

    #[test]
    fn trade_currency_defaults_to_account() {
        let trade = build_trade_data(&config(VALID_INI), Currency::Usd).unwrap();
        assert_eq!(trade.underlying, "SPX");
        assert_eq!(trade.currency, Currency::Usd);
        assert!((trade.default_notional - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn build_rule_settings_from_ini() {
        let groups = build_rule_settings(&config(VALID_INI)).unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.rules.len(), 2);
        assert_eq!(group.rules[0].name, "dip.open");
        assert_eq!(group.rules[0].action, RuleAction::Open);
        assert_eq!(group.rules[1].name, "dip.close");
        assert_eq!(
            group.execution.sizing,
            SizingPolicy::FixedNotional(100.0)
        );
        assert_eq!(
            group.execution.legs,
            vec![LegTemplate {
                instrument: Instrument::Spot,
                direction: Direction::Buy,
            }]
        );
    }

    #[test]
    fn parse_rule_logic_prefixes() {
        let rule = parse_rule(
            "g.open",
            RuleAction::Open,
            "any: market:price < 50 ; market:price > 100",
        )
        .unwrap();
        assert_eq!(rule.logic, ConditionLogic::Any);
        assert_eq!(rule.conditions.len(), 2);

        let rule = parse_rule("g.open", RuleAction::Open, "market:price < 50").unwrap();
        assert_eq!(rule.logic, ConditionLogic::All);
        assert_eq!(rule.conditions.len(), 1);
    }

    #[test]
    fn parse_rule_rejects_bad_arity() {
        let err = parse_rule("g.open", RuleAction::Open, "xor: market:price < 50").unwrap_err();
        assert!(matches!(err, TradesimError::RuleInvalid { .. }));
    }

    #[test]
    fn parse_sizing_forms() {
        assert_eq!(
            parse_sizing("fixed:100").unwrap(),
            SizingPolicy::FixedNotional(100.0)
        );
        assert_eq!(
            parse_sizing("pct:0.25").unwrap(),
            SizingPolicy::PercentOfAccount(0.25)
        );
        assert_eq!(
            parse_sizing("spread:0:100").unwrap(),
            SizingPolicy::SpreadTarget {
                target_cost: 0.0,
                reference_notional: 100.0
            }
        );
        assert!(parse_sizing("martingale:2").is_err());
        assert!(parse_sizing("fixed:lots").is_err());
    }

    #[test]
    fn parse_leg_forms() {
        assert_eq!(
            parse_leg("buy:call").unwrap(),
            LegTemplate {
                instrument: Instrument::Call,
                direction: Direction::Buy,
            }
        );
        assert_eq!(
            parse_leg("sell:put").unwrap(),
            LegTemplate {
                instrument: Instrument::Put,
                direction: Direction::Sell,
            }
        );
        assert!(parse_leg("hold:spot").is_err());
        assert!(parse_leg("buy:bond").is_err());
        assert!(parse_leg("spot").is_err());
    }

    #[test]
    fn manager_configs_only_for_present_sections() {
        let configs = build_manager_configs(&config(VALID_INI)).unwrap();
        assert_eq!(configs.len(), 1);
        assert!(matches!(
            configs[0],
            ManagerConfig::Risk(RiskConfig {
                max_position_notional: Some(limit),
                max_total_exposure: None,
            }) if (limit - 500_000.0).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn stream_and_market_data_sections() {
        let ini = format!(
            "{VALID_INI}\n[stream]\nroll_interval = quarterly\nexpiry_offset_months = 3\n\n\
             [market_data]\nrolling_mean = price:20:price_ma20\n"
        );
        let configs = build_manager_configs(&config(&ini)).unwrap();
        assert_eq!(configs.len(), 3);
        assert!(configs.iter().any(|c| matches!(
            c,
            ManagerConfig::Stream(StreamConfig {
                roll_interval: RollInterval::Quarterly,
                expiry_offset_months: 3,
            })
        )));
        assert!(configs.iter().any(|c| matches!(
            c,
            ManagerConfig::MarketData(MarketDataConfig { transforms }) if transforms.len() == 1
        )));
    }

    #[test]
    fn build_input_clips_dates() {
        let ini = VALID_INI.replace(
            "data_gap_policy = skip",
            "data_gap_policy = skip\nstart_date = 2024-01-03\nend_date = 2024-01-04",
        );
        let d = |day| chrono::NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let input = build_input(&config(&ini), vec![d(2), d(3), d(4), d(5)]).unwrap();
        assert_eq!(input.dates(), &[d(3), d(4)]);
    }

    #[test]
    fn gap_policy_parsing() {
        assert_eq!(
            build_gap_policy(&config(VALID_INI)).unwrap(),
            DataGapPolicy::SkipDate
        );
        let abort = VALID_INI.replace("data_gap_policy = skip", "data_gap_policy = abort");
        assert_eq!(
            build_gap_policy(&config(&abort)).unwrap(),
            DataGapPolicy::Abort
        );
        let bad = VALID_INI.replace("data_gap_policy = skip", "data_gap_policy = punt");
        assert!(build_gap_policy(&config(&bad)).is_err());
    }
}
