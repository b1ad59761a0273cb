//! CLI definition and dispatch.

use chrono::Local;
use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_snapshot_adapter::JsonSnapshotStore;
use crate::adapters::statement_broker_adapter::StatementBrokerAdapter;
use crate::domain::error::RebalancerError;
use crate::domain::orchestrator::{DateSpec, Orchestrator, RunAction, RunOutcome};
use crate::domain::settings::{DataSettings, DataSource, Settings, BROKER};
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "rebalancer", about = "Daily multi-strategy portfolio rebalancer")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Trading day: YYYY-MM-DD or `today`; defaults to the latest snapshot
    #[arg(short, long, value_parser = parse_date_spec)]
    pub date: Option<DateSpec>,
    #[arg(short, long, value_enum, default_value_t = Action::Next)]
    pub action: Action,
    /// Instruments no strategy may enter today (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    /// Validate the configuration and print the strategy plan without running
    #[arg(long)]
    pub dry_run: bool,
    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Next,
    Sync,
}

impl From<Action> for RunAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Start => RunAction::Start,
            Action::Next => RunAction::Next,
            Action::Sync => RunAction::Sync,
        }
    }
}

fn parse_date_spec(value: &str) -> Result<DateSpec, String> {
    DateSpec::parse(value).ok_or_else(|| format!("invalid date '{value}' (expected YYYY-MM-DD or today)"))
}

pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // a subscriber may already be installed when run from tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);
    let result = if cli.dry_run {
        run_dry_run(&cli)
    } else {
        execute(&cli).map(|outcome| {
            println!("{}", outcome.saved_as);
        })
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            ExitCode::from(&err)
        }
    }
}

pub fn load_settings(path: &PathBuf) -> Result<Settings, RebalancerError> {
    info!(path = %path.display(), "loading configuration");
    let config = FileConfigAdapter::from_file(path)?;
    Settings::from_config(&config)
}

/// Open the configured price provider.
pub fn open_data_port(data: &DataSettings) -> Result<Box<dyn DataPort>, RebalancerError> {
    match data.source {
        DataSource::Csv => Ok(Box::new(CsvAdapter::new(data.path.clone()))),
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            Ok(Box::new(SqliteAdapter::open(&data.path, data.pool_size)?))
        }
        #[cfg(not(feature = "sqlite"))]
        DataSource::Sqlite => Err(RebalancerError::invalid(
            crate::domain::settings::DATA,
            "source",
            "built without the sqlite feature",
        )),
    }
}

/// Normalized exclusion list.
pub fn excluded_symbols(raw: &[String]) -> BTreeSet<String> {
    raw.iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load, wire and run one action; returns what was persisted.
pub fn execute(cli: &Cli) -> Result<RunOutcome, RebalancerError> {
    let settings = load_settings(&cli.config)?;
    let data_port = open_data_port(&settings.data)?;
    let snapshots = JsonSnapshotStore::for_portfolio(&settings.work_dir, &settings.name);
    let action = RunAction::from(cli.action);

    let broker = match (action, &settings.broker_statement) {
        (RunAction::Sync, Some(path)) => Some(StatementBrokerAdapter::from_file(path)?),
        (RunAction::Sync, None) => return Err(RebalancerError::missing(BROKER, "statement")),
        _ => None,
    };

    let mut orchestrator = Orchestrator::new(&settings, data_port.as_ref(), &snapshots);
    if let Some(broker) = broker.as_ref() {
        orchestrator = orchestrator.with_broker(broker);
    }

    let today = Local::now().date_naive();
    let date_spec = cli.date.unwrap_or(match action {
        RunAction::Start => DateSpec::Today,
        RunAction::Next | RunAction::Sync => DateSpec::Latest,
    });
    let date = orchestrator.resolve_date(date_spec, today)?;
    let excluded = excluded_symbols(&cli.exclude);
    info!(
        portfolio = %settings.name,
        date = %date,
        action = ?action,
        excluded = ?excluded,
        "running"
    );
    orchestrator.run(action, date, &excluded)
}

fn run_dry_run(cli: &Cli) -> Result<(), RebalancerError> {
    let settings = load_settings(&cli.config)?;
    println!("Portfolio: {}", settings.name);
    println!("Snapshots: {}", settings.snapshot_dir().display());
    println!("Initial balance: {:.2}", settings.initial_balance);
    println!(
        "Leverage: {}  Allocation: {}%",
        settings.engine.leverage, settings.engine.alloc_percent
    );
    for spec in &settings.strategies {
        println!(
            "  {:<12} {:<24} {:>6.2}%  lookback {}",
            spec.key, spec.kind, spec.percent, spec.lookback
        );
    }
    println!("Configuration is valid.");
    Ok(())
}
