use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use moonthread::calendar::MonthView;
use moonthread::commands::{AppError, AppState, SettingsUpdate};
use moonthread::config::{Config, PASSPHRASE_ENV};
use moonthread::credentials::KeyringCredentialStore;
use moonthread::dates;
use moonthread::models::PeriodRecord;
use moonthread::storage::Vault;

#[derive(Parser)]
#[command(name = "moonthread", version, about = "Period log with cycle forecasts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new vault, using the passphrase from MOONTHREAD_PASSPHRASE
    Init {
        /// Keep the passphrase in the system keychain
        #[arg(long)]
        remember: bool,
    },
    /// Start a period (default: today)
    Start {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// End the current period (default: today)
    End {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Replace the dates of a period
    Edit {
        id: i64,
        #[arg(value_parser = parse_date)]
        start: NaiveDate,
        #[arg(value_parser = parse_date)]
        end: Option<NaiveDate>,
    },
    Delete {
        id: i64,
    },
    /// List periods, newest first
    List,
    /// Averages, current period and next expected start
    Stats,
    /// Full statistics as JSON
    Metrics {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show a month with logged and forecast days (default: this month)
    Calendar {
        year: Option<i32>,
        month: Option<u32>,
    },
    /// Print all data as JSON
    Export,
    /// Merge periods from a JSON file
    Import {
        file: PathBuf,
    },
    Settings {
        #[arg(long)]
        auto_lock: Option<u32>,
        #[arg(long)]
        horizon: Option<u32>,
        #[arg(long)]
        remember: Option<bool>,
    },
    /// Remove the remembered passphrase
    Forget,
    /// Delete the vault and any remembered passphrase
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    dates::parse_calendar_date(raw)
        .ok_or_else(|| format!("not a date: {raw} (expected YYYY-MM-DD)"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app = AppState::new(
        Vault::in_dir(&config.data_dir),
        Box::new(KeyringCredentialStore::default()),
    );

    match cli.command {
        Command::Init { remember } => {
            let passphrase = config
                .passphrase
                .as_deref()
                .with_context(|| format!("set {PASSPHRASE_ENV} to choose a passphrase"))?;
            app.setup(passphrase, remember)?;
            println!("vault created at {}", config.vault_path().display());
        }
        Command::Wipe { yes } => {
            if !yes {
                bail!("this deletes every record; pass --yes to confirm");
            }
            app.wipe_all_data()?;
            println!("all data wiped");
        }
        command => {
            unlock(&app, &config)?;
            run(&app, command)?;
            app.lock()?;
        }
    }

    Ok(())
}

fn unlock(app: &AppState, config: &Config) -> Result<()> {
    if !app.is_setup() {
        bail!("no vault yet; run `moonthread init` first");
    }
    let unlocked = match config.passphrase.as_deref() {
        Some(passphrase) => app.unlock(passphrase)?,
        None => match app.unlock_remembered() {
            Ok(unlocked) => unlocked,
            Err(AppError::NoRememberedPassphrase) => {
                bail!("set {PASSPHRASE_ENV} or run `init --remember`")
            }
            Err(e) => return Err(e.into()),
        },
    };
    if !unlocked {
        bail!("wrong passphrase");
    }
    Ok(())
}

fn run(app: &AppState, command: Command) -> Result<()> {
    let today = app.today();

    match command {
        Command::Start { date } => {
            let record = app.start_period(date.unwrap_or(today))?;
            println!("started period {} on {}", record.id, record.start_date);
        }
        Command::End { date } => {
            let current = app
                .get_stats()?
                .current_period
                .context("no period in progress")?;
            let record = app.end_period(current.id, date.unwrap_or(today))?;
            print_record(&record, today);
        }
        Command::Edit { id, start, end } => {
            let record = app.update_period(id, start, end)?;
            print_record(&record, today);
        }
        Command::Delete { id } => {
            let record = app.delete_period(id)?;
            println!("deleted period {} ({})", record.id, record.start_date);
        }
        Command::List => {
            for record in app.list_periods()? {
                print_record(&record, today);
            }
        }
        Command::Stats => {
            let stats = app.get_stats()?;
            println!("{}", app.get_status()?);
            let days = |v: f64| format!("{v} days");
            print_optional("average cycle", stats.average_cycle_length.map(days));
            print_optional("average period", stats.average_period_length.map(days));
            print_optional("next expected", stats.predicted_next_start.map(|d| d.to_string()));
        }
        Command::Metrics { year } => {
            let metrics = app.get_metrics(year)?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Calendar { year, month } => {
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            print_month(&app.get_month(year, month)?);
        }
        Command::Export => println!("{}", app.export_data()?),
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let summary = app.import_data(&json)?;
            println!(
                "imported {}, skipped {} duplicates",
                summary.imported, summary.skipped
            );
        }
        Command::Settings {
            auto_lock,
            horizon,
            remember,
        } => {
            let settings = app.update_settings(SettingsUpdate {
                auto_lock_minutes: auto_lock,
                forecast_horizon_cycles: horizon,
                remember_passphrase: remember,
            })?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Forget => {
            app.forget_credentials()?;
            println!("remembered passphrase removed");
        }
        Command::Init { .. } | Command::Wipe { .. } => {}
    }

    Ok(())
}

fn print_record(record: &PeriodRecord, today: NaiveDate) {
    match (record.end_date, record.duration_days()) {
        (Some(end), Some(days)) => println!(
            "#{:<4} {} .. {}  ({} days)",
            record.id, record.start_date, end, days
        ),
        (Some(end), None) => println!("#{:<4} {} .. {}", record.id, record.start_date, end),
        (None, _) => println!(
            "#{:<4} {} .. ongoing (day {})",
            record.id,
            record.start_date,
            record.days_since_start(today) + 1
        ),
    }
}

fn print_optional(label: &str, value: Option<String>) {
    println!("{label:>15}: {}", value.as_deref().unwrap_or("not enough data"));
}

fn print_month(view: &MonthView) {
    println!("{}", view.title);
    println!("Su Mo Tu We Th Fr Sa");

    let mut line = "   ".repeat(view.leading_blanks as usize);
    let mut column = view.leading_blanks;
    for cell in &view.days {
        let marker = if cell.is_period {
            '*'
        } else if cell.is_forecast {
            '~'
        } else if cell.is_today {
            '<'
        } else {
            ' '
        };
        line.push_str(&format!("{:>2}{marker}", cell.date.day()));
        column += 1;
        if column % 7 == 0 {
            println!("{}", line.trim_end());
            line.clear();
        }
    }
    if !line.is_empty() {
        println!("{}", line.trim_end());
    }
    println!("* period   ~ forecast   < today");
}
