mod config;
mod error;
mod export;
mod models;
mod normalize;
mod persona;
mod projection;
mod report;
mod rolling;
mod scenario;
mod service;
mod source;
mod summary;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use config::{
    ensure_initialized, load_config, load_file_config, save_config, validate_growth_pct,
    validate_projection_months, AppConfig,
};
use error::AppError;
use models::Persona;
use persona::CostBasis;
use serde::Serialize;
use service::{effective_rates, CostCalculator, InputSource};
use source::{validate_lookback, SourceContext};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "credit-meter")]
#[command(about = "Usage analytics and cost projection for credit-metered services")]
struct Cli {
    #[command(flatten)]
    input: InputArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct InputArgs {
    /// CSV export with DATE, SERVICE_TYPE and TOTAL_CREDITS columns
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    /// SQLite database holding the daily usage views
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Reference date for the lookback window (defaults to today)
    #[arg(long, global = true)]
    as_of: Option<String>,
    #[arg(long, global = true)]
    lookback_days: Option<u32>,
    #[arg(long, global = true)]
    credit_cost: Option<f64>,
    #[arg(long, global = true)]
    variance_pct: Option<f64>,
    #[arg(long, global = true, default_value = "text")]
    format: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    History,
    Rolling {
        /// Print every aggregate instead of the latest per service
        #[arg(long)]
        all: bool,
    },
    Project {
        #[arg(long)]
        months: Option<u32>,
        #[arg(long)]
        growth_pct: Option<f64>,
    },
    Scenarios {
        #[arg(long)]
        months: Option<u32>,
    },
    Summary,
    Personas {
        #[command(subcommand)]
        action: PersonaCommand,
    },
    Export {
        /// history or estimate
        kind: String,
    },
}

#[derive(Debug, Subcommand)]
enum PersonaCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        users: u32,
        #[arg(long)]
        requests_per_day: u32,
    },
    Remove {
        name: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Set {
        name: String,
        #[arg(long)]
        users: Option<u32>,
        #[arg(long)]
        requests_per_day: Option<u32>,
    },
    Estimate {
        /// rolling or history
        #[arg(long)]
        basis: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_output_format(input: &str) -> Result<OutputFormat, AppError> {
    match input.to_ascii_lowercase().as_str() {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(AppError::Config(
            "Unsupported output format. Use text or json.".into(),
        )),
    }
}

fn parse_basis(input: &str) -> Result<CostBasis, AppError> {
    match input.to_ascii_lowercase().as_str() {
        "rolling" => Ok(CostBasis::Rolling),
        "history" => Ok(CostBasis::History),
        _ => Err(AppError::Config(
            "Unsupported basis. Use rolling or history.".into(),
        )),
    }
}

fn parse_as_of(input: Option<&str>) -> Result<NaiveDate, AppError> {
    match input {
        None => Ok(Local::now().date_naive()),
        Some(raw) => normalize::parse_date(raw)
            .ok_or_else(|| AppError::Format(format!("unparsable --as-of date '{raw}'"))),
    }
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<(), AppError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", text(value)),
    }
    Ok(())
}

fn open_calculator(cfg: &AppConfig, args: &InputArgs) -> Result<CostCalculator, AppError> {
    let (credit_cost, variance) = effective_rates(cfg, args.credit_cost, args.variance_pct)?;
    let lookback_days = args.lookback_days.unwrap_or(cfg.lookback_days);
    validate_lookback(lookback_days)?;
    let ctx = SourceContext {
        as_of: parse_as_of(args.as_of.as_deref())?,
        lookback_days,
    };
    let input = InputSource::resolve(args.file.as_deref(), args.database.as_deref(), &cfg.source)?;
    debug!(?input, since = %ctx.since(), credit_cost, variance, "opening usage source");
    CostCalculator::load(&input, &cfg.source, &ctx, credit_cost, variance)
}

fn run_personas(
    action: PersonaCommand,
    args: &InputArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    if let PersonaCommand::Estimate { basis } = action {
        let cfg = load_config()?;
        let basis = basis.as_deref().map(parse_basis).transpose()?;
        let roster = cfg.roster()?;
        let calc = open_calculator(&cfg, args)?;
        let estimate = calc.personas(roster.personas(), basis);
        return emit(format, &estimate, report::render_personas);
    }

    let mut cfg = load_file_config()?;
    let mut roster = cfg.roster()?;
    let message = match action {
        PersonaCommand::List => None,
        PersonaCommand::Add {
            name,
            users,
            requests_per_day,
        } => {
            roster.add(Persona {
                name: name.clone(),
                user_count: users,
                requests_per_day,
            })?;
            Some(format!("Persona '{}' added.", name.trim()))
        }
        PersonaCommand::Remove { name } => {
            let removed = roster.remove(&name)?;
            Some(format!("Persona '{}' removed.", removed.name))
        }
        PersonaCommand::Rename { from, to } => {
            roster.rename(&from, &to)?;
            Some(format!("Persona '{}' renamed to '{}'.", from.trim(), to.trim()))
        }
        PersonaCommand::Set {
            name,
            users,
            requests_per_day,
        } => {
            if users.is_none() && requests_per_day.is_none() {
                return Err(AppError::Config(
                    "Nothing to update. Pass --users and/or --requests-per-day.".into(),
                ));
            }
            if let Some(users) = users {
                roster.set_user_count(&name, users)?;
            }
            if let Some(requests) = requests_per_day {
                roster.set_requests_per_day(&name, requests)?;
            }
            Some(format!("Persona '{}' updated.", name.trim()))
        }
        PersonaCommand::Estimate { .. } => None,
    };

    if let Some(message) = message {
        cfg.personas = roster.into_personas();
        save_config(&cfg)?;
        println!("{message}");
        return Ok(());
    }

    emit(format, &roster.personas().to_vec(), |p| report::render_roster(p))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<(), AppError> {
    init_tracing();
    let cli = Cli::parse();
    let format = parse_output_format(&cli.input.format)?;

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized credit-meter config and data directories.");
        }
        Commands::Personas { action } => {
            ensure_initialized()?;
            run_personas(action, &cli.input, format)?;
        }
        Commands::History => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let calc = open_calculator(&cfg, &cli.input)?;
            emit(format, &calc.history(), report::render_history)?;
        }
        Commands::Rolling { all } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let calc = open_calculator(&cfg, &cli.input)?;
            let (title, rows) = if all {
                ("Rolling 30-record windows", calc.rolling())
            } else {
                ("Latest 30-record window per service", calc.latest_rolling())
            };
            emit(format, &rows, |r| report::render_rolling(title, r))?;
        }
        Commands::Project { months, growth_pct } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let months = months.unwrap_or(cfg.projection_months);
            validate_projection_months(months)?;
            let growth_pct = growth_pct.unwrap_or(cfg.growth_rate_pct);
            validate_growth_pct(growth_pct)?;
            let calc = open_calculator(&cfg, &cli.input)?;
            let projection = calc.project(growth_pct / 100.0, months)?;
            emit(format, &projection, |p| {
                report::render_projection(p, calc.variance())
            })?;
        }
        Commands::Scenarios { months } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let months = months.unwrap_or(cfg.projection_months);
            validate_projection_months(months)?;
            let calc = open_calculator(&cfg, &cli.input)?;
            let results = calc.scenarios(&cfg.scenarios, months)?;
            emit(format, &results, |r| report::render_scenarios(r, months))?;
        }
        Commands::Summary => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let calc = open_calculator(&cfg, &cli.input)?;
            let summary = calc.summary()?;
            emit(format, &summary, |s| report::render_summary(s, calc.variance()))?;
        }
        Commands::Export { kind } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let calc = open_calculator(&cfg, &cli.input)?;
            match (kind.to_ascii_lowercase().as_str(), format) {
                ("history", OutputFormat::Text) => {
                    print!("{}", export::history_csv(calc.series())?)
                }
                ("history", OutputFormat::Json) => {
                    println!("{}", serde_json::to_string_pretty(calc.series().records())?)
                }
                ("estimate", OutputFormat::Text) => {
                    print!("{}", export::credit_estimate_csv(&calc.credit_estimates())?)
                }
                ("estimate", OutputFormat::Json) => {
                    println!("{}", serde_json::to_string_pretty(&calc.credit_estimates())?)
                }
                _ => {
                    return Err(AppError::Config(
                        "Unsupported export. Use history or estimate.".into(),
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_output_format_accepts_known_values() {
        assert_eq!(parse_output_format("text").expect("text"), OutputFormat::Text);
        assert_eq!(parse_output_format("JSON").expect("json"), OutputFormat::Json);
    }

    #[test]
    fn parse_output_format_rejects_unknown_values() {
        let err = parse_output_format("yaml").expect_err("expected validation error");
        assert!(err.to_string().contains("Unsupported output format"));
    }

    #[test]
    fn parse_basis_accepts_both_bases() {
        assert_eq!(parse_basis("rolling").expect("rolling"), CostBasis::Rolling);
        assert_eq!(parse_basis("History").expect("history"), CostBasis::History);
        assert!(parse_basis("weekly").is_err());
    }

    #[test]
    fn parse_as_of_uses_given_date() {
        let date = parse_as_of(Some("2024-05-01")).expect("date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"));
        assert!(parse_as_of(Some("soon")).is_err());
    }
}
