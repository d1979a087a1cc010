use std::process::ExitCode;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use brewcal::config::Config;
use brewcal::model::{BrewType, Day, DaySpan};
use brewcal::service::{BookingRequest, Scheduler};

const USAGE: &str = "usage:
  brewcal [DATE]                          occupancy report (default today)
  brewcal status [DATE]
  brewcal runs [FROM TO]                  runs overlapping [FROM, TO)
  brewcal schedule RUN_ID
  brewcal book TITLE DATE TYPE [TRANSFER] TYPE: top_fermenting | bottom_fermenting
  brewcal cancel RUN_ID
  brewcal appointments";

enum Cli {
    Status(Option<Day>),
    Runs(Option<DaySpan>),
    Schedule(ulid::Ulid),
    Book(BookingRequest),
    Cancel(ulid::Ulid),
    Appointments,
}

fn parse_day(s: &str) -> Result<Day, String> {
    s.parse::<NaiveDate>()
        .map_err(|e| format!("bad date {s:?} (expected YYYY-MM-DD): {e}"))
}

fn parse_id(s: &str) -> Result<ulid::Ulid, String> {
    ulid::Ulid::from_string(s).map_err(|e| format!("bad run id {s:?}: {e}"))
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] | ["status"] => Ok(Cli::Status(None)),
        ["status", date] => Ok(Cli::Status(Some(parse_day(date)?))),
        ["runs"] => Ok(Cli::Runs(None)),
        ["runs", from, to] => {
            let (from, to) = (parse_day(from)?, parse_day(to)?);
            if from >= to {
                return Err("FROM must be before TO".into());
            }
            Ok(Cli::Runs(Some(DaySpan::new(from, to))))
        }
        ["schedule", id] => Ok(Cli::Schedule(parse_id(id)?)),
        ["book", title, date, kind, rest @ ..] if rest.len() <= 1 => {
            let brew_type = BrewType::parse(kind).ok_or_else(|| format!("unknown brew type {kind:?}"))?;
            let mut request = BookingRequest::new(*title, parse_day(date)?, brew_type);
            if let [transfer] = rest {
                request = request.with_transfer(parse_day(transfer)?);
            }
            Ok(Cli::Book(request))
        }
        ["cancel", id] => Ok(Cli::Cancel(parse_id(id)?)),
        ["appointments"] => Ok(Cli::Appointments),
        [date] => Ok(Cli::Status(Some(parse_day(date)?))),
        _ => Err(USAGE.into()),
    }
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    brewcal::observability::init(config.metrics_port);

    info!("brewcal starting");
    info!("  storage: {}", config.storage.label());
    info!("  data_dir: {}", config.data_dir.display());
    info!("  pool: {} tanks, {} containers", config.tanks, config.containers);
    info!("  candidate span: {:?}", config.candidate_span);

    let scheduler = Scheduler::from_config(&config).await?;

    match cli {
        Cli::Status(date) => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            print_json(&scheduler.status(date).await?)?;
        }
        Cli::Runs(None) => print_json(&scheduler.runs().await?)?,
        Cli::Runs(Some(window)) => print_json(&scheduler.runs_between(window).await?)?,
        Cli::Schedule(id) => print_json(&scheduler.schedule_of(id).await?)?,
        Cli::Book(request) => print_json(&scheduler.book(request).await?)?,
        Cli::Cancel(id) => print_json(&scheduler.cancel(id).await?)?,
        Cli::Appointments => print_json(&scheduler.appointments().await?)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
