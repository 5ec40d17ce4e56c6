//! Scrape one event's start lists into an xlsx workbook.
//!
//! ```text
//! race-scrape https://www.atg.se/spel/2024-01-20/V75/solvalla --output ./data/v75.xlsx
//! ```
//!
//! `CHROME_PATH` selects the browser binary; `RUST_LOG` the log level.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use race_scraper::{RaceService, ScrapeRequest, DEFAULT_DIVISION_COUNT};
use tower::ServiceExt;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "race-scrape", about = "Scrape race start lists into one sheet per division")]
struct Args {
    /// Event URL, e.g. https://www.atg.se/spel/2024-01-20/V75/solvalla
    base_url: String,

    /// Number of divisions to scrape (1..=N)
    #[arg(short, long, default_value_t = DEFAULT_DIVISION_COUNT)]
    divisions: u32,

    /// Only these divisions, comma separated
    #[arg(long, value_delimiter = ',')]
    only: Vec<u32>,

    /// Workbook path
    #[arg(short, long, default_value = "./data/races.xlsx")]
    output: PathBuf,

    /// Write the event JSON here instead of stdout
    #[arg(long)]
    json: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Save a screenshot and HTML dump per division
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    /// Skip the timestamped backup before overwriting the workbook
    #[arg(long)]
    no_backup: bool,

    /// Scrape only; leave the workbook alone
    #[arg(long)]
    no_write: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut request = ScrapeRequest::new(&args.base_url)
        .with_division_count(args.divisions)
        .with_divisions(args.only.clone())
        .with_workbook_path(&args.output)
        .with_headless(!args.headed)
        .with_backup(!args.no_backup)
        .with_write_workbook(!args.no_write);
    if let Some(dir) = &args.diagnostics {
        request = request.with_diagnostics_dir(dir);
    }

    let result = match RaceService::new().oneshot(request).await {
        Ok(result) => result,
        Err(e) => {
            error!("Scrape failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for failure in &result.failures {
        warn!("Division {} missing: {}", failure.division_number, failure.error);
    }

    let json = match serde_json::to_string_pretty(&result) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize result: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match &args.json {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                error!("Failed to write {:?}: {}", path, e);
                return ExitCode::FAILURE;
            }
            info!("Saved event JSON to {:?}", path);
        }
        None => println!("{}", json),
    }

    if result.is_complete() {
        ExitCode::SUCCESS
    } else {
        // Partial result: the caller decides whether to fall back.
        ExitCode::from(2)
    }
}
