//! Race start-list scraper
//!
//! - Drives Chrome through each division page of one betting event
//! - Extracts entrants (name, market percentages, odds, scratch status, shoes)
//! - Writes one xlsx sheet per division
//!
//! # Usage
//!
//! ```rust,ignore
//! use race_scraper::{RaceService, ScrapeRequest};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = RaceService::new();
//!
//!     let request = ScrapeRequest::new("https://www.atg.se/spel/2024-01-20/V75/solvalla")
//!         .with_workbook_path("./data/v75.xlsx")
//!         .with_headless(false);
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("divisions: {}", result.event.divisions.len());
//! }
//! ```
//!
//! # Without the service
//!
//! ```rust,ignore
//! use race_scraper::{ChromeSession, DivisionAggregator, ScraperConfig, WorkbookWriter};
//!
//! let config = ScraperConfig::new();
//! let session = ChromeSession::launch(&config).await?;
//! let report = DivisionAggregator::new(&config)
//!     .aggregate(session, "https://www.atg.se/spel/2024-01-20/V75/solvalla", 7)
//!     .await?;
//! WorkbookWriter::new(&config.workbook_path).write(&report.event)?;
//! ```

pub mod chrome;
pub mod config;
pub mod error;
pub mod race;
pub mod service;
pub mod traits;
pub mod workbook;

pub use chrome::ChromeSession;
pub use config::{ScraperConfig, DEFAULT_DIVISION_COUNT};
pub use error::ScraperError;
pub use race::{
    AggregateReport, Division, DivisionAggregator, Entrant, Equipment, Event, NO_QUOTE_ODDS,
};
pub use service::{scrape_with, RaceService, ScrapeRequest, ScrapeResult};
pub use traits::RaceBrowser;
pub use workbook::WorkbookWriter;
