//! Sequential per-division scrape of one event

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::RaceBrowser;

use super::extractor::EntrantExtractor;
use super::navigator::Navigator;
use super::types::{Division, Event};

/// Date, game and track parsed from an event URL such as
/// `https://www.atg.se/spel/2024-01-20/V75/solvalla`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub date: NaiveDate,
    pub event_type: String,
    pub track_name: String,
}

impl EventInfo {
    /// Falls back to today / the configured code / `unknown` for anything the
    /// URL does not carry.
    pub fn from_base_url(base_url: &str, default_code: &str) -> Self {
        let segments: Vec<String> = Url::parse(base_url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            })
            .unwrap_or_default();

        let date_index = segments
            .iter()
            .position(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());

        let (date, event_type, track_name) = match date_index {
            Some(i) => (
                NaiveDate::parse_from_str(&segments[i], "%Y-%m-%d").ok(),
                segments.get(i + 1).cloned(),
                segments.get(i + 2).cloned(),
            ),
            None => (None, None, None),
        };

        Self {
            date: date.unwrap_or_else(|| Utc::now().date_naive()),
            event_type: event_type.unwrap_or_else(|| default_code.to_string()),
            track_name: track_name.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// `{base_url}/avd/{division}`
pub fn division_url(base_url: &str, division: u32) -> String {
    format!("{}/avd/{}", base_url.trim_end_matches('/'), division)
}

/// A division that could not be scraped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionFailure {
    pub division_number: u32,
    pub error: String,
}

/// Outcome of one aggregate run. Failed divisions are omitted from
/// `event.divisions` and listed in `failures`.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub event: Event,
    pub attempted: usize,
    pub failures: Vec<DivisionFailure>,
}

impl AggregateReport {
    pub fn succeeded(&self) -> usize {
        self.event.divisions.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.succeeded() == self.attempted
    }
}

pub struct DivisionAggregator<'a> {
    config: &'a ScraperConfig,
}

impl<'a> DivisionAggregator<'a> {
    pub fn new(config: &'a ScraperConfig) -> Self {
        Self { config }
    }

    /// Scrape divisions `1..=division_count`.
    pub async fn aggregate<B: RaceBrowser>(
        &self,
        browser: B,
        base_url: &str,
        division_count: u32,
    ) -> Result<AggregateReport, ScraperError> {
        let divisions: Vec<u32> = (1..=division_count).collect();
        self.aggregate_divisions(browser, base_url, &divisions).await
    }

    /// Scrape the given divisions in ascending order. The session is owned by
    /// this call and closed before it returns, whatever the outcome.
    pub async fn aggregate_divisions<B: RaceBrowser>(
        &self,
        mut browser: B,
        base_url: &str,
        divisions: &[u32],
    ) -> Result<AggregateReport, ScraperError> {
        let result = self.run(&mut browser, base_url, divisions).await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser session: {}", e);
        }

        result
    }

    async fn run<B: RaceBrowser>(
        &self,
        browser: &mut B,
        base_url: &str,
        divisions: &[u32],
    ) -> Result<AggregateReport, ScraperError> {
        let mut numbers: Vec<u32> = divisions.iter().copied().filter(|n| *n > 0).collect();
        numbers.sort_unstable();
        numbers.dedup();

        let info = EventInfo::from_base_url(base_url, &self.config.event_code);
        info!(
            "Scraping {} {} {} ({} divisions)",
            info.date,
            info.event_type,
            info.track_name,
            numbers.len()
        );

        let extractor = EntrantExtractor::new(&info.event_type);
        let mut event = Event {
            date: info.date,
            track_name: info.track_name,
            event_type: info.event_type,
            divisions: Vec::with_capacity(numbers.len()),
        };
        let mut failures = Vec::new();

        let event_type = event.event_type.clone();
        for &number in &numbers {
            let outcome = self
                .scrape_division(browser, &extractor, base_url, number, &event_type)
                .await;
            match outcome {
                Ok(division) => {
                    if division.entrants.is_empty() {
                        warn!("Division {} has no entrants", number);
                    }
                    event.divisions.push(division);
                }
                Err(e) if e.is_session_fatal() => {
                    error!("Division {}: browser session lost: {}", number, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Division {} failed, skipping: {}", number, e);
                    failures.push(DivisionFailure {
                        division_number: number,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Scraped {}/{} divisions, {} entrants",
            event.divisions.len(),
            numbers.len(),
            event.entrant_count()
        );

        Ok(AggregateReport {
            event,
            attempted: numbers.len(),
            failures,
        })
    }

    async fn scrape_division<B: RaceBrowser>(
        &self,
        browser: &mut B,
        extractor: &EntrantExtractor,
        base_url: &str,
        number: u32,
        event_type: &str,
    ) -> Result<Division, ScraperError> {
        let url = division_url(base_url, number);
        let page = Navigator::new(self.config).open(browser, &url, number).await?;

        let extraction = extractor.extract(&page.html);
        let meta = extractor.division_meta(&page.html);

        Ok(Division {
            division_number: number,
            title: if meta.title.is_empty() {
                format!("{} {}", event_type, number)
            } else {
                meta.title
            },
            distance: meta.distance,
            event_type: event_type.to_string(),
            entrants: extraction.entrants,
        })
    }
}
