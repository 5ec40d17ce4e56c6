use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::Serialize;
use tower::Service;
use tracing::info;

use crate::chrome::ChromeSession;
use crate::config::{ScraperConfig, DEFAULT_DIVISION_COUNT};
use crate::error::ScraperError;
use crate::race::{DivisionAggregator, DivisionFailure, Event};
use crate::traits::RaceBrowser;
use crate::workbook::WorkbookWriter;

/// One event to scrape.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub base_url: String,
    /// Explicit division numbers; `1..=division_count` when empty.
    pub divisions: Vec<u32>,
    pub division_count: u32,
    pub headless: bool,
    pub workbook_path: PathBuf,
    pub write_workbook: bool,
    pub backup: bool,
    pub diagnostics_dir: Option<PathBuf>,
}

impl ScrapeRequest {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            divisions: Vec::new(),
            division_count: DEFAULT_DIVISION_COUNT,
            headless: true,
            workbook_path: ScraperConfig::default().workbook_path,
            write_workbook: true,
            backup: true,
            diagnostics_dir: None,
        }
    }

    pub fn with_divisions(mut self, divisions: impl Into<Vec<u32>>) -> Self {
        self.divisions = divisions.into();
        self
    }

    pub fn with_division_count(mut self, count: u32) -> Self {
        self.division_count = count;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_workbook_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.workbook_path = path.into();
        self
    }

    pub fn with_write_workbook(mut self, write: bool) -> Self {
        self.write_workbook = write;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    /// Division numbers this request covers.
    pub fn division_numbers(&self) -> Vec<u32> {
        if self.divisions.is_empty() {
            (1..=self.division_count).collect()
        } else {
            self.divisions.clone()
        }
    }
}

impl From<&ScrapeRequest> for ScraperConfig {
    fn from(req: &ScrapeRequest) -> Self {
        ScraperConfig {
            headless: req.headless,
            workbook_path: req.workbook_path.clone(),
            backup_before_write: req.backup,
            diagnostics_dir: req.diagnostics_dir.clone(),
            ..Default::default()
        }
    }
}

/// Scrape outcome, serializable for relaying as JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub event: Event,
    pub attempted: usize,
    pub failures: Vec<DivisionFailure>,
    pub workbook_path: Option<PathBuf>,
}

impl ScrapeResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.event.divisions.len() == self.attempted
    }
}

/// Aggregate with `browser`, then write the workbook if asked to.
pub async fn scrape_with<B: RaceBrowser>(
    browser: B,
    config: &ScraperConfig,
    req: &ScrapeRequest,
) -> Result<ScrapeResult, ScraperError> {
    let report = DivisionAggregator::new(config)
        .aggregate_divisions(browser, &req.base_url, &req.division_numbers())
        .await?;

    let workbook_path = if req.write_workbook {
        let writer = WorkbookWriter::new(&config.workbook_path).with_backup(config.backup_before_write);
        writer.write(&report.event)?;
        Some(config.workbook_path.clone())
    } else {
        None
    };

    Ok(ScrapeResult {
        event: report.event,
        attempted: report.attempted,
        failures: report.failures,
        workbook_path,
    })
}

/// tower::Service entry point: one request launches one browser session.
#[derive(Debug, Clone, Default)]
pub struct RaceService {}

impl RaceService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<ScrapeRequest> for RaceService {
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!("Scrape request received: {}", req.base_url);

        Box::pin(async move {
            let config = ScraperConfig::from(&req);
            let browser = ChromeSession::launch(&config).await?;

            let result = scrape_with(browser, &config, &req).await?;

            info!(
                "Scrape finished: {}/{} divisions, workbook={:?}",
                result.event.divisions.len(),
                result.attempted,
                result.workbook_path
            );
            Ok(result)
        })
    }
}
