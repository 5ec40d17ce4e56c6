//! Division page loading: retry, settle, consent dismissal, diagnostics

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use scraper::{Html, Selector};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::RaceBrowser;

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Upper bound for the content-selector wait after settling.
const CONTENT_WAIT: Duration = Duration::from_secs(10);

/// A loaded division page, snapshotted as HTML.
#[derive(Debug, Clone)]
pub struct PageHandle {
    pub url: String,
    pub html: String,
}

/// One known shape of a cookie/consent "accept" control.
pub struct ConsentStrategy {
    pub name: &'static str,
    pub selector: &'static str,
}

impl ConsentStrategy {
    /// Whether this strategy's control exists in the DOM snapshot.
    pub fn probe(&self, document: &Html) -> Option<&'static str> {
        let selector = Selector::parse(self.selector).ok()?;
        document
            .select(&selector)
            .next()
            .map(|_| self.selector)
    }
}

/// Tried in order; the first visible match is clicked.
pub const CONSENT_STRATEGIES: &[ConsentStrategy] = &[
    ConsentStrategy { name: "onetrust", selector: "#onetrust-accept-btn-handler" },
    ConsentStrategy {
        name: "accept-all-data-test-id",
        selector: "button[data-test-id='accept-all-cookies']",
    },
    ConsentStrategy { name: "cookiebot", selector: "#CybotCookiebotDialogBodyLevelButtonLLWhitelist" },
    ConsentStrategy { name: "aria-accept", selector: "button[aria-label*='Godkänn'], button[aria-label*='Accept']" },
    ConsentStrategy { name: "consent-class", selector: "[class*='consent'] button, [id*='consent'] button" },
];

/// Strategies whose controls are present in `html`, in priority order.
pub fn matching_consent_strategies(html: &str) -> Vec<&'static ConsentStrategy> {
    let document = Html::parse_document(html);
    CONSENT_STRATEGIES
        .iter()
        .filter(|s| s.probe(&document).is_some())
        .collect()
}

/// Exponential from `INITIAL_BACKOFF_MS`, capped at `MAX_BACKOFF_MS`.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

pub struct Navigator<'a> {
    config: &'a ScraperConfig,
}

impl<'a> Navigator<'a> {
    pub fn new(config: &'a ScraperConfig) -> Self {
        Self { config }
    }

    /// Load a division page and return its settled DOM.
    pub async fn open<B: RaceBrowser + ?Sized>(
        &self,
        browser: &mut B,
        url: &str,
        division: u32,
    ) -> Result<PageHandle, ScraperError> {
        info!("Opening division {}: {}", division, url);

        self.goto_with_retry(browser, url).await?;

        if !self.config.settle_wait.is_zero() {
            sleep(self.config.settle_wait).await;
        }

        if let Err(e) = self.dismiss_consent(browser).await {
            if e.is_session_fatal() {
                return Err(e);
            }
            debug!("Consent dismissal failed: {}", e);
        }

        let rendered = browser
            .wait_for_selector(&self.config.content_selector, CONTENT_WAIT)
            .await?;
        if !rendered {
            warn!(
                "Division {}: content selector {:?} not found, continuing",
                division, self.config.content_selector
            );
        }
        browser.wait_stable().await?;

        let html = browser.content().await?;

        if let Some(dir) = &self.config.diagnostics_dir {
            self.capture_diagnostics(browser, dir, division, &html).await;
        }

        Ok(PageHandle {
            url: url.to_string(),
            html,
        })
    }

    /// Each attempt is bounded by the configured timeout; retryable failures
    /// back off exponentially.
    async fn goto_with_retry<B: RaceBrowser + ?Sized>(
        &self,
        browser: &mut B,
        url: &str,
    ) -> Result<(), ScraperError> {
        let attempts = self.config.navigation_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            let result = match timeout(self.config.timeout, browser.goto(url)).await {
                // A page that never settles is still a failed navigation.
                Ok(result) => result.map_err(|e| match e {
                    ScraperError::Timeout(cause) => ScraperError::navigation(url, cause),
                    other => other,
                }),
                Err(_) => Err(ScraperError::navigation(
                    url,
                    format!("timed out after {:?}", self.config.timeout),
                )),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let backoff = backoff_delay(attempt);
                    warn!(
                        "Navigation attempt {} failed, retrying in {:?}: {}",
                        attempt + 1,
                        backoff,
                        e
                    );
                    sleep(backoff).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ScraperError::navigation(url, "no attempts made")))
    }

    /// Click the first visible consent control. Finding none is normal once
    /// consent has been given earlier in the session.
    async fn dismiss_consent<B: RaceBrowser + ?Sized>(
        &self,
        browser: &mut B,
    ) -> Result<bool, ScraperError> {
        let html = browser.content().await?;
        let candidates = matching_consent_strategies(&html);

        for strategy in candidates {
            if browser.click_if_visible(strategy.selector).await? {
                info!("Dismissed consent dialog via {}", strategy.name);
                sleep(Duration::from_millis(500)).await;
                return Ok(true);
            }
            debug!("Consent control {} present but not visible", strategy.name);
        }

        debug!("No consent dialog found");
        Ok(false)
    }

    /// Best effort; never fails the division.
    async fn capture_diagnostics<B: RaceBrowser + ?Sized>(
        &self,
        browser: &mut B,
        dir: &Path,
        division: u32,
        html: &str,
    ) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create diagnostics directory {:?}: {}", dir, e);
            return;
        }

        let html_path = dir.join(format!("division-{}.html", division));
        match std::fs::write(&html_path, html) {
            Ok(()) => debug!("Saved page HTML to {:?}", html_path),
            Err(e) => warn!("Failed to save page HTML: {}", e),
        }

        match browser.screenshot().await {
            Ok(png) => {
                let png_path = dir.join(format!("division-{}.png", division));
                if let Err(e) = std::fs::write(&png_path, &png) {
                    warn!("Failed to save screenshot: {}", e);
                    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
                    debug!("Division {} screenshot: data:image/png;base64,{}", division, encoded);
                } else {
                    debug!("Saved screenshot to {:?}", png_path);
                }
            }
            Err(e) => warn!("Screenshot failed: {}", e),
        }
    }
}
