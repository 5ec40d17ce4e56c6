//! Scripted in-memory browser serving canned HTML.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::ScraperError;
use crate::traits::RaceBrowser;

#[derive(Debug, Default, Clone)]
pub struct FakeLog {
    pub gotos: Vec<String>,
    pub clicks: Vec<String>,
    pub closed: bool,
}

#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, String>,
    hidden: HashSet<String>,
    failures: HashMap<String, u32>,
    broken_content: HashSet<String>,
    dead_at: Option<String>,
    never_ready: HashSet<String>,
    load_delay: Option<Duration>,
    current: Option<String>,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Matching elements exist but are not visible.
    pub fn with_hidden(mut self, selector: &str) -> Self {
        self.hidden.insert(selector.to_string());
        self
    }

    /// The first `times` navigations to `url` fail.
    pub fn failing_first(mut self, url: &str, times: u32) -> Self {
        self.failures.insert(url.to_string(), times);
        self
    }

    /// Navigation works but reading the DOM fails.
    pub fn with_broken_content(mut self, url: &str) -> Self {
        self.broken_content.insert(url.to_string());
        self
    }

    /// The browser process dies when `url` is requested.
    pub fn dying_at(mut self, url: &str) -> Self {
        self.dead_at = Some(url.to_string());
        self
    }

    /// Navigation starts but the document never finishes loading.
    pub fn never_ready(mut self, url: &str) -> Self {
        self.never_ready.insert(url.to_string());
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn log(&self) -> FakeLog {
        self.log.lock().unwrap().clone()
    }

    /// Handle that outlives the browser being moved into a pipeline.
    pub fn shared_log(&self) -> Arc<Mutex<FakeLog>> {
        self.log.clone()
    }

    fn current_html(&self) -> &str {
        self.current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

fn matches(html: &str, selector: &str) -> bool {
    let Ok(selector) = Selector::parse(selector) else {
        return false;
    };
    Html::parse_document(html).select(&selector).next().is_some()
}

#[async_trait]
impl RaceBrowser for FakeBrowser {
    async fn goto(&mut self, url: &str) -> Result<(), ScraperError> {
        self.log.lock().unwrap().gotos.push(url.to_string());

        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.dead_at.as_deref() == Some(url) {
            return Err(ScraperError::Session("browser process has exited".into()));
        }
        if let Some(remaining) = self.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ScraperError::navigation(url, "net::ERR_CONNECTION_RESET"));
            }
        }
        if self.never_ready.contains(url) {
            return Err(ScraperError::Timeout(
                "document.readyState did not reach complete".into(),
            ));
        }
        if !self.pages.contains_key(url) {
            return Err(ScraperError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"));
        }

        self.current = Some(url.to_string());
        Ok(())
    }

    async fn click_if_visible(&mut self, selector: &str) -> Result<bool, ScraperError> {
        if self.hidden.contains(selector) || !matches(self.current_html(), selector) {
            return Ok(false);
        }
        self.log.lock().unwrap().clicks.push(selector.to_string());
        Ok(true)
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, ScraperError> {
        Ok(matches(self.current_html(), selector))
    }

    async fn content(&mut self) -> Result<String, ScraperError> {
        if let Some(url) = &self.current {
            if self.broken_content.contains(url) {
                return Err(ScraperError::Extraction(format!("DOM snapshot failed for {}", url)));
            }
        }
        Ok(self.current_html().to_string())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, ScraperError> {
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}
