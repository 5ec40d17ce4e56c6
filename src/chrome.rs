use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::RaceBrowser;

/// Poll interval for readyState / selector checks (ms)
const POLL_INTERVAL_MS: u64 = 500;
/// Upper bound for `document.readyState == "complete"` polling (ms)
const READY_STATE_TIMEOUT_MS: u64 = 30000;
/// Upper bound for the DOM-size stability check (ms)
const PAGE_STABLE_TIMEOUT_MS: u64 = 10000;

/// A single Chrome instance with one tab, reused across divisions.
pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

impl ChromeSession {
    /// Launch the browser. Any failure here is a `Session` error.
    pub async fn launch(config: &ScraperConfig) -> Result<Self, ScraperError> {
        info!("Launching browser (headless={})...", config.headless);

        let chrome_path = config.resolve_chrome_path();
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1280, 1024);

        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(config.timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=sv-SE");

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::Session(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::Session(e.to_string()))?;

        // The CDP handler must be driven for the whole session; when it
        // stops, the browser is gone.
        let alive = Arc::new(AtomicBool::new(true));
        let flag = alive.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {}", e);
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!("Browser handler finished");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::Session(e.to_string()))?;

        info!("Browser launched");
        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handle),
            alive,
        })
    }

    fn page(&self) -> Result<&Page, ScraperError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(ScraperError::Session("browser process has exited".into()));
        }
        self.page
            .as_ref()
            .ok_or_else(|| ScraperError::Session("browser is not open".into()))
    }

    async fn eval_bool(&self, script: &str) -> Result<bool, ScraperError> {
        let page = self.page()?;
        let value = page
            .evaluate(script)
            .await
            .map_err(|e| ScraperError::Extraction(format!("script evaluation: {}", e)))?;
        Ok(value.into_value::<bool>().unwrap_or(false))
    }

    async fn wait_ready_state(&self, url: &str) -> Result<(), ScraperError> {
        let page = self.page()?;
        let start = Instant::now();
        let timeout = Duration::from_millis(READY_STATE_TIMEOUT_MS);

        while start.elapsed() < timeout {
            let state = page
                .evaluate("document.readyState")
                .await
                .map_err(|e| ScraperError::navigation(url, e))?
                .into_value::<String>()
                .unwrap_or_default();

            if state == "complete" {
                debug!("Page load complete after {:?}", start.elapsed());
                return Ok(());
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }

        Err(ScraperError::Timeout(format!(
            "{} did not reach readyState=complete within {:?}",
            url, timeout
        )))
    }
}

/// Embed a CSS selector in a script as a JSON string literal.
fn js_string(selector: &str) -> String {
    serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl RaceBrowser for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<(), ScraperError> {
        debug!("Navigating to {}", url);
        self.page()?
            .goto(url)
            .await
            .map_err(|e| ScraperError::navigation(url, e))?;
        self.wait_ready_state(url).await
    }

    async fn click_if_visible(&mut self, selector: &str) -> Result<bool, ScraperError> {
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                const visible = style.display !== 'none' &&
                                style.visibility !== 'hidden' &&
                                style.opacity !== '0' &&
                                (rect.width > 0 || rect.height > 0);
                if (!visible) return false;
                el.click();
                return true;
            }})()
        "#,
            js_string(selector)
        );
        self.eval_bool(&script).await
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError> {
        let script = format!("document.querySelector({}) !== null", js_string(selector));
        let start = Instant::now();

        loop {
            match self.eval_bool(&script).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => debug!("Selector check failed: {}", e),
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn wait_stable(&mut self) -> Result<(), ScraperError> {
        let page = self.page()?;
        let start = Instant::now();
        let timeout = Duration::from_millis(PAGE_STABLE_TIMEOUT_MS);

        let mut last_html_len: Option<usize> = None;
        let mut stable_count = 0;
        const REQUIRED_STABLE_CHECKS: u32 = 3;

        while start.elapsed() < timeout {
            match page.evaluate("document.documentElement.outerHTML.length").await {
                Ok(val) => {
                    let current_len = val.into_value::<usize>().unwrap_or(0);
                    match last_html_len {
                        Some(last) if last == current_len => {
                            stable_count += 1;
                            if stable_count >= REQUIRED_STABLE_CHECKS {
                                debug!("Page stable after {:?}", start.elapsed());
                                return Ok(());
                            }
                        }
                        _ => stable_count = 0,
                    }
                    last_html_len = Some(current_len);
                }
                Err(e) => {
                    debug!("Page stable check error: {}", e);
                    stable_count = 0;
                }
            }
            sleep(Duration::from_millis(300)).await;
        }

        warn!("Page stable timeout after {:?}, proceeding anyway", start.elapsed());
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ScraperError> {
        self.page()?
            .content()
            .await
            .map_err(|e| ScraperError::Extraction(format!("page content: {}", e)))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, ScraperError> {
        self.page()?
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| ScraperError::Extraction(format!("screenshot: {}", e)))
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        info!("Closing browser...");

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close command failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Waiting for browser exit failed: {}", e);
            }
        }

        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
        self.alive.store(false, Ordering::SeqCst);

        info!("Browser closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("button[id='a\"b']"), r#""button[id='a\"b']""#);
    }

    #[tokio::test]
    #[ignore] // needs a local Chrome: cargo test test_chrome_session -- --ignored --nocapture
    async fn test_chrome_session() {
        let config = ScraperConfig::new();
        let mut session = ChromeSession::launch(&config)
            .await
            .expect("Failed to launch browser");
        session
            .goto("data:text/html,<div role='row'>Test Horse 12,5%</div>")
            .await
            .expect("navigation failed");
        let html = session.content().await.expect("no content");
        assert!(html.contains("Test Horse"));
        session.close().await.expect("close failed");
    }
}
