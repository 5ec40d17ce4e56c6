use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScraperError;

/// Capabilities the pipeline needs from a browser session.
///
/// `ChromeSession` drives a real browser; tests script a fake that serves
/// canned HTML, so navigation and extraction logic never depend on Chrome.
#[async_trait]
pub trait RaceBrowser: Send {
    /// Load `url` and return once the document has loaded.
    async fn goto(&mut self, url: &str) -> Result<(), ScraperError>;

    /// Click the first element matching `selector` if it is visible.
    /// Returns whether a click happened.
    async fn click_if_visible(&mut self, selector: &str) -> Result<bool, ScraperError>;

    /// Poll until `selector` matches or `timeout` elapses.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError>;

    /// Wait for client-side rendering to stop changing the DOM.
    async fn wait_stable(&mut self) -> Result<(), ScraperError> {
        Ok(())
    }

    /// Serialized DOM of the current page.
    async fn content(&mut self) -> Result<String, ScraperError>;

    /// PNG screenshot of the current page.
    async fn screenshot(&mut self) -> Result<Vec<u8>, ScraperError>;

    /// Release the session.
    async fn close(&mut self) -> Result<(), ScraperError>;
}
