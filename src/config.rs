use std::path::PathBuf;
use std::time::Duration;

/// Divisions in a standard V75 card.
pub const DEFAULT_DIVISION_COUNT: u32 = 7;

/// Event code used when the base URL does not carry one.
pub const DEFAULT_EVENT_CODE: &str = "V75";

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub headless: bool,
    /// Browser executable; falls back to `CHROME_PATH` / `CHROMIUM_PATH`.
    pub chrome_path: Option<PathBuf>,
    /// Budget for one navigation attempt.
    pub timeout: Duration,
    pub navigation_retries: u32,
    /// Fixed wait after load before the page is queried.
    pub settle_wait: Duration,
    /// Selector whose presence means the start list has rendered.
    pub content_selector: String,
    pub event_code: String,
    pub workbook_path: PathBuf,
    pub backup_before_write: bool,
    /// Screenshot/HTML dumps go here when set.
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            timeout: Duration::from_secs(60),
            navigation_retries: 2,
            settle_wait: Duration::from_secs(3),
            content_selector: "[data-test-id*='startlist'], [role='row'], table tbody tr".to_string(),
            event_code: DEFAULT_EVENT_CODE.to_string(),
            workbook_path: PathBuf::from("./data/races.xlsx"),
            backup_before_write: true,
            diagnostics_dir: None,
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_navigation_retries(mut self, retries: u32) -> Self {
        self.navigation_retries = retries;
        self
    }

    pub fn with_settle_wait(mut self, wait: Duration) -> Self {
        self.settle_wait = wait;
        self
    }

    pub fn with_content_selector(mut self, selector: impl Into<String>) -> Self {
        self.content_selector = selector.into();
        self
    }

    pub fn with_event_code(mut self, code: impl Into<String>) -> Self {
        self.event_code = code.into();
        self
    }

    pub fn with_workbook_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.workbook_path = path.into();
        self
    }

    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_before_write = enabled;
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    /// Explicit path, then the environment, then `chromium` on `PATH`.
    pub fn resolve_chrome_path(&self) -> PathBuf {
        self.chrome_path
            .clone()
            .or_else(|| std::env::var_os("CHROME_PATH").map(PathBuf::from))
            .or_else(|| std::env::var_os("CHROMIUM_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("chromium"))
    }
}
