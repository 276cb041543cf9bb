//! Smoke run configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then whatever the binary applies from its flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SmokeError, SmokeResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Deployment under test; every request and navigation is relative to it
    pub base_url: String,

    /// Account the scenario signs in with
    pub credentials: Credentials,

    /// Name of the session cookie issued by `POST /api/login`
    pub session_cookie: String,

    /// Chromium launch options
    pub browser: BrowserOptions,

    /// Per-wait bounds
    pub timeouts: Timeouts,

    /// Retry policy for switching sub-applications
    pub navigation: NavigationPolicy,

    /// Where diagnostics are written
    pub artifacts: ArtifactConfig,

    /// Run the best-effort secondary application section
    pub check_land: bool,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: Credentials::default(),
            session_cookie: "sid".to_string(),
            browser: BrowserOptions::default(),
            timeouts: Timeouts::default(),
            navigation: NavigationPolicy::default(),
            artifacts: ArtifactConfig::default(),
            check_land: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        // Fixture account seeded in every deployment the smoke check targets
        Self {
            username: "huda".to_string(),
            password: "Damjan1!".to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub chrome_executable: Option<PathBuf>,
    /// Pass `--no-sandbox` (needed in most containers)
    pub no_sandbox: bool,
    /// CDP request timeout
    pub request_timeout_ms: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            chrome_executable: None,
            no_sandbox: false,
            request_timeout_ms: 30_000,
        }
    }
}

/// Wait bounds, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Simple element waits (form fields, buttons, theme attribute)
    pub element_ms: u64,
    /// Tag chip rendering after a task is opened
    pub tag_ms: u64,
    /// A root layout or task card becoming visible
    pub view_ms: u64,
    /// Full UI login round trip (network response and layout)
    pub login_ms: u64,
    /// Reload-and-wait after a positive session probe
    pub fast_path_ms: u64,
    /// Backend listing polls
    pub api_poll_ms: u64,
    /// How long a deleted task's card must stay absent after the board reloads
    pub settle_ms: u64,
    /// Interval between DOM and API polls
    pub poll_interval_ms: u64,
    /// Shared budget for every navigation strategy of one switch
    pub navigation_budget_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_ms: 5_000,
            tag_ms: 8_000,
            view_ms: 15_000,
            login_ms: 20_000,
            fast_path_ms: 10_000,
            api_poll_ms: 15_000,
            settle_ms: 2_000,
            poll_interval_ms: 100,
            navigation_budget_ms: 60_000,
        }
    }
}

impl Timeouts {
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn tag(&self) -> Duration {
        Duration::from_millis(self.tag_ms)
    }

    pub fn view(&self) -> Duration {
        Duration::from_millis(self.view_ms)
    }

    pub fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub fn fast_path(&self) -> Duration {
        Duration::from_millis(self.fast_path_ms)
    }

    pub fn api_poll(&self) -> Duration {
        Duration::from_millis(self.api_poll_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn navigation_budget(&self) -> Duration {
        Duration::from_millis(self.navigation_budget_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationPolicy {
    /// UI click attempts before falling back
    pub menu_attempts: u32,
    /// UI click attempts after the persisted-state reload
    pub fallback_attempts: u32,
    /// Fixed delay between attempts
    pub backoff_ms: u64,
    /// Client-side persisted key holding the active sub-application
    pub state_key: String,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self {
            menu_attempts: 3,
            fallback_attempts: 2,
            backoff_ms: 500,
            state_key: "activeApp".to_string(),
        }
    }
}

impl NavigationPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub screenshot_name: String,
    pub report_name: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".cpcache"),
            screenshot_name: "app-smoke.png".to_string(),
            report_name: "app-smoke.json".to_string(),
        }
    }
}

impl ArtifactConfig {
    pub fn screenshot_path(&self) -> PathBuf {
        self.dir.join(&self.screenshot_name)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report_name)
    }
}

impl SmokeConfig {
    /// Load configuration from a TOML file, or defaults when there is none
    pub fn load(path: Option<&Path>) -> SmokeResult<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> SmokeResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `APP_URL`, `APP_SMOKE_USERNAME`, `APP_SMOKE_PASSWORD` and
    /// `APP_SMOKE_ARTIFACT_DIR` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("APP_URL") {
            self.base_url = url;
        }
        if let Some(username) = non_empty("APP_SMOKE_USERNAME") {
            self.credentials.username = username;
        }
        if let Some(password) = non_empty("APP_SMOKE_PASSWORD") {
            self.credentials.password = password;
        }
        if let Some(dir) = non_empty("APP_SMOKE_ARTIFACT_DIR") {
            self.artifacts.dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> SmokeResult<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SmokeError::Config(format!("base_url '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SmokeError::Config(format!(
                "base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.credentials.username.trim().is_empty() {
            return Err(SmokeError::Config("username must not be empty".into()));
        }
        if self.session_cookie.trim().is_empty() {
            return Err(SmokeError::Config("session_cookie must not be empty".into()));
        }
        if self.navigation.menu_attempts == 0 || self.navigation.fallback_attempts == 0 {
            return Err(SmokeError::Config(
                "navigation attempt counts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Absolute URL for a path on the deployment
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
