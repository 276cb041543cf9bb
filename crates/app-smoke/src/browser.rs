//! Chromium lifecycle and the CDP-backed [`PageDriver`]

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrowserOptions, Timeouts};
use crate::driver::{Locator, ObservedResponse, PageDriver, ResponseMatcher, ResponseWaiter};
use crate::error::{SmokeError, SmokeResult};
use crate::script;
use crate::token::SessionCredential;
use crate::wait::Wait;

/// One Chromium process with one page for the whole run
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Arc<CdpPage>,
}

impl BrowserSession {
    pub async fn launch(options: &BrowserOptions, timeouts: &Timeouts) -> SmokeResult<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                ..Viewport::default()
            })
            .request_timeout(Duration::from_millis(options.request_timeout_ms));

        if !options.headless {
            builder = builder.with_head();
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| SmokeError::Browser(format!("invalid browser config: {}", e)))?;

        info!(
            headless = options.headless,
            width = options.viewport_width,
            height = options.viewport_height,
            "Launching Chromium"
        );
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e.into());
            }
        };

        Ok(Self {
            browser,
            handler,
            page: Arc::new(CdpPage::new(page, timeouts)),
        })
    }

    pub fn page(&self) -> Arc<CdpPage> {
        Arc::clone(&self.page)
    }

    /// Close the browser and reap the process. Errors are logged, never returned,
    /// so teardown cannot mask the run's verdict.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close returned error: {}", e);
            self.browser.kill().await;
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit failed: {}", e);
        }
        self.handler.abort();
        info!("Browser terminated");
    }
}

/// [`PageDriver`] over a chromiumoxide [`Page`]
pub struct CdpPage {
    page: Page,
    markers: AtomicU64,
    poll: Duration,
    load_timeout: Duration,
}

impl CdpPage {
    pub fn new(page: Page, timeouts: &Timeouts) -> Self {
        Self {
            page,
            markers: AtomicU64::new(0),
            poll: timeouts.poll_interval(),
            load_timeout: timeouts.view(),
        }
    }

    async fn eval(&self, expression: String) -> SmokeResult<serde_json::Value> {
        let result = self.page.evaluate_expression(expression).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Resolve a locator in page context and hand the element to CDP
    async fn resolve(&self, locator: &Locator) -> SmokeResult<Element> {
        let marker = self.markers.fetch_add(1, Ordering::Relaxed).to_string();
        let found = self.eval(script::tag_target(locator, &marker)).await?;
        if found.as_bool() != Some(true) {
            return Err(SmokeError::ElementNotFound(locator.to_string()));
        }
        Ok(self.page.find_element(script::target_selector(&marker)).await?)
    }

    async fn wait_loaded(&self) -> SmokeResult<()> {
        Wait::new(self, self.poll).ready(self.load_timeout).await
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> SmokeResult<()> {
        debug!("goto {}", url);
        self.page.goto(url).await?;
        self.wait_loaded().await
    }

    async fn reload(&self) -> SmokeResult<()> {
        debug!("reload");
        self.page.reload().await?;
        self.wait_loaded().await
    }

    async fn is_visible(&self, locator: &Locator) -> SmokeResult<bool> {
        Ok(self.eval(script::is_visible(locator)).await?.as_bool() == Some(true))
    }

    async fn count(&self, locator: &Locator) -> SmokeResult<usize> {
        let n = self.eval(script::count(locator)).await?;
        Ok(n.as_u64().unwrap_or(0) as usize)
    }

    async fn click(&self, locator: &Locator) -> SmokeResult<()> {
        self.resolve(locator).await?.click().await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> SmokeResult<()> {
        let element = self.resolve(locator).await?;
        self.eval(script::set_value(locator, "")).await?;
        element.focus().await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn press(&self, locator: &Locator, key: &str) -> SmokeResult<()> {
        let element = self.resolve(locator).await?;
        element.focus().await?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> SmokeResult<()> {
        let applied = self.eval(script::set_value(locator, value)).await?;
        if applied.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(SmokeError::ElementNotFound(format!(
                "{} with option '{}'",
                locator, value
            )))
        }
    }

    async fn input_value(&self, locator: &Locator) -> SmokeResult<String> {
        match self.eval(script::input_value(locator)).await? {
            serde_json::Value::String(value) => Ok(value),
            _ => Err(SmokeError::ElementNotFound(locator.to_string())),
        }
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> SmokeResult<Option<String>> {
        Ok(self
            .eval(script::attribute(locator, name))
            .await?
            .as_str()
            .map(str::to_string))
    }

    async fn evaluate(&self, script: &str) -> SmokeResult<serde_json::Value> {
        self.eval(script.to_string()).await
    }

    async fn set_session_cookie(&self, credential: &SessionCredential) -> SmokeResult<()> {
        let cookie = CookieParam::builder()
            .name(credential.name.clone())
            .value(credential.value.clone())
            .url(credential.url.clone())
            .path(credential.path.clone())
            .http_only(credential.http_only)
            .build()
            .map_err(|e| SmokeError::Browser(format!("invalid session cookie: {}", e)))?;
        self.page.set_cookie(cookie).await?;
        debug!(cookie = %credential.name, domain = %credential.domain, "Session cookie attached");
        Ok(())
    }

    async fn expect_response(&self, matcher: ResponseMatcher) -> SmokeResult<ResponseWaiter> {
        let mut requests = self.page.event_listener::<EventRequestWillBeSent>().await?;
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;
        let (tx, rx) = oneshot::channel();
        let wanted = matcher.clone();

        let listener = tokio::spawn(async move {
            let mut methods: HashMap<String, String> = HashMap::new();
            loop {
                tokio::select! {
                    biased;
                    Some(event) = requests.next() => {
                        methods.insert(event.request_id.inner().clone(), event.request.method.clone());
                    }
                    Some(event) = responses.next() => {
                        let Some(method) = methods.remove(event.request_id.inner()) else {
                            continue;
                        };
                        if wanted.matches(&method, &event.response.url) {
                            let _ = tx.send(ObservedResponse {
                                method,
                                url: event.response.url.clone(),
                                status: u16::try_from(event.response.status).unwrap_or(0),
                            });
                            return;
                        }
                    }
                    else => return,
                }
            }
        });

        Ok(ResponseWaiter::new(matcher, rx).with_listener(listener))
    }

    async fn screenshot(&self, path: &Path) -> SmokeResult<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await?;
        Ok(())
    }
}
