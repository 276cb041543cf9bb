//! Page automation seam
//!
//! Everything above this module talks to the browser through [`PageDriver`].
//! The production implementation is [`crate::browser::CdpPage`].

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{SmokeError, SmokeResult};
use crate::token::SessionCredential;

/// An element query: a CSS selector, optionally narrowed to elements whose
/// visible text (or accessible label) matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    css: String,
    text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
        }
    }

    /// A button addressed by its label
    pub fn button(label: impl Into<String>) -> Self {
        Self::with_text("button", label)
    }

    pub fn css_selector(&self) -> &str {
        &self.css
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{}:has-text({:?})", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

/// URL path predicate for network responses
#[derive(Debug, Clone)]
pub enum PathPattern {
    Exact(String),
    /// A path with `{param}` segments, e.g. `/api/tasks/{id}/status`
    Template { source: String, regex: Regex },
}

impl PathPattern {
    pub fn exact(path: impl Into<String>) -> Self {
        PathPattern::Exact(path.into())
    }

    pub fn template(source: &str) -> Self {
        let mut pattern = String::from("^");
        for (i, segment) in source.split('/').enumerate() {
            if i > 0 {
                pattern.push('/');
            }
            if segment.starts_with('{') && segment.ends_with('}') {
                pattern.push_str("[^/]+");
            } else {
                pattern.push_str(&regex::escape(segment));
            }
        }
        pattern.push('$');

        match Regex::new(&pattern) {
            Ok(regex) => PathPattern::Template {
                source: source.to_string(),
                regex,
            },
            Err(_) => PathPattern::Exact(source.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(expected) => path == expected,
            PathPattern::Template { regex, .. } => regex.is_match(path),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(path) => f.write_str(path),
            PathPattern::Template { source, .. } => f.write_str(source),
        }
    }
}

/// Method + path predicate selecting the network response a step waits for
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    methods: Vec<String>,
    path: PathPattern,
}

impl ResponseMatcher {
    pub fn new(methods: &[&str], path: PathPattern) -> Self {
        Self {
            methods: methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
            path,
        }
    }

    pub fn post(path: &str) -> Self {
        Self::new(&["POST"], PathPattern::exact(path))
    }

    /// `method` is compared case-insensitively; `url` may be absolute or a bare path.
    /// Query strings are ignored.
    pub fn matches(&self, method: &str, url: &str) -> bool {
        if !self.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            return false;
        }
        let path = match reqwest::Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.split('?').next().unwrap_or(url).to_string(),
        };
        self.path.matches(&path)
    }
}

impl fmt::Display for ResponseMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.methods.join("|"), self.path)
    }
}

/// A response observed on the page's network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
}

impl ObservedResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn require_ok(self) -> SmokeResult<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(SmokeError::RequestFailed {
                method: self.method,
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// A pending network expectation, armed before the action that triggers it
pub struct ResponseWaiter {
    matcher: ResponseMatcher,
    rx: oneshot::Receiver<ObservedResponse>,
    listener: Option<JoinHandle<()>>,
}

impl ResponseWaiter {
    pub fn new(matcher: ResponseMatcher, rx: oneshot::Receiver<ObservedResponse>) -> Self {
        Self {
            matcher,
            rx,
            listener: None,
        }
    }

    /// Tie a background listener task to this waiter; it is aborted on drop
    pub fn with_listener(mut self, listener: JoinHandle<()>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub async fn wait(mut self, timeout: Duration) -> SmokeResult<ObservedResponse> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(SmokeError::Browser(format!(
                "response listener for {} stopped",
                self.matcher
            ))),
            Err(_) => Err(SmokeError::ResponseTimeout {
                what: format!("response to {}", self.matcher),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Drop for ResponseWaiter {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Operations the smoke run needs from one browser page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the document to finish loading
    async fn goto(&self, url: &str) -> SmokeResult<()>;

    /// Full page reload, waiting for the document to finish loading
    async fn reload(&self) -> SmokeResult<()>;

    async fn is_visible(&self, locator: &Locator) -> SmokeResult<bool>;

    /// Number of attached elements matching the locator
    async fn count(&self, locator: &Locator) -> SmokeResult<usize>;

    async fn click(&self, locator: &Locator) -> SmokeResult<()>;

    /// Replace the value of an input with `value`, typed as keystrokes
    async fn fill(&self, locator: &Locator, value: &str) -> SmokeResult<()>;

    /// Press a key (e.g. `Enter`) with the element focused
    async fn press(&self, locator: &Locator, key: &str) -> SmokeResult<()>;

    async fn select_option(&self, locator: &Locator, value: &str) -> SmokeResult<()>;

    async fn input_value(&self, locator: &Locator) -> SmokeResult<String>;

    async fn attribute(&self, locator: &Locator, name: &str) -> SmokeResult<Option<String>>;

    /// Evaluate a JavaScript expression in page context, awaiting promises
    async fn evaluate(&self, script: &str) -> SmokeResult<serde_json::Value>;

    /// Attach the session cookie, superseding any previous value of that name
    async fn set_session_cookie(&self, credential: &SessionCredential) -> SmokeResult<()>;

    /// Start listening for the first response matching `matcher`
    async fn expect_response(&self, matcher: ResponseMatcher) -> SmokeResult<ResponseWaiter>;

    /// Full-page PNG capture
    async fn screenshot(&self, path: &Path) -> SmokeResult<()>;
}
