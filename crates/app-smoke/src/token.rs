//! API-first login: obtain a session cookie without touching the UI

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::{SmokeError, SmokeResult};

pub const LOGIN_PATH: &str = "/api/login";

/// A server-issued session cookie, scoped to the application host
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub http_only: bool,
    /// Origin the cookie is attached for
    pub url: String,
}

impl SessionCredential {
    pub fn new(name: &str, value: &str, base_url: &str) -> SmokeResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| SmokeError::Config(format!("invalid base URL '{}': {}", base_url, e)))?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| SmokeError::Config(format!("base URL '{}' has no host", base_url)))?
            .to_string();
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
            domain,
            path: "/".to_string(),
            http_only: true,
            url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `name=value`, as sent in a `Cookie` request header
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("http_only", &self.http_only)
            .finish()
    }
}

/// Source of session credentials for the browser context
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn obtain(&self) -> SmokeResult<SessionCredential>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Logs in through `POST /api/login`. Never retries: a rejection here is a
/// backend problem and is reported as such.
pub struct SessionTokenClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    cookie_name: String,
}

impl SessionTokenClient {
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        cookie_name: &str,
        timeout: Duration,
    ) -> SmokeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            cookie_name: cookie_name.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for SessionTokenClient {
    async fn obtain(&self) -> SmokeResult<SessionCredential> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        info!("Requesting session for '{}'", self.credentials.username);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmokeError::Authentication {
                status: status.as_u16(),
                body,
            });
        }

        let headers: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        debug!("Login returned {} Set-Cookie header(s)", headers.len());

        let value = find_cookie(headers.iter().map(String::as_str), &self.cookie_name).ok_or_else(
            || SmokeError::MissingCredential {
                cookie: self.cookie_name.clone(),
            },
        )?;
        SessionCredential::new(&self.cookie_name, &value, &self.base_url)
    }
}

/// Value of cookie `name` among `Set-Cookie` header values. Empty values do not count.
pub fn find_cookie<'a>(headers: impl IntoIterator<Item = &'a str>, name: &str) -> Option<String> {
    headers.into_iter().find_map(|header| {
        // Some proxies fold several cookies into one header line
        header.split(',').find_map(|part| {
            let pair = part.split(';').next()?.trim();
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name && !value.trim().is_empty()).then(|| value.trim().to_string())
        })
    })
}
