//! Out-of-band verification through the task listing endpoint

use async_trait::async_trait;
use reqwest::header::COOKIE;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{SmokeError, SmokeResult};
use crate::token::SessionCredential;

pub const TASKS_PATH: &str = "/api/tasks";

/// The fields of a listed task the smoke run looks at
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<TaskRecord>),
    Tasks { tasks: Vec<TaskRecord> },
    Data { data: Vec<TaskRecord> },
}

/// Accepts a bare array or an object wrapping it in `tasks` or `data`
pub fn parse_listing(body: &str) -> SmokeResult<Vec<TaskRecord>> {
    let listing: Listing = serde_json::from_str(body)?;
    Ok(match listing {
        Listing::Bare(tasks) | Listing::Tasks { tasks } | Listing::Data { data: tasks } => tasks,
    })
}

#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn list_tasks(&self, session: &SessionCredential) -> SmokeResult<Vec<TaskRecord>>;
}

pub struct TaskApi {
    client: reqwest::Client,
    base_url: String,
}

impl TaskApi {
    pub fn new(base_url: &str, timeout: Duration) -> SmokeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TaskBackend for TaskApi {
    async fn list_tasks(&self, session: &SessionCredential) -> SmokeResult<Vec<TaskRecord>> {
        let url = format!("{}{}", self.base_url, TASKS_PATH);
        let response = self
            .client
            .get(&url)
            .header(COOKIE, session.cookie_header())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SmokeError::RequestFailed {
                method: "GET".to_string(),
                url,
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        parse_listing(&body)
    }
}

/// Poll the listing until a task titled `title` shows up
pub async fn wait_until_listed(
    backend: &dyn TaskBackend,
    session: &SessionCredential,
    title: &str,
    timeout: Duration,
    interval: Duration,
) -> SmokeResult<TaskRecord> {
    let deadline = Instant::now() + timeout;
    loop {
        let tasks = backend.list_tasks(session).await?;
        if let Some(record) = tasks.into_iter().find(|t| t.title == title) {
            return Ok(record);
        }
        if Instant::now() >= deadline {
            return Err(SmokeError::Assertion(format!(
                "Task '{}' not returned by GET {} within {} ms",
                title,
                TASKS_PATH,
                timeout.as_millis()
            )));
        }
        debug!("'{}' not listed yet", title);
        sleep(interval).await;
    }
}

/// Poll the listing until no task titled `title` remains
pub async fn wait_until_absent(
    backend: &dyn TaskBackend,
    session: &SessionCredential,
    title: &str,
    timeout: Duration,
    interval: Duration,
) -> SmokeResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let tasks = backend.list_tasks(session).await?;
        if !tasks.iter().any(|t| t.title == title) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(SmokeError::Assertion(format!(
                "Deleted task '{}' still returned by GET {}",
                title, TASKS_PATH
            )));
        }
        debug!("'{}' still listed", title);
        sleep(interval).await;
    }
}
