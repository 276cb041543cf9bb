//! Bounded waits over a [`PageDriver`]
//!
//! Every wait has its own deadline. Polling never outlives it.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::driver::{Locator, PageDriver};
use crate::error::{SmokeError, SmokeResult};
use crate::script;

/// Polls page state at a fixed interval until a condition holds or the deadline passes
#[derive(Clone, Copy)]
pub struct Wait<'a> {
    page: &'a dyn PageDriver,
    poll: Duration,
}

impl<'a> Wait<'a> {
    pub fn new(page: &'a dyn PageDriver, poll: Duration) -> Self {
        Self { page, poll }
    }

    /// Fail with `SelectorTimeout` unless `locator` becomes visible within `timeout`
    pub async fn visible(&self, locator: &Locator, timeout: Duration) -> SmokeResult<()> {
        if self.until_visible(locator, timeout).await? {
            Ok(())
        } else {
            Err(selector_timeout(locator, timeout))
        }
    }

    /// Like [`Wait::visible`] but reports a timeout as `false`
    pub async fn until_visible(&self, locator: &Locator, timeout: Duration) -> SmokeResult<bool> {
        self.poll_until(timeout, || async move { self.page.is_visible(locator).await })
            .await
    }

    /// Index of the first locator in `candidates` to become visible, or `None` on timeout
    pub async fn first_visible(
        &self,
        candidates: &[Locator],
        timeout: Duration,
    ) -> SmokeResult<Option<usize>> {
        self.poll_for(timeout, || async move {
            for (i, locator) in candidates.iter().enumerate() {
                if self.page.is_visible(locator).await? {
                    return Ok(Some(i));
                }
            }
            Ok(None)
        })
        .await
    }

    pub async fn hidden(&self, locator: &Locator, timeout: Duration) -> SmokeResult<()> {
        let gone = self
            .poll_until(timeout, || async move {
                self.page.is_visible(locator).await.map(|v| !v)
            })
            .await?;
        if gone {
            Ok(())
        } else {
            Err(SmokeError::SelectorTimeout {
                selector: format!("{} to disappear", locator),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    /// `true` when nothing matches `locator` for the whole `window`
    pub async fn absent_for(&self, locator: &Locator, window: Duration) -> SmokeResult<bool> {
        let appeared = self
            .poll_until(window, || async move {
                self.page.count(locator).await.map(|n| n > 0)
            })
            .await?;
        Ok(!appeared)
    }

    /// Wait until an attribute of the first match equals `expected`
    pub async fn attribute(
        &self,
        locator: &Locator,
        name: &str,
        expected: &str,
        timeout: Duration,
    ) -> SmokeResult<()> {
        let matched = self
            .poll_until(timeout, || async move {
                let value = self.page.attribute(locator, name).await?;
                Ok(value.as_deref() == Some(expected))
            })
            .await?;
        if matched {
            Ok(())
        } else {
            Err(SmokeError::SelectorTimeout {
                selector: format!("{}[{}=\"{}\"]", locator, name, expected),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    /// Wait for `document.readyState == "complete"`
    pub async fn ready(&self, timeout: Duration) -> SmokeResult<()> {
        let expression = script::ready_state();
        let expression = expression.as_str();
        let complete = self
            .poll_until(timeout, || async move {
                let state = self.page.evaluate(expression).await?;
                Ok(state.as_str() == Some("complete"))
            })
            .await?;
        if complete {
            Ok(())
        } else {
            Err(SmokeError::ResponseTimeout {
                what: "document to finish loading".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn poll_until<F, Fut>(&self, timeout: Duration, mut probe: F) -> SmokeResult<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SmokeResult<bool>>,
    {
        let found = self
            .poll_for(timeout, || {
                let fut = probe();
                async move { fut.await.map(|ok| ok.then_some(())) }
            })
            .await?;
        Ok(found.is_some())
    }

    /// Evaluate `probe` every poll interval until it yields a value. Browser
    /// errors while polling count as "not yet" (the page may be mid-navigation);
    /// other errors abort.
    async fn poll_for<T, F, Fut>(&self, timeout: Duration, mut probe: F) -> SmokeResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SmokeResult<Option<T>>>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            match probe().await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(SmokeError::Browser(reason)) => trace!("poll probe failed: {}", reason),
                Err(e) => return Err(e),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll.min(deadline - now)).await;
        }
    }
}

fn selector_timeout(locator: &Locator, timeout: Duration) -> SmokeError {
    SmokeError::SelectorTimeout {
        selector: locator.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// Complete only once both signals resolve successfully, under one overall deadline.
///
/// The first signal to fail aborts the other; exceeding the deadline is a
/// `ResponseTimeout` naming `what`.
pub async fn both<A, B, FA, FB>(what: &str, deadline: Duration, a: FA, b: FB) -> SmokeResult<(A, B)>
where
    FA: Future<Output = SmokeResult<A>>,
    FB: Future<Output = SmokeResult<B>>,
{
    match tokio::time::timeout(deadline, async { tokio::try_join!(a, b) }).await {
        Ok(result) => result,
        Err(_) => Err(SmokeError::ResponseTimeout {
            what: what.to_string(),
            timeout_ms: deadline.as_millis() as u64,
        }),
    }
}
