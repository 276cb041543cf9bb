//! Switching between sub-applications
//!
//! [`NavigationController::open`] tries an ordered chain of
//! [`NavigationStrategy`] implementations under one shared time budget:
//!
//! 1. [`MenuClickStrategy`]: app switcher menu, bounded retries with fixed backoff
//! 2. [`PersistedStateStrategy`]: write the target into persisted client state,
//!    reload, re-establish the session, then a shorter menu loop
//! 3. [`InternalDispatchStrategy`]: emit a switch event on the app's internal bus
//!
//! The target's root layout becoming visible is the only success criterion.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{NavigationPolicy, Timeouts};
use crate::dom::{self, NavigationTarget};
use crate::driver::PageDriver;
use crate::error::{SmokeError, SmokeResult};
use crate::guard::SessionGuard;
use crate::script;
use crate::store::StateStore;
use crate::wait::Wait;

/// The desktop/mobile app switcher affordance
pub struct AppSwitcher;

impl AppSwitcher {
    /// Open the switcher (desktop trigger first, mobile otherwise) and click the
    /// target's menu item. Returns `false` when no trigger or item is visible.
    ///
    /// A menu left open by an earlier attempt is reused: clicking a toggle
    /// trigger again would close it before its items render.
    pub async fn open_and_select(
        page: &dyn PageDriver,
        timeouts: &Timeouts,
        target: NavigationTarget,
    ) -> SmokeResult<bool> {
        if Self::is_open(page).await? {
            debug!("App switcher already open");
        } else {
            let desktop = dom::switcher_desktop_trigger();
            let mobile = dom::switcher_mobile_trigger();
            let trigger = if page.is_visible(&desktop).await? {
                desktop
            } else if page.is_visible(&mobile).await? {
                mobile
            } else {
                debug!("No app switcher trigger visible");
                return Ok(false);
            };
            page.click(&trigger).await?;
        }

        let item = target.menu_item();
        if !Wait::new(page, timeouts.poll_interval())
            .until_visible(&item, timeouts.element())
            .await?
        {
            debug!("Menu item {} did not render", item);
            return Ok(false);
        }
        page.click(&item).await?;
        Ok(true)
    }

    /// Menu container rendered, or a trigger reporting `aria-expanded="true"`
    async fn is_open(page: &dyn PageDriver) -> SmokeResult<bool> {
        if page.is_visible(&dom::switcher_menu()).await? {
            return Ok(true);
        }
        for trigger in [dom::switcher_desktop_trigger(), dom::switcher_mobile_trigger()] {
            let expanded = page.attribute(&trigger, dom::EXPANDED_ATTRIBUTE).await?;
            if expanded.as_deref() == Some("true") {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// What a strategy may touch
pub struct NavigationContext<'a> {
    pub page: &'a dyn PageDriver,
    pub guard: &'a SessionGuard,
    pub store: &'a dyn StateStore,
    pub timeouts: &'a Timeouts,
}

impl NavigationContext<'_> {
    fn wait(&self) -> Wait<'_> {
        Wait::new(self.page, self.timeouts.poll_interval())
    }

    async fn arrived(&self, target: NavigationTarget) -> SmokeResult<bool> {
        self.wait()
            .until_visible(&target.layout(), self.timeouts.view())
            .await
    }
}

/// One way of reaching a view. `Ok(false)` means "did not get there, try the next one".
#[async_trait]
pub trait NavigationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(
        &self,
        cx: &NavigationContext<'_>,
        target: NavigationTarget,
    ) -> SmokeResult<bool>;
}

pub struct MenuClickStrategy {
    attempts: u32,
    backoff: Duration,
}

impl MenuClickStrategy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    async fn once(&self, cx: &NavigationContext<'_>, target: NavigationTarget) -> SmokeResult<bool> {
        if !AppSwitcher::open_and_select(cx.page, cx.timeouts, target).await? {
            return Ok(false);
        }
        cx.arrived(target).await
    }
}

#[async_trait]
impl NavigationStrategy for MenuClickStrategy {
    fn name(&self) -> &'static str {
        "menu"
    }

    async fn attempt(
        &self,
        cx: &NavigationContext<'_>,
        target: NavigationTarget,
    ) -> SmokeResult<bool> {
        for attempt in 1..=self.attempts {
            match self.once(cx, target).await {
                Ok(true) => return Ok(true),
                Ok(false) => debug!(attempt, "Menu did not reach {}", target),
                Err(e) if e.is_transient() => debug!(attempt, "Menu attempt failed: {}", e),
                Err(e) => return Err(e),
            }
            if attempt < self.attempts {
                sleep(self.backoff).await;
            }
        }
        Ok(false)
    }
}

pub struct PersistedStateStrategy {
    state_key: String,
    menu: MenuClickStrategy,
}

impl PersistedStateStrategy {
    pub fn new(state_key: impl Into<String>, menu: MenuClickStrategy) -> Self {
        Self {
            state_key: state_key.into(),
            menu,
        }
    }
}

#[async_trait]
impl NavigationStrategy for PersistedStateStrategy {
    fn name(&self) -> &'static str {
        "persisted-state"
    }

    async fn attempt(
        &self,
        cx: &NavigationContext<'_>,
        target: NavigationTarget,
    ) -> SmokeResult<bool> {
        cx.store.set(&self.state_key, target.key()).await?;
        cx.page.reload().await?;

        match cx.guard.ensure_on(target).await {
            Ok(()) => return Ok(true),
            Err(e) if e.is_skippable() || e.is_transient() => {
                debug!("Session guard did not land on {}: {}", target, e)
            }
            Err(e) => return Err(e),
        }
        self.menu.attempt(cx, target).await
    }
}

pub struct InternalDispatchStrategy;

#[async_trait]
impl NavigationStrategy for InternalDispatchStrategy {
    fn name(&self) -> &'static str {
        "internal-dispatch"
    }

    async fn attempt(
        &self,
        cx: &NavigationContext<'_>,
        target: NavigationTarget,
    ) -> SmokeResult<bool> {
        let via = cx
            .page
            .evaluate(&script::dispatch_app_switch(target.key()))
            .await?;
        debug!("Dispatched app switch via {}", via);
        cx.arrived(target).await
    }
}

pub struct NavigationController {
    page: Arc<dyn PageDriver>,
    guard: Arc<SessionGuard>,
    store: Arc<dyn StateStore>,
    timeouts: Timeouts,
    strategies: Vec<Box<dyn NavigationStrategy>>,
}

impl NavigationController {
    /// Controller with the standard menu → persisted state → dispatch chain
    pub fn new(
        page: Arc<dyn PageDriver>,
        guard: Arc<SessionGuard>,
        store: Arc<dyn StateStore>,
        timeouts: Timeouts,
        policy: &NavigationPolicy,
    ) -> Self {
        let strategies: Vec<Box<dyn NavigationStrategy>> = vec![
            Box::new(MenuClickStrategy::new(policy.menu_attempts, policy.backoff())),
            Box::new(PersistedStateStrategy::new(
                policy.state_key.clone(),
                MenuClickStrategy::new(policy.fallback_attempts, policy.backoff()),
            )),
            Box::new(InternalDispatchStrategy),
        ];
        Self::with_strategies(page, guard, store, timeouts, strategies)
    }

    pub fn with_strategies(
        page: Arc<dyn PageDriver>,
        guard: Arc<SessionGuard>,
        store: Arc<dyn StateStore>,
        timeouts: Timeouts,
        strategies: Vec<Box<dyn NavigationStrategy>>,
    ) -> Self {
        Self {
            page,
            guard,
            store,
            timeouts,
            strategies,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Bring `target` into view or fail with `Navigation`
    pub async fn open(&self, target: NavigationTarget) -> SmokeResult<()> {
        if self.page.is_visible(&target.layout()).await? {
            debug!("Already on {}", target);
            return Ok(());
        }

        let cx = NavigationContext {
            page: self.page.as_ref(),
            guard: self.guard.as_ref(),
            store: self.store.as_ref(),
            timeouts: &self.timeouts,
        };
        let deadline = Instant::now() + self.timeouts.navigation_budget();
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                failures.push(format!("{}: budget exhausted", strategy.name()));
                break;
            }

            match tokio::time::timeout(remaining, strategy.attempt(&cx, target)).await {
                Ok(Ok(true)) => {
                    info!(strategy = strategy.name(), "Opened {}", target);
                    return Ok(());
                }
                Ok(Ok(false)) => {
                    warn!(strategy = strategy.name(), "Did not reach {}, falling back", target);
                    failures.push(format!("{}: layout not visible", strategy.name()));
                }
                Ok(Err(e)) if e.is_skippable() || e.is_transient() => {
                    warn!(strategy = strategy.name(), "Navigation attempt failed: {}", e);
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(strategy = strategy.name(), "Navigation budget exhausted");
                    failures.push(format!("{}: budget exhausted", strategy.name()));
                    break;
                }
            }
        }

        Err(SmokeError::Navigation {
            target: target.key().to_string(),
            reason: failures.join("; "),
        })
    }
}
