//! Session establishment
//!
//! [`SessionGuard`] drives a page from any starting state (no cookie, stale
//! cookie, login form, wrong app, already done) to "authenticated and on the
//! requested view". The cookie obtained through the API is the fast path; the
//! login form is the fallback; the app switcher fixes the view.
//!
//! ```text
//!            probe + API token
//!  Unknown ───────────────────────┐
//!     │ session valid             │ no session
//!     ▼                           ▼
//!  reload ──► on view?      Authenticating ──► fill + submit
//!     │           │               │   (login response AND a view)
//!     │           ▼               ▼
//!     │   AuthenticatedOnView ◄── AuthenticatedWrongView ◄─ app switcher
//!     └────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Credentials, Timeouts};
use crate::dom::{self, NavigationTarget};
use crate::driver::{Locator, PageDriver, ResponseMatcher};
use crate::error::{SmokeError, SmokeResult};
use crate::navigation::AppSwitcher;
use crate::script;
use crate::token::{SessionCredential, TokenSource, LOGIN_PATH};
use crate::wait::{self, Wait};

pub const SESSION_PATH: &str = "/api/session";

/// Where the page stands relative to "authenticated on the requested view"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unknown,
    Authenticating,
    AuthenticatedWrongView,
    AuthenticatedOnView,
}

/// One probe of the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub login_form: bool,
    pub on_view: bool,
    pub session_valid: bool,
}

impl GuardState {
    pub fn classify(observation: Observation) -> Self {
        if observation.login_form {
            GuardState::Authenticating
        } else if !observation.session_valid {
            GuardState::Unknown
        } else if observation.on_view {
            GuardState::AuthenticatedOnView
        } else {
            GuardState::AuthenticatedWrongView
        }
    }
}

pub struct SessionGuard {
    page: Arc<dyn PageDriver>,
    tokens: Arc<dyn TokenSource>,
    credentials: Credentials,
    session: Mutex<Option<SessionCredential>>,
    timeouts: Timeouts,
}

impl SessionGuard {
    pub fn new(
        page: Arc<dyn PageDriver>,
        tokens: Arc<dyn TokenSource>,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            page,
            tokens,
            credentials,
            session: Mutex::new(None),
            timeouts,
        }
    }

    /// The API-issued session, once obtained
    pub async fn credential(&self) -> Option<SessionCredential> {
        self.session.lock().await.clone()
    }

    /// Obtain the API session and attach it to the browser. Runs once per guard;
    /// later calls reuse the attached cookie.
    pub async fn attach_session(&self) -> SmokeResult<()> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            let credential = self.tokens.obtain().await?;
            self.page.set_session_cookie(&credential).await?;
            info!(cookie = %credential.name, "Attached API session to browser");
            *session = Some(credential);
        }
        Ok(())
    }

    /// Ensure an authenticated session on the task board
    pub async fn ensure(&self) -> SmokeResult<()> {
        self.ensure_on(NavigationTarget::Tasks).await
    }

    pub async fn ensure_on(&self, target: NavigationTarget) -> SmokeResult<()> {
        let login_form_visible = self.page.is_visible(&dom::login_form()).await?;
        self.attach_session().await?;

        let mut state = self.fast_path(target, login_form_visible).await?;
        debug!(?state, "after session fast path");

        if matches!(state, GuardState::Unknown | GuardState::Authenticating) {
            state = self.ui_login(target).await?;
            debug!(?state, "after UI login");
        }

        // A failing session probe leaves a wrong-view page classified Unknown;
        // any page without a login form gets the switcher
        if state != GuardState::AuthenticatedOnView
            && !self.page.is_visible(&dom::login_form()).await?
        {
            state = self.switch_view(target).await?;
            debug!(?state, "after app switch");
        }

        if state == GuardState::AuthenticatedOnView {
            return Ok(());
        }

        if self.page.is_visible(&dom::login_form()).await? {
            return Err(SmokeError::SessionEstablishment(
                "login form still visible after API session, UI login and app switch".to_string(),
            ));
        }
        Err(SmokeError::SelectorTimeout {
            selector: target.layout().to_string(),
            timeout_ms: self.timeouts.view_ms,
        })
    }

    fn wait(&self) -> Wait<'_> {
        Wait::new(self.page.as_ref(), self.timeouts.poll_interval())
    }

    async fn session_valid(&self) -> bool {
        match self.page.evaluate(&script::session_probe(SESSION_PATH)).await {
            Ok(value) => value.as_bool() == Some(true),
            Err(e) => {
                debug!("Session probe failed: {}", e);
                false
            }
        }
    }

    async fn observe(&self, target: NavigationTarget) -> SmokeResult<GuardState> {
        let observation = Observation {
            login_form: self.page.is_visible(&dom::login_form()).await?,
            on_view: self.page.is_visible(&target.layout()).await?,
            session_valid: self.session_valid().await,
        };
        debug!(?observation, "page observed");
        Ok(GuardState::classify(observation))
    }

    /// Valid session: stay put when already on the view, otherwise reload and
    /// give the view a bounded chance to appear.
    async fn fast_path(
        &self,
        target: NavigationTarget,
        login_form_visible: bool,
    ) -> SmokeResult<GuardState> {
        if !self.session_valid().await {
            debug!("No valid session for fast path");
            return self.observe(target).await;
        }

        let layout = target.layout();
        if !login_form_visible && self.page.is_visible(&layout).await? {
            return Ok(GuardState::AuthenticatedOnView);
        }

        self.page.reload().await?;
        if self
            .wait()
            .until_visible(&layout, self.timeouts.fast_path())
            .await?
        {
            info!("Session restored from cookie");
            return Ok(GuardState::AuthenticatedOnView);
        }
        warn!("Session fast path did not reach {}", target);
        self.observe(target).await
    }

    async fn ui_login(&self, target: NavigationTarget) -> SmokeResult<GuardState> {
        let form = dom::login_form();
        if !self.page.is_visible(&form).await?
            && !self
                .wait()
                .until_visible(&form, self.timeouts.element())
                .await?
        {
            debug!("No login form to submit");
            return self.observe(target).await;
        }

        info!("Signing in through the login form");
        self.page
            .fill(&dom::username_field(), &self.credentials.username)
            .await?;
        self.page
            .fill(&dom::password_field(), &self.credentials.password)
            .await?;

        let response = self
            .page
            .expect_response(ResponseMatcher::post(LOGIN_PATH))
            .await?;
        self.page.click(&dom::login_submit()).await?;

        let timeout = self.timeouts.login();
        let views: Vec<Locator> = NavigationTarget::ALL.iter().map(|t| t.layout()).collect();
        let wait = self.wait();
        let outcome = wait::both(
            "login response and a navigable view",
            timeout,
            async move {
                let response = response.wait(timeout).await?;
                if response.is_ok() {
                    Ok(response)
                } else {
                    Err(SmokeError::Authentication {
                        status: response.status,
                        body: "login form submission rejected".to_string(),
                    })
                }
            },
            async {
                wait.first_visible(&views, timeout)
                    .await?
                    .ok_or_else(|| SmokeError::SelectorTimeout {
                        selector: "any navigable view".to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
            },
        )
        .await;

        match outcome {
            Ok(_) => {}
            Err(e) if e.is_transient() => warn!("UI login did not settle: {}", e),
            Err(e) => return Err(e),
        }
        self.observe(target).await
    }

    async fn switch_view(&self, target: NavigationTarget) -> SmokeResult<GuardState> {
        let switched = match AppSwitcher::open_and_select(self.page.as_ref(), &self.timeouts, target)
            .await
        {
            Ok(selected) => {
                selected
                    && self
                        .wait()
                        .until_visible(&target.layout(), self.timeouts.view())
                        .await?
            }
            Err(e) if e.is_transient() => {
                debug!("App switch failed: {}", e);
                false
            }
            Err(e) => return Err(e),
        };
        if switched {
            Ok(GuardState::AuthenticatedOnView)
        } else {
            self.observe(target).await
        }
    }
}
