//! The fixed smoke scenario
//!
//! Steps run strictly in order; the first fatal error aborts the rest. Only the
//! land section is best-effort.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use crate::api::{self, TaskBackend, TASKS_PATH};
use crate::config::{SmokeConfig, Timeouts};
use crate::dom::{self, NavigationTarget, Theme, THEME_ATTRIBUTE};
use crate::driver::{ObservedResponse, PageDriver, PathPattern, ResponseMatcher, ResponseWaiter};
use crate::error::{SmokeError, SmokeResult};
use crate::guard::SessionGuard;
use crate::navigation::NavigationController;
use crate::report::{StepOutcome, StepRecord};
use crate::script;
use crate::task::{TaskFixture, TaskStatus};
use crate::token::SessionCredential;
use crate::wait::{self, Wait};

/// What one run produced, before it is reduced to a verdict
pub struct ScenarioRun {
    pub fixture: TaskFixture,
    pub steps: Vec<StepRecord>,
    pub outcome: SmokeResult<()>,
}

pub struct ScenarioRunner {
    page: Arc<dyn PageDriver>,
    guard: Arc<SessionGuard>,
    navigation: NavigationController,
    backend: Arc<dyn TaskBackend>,
    timeouts: Timeouts,
    home_url: String,
    check_land: bool,
}

impl ScenarioRunner {
    pub fn new(
        page: Arc<dyn PageDriver>,
        guard: Arc<SessionGuard>,
        navigation: NavigationController,
        backend: Arc<dyn TaskBackend>,
        config: &SmokeConfig,
    ) -> Self {
        Self {
            page,
            guard,
            navigation,
            backend,
            timeouts: config.timeouts.clone(),
            home_url: config.url("/"),
            check_land: config.check_land,
        }
    }

    pub async fn run(&self, fixture: TaskFixture) -> ScenarioRun {
        info!("Running smoke scenario with '{}'", fixture.title());
        let mut steps = Vec::new();
        let outcome = self.run_steps(&fixture, &mut steps).await;
        ScenarioRun {
            fixture,
            steps,
            outcome,
        }
    }

    async fn run_steps(&self, fixture: &TaskFixture, steps: &mut Vec<StepRecord>) -> SmokeResult<()> {
        step(steps, "establish-session", self.establish_session()).await?;
        step(steps, "create-task", self.create_task(fixture)).await?;
        step(steps, "verify-listed", self.verify_listed(fixture)).await?;
        step(steps, "update-status", self.update_status(fixture)).await?;
        step(steps, "delete-task", self.delete_task(fixture)).await?;
        if self.check_land {
            best_effort(steps, "land", self.browse_land()).await?;
        } else {
            steps.push(StepRecord {
                name: "land".to_string(),
                outcome: StepOutcome::Skipped,
                duration_ms: 0,
                detail: Some("disabled".to_string()),
            });
        }
        step(steps, "theme-toggle", self.toggle_theme()).await?;
        step(steps, "reload-persistence", self.reload_persists()).await?;
        step(steps, "sign-out-sign-in", self.sign_out_and_in()).await?;
        Ok(())
    }

    fn wait(&self) -> Wait<'_> {
        Wait::new(self.page.as_ref(), self.timeouts.poll_interval())
    }

    async fn session(&self) -> SmokeResult<SessionCredential> {
        self.guard.credential().await.ok_or_else(|| {
            SmokeError::SessionEstablishment("no API session available for listing checks".into())
        })
    }

    /// Wait for a 2xx response and a DOM signal under the view timeout
    async fn confirm<F>(
        &self,
        what: &str,
        response: ResponseWaiter,
        dom_signal: F,
    ) -> SmokeResult<ObservedResponse>
    where
        F: Future<Output = SmokeResult<()>>,
    {
        let timeout = self.timeouts.view();
        let (observed, ()) = wait::both(
            what,
            timeout,
            async move { response.wait(timeout).await?.require_ok() },
            dom_signal,
        )
        .await?;
        Ok(observed)
    }

    async fn establish_session(&self) -> SmokeResult<()> {
        self.guard.attach_session().await?;
        self.page.goto(&self.home_url).await?;
        self.guard.ensure().await?;

        self.wait()
            .visible(&NavigationTarget::Tasks.layout(), self.timeouts.view())
            .await?;
        if self.page.is_visible(&dom::login_form()).await? {
            return Err(SmokeError::SessionEstablishment(
                "login form visible after session was established".into(),
            ));
        }
        Ok(())
    }

    async fn create_task(&self, fixture: &TaskFixture) -> SmokeResult<()> {
        let task = &fixture.task;
        self.page.click(&dom::new_task_button()).await?;
        self.wait()
            .visible(&dom::task_title_field(), self.timeouts.element())
            .await?;

        self.page.fill(&dom::task_title_field(), &task.title).await?;
        self.page
            .fill(&dom::task_description_field(), &task.description)
            .await?;
        self.page
            .select_option(&dom::task_status_field(), task.status.as_str())
            .await?;
        self.page
            .select_option(&dom::task_priority_field(), task.priority.as_str())
            .await?;
        for tag in &task.tags {
            self.page.fill(&dom::tag_input(), tag).await?;
            self.page.press(&dom::tag_input(), "Enter").await?;
        }

        let created = self
            .page
            .expect_response(ResponseMatcher::post(TASKS_PATH))
            .await?;
        self.page.click(&dom::create_task_button()).await?;

        let card = dom::task_card(&task.title);
        let response = self
            .confirm(
                "task creation response and card",
                created,
                self.wait().visible(&card, self.timeouts.view()),
            )
            .await?;
        info!(status = response.status, "Created '{}'", task.title);
        Ok(())
    }

    async fn verify_listed(&self, fixture: &TaskFixture) -> SmokeResult<()> {
        let session = self.session().await?;
        let record = api::wait_until_listed(
            self.backend.as_ref(),
            &session,
            fixture.title(),
            self.timeouts.api_poll(),
            self.timeouts.poll_interval(),
        )
        .await?;
        if let Some(status) = record.status.as_deref() {
            let listed: TaskStatus = status.parse()?;
            if listed != fixture.task.status {
                return Err(SmokeError::Assertion(format!(
                    "Created task listed with status '{}', expected '{}'",
                    listed, fixture.task.status
                )));
            }
        }
        info!(id = ?record.id, "'{}' returned by the task listing", fixture.title());
        Ok(())
    }

    /// Open the task's detail form from the board
    async fn open_task(&self, fixture: &TaskFixture) -> SmokeResult<()> {
        let card = dom::task_card(fixture.title());
        self.wait().visible(&card, self.timeouts.view()).await?;
        self.page.click(&card).await?;
        self.wait()
            .visible(&dom::task_status_field(), self.timeouts.element())
            .await?;
        self.wait()
            .visible(&dom::tag_chip(&fixture.tag), self.timeouts.tag())
            .await
    }

    async fn reload_and_reauthenticate(&self) -> SmokeResult<()> {
        self.page.reload().await?;
        self.guard.ensure().await
    }

    async fn update_status(&self, fixture: &TaskFixture) -> SmokeResult<()> {
        self.reload_and_reauthenticate().await?;
        self.open_task(fixture).await?;

        let done = TaskStatus::Done;
        self.page
            .select_option(&dom::task_status_field(), done.as_str())
            .await?;
        let updated = self
            .page
            .expect_response(ResponseMatcher::new(
                &["PATCH", "PUT"],
                PathPattern::template("/api/tasks/{id}/status"),
            ))
            .await?;
        self.page.click(&dom::save_changes_button()).await?;
        self.confirm(
            "status update response and saved indicator",
            updated,
            self.wait()
                .visible(&dom::saved_indicator(), self.timeouts.view()),
        )
        .await?;

        self.reload_and_reauthenticate().await?;
        self.open_task(fixture).await?;
        let shown = self.page.input_value(&dom::task_status_field()).await?;
        if shown.parse::<TaskStatus>().ok() != Some(done) {
            return Err(SmokeError::Assertion(
                "Updated status not reflected for created task".into(),
            ));
        }

        let session = self.session().await?;
        let record = api::wait_until_listed(
            self.backend.as_ref(),
            &session,
            fixture.title(),
            self.timeouts.api_poll(),
            self.timeouts.poll_interval(),
        )
        .await?;
        if let Some(status) = record.status.as_deref() {
            let listed: TaskStatus = status.parse()?;
            if listed != done {
                return Err(SmokeError::Assertion(format!(
                    "Task listing reports status '{}' after update to '{}'",
                    listed, done
                )));
            }
        }
        info!("Status '{}' persisted for '{}'", done, fixture.title());
        Ok(())
    }

    async fn delete_task(&self, fixture: &TaskFixture) -> SmokeResult<()> {
        if !self.page.is_visible(&dom::delete_task_button()).await? {
            self.open_task(fixture).await?;
        }

        self.page.evaluate(&script::accept_dialogs()).await?;
        let deleted = self
            .page
            .expect_response(ResponseMatcher::new(
                &["DELETE"],
                PathPattern::template("/api/tasks/{id}"),
            ))
            .await?;
        self.page.click(&dom::delete_task_button()).await?;

        let card = dom::task_card(fixture.title());
        self.confirm(
            "delete response and card removal",
            deleted,
            self.wait().hidden(&card, self.timeouts.view()),
        )
        .await?;

        // The layout can render before the board has fetched its cards
        let listing = self
            .page
            .expect_response(ResponseMatcher::new(
                &["GET"],
                PathPattern::exact(TASKS_PATH),
            ))
            .await?;
        self.reload_and_reauthenticate().await?;
        match listing.wait(self.timeouts.view()).await {
            Ok(response) => {
                response.require_ok()?;
            }
            Err(e) if e.is_transient() => warn!("Board listing not observed after reload: {}", e),
            Err(e) => return Err(e),
        }
        if !self.wait().absent_for(&card, self.timeouts.settle()).await? {
            return Err(SmokeError::Assertion(format!(
                "Deleted task '{}' still shown after reload",
                fixture.title()
            )));
        }

        let session = self.session().await?;
        api::wait_until_absent(
            self.backend.as_ref(),
            &session,
            fixture.title(),
            self.timeouts.api_poll(),
            self.timeouts.poll_interval(),
        )
        .await?;
        info!("'{}' deleted and gone from the listing", fixture.title());
        Ok(())
    }

    async fn browse_land(&self) -> SmokeResult<()> {
        self.navigation.open(NavigationTarget::Land).await?;

        let view = self.timeouts.view();
        self.wait().visible(&dom::land_summary_cards(), view).await?;

        for (panel, rows) in dom::land_listing_rows() {
            self.wait().visible(&rows, view).await?;
            self.page.click(&rows).await?;
            self.wait()
                .visible(&dom::land_detail_rows(), self.timeouts.element())
                .await?;
            info!("Land {} detail rendered", panel);
        }
        Ok(())
    }

    async fn toggle_theme(&self) -> SmokeResult<()> {
        self.navigation.open(NavigationTarget::Tasks).await?;

        let root = dom::theme_root();
        let original =
            Theme::from_attribute(self.page.attribute(&root, THEME_ATTRIBUTE).await?.as_deref());

        for theme in [original.alternate(), original] {
            self.page.click(&theme.button()).await?;
            self.wait()
                .attribute(
                    &root,
                    THEME_ATTRIBUTE,
                    theme.attribute_value(),
                    self.timeouts.element(),
                )
                .await?;
        }

        let restored = self.page.attribute(&root, THEME_ATTRIBUTE).await?;
        if restored.as_deref() != Some(original.attribute_value()) {
            return Err(SmokeError::Assertion(format!(
                "Theme toggle did not restore '{}' (now {:?})",
                original.attribute_value(),
                restored
            )));
        }
        Ok(())
    }

    async fn reload_persists(&self) -> SmokeResult<()> {
        self.page.reload().await?;
        self.wait()
            .visible(&NavigationTarget::Tasks.layout(), self.timeouts.view())
            .await?;
        if self.page.is_visible(&dom::login_form()).await? {
            return Err(SmokeError::Assertion(
                "Reload dropped the session back to the login form".into(),
            ));
        }
        Ok(())
    }

    async fn sign_out_and_in(&self) -> SmokeResult<()> {
        self.page.click(&dom::sign_out_button()).await?;
        self.wait()
            .visible(&dom::login_form(), self.timeouts.view())
            .await?;
        info!("Signed out");

        self.guard.ensure().await?;
        self.wait()
            .visible(&NavigationTarget::Tasks.layout(), self.timeouts.view())
            .await
    }
}

async fn step<F>(steps: &mut Vec<StepRecord>, name: &str, body: F) -> SmokeResult<()>
where
    F: Future<Output = SmokeResult<()>>,
{
    let started = Instant::now();
    let result = body.instrument(info_span!("step", step = name)).await;
    steps.push(StepRecord {
        name: name.to_string(),
        outcome: if result.is_ok() {
            StepOutcome::Passed
        } else {
            StepOutcome::Failed
        },
        duration_ms: started.elapsed().as_millis() as u64,
        detail: result.as_ref().err().map(|e| e.to_string()),
    });
    result
}

/// Like [`step`], but selector and navigation failures are logged and skipped
async fn best_effort<F>(steps: &mut Vec<StepRecord>, name: &str, body: F) -> SmokeResult<()>
where
    F: Future<Output = SmokeResult<()>>,
{
    let started = Instant::now();
    let result = body.instrument(info_span!("step", step = name)).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            steps.push(StepRecord {
                name: name.to_string(),
                outcome: StepOutcome::Passed,
                duration_ms,
                detail: None,
            });
            Ok(())
        }
        Err(e) if e.is_skippable() => {
            warn!(step = name, "Skipping best-effort section: {}", e);
            steps.push(StepRecord {
                name: name.to_string(),
                outcome: StepOutcome::Skipped,
                duration_ms,
                detail: Some(e.to_string()),
            });
            Ok(())
        }
        Err(e) => {
            steps.push(StepRecord {
                name: name.to_string(),
                outcome: StepOutcome::Failed,
                duration_ms,
                detail: Some(e.to_string()),
            });
            Err(e)
        }
    }
}
