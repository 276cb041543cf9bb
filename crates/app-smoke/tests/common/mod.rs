//! In-memory task manager used by the integration tests
//!
//! `FakeApp` plays both sides: the page (DOM reachable through locators) and the
//! server (sessions, tasks, API responses). Knobs on [`AppState`] break specific
//! parts of the app so fallback paths can be exercised.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use app_smoke::api::{TaskBackend, TaskRecord};
use app_smoke::config::{Credentials, SmokeConfig};
use app_smoke::driver::{Locator, ObservedResponse, ResponseMatcher, ResponseWaiter};
use app_smoke::store::{LocalStorageStore, StateStore};
use app_smoke::{
    NavigationController, PageDriver, ScenarioRunner, SessionCredential, SessionGuard,
    SmokeError, SmokeResult, TokenSource,
};

pub const ORIGIN: &str = "http://app.test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Blank,
    Login,
    Tasks,
    Land,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switcher {
    Desktop,
    Mobile,
    Hidden,
}

#[derive(Debug, Clone)]
pub struct ServerTask {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone)]
enum Form {
    Create,
    Edit(u32),
}

pub struct AppState {
    // Server side
    pub credentials: Credentials,
    pub sessions: HashSet<String>,
    next_session: u32,
    pub tasks: Vec<ServerTask>,
    next_task: u32,
    /// Status `POST /api/login` answers with (API and form)
    pub login_status: u16,
    /// API tokens are issued but never accepted by the server
    pub api_sessions_rejected: bool,
    /// The login form's submit button does nothing
    pub login_form_broken: bool,
    /// Status updates answer 200 but are not stored
    pub drop_status_update: bool,
    /// `/api/session` cannot be fetched from the page
    pub session_probe_fails: bool,

    // Browser side
    pub cookie: Option<String>,
    pub view: View,
    pub local_storage: HashMap<String, String>,
    pub theme: String,
    form: Option<Form>,
    fields: HashMap<String, String>,
    form_tags: BTreeSet<String>,
    pub saved_pill: bool,
    pub confirm_accepted: bool,
    pub switcher: Switcher,
    switcher_open: bool,
    switcher_opened_at: Option<Instant>,
    /// Menu items render after the trigger is clicked
    pub menu_renders: bool,
    /// Menu items render this long after the menu opens
    pub menu_delay: Duration,
    /// Clicking the trigger of an open menu closes it; triggers report `aria-expanded`
    pub switcher_toggles: bool,
    /// Cards of deleted tasks reappear this long after the next document load
    pub stale_card_delay: Option<Duration>,
    deleted: Vec<(String, Instant)>,
    loaded_at: Instant,
    /// A reload honours `activeApp` in local storage
    pub persisted_state_honoured: bool,
    /// The internal event bus switches apps
    pub dispatch_works: bool,
    /// Land panels contain rows
    pub land_rows: bool,
    land_detail: bool,
    pub screenshot_fails: bool,

    // Recording
    pub calls: Vec<String>,
    pub token_requests: u32,
    pub responses: Vec<ObservedResponse>,
    listeners: Vec<(ResponseMatcher, oneshot::Sender<ObservedResponse>)>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            sessions: HashSet::new(),
            next_session: 0,
            tasks: Vec::new(),
            next_task: 0,
            login_status: 200,
            api_sessions_rejected: false,
            login_form_broken: false,
            drop_status_update: false,
            session_probe_fails: false,
            cookie: None,
            view: View::Blank,
            local_storage: HashMap::new(),
            theme: "default".to_string(),
            form: None,
            fields: HashMap::new(),
            form_tags: BTreeSet::new(),
            saved_pill: false,
            confirm_accepted: false,
            switcher: Switcher::Desktop,
            switcher_open: false,
            switcher_opened_at: None,
            menu_renders: true,
            menu_delay: Duration::ZERO,
            switcher_toggles: false,
            stale_card_delay: None,
            deleted: Vec::new(),
            loaded_at: Instant::now(),
            persisted_state_honoured: true,
            dispatch_works: true,
            land_rows: true,
            land_detail: false,
            screenshot_fails: false,
            calls: Vec::new(),
            token_requests: 0,
            responses: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

impl AppState {
    fn issue_session(&mut self) -> String {
        self.next_session += 1;
        let id = format!("session-{}", self.next_session);
        self.sessions.insert(id.clone());
        id
    }

    fn session_valid(&self) -> bool {
        self.cookie
            .as_ref()
            .map(|c| self.sessions.contains(c))
            .unwrap_or(false)
    }

    fn signed_in(&self) -> bool {
        matches!(self.view, View::Tasks | View::Land)
    }

    /// Full document load: transient UI state is lost, persisted state is not
    fn load(&mut self) {
        self.form = None;
        self.fields.clear();
        self.form_tags.clear();
        self.saved_pill = false;
        self.switcher_open = false;
        self.switcher_opened_at = None;
        self.land_detail = false;
        self.loaded_at = Instant::now();
        self.view = if !self.session_valid() {
            View::Login
        } else if self.persisted_state_honoured
            && self.local_storage.get("activeApp").map(String::as_str) == Some("land")
        {
            View::Land
        } else {
            View::Tasks
        };
        if self.view == View::Tasks {
            self.emit("GET", "/api/tasks", 200);
        }
    }

    fn emit(&mut self, method: &str, path: &str, status: u16) {
        let response = ObservedResponse {
            method: method.to_string(),
            url: format!("{}{}", ORIGIN, path),
            status,
        };
        self.responses.push(response.clone());
        let listeners = std::mem::take(&mut self.listeners);
        for (matcher, tx) in listeners {
            if matcher.matches(method, &response.url) {
                let _ = tx.send(response.clone());
            } else {
                self.listeners.push((matcher, tx));
            }
        }
    }

    fn task_by_title(&self, title: &str) -> Option<&ServerTask> {
        self.tasks.iter().find(|t| t.title.contains(title))
    }

    /// Cards on the board matching `title`, stale ones included
    fn cards(&self, title: &str) -> usize {
        if self.view != View::Tasks {
            return 0;
        }
        let live = self.tasks.iter().filter(|t| t.title.contains(title)).count();
        let stale = match self.stale_card_delay {
            Some(delay) if self.loaded_at.elapsed() >= delay => self
                .deleted
                .iter()
                .filter(|(t, at)| t.contains(title) && *at < self.loaded_at)
                .count(),
            _ => 0,
        };
        live + stale
    }

    fn menu_open(&self) -> bool {
        self.signed_in() && self.switcher_open && self.menu_renders
    }

    fn menu_items_ready(&self) -> bool {
        self.switcher_opened_at
            .map(|at| at.elapsed() >= self.menu_delay)
            .unwrap_or(false)
    }

    fn visible(&self, locator: &Locator) -> bool {
        let text = locator.text().unwrap_or("");
        let form_open = self.form.is_some() && self.view == View::Tasks;
        match locator.css_selector() {
            "form.login-form" | "#username" | "#password" => self.view == View::Login,
            r#"form.login-form button[type="submit"]"# => self.view == View::Login,
            ".tasks-layout" => self.view == View::Tasks,
            ".land-layout" => self.view == View::Land,
            ".app-switcher-trigger" => self.signed_in() && self.switcher == Switcher::Desktop,
            ".app-switcher-mobile-trigger" => {
                self.signed_in() && self.switcher == Switcher::Mobile
            }
            ".app-switcher-menu" => self.menu_open(),
            r#".app-switcher-menu [role="menuitem"]"# => {
                self.menu_open() && self.menu_items_ready() && matches!(text, "Tasks" | "Land")
            }
            ".task-card" => self.cards(text) > 0,
            "#task-title" | "#task-description" | "#task-status" | "#task-priority" => form_open,
            r#"input[placeholder="Create or attach tag (press Enter)"]"# => form_open,
            ".tag-chip" => {
                form_open
                    && text
                        .strip_prefix('#')
                        .map(|tag| self.form_tags.contains(tag))
                        .unwrap_or(false)
            }
            ".pill" => text == "Saved" && self.saved_pill,
            "html" => true,
            ".land-summary .summary-card"
            | ".land-parcels-panel .list-row"
            | ".land-owners-panel .list-row" => self.view == View::Land && self.land_rows,
            ".land-detail-panel .detail-row" => self.view == View::Land && self.land_detail,
            "button" => match text {
                "New task" | "Dark" | "Light" => self.view == View::Tasks,
                "Sign out" => self.signed_in(),
                "Create task" => matches!(self.form, Some(Form::Create)) && form_open,
                "Save changes" | "Delete task" => {
                    matches!(self.form, Some(Form::Edit(_))) && form_open
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn click(&mut self, locator: &Locator) -> SmokeResult<()> {
        if !self.visible(locator) {
            return Err(SmokeError::ElementNotFound(locator.to_string()));
        }
        let text = locator.text().unwrap_or("").to_string();
        match (locator.css_selector(), text.as_str()) {
            (r#"form.login-form button[type="submit"]"#, _) => self.submit_login(),
            (".app-switcher-trigger", _) | (".app-switcher-mobile-trigger", _) => {
                if self.switcher_open && self.switcher_toggles {
                    self.switcher_open = false;
                    self.switcher_opened_at = None;
                } else if !self.switcher_open {
                    self.switcher_open = true;
                    self.switcher_opened_at = Some(Instant::now());
                }
            }
            (r#".app-switcher-menu [role="menuitem"]"#, label) => {
                let (view, key) = if label == "Land" {
                    (View::Land, "land")
                } else {
                    (View::Tasks, "tasks")
                };
                self.view = view;
                self.form = None;
                self.switcher_open = false;
                self.switcher_opened_at = None;
                self.local_storage
                    .insert("activeApp".to_string(), key.to_string());
            }
            (".task-card", title) => {
                if let Some(task) = self.task_by_title(title).cloned() {
                    self.fields.insert("#task-title".into(), task.title);
                    self.fields
                        .insert("#task-description".into(), task.description);
                    self.fields.insert("#task-status".into(), task.status);
                    self.fields.insert("#task-priority".into(), task.priority);
                    self.form_tags = task.tags;
                    self.form = Some(Form::Edit(task.id));
                    self.saved_pill = false;
                }
            }
            ("button", "New task") => {
                self.fields.clear();
                self.form_tags.clear();
                self.form = Some(Form::Create);
            }
            ("button", "Create task") => self.create_task(),
            ("button", "Save changes") => self.save_task(),
            ("button", "Delete task") => self.delete_task(),
            ("button", "Sign out") => {
                if let Some(cookie) = &self.cookie {
                    self.sessions.remove(cookie);
                }
                self.emit("POST", "/api/logout", 204);
                self.load();
            }
            ("button", "Dark") => self.theme = "dark".to_string(),
            ("button", "Light") => self.theme = "default".to_string(),
            (".land-parcels-panel .list-row", _) | (".land-owners-panel .list-row", _) => {
                self.land_detail = true;
            }
            _ => {}
        }
        Ok(())
    }

    fn submit_login(&mut self) {
        if self.login_form_broken {
            return;
        }
        let username = self.fields.get("#username").cloned().unwrap_or_default();
        let password = self.fields.get("#password").cloned().unwrap_or_default();
        let accepted = self.login_status < 300
            && username == self.credentials.username
            && password == self.credentials.password;
        if accepted {
            let session = self.issue_session();
            self.cookie = Some(session);
            self.emit("POST", "/api/login", 200);
            self.load();
        } else {
            let status = if self.login_status < 300 { 401 } else { self.login_status };
            self.emit("POST", "/api/login", status);
        }
    }

    fn create_task(&mut self) {
        self.next_task += 1;
        let field = |name: &str| self.fields.get(name).cloned().unwrap_or_default();
        let task = ServerTask {
            id: self.next_task,
            title: field("#task-title"),
            description: field("#task-description"),
            status: field("#task-status"),
            priority: field("#task-priority"),
            tags: self.form_tags.clone(),
        };
        self.tasks.push(task);
        self.form = None;
        self.emit("POST", "/api/tasks", 201);
    }

    fn save_task(&mut self) {
        let Some(Form::Edit(id)) = self.form else {
            return;
        };
        let status = self.fields.get("#task-status").cloned().unwrap_or_default();
        if !self.drop_status_update {
            if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
                task.status = status;
            }
        }
        self.saved_pill = true;
        self.emit("PATCH", &format!("/api/tasks/{}/status", id), 200);
    }

    fn delete_task(&mut self) {
        let Some(Form::Edit(id)) = self.form else {
            return;
        };
        if !self.confirm_accepted {
            return;
        }
        let now = Instant::now();
        for task in self.tasks.iter().filter(|t| t.id == id) {
            self.deleted.push((task.title.clone(), now));
        }
        self.tasks.retain(|t| t.id != id);
        self.form = None;
        self.emit("DELETE", &format!("/api/tasks/{}", id), 204);
    }
}

/// Shared handle; clones see the same app
#[derive(Clone, Default)]
pub struct FakeApp {
    state: Arc<Mutex<AppState>>,
}

impl FakeApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut *state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn view(&self) -> View {
        self.state.lock().view
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

fn json_args(script: &str, pattern: &str) -> Vec<String> {
    let Ok(re) = Regex::new(pattern) else {
        return Vec::new();
    };
    re.captures(script)
        .map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .filter_map(|m| serde_json::from_str::<String>(m.as_str()).ok())
                .collect()
        })
        .unwrap_or_default()
}

const JSON_STRING: &str = r#"("(?:[^"\\]|\\.)*")"#;

#[async_trait]
impl PageDriver for FakeApp {
    async fn goto(&self, url: &str) -> SmokeResult<()> {
        self.record(format!("goto {}", url));
        self.with(|s| s.load());
        Ok(())
    }

    async fn reload(&self) -> SmokeResult<()> {
        self.record("reload".to_string());
        self.with(|s| s.load());
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> SmokeResult<bool> {
        self.record(format!("is_visible {}", locator));
        Ok(self.with(|s| s.visible(locator)))
    }

    async fn count(&self, locator: &Locator) -> SmokeResult<usize> {
        self.record(format!("count {}", locator));
        Ok(self.with(|s| match (locator.css_selector(), locator.text()) {
            (".task-card", Some(title)) => s.cards(title),
            _ => usize::from(s.visible(locator)),
        }))
    }

    async fn click(&self, locator: &Locator) -> SmokeResult<()> {
        self.record(format!("click {}", locator));
        self.with(|s| s.click(locator))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> SmokeResult<()> {
        self.record(format!("fill {}", locator));
        self.with(|s| {
            if !s.visible(locator) {
                return Err(SmokeError::ElementNotFound(locator.to_string()));
            }
            s.fields
                .insert(locator.css_selector().to_string(), value.to_string());
            Ok(())
        })
    }

    async fn press(&self, locator: &Locator, key: &str) -> SmokeResult<()> {
        self.record(format!("press {} {}", locator, key));
        self.with(|s| {
            if !s.visible(locator) {
                return Err(SmokeError::ElementNotFound(locator.to_string()));
            }
            if key == "Enter" {
                if let Some(tag) = s.fields.remove(locator.css_selector()) {
                    if !tag.is_empty() {
                        s.form_tags.insert(tag);
                    }
                }
            }
            Ok(())
        })
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> SmokeResult<()> {
        self.record(format!("select {} {}", locator, value));
        self.with(|s| {
            if !s.visible(locator) {
                return Err(SmokeError::ElementNotFound(locator.to_string()));
            }
            s.fields
                .insert(locator.css_selector().to_string(), value.to_string());
            Ok(())
        })
    }

    async fn input_value(&self, locator: &Locator) -> SmokeResult<String> {
        self.record(format!("input_value {}", locator));
        self.with(|s| {
            if !s.visible(locator) {
                return Err(SmokeError::ElementNotFound(locator.to_string()));
            }
            Ok(s.fields
                .get(locator.css_selector())
                .cloned()
                .unwrap_or_default())
        })
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> SmokeResult<Option<String>> {
        self.record(format!("attribute {} {}", locator, name));
        Ok(self.with(|s| match (locator.css_selector(), name) {
            ("html", "data-theme") => Some(s.theme.clone()),
            (".app-switcher-trigger", "aria-expanded") if s.switcher_toggles => {
                Some(s.switcher_open.to_string())
            }
            _ => None,
        }))
    }

    async fn evaluate(&self, script: &str) -> SmokeResult<serde_json::Value> {
        use serde_json::Value;

        if script.contains("/api/session") {
            self.record("evaluate session-probe".to_string());
            if self.with(|s| s.session_probe_fails) {
                return Err(SmokeError::Browser("TypeError: Failed to fetch".to_string()));
            }
            return Ok(Value::Bool(self.with(|s| s.session_valid())));
        }
        if script == "document.readyState" {
            self.record("evaluate ready-state".to_string());
            return Ok(Value::from("complete"));
        }
        if script.contains("localStorage.setItem") {
            self.record("evaluate storage-set".to_string());
            let args = json_args(
                script,
                &format!(r"setItem\({}, {}\)", JSON_STRING, JSON_STRING),
            );
            if let [key, value] = args.as_slice() {
                self.with(|s| s.local_storage.insert(key.clone(), value.clone()));
            }
            return Ok(Value::Bool(true));
        }
        if script.contains("localStorage.getItem") {
            self.record("evaluate storage-get".to_string());
            let args = json_args(script, &format!(r"getItem\({}\)", JSON_STRING));
            let value = args
                .first()
                .and_then(|key| self.with(|s| s.local_storage.get(key).cloned()));
            return Ok(value.map(Value::from).unwrap_or(Value::Null));
        }
        if script.contains("app:switch") {
            self.record("evaluate dispatch".to_string());
            let args = json_args(script, &format!(r"const app = {};", JSON_STRING));
            self.with(|s| {
                if s.dispatch_works && s.signed_in() {
                    match args.first().map(String::as_str) {
                        Some("land") => s.view = View::Land,
                        Some("tasks") => s.view = View::Tasks,
                        _ => {}
                    }
                }
            });
            return Ok(Value::from("bus"));
        }
        if script.contains("window.confirm") {
            self.record("evaluate accept-dialogs".to_string());
            self.with(|s| s.confirm_accepted = true);
            return Ok(Value::Bool(true));
        }
        self.record("evaluate other".to_string());
        Ok(Value::Null)
    }

    async fn set_session_cookie(&self, credential: &SessionCredential) -> SmokeResult<()> {
        self.record(format!("set_cookie {}", credential.name));
        self.with(|s| s.cookie = Some(credential.value.clone()));
        Ok(())
    }

    async fn expect_response(&self, matcher: ResponseMatcher) -> SmokeResult<ResponseWaiter> {
        self.record(format!("expect {}", matcher));
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.listeners.push((matcher.clone(), tx)));
        Ok(ResponseWaiter::new(matcher, rx))
    }

    async fn screenshot(&self, path: &Path) -> SmokeResult<()> {
        self.record(format!("screenshot {}", path.display()));
        if self.with(|s| s.screenshot_fails) {
            return Err(SmokeError::Browser("capture failed".to_string()));
        }
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        Ok(())
    }
}

#[async_trait]
impl TokenSource for FakeApp {
    async fn obtain(&self) -> SmokeResult<SessionCredential> {
        let outcome = self.with(|s| {
            s.token_requests += 1;
            if s.login_status >= 300 {
                return Err(SmokeError::Authentication {
                    status: s.login_status,
                    body: r#"{"error":"invalid credentials"}"#.to_string(),
                });
            }
            if s.api_sessions_rejected {
                return Ok("stale-session".to_string());
            }
            Ok(s.issue_session())
        })?;
        SessionCredential::new("sid", &outcome, ORIGIN)
    }
}

#[async_trait]
impl TaskBackend for FakeApp {
    async fn list_tasks(&self, session: &SessionCredential) -> SmokeResult<Vec<TaskRecord>> {
        self.with(|s| {
            if !s.sessions.contains(&session.value) {
                return Err(SmokeError::RequestFailed {
                    method: "GET".to_string(),
                    url: format!("{}/api/tasks", ORIGIN),
                    status: 401,
                });
            }
            Ok(s.tasks
                .iter()
                .map(|t| TaskRecord {
                    id: Some(serde_json::Value::from(t.id)),
                    title: t.title.clone(),
                    status: Some(t.status.clone()),
                })
                .collect())
        })
    }
}

/// Defaults with every wait shrunk so failure paths finish quickly
pub fn fast_config() -> SmokeConfig {
    let mut config = SmokeConfig::default();
    config.base_url = ORIGIN.to_string();
    config.timeouts.element_ms = 60;
    config.timeouts.tag_ms = 60;
    config.timeouts.view_ms = 200;
    config.timeouts.login_ms = 200;
    config.timeouts.fast_path_ms = 60;
    config.timeouts.api_poll_ms = 100;
    config.timeouts.settle_ms = 60;
    config.timeouts.poll_interval_ms = 5;
    config.timeouts.navigation_budget_ms = 10_000;
    config.navigation.backoff_ms = 5;
    config
}

pub struct Harness {
    pub app: FakeApp,
    pub page: Arc<dyn PageDriver>,
    pub guard: Arc<SessionGuard>,
    pub store: Arc<dyn StateStore>,
    pub config: SmokeConfig,
}

impl Harness {
    pub fn new(app: FakeApp, config: SmokeConfig) -> Self {
        let page: Arc<dyn PageDriver> = Arc::new(app.clone());
        let guard = Arc::new(SessionGuard::new(
            page.clone(),
            Arc::new(app.clone()),
            config.credentials.clone(),
            config.timeouts.clone(),
        ));
        let store: Arc<dyn StateStore> = Arc::new(LocalStorageStore::new(page.clone()));
        Self {
            app,
            page,
            guard,
            store,
            config,
        }
    }

    pub fn navigation(&self) -> NavigationController {
        NavigationController::new(
            self.page.clone(),
            self.guard.clone(),
            self.store.clone(),
            self.config.timeouts.clone(),
            &self.config.navigation,
        )
    }

    pub fn runner(&self) -> ScenarioRunner {
        ScenarioRunner::new(
            self.page.clone(),
            self.guard.clone(),
            self.navigation(),
            Arc::new(self.app.clone()),
            &self.config,
        )
    }

    /// Attach the API session and load the app, as the first scenario step does
    pub async fn signed_in(&self) {
        self.guard.attach_session().await.unwrap();
        self.page.goto(ORIGIN).await.unwrap();
        self.guard.ensure().await.unwrap();
    }
}
