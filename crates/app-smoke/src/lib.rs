//! Task Manager App Smoke Check
//!
//! Drives a real Chromium against a running deployment of the task manager and
//! reduces one fixed scenario to a pass/fail verdict:
//! - Obtains a session through the API and attaches it to the browser
//! - Falls back to the login form, then to the app switcher, when needed
//! - Creates, updates and deletes a uniquely titled task, cross-checking the
//!   backend listing after each mutation
//! - Visits the land app (best-effort), toggles the theme, reloads, signs out
//!   and back in
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ScenarioRunner (9 ordered steps)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionGuard                NavigationController           │
//! │    ├── API token fast path     ├── MenuClickStrategy        │
//! │    ├── UI login fallback       ├── PersistedStateStrategy   │
//! │    └── app switcher            └── InternalDispatchStrategy │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionTokenClient   TaskApi   StateStore   Wait / both()  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver  ──►  CdpPage (chromiumoxide)  ◄── BrowserSession│
//! └─────────────────────────────────────────────────────────────┘
//!                 FailureReporter ──► app-smoke.png / .json
//! ```

pub mod api;
pub mod browser;
pub mod config;
pub mod dom;
pub mod driver;
pub mod error;
pub mod guard;
pub mod navigation;
pub mod report;
pub mod scenario;
pub mod script;
pub mod store;
pub mod task;
pub mod token;
pub mod wait;

pub use browser::BrowserSession;
pub use config::SmokeConfig;
pub use dom::NavigationTarget;
pub use driver::{Locator, PageDriver};
pub use error::{FailureKind, SmokeError, SmokeResult};
pub use guard::SessionGuard;
pub use navigation::NavigationController;
pub use report::{FailureReporter, ScenarioReport, ScenarioResult};
pub use scenario::{ScenarioRun, ScenarioRunner};
pub use task::TaskFixture;
pub use token::{SessionCredential, SessionTokenClient, TokenSource};
