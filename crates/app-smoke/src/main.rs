//! app-smoke - end-to-end smoke check for a task manager deployment

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use app_smoke::api::TaskApi;
use app_smoke::report::ScenarioReport;
use app_smoke::store::LocalStorageStore;
use app_smoke::{
    BrowserSession, FailureReporter, NavigationController, PageDriver, ScenarioRun,
    ScenarioRunner, SessionGuard, SessionTokenClient, SmokeConfig, SmokeResult, TaskFixture,
};

/// Verify login, task CRUD, app navigation and UI persistence against a running deployment
#[derive(Parser)]
#[command(name = "app-smoke")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the deployment under test
    #[arg(long, env = "APP_URL")]
    base_url: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Account used for API and UI login
    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Where the failure screenshot and run report are written
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Chrome/Chromium executable to launch
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Launch Chromium with --no-sandbox (containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Skip the best-effort land section
    #[arg(long)]
    skip_land: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<SmokeConfig> {
        let mut config = SmokeConfig::load(self.config.as_deref())
            .with_context(|| format!("loading config {:?}", self.config))?;
        config.apply_env();

        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        if let Some(username) = self.username {
            config.credentials.username = username;
        }
        if let Some(password) = self.password {
            config.credentials.password = password;
        }
        if let Some(dir) = self.artifact_dir {
            config.artifacts.dir = dir;
        }
        if let Some(chrome) = self.chrome {
            config.browser.chrome_executable = Some(chrome);
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.no_sandbox {
            config.browser.no_sandbox = true;
        }
        if self.skip_land {
            config.check_land = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn build_runner(config: &SmokeConfig, page: Arc<dyn PageDriver>) -> SmokeResult<ScenarioRunner> {
    let request_timeout = Duration::from_millis(config.browser.request_timeout_ms);
    let tokens = Arc::new(SessionTokenClient::new(
        &config.base_url,
        config.credentials.clone(),
        &config.session_cookie,
        request_timeout,
    )?);
    let backend = Arc::new(TaskApi::new(&config.base_url, request_timeout)?);
    let guard = Arc::new(SessionGuard::new(
        page.clone(),
        tokens,
        config.credentials.clone(),
        config.timeouts.clone(),
    ));
    let store = Arc::new(LocalStorageStore::new(page.clone()));
    let navigation = NavigationController::new(
        page.clone(),
        guard.clone(),
        store,
        config.timeouts.clone(),
        &config.navigation,
    );
    Ok(ScenarioRunner::new(page, guard, navigation, backend, config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = args.into_config()?;
    std::fs::create_dir_all(&config.artifacts.dir).with_context(|| {
        format!(
            "creating artifact directory {}",
            config.artifacts.dir.display()
        )
    })?;
    info!("Smoke testing {}", config.base_url);

    let started_at = Utc::now();
    let clock = Instant::now();
    let reporter = FailureReporter::new(config.artifacts.screenshot_path());

    let (run, result) = match BrowserSession::launch(&config.browser, &config.timeouts).await {
        Ok(session) => {
            let page: Arc<dyn PageDriver> = session.page();
            let run = match build_runner(&config, page.clone()) {
                Ok(runner) => runner.run(TaskFixture::now()).await,
                Err(e) => ScenarioRun {
                    fixture: TaskFixture::now(),
                    steps: Vec::new(),
                    outcome: Err(e),
                },
            };
            let result = reporter
                .conclude(
                    Some(page.as_ref()),
                    &config.base_url,
                    run.fixture.title(),
                    &run.outcome,
                )
                .await;
            drop(page);
            session.shutdown().await;
            (run, result)
        }
        Err(e) => {
            let result = reporter.failed(None, &e).await;
            let run = ScenarioRun {
                fixture: TaskFixture::now(),
                steps: Vec::new(),
                outcome: Err(e),
            };
            (run, result)
        }
    };

    let report = ScenarioReport {
        base_url: config.base_url.clone(),
        task_title: run.fixture.title().to_string(),
        started_at,
        duration_ms: clock.elapsed().as_millis() as u64,
        steps: run.steps,
        result,
    };
    if let Err(e) = report.write(&config.artifacts.report_path()) {
        warn!("Could not write run report: {}", e);
    }

    std::process::exit(report.result.exit_code());
}
