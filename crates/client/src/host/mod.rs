//! Host coordinator: the once-per-load recovery loop.
//!
//! ### Load sequence
//! 1. A session that already passed its checks skips everything.
//! 2. Critical resources are checked with HEAD requests. Anything missing
//!    purges the caches, drops the interceptor registration and schedules
//!    a reload.
//! 3. Otherwise malformed-response signals are watched for a short window.
//!    One arriving marks the session, promotes a waiting interceptor,
//!    purges the caches and schedules a reload.
//! 4. Otherwise the session is marked initialized and the load is healthy.
//!
//! Forced reloads are counted per session. Past `max_retries` the loop stops
//! and hands the host a terminal state with manual recovery actions.

mod reload;

use std::sync::Arc;
use std::time::Duration;

use offgrid_core::{AppConfig, CacheDb, Error, FlagStore, MemoryFlagStore};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use url::Url;

use crate::fetch::{Request, Transport, normalize_url};
use crate::lifecycle::LifecycleController;
use crate::signals::{ErrorSignal, ErrorSignals};

pub use reload::{ReloadScheduler, Reloader};

pub const SESSION_INITIALIZED: &str = "sessionInitialized";
pub const SW_RELOADED: &str = "swReloaded";
pub const SW_RETRY_COUNT: &str = "swRetryCount";
pub const UPDATE_DECLINED: &str = "updateDeclined";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Absolute URLs that must answer for the shell to be healthy.
    pub critical_resources: Vec<Url>,
    pub script_url: String,
    pub max_retries: u32,
    pub reload_delay: Duration,
    pub error_watch: Duration,
}

impl CoordinatorConfig {
    /// Resolve critical resources against the configured origin.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = normalize_url(&config.origin, None)?;
        let critical_resources = config
            .critical_resources
            .iter()
            .map(|path| normalize_url(path, Some(&origin)).map_err(Error::from))
            .collect::<Result<Vec<_>, _>>()?;
        let script_url = normalize_url(&config.script_url, Some(&origin))?.to_string();

        Ok(Self {
            critical_resources,
            script_url,
            max_retries: config.max_retries,
            reload_delay: config.reload_delay(),
            error_watch: config.error_watch_window(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualAction {
    Reload,
    RestartInterceptor,
    ClearCaches,
}

/// Recovery gave up; the user picks what happens next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalState {
    pub reason: String,
    pub attempts: u32,
    pub actions: Vec<ManualAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    SkippedInitialized,
    Healthy,
    ReloadScheduled { reason: String },
    Terminal(TerminalState),
}

pub struct HostCoordinator {
    config: CoordinatorConfig,
    db: CacheDb,
    transport: Arc<dyn Transport>,
    lifecycle: Arc<LifecycleController>,
    signals: ErrorSignals,
    scheduler: ReloadScheduler,
    session: Arc<dyn FlagStore>,
    local: Arc<dyn FlagStore>,
}

impl std::fmt::Debug for HostCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCoordinator").field("config", &self.config).finish_non_exhaustive()
    }
}

impl HostCoordinator {
    /// Session flags start empty; local flags live in `db`.
    pub fn new(
        config: CoordinatorConfig, db: CacheDb, transport: Arc<dyn Transport>, lifecycle: Arc<LifecycleController>,
        signals: ErrorSignals, reloader: Arc<dyn Reloader>,
    ) -> Self {
        let local: Arc<dyn FlagStore> = Arc::new(db.clone());
        Self {
            config,
            db,
            transport,
            lifecycle,
            signals,
            scheduler: ReloadScheduler::new(reloader),
            session: Arc::new(MemoryFlagStore::new()),
            local,
        }
    }

    pub fn with_flag_stores(mut self, session: Arc<dyn FlagStore>, local: Arc<dyn FlagStore>) -> Self {
        self.session = session;
        self.local = local;
        self
    }

    pub fn scheduler(&self) -> &ReloadScheduler {
        &self.scheduler
    }

    /// Forced reloads spent in this session.
    pub async fn retry_count(&self) -> Result<u32, Error> {
        let raw = self.session.get(SW_RETRY_COUNT).await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Run the load sequence once.
    pub async fn run_on_load(&self) -> Result<LoadOutcome, Error> {
        if self.session.is_set(SESSION_INITIALIZED).await? {
            tracing::debug!("session already initialized, skipping checks");
            return Ok(LoadOutcome::SkippedInitialized);
        }

        // Subscribe before the integrity checks so signals they raise are seen.
        let mut errors = self.signals.subscribe();

        let missing = self.check_integrity().await;
        if !missing.is_empty() {
            let reason = Error::ResourceIntegrity(format!("missing critical resources: {}", missing.join(", ")));
            tracing::warn!(error = %reason, "integrity check failed");
            return self.recover(&reason, false).await;
        }

        let watch = tokio::time::timeout(self.config.error_watch, async {
            loop {
                match errors.recv().await {
                    Ok(signal @ ErrorSignal::MalformedResponse { .. }) => return Some(signal),
                    Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "error watcher lagged"),
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .await;

        if let Ok(Some(signal)) = watch {
            let reason = Error::MalformedResponse(signal.to_string());
            tracing::warn!(error = %reason, "malformed response during load");
            self.session.set(SESSION_INITIALIZED, "true").await?;
            return self.recover(&reason, true).await;
        }

        self.session.set(SESSION_INITIALIZED, "true").await?;
        tracing::info!("load healthy");
        Ok(LoadOutcome::Healthy)
    }

    /// HEAD-request every critical resource; returns the ones that failed.
    async fn check_integrity(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for url in &self.config.critical_resources {
            let head = Request::new(Method::HEAD, url.clone());
            match self.transport.fetch(&head).await {
                Ok(response) if response.status < 400 => {}
                Ok(response) => {
                    tracing::debug!(url = %url, status = response.status, "critical resource missing");
                    missing.push(url.to_string());
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "critical resource unreachable");
                    missing.push(url.to_string());
                }
            }
        }
        missing
    }

    async fn recover(&self, reason: &Error, promote_waiting: bool) -> Result<LoadOutcome, Error> {
        let attempts = self.retry_count().await?;
        if attempts >= self.config.max_retries {
            tracing::error!(attempts, error = %reason, "recovery retries exhausted");
            return Ok(LoadOutcome::Terminal(TerminalState {
                reason: reason.to_string(),
                attempts,
                actions: vec![ManualAction::Reload, ManualAction::RestartInterceptor, ManualAction::ClearCaches],
            }));
        }
        self.session.set(SW_RETRY_COUNT, &(attempts + 1).to_string()).await?;

        if promote_waiting && let Err(e) = self.lifecycle.activate_waiting().await {
            tracing::warn!(error = %e, "could not activate waiting interceptor");
        }
        self.purge_caches().await;
        if !promote_waiting && let Err(e) = self.lifecycle.unregister().await {
            tracing::warn!(error = %e, "could not unregister interceptor");
        }

        self.session.set(SW_RELOADED, "true").await?;
        self.scheduler.schedule(self.config.reload_delay);
        tracing::info!(attempt = attempts + 1, max = self.config.max_retries, "forced reload scheduled");
        Ok(LoadOutcome::ReloadScheduled { reason: reason.to_string() })
    }

    async fn purge_caches(&self) {
        match self.db.purge_all().await {
            Ok(n) => tracing::info!(entries = n, "caches purged"),
            Err(e) => tracing::warn!(error = %e, "cache purge failed"),
        }
    }

    /// Run a manual recovery action from the terminal state.
    pub async fn perform(&self, action: ManualAction) -> Result<(), Error> {
        self.session.remove(SW_RETRY_COUNT).await?;
        self.session.remove(SESSION_INITIALIZED).await?;
        tracing::info!(?action, "manual recovery");

        match action {
            ManualAction::Reload => {}
            ManualAction::RestartInterceptor => {
                self.lifecycle.unregister().await?;
                self.lifecycle.register(&self.config.script_url).await?;
            }
            ManualAction::ClearCaches => {
                self.db.purge_all().await?;
            }
        }
        self.scheduler.reload_now().await;
        Ok(())
    }

    /// Whether the user should be asked about `version`.
    pub async fn should_prompt_update(&self, version: &str) -> Result<bool, Error> {
        Ok(self.local.get(UPDATE_DECLINED).await?.as_deref() != Some(version))
    }

    pub async fn decline_update(&self, version: &str) -> Result<(), Error> {
        tracing::info!(version, "update declined");
        self.local.set(UPDATE_DECLINED, version).await
    }

    /// Activate the waiting interceptor and reload onto it.
    pub async fn accept_update(&self) -> Result<Option<String>, Error> {
        let activated = self.lifecycle.activate_waiting().await?;
        if activated.is_some() {
            self.local.remove(UPDATE_DECLINED).await?;
            self.scheduler.schedule(self.config.reload_delay);
        }
        Ok(activated)
    }
}
