//! # Safe-Mode Orchestrator
//!
//! Guided, dependency-ordered restart of a [`QueueItem`] plan.
//!
//! ```text
//! Idle --start(plan)--> Running --all steps ready--> Completed
//!                          \-----restart rejected / timeout / cancel--> Failed
//! ```
//!
//! A run is executed by one task, strictly step by step:
//!
//! 1. best-effort `safe_mode enter` notification (a failure is logged only),
//! 2. per item: restart through the [`ActionGateway`], then poll the item's
//!    resource until it reports running (checked right away, then every
//!    `readiness_interval`) under a per-step timeout,
//! 3. best-effort `safe_mode exit` notification, whatever the outcome,
//! 4. terminal status, and the [`SafeModeLock`](crate::core::actions::SafeModeLock)
//!    is released in the same state update.
//!
//! While a run holds the lock every restart submitted outside the run is
//! refused by the gateway.
//!
//! `cancel` aborts a run during its restart request or readiness polling. The
//! run fails with "cancelled by operator"; the exit notification still goes out.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::actions::{ActionGateway, ActionRequest, SafeModePermit};
use crate::core::notifications::{Notification, Notifier};
use crate::core::plan::{ItemKind, QueueItem};
use crate::errors::{SafeModeError, StepFailure};
use crate::ingestors::polling::PollingCache;
use crate::models::containers::ContainersReport;
use crate::models::services::ServicesReport;

/// Readiness polling cadence and per-step limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeModeTimings {
    pub readiness_interval: Duration,
    pub service_timeout: Duration,
    pub container_timeout: Duration,
}

impl Default for SafeModeTimings {
    fn default() -> Self {
        Self {
            readiness_interval: Duration::from_secs(2),
            service_timeout: Duration::from_secs(60),
            container_timeout: Duration::from_secs(90),
        }
    }
}

impl SafeModeTimings {
    pub fn timeout_for(&self, kind: ItemKind) -> Duration {
        match kind {
            ItemKind::Service => self.service_timeout,
            ItemKind::Container => self.container_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        })
    }
}

/// One timestamped line of the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub text: String,
}

impl LogLine {
    fn now(text: impl Into<String>) -> Self {
        Self { at: Utc::now(), text: text.into() }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.text)
    }
}

/// Execution record of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeModeRun {
    pub status: RunStatus,
    /// Append-only while the run is alive.
    pub log: Vec<LogLine>,
    /// Index into `plan` of the step being executed (or the one that failed).
    pub current_step: Option<usize>,
    pub plan: Vec<QueueItem>,
}

/// # Safe-Mode Orchestrator
pub struct SafeModeOrchestrator {
    gateway: Arc<ActionGateway>,
    services: Arc<PollingCache<ServicesReport>>,
    containers: Arc<PollingCache<ContainersReport>>,
    timings: SafeModeTimings,
    notifier: Notifier,
    active: watch::Sender<bool>,
    run: watch::Sender<SafeModeRun>,
    cancel: Mutex<CancellationToken>,
}

impl SafeModeOrchestrator {
    pub fn new(
        gateway: Arc<ActionGateway>,
        services: Arc<PollingCache<ServicesReport>>,
        containers: Arc<PollingCache<ContainersReport>>,
        timings: SafeModeTimings,
        notifier: Notifier,
    ) -> Arc<Self> {
        let (active, _) = watch::channel(false);
        let (run, _) = watch::channel(SafeModeRun::default());
        Arc::new(Self {
            gateway,
            services,
            containers,
            timings,
            notifier,
            active,
            run,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    // --- Observation ---

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub fn watch_active(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    pub fn run(&self) -> SafeModeRun {
        self.run.borrow().clone()
    }

    pub fn watch_run(&self) -> watch::Receiver<SafeModeRun> {
        self.run.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        self.run.borrow().status
    }

    pub fn timings(&self) -> &SafeModeTimings {
        &self.timings
    }

    // --- Lifecycle ---

    /// Turns safe mode on (the operator-visible mode, not a run).
    pub fn open(&self) {
        self.active.send_if_modified(|active| !std::mem::replace(active, true));
    }

    /// Turns safe mode off and discards the last run record.
    ///
    /// # Errors
    /// `RunInProgress` while a run is executing; nothing changes then.
    pub fn close(&self) -> Result<(), SafeModeError> {
        let mut refused = false;
        self.run.send_if_modified(|run| {
            if run.status == RunStatus::Running {
                refused = true;
                return false;
            }
            let changed = *run != SafeModeRun::default();
            *run = SafeModeRun::default();
            changed
        });
        if refused {
            return Err(SafeModeError::RunInProgress);
        }
        self.active.send_if_modified(|active| std::mem::replace(active, false));
        Ok(())
    }

    /// # Start
    ///
    /// Begins executing `plan` on its own task and returns immediately.
    /// Safe mode is opened implicitly.
    ///
    /// # Errors
    /// `EmptyPlan` or `AlreadyRunning`; a rejected start changes nothing.
    pub fn start(self: &Arc<Self>, plan: Vec<QueueItem>) -> Result<(), SafeModeError> {
        if plan.is_empty() {
            return Err(SafeModeError::EmptyPlan);
        }

        let mut accepted = false;
        self.run.send_if_modified(|run| {
            if run.status == RunStatus::Running || !self.gateway.lock().try_acquire() {
                return false;
            }
            *run = SafeModeRun {
                status: RunStatus::Running,
                log: vec![LogLine::now(format!("Safe-mode run started with {} step(s)", plan.len()))],
                current_step: None,
                plan: plan.clone(),
            };
            accepted = true;
            true
        });
        if !accepted {
            return Err(SafeModeError::AlreadyRunning);
        }

        self.open();
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        log::info!("Safe-mode run started: {} step(s)", plan.len());
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.execute(plan, token).await });
        Ok(())
    }

    /// Aborts the running run. Returns `false` if nothing was running.
    pub fn cancel(&self) -> bool {
        if self.status() != RunStatus::Running {
            return false;
        }
        log::warn!("Safe-mode run cancellation requested");
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        true
    }

    /// Waits until no run is executing and returns the resulting status.
    #[allow(clippy::let_and_return)]
    pub async fn wait(&self) -> RunStatus {
        let mut rx = self.run.subscribe();
        // The borrowed `Ref` has to be dropped before `rx`.
        let status = match rx.wait_for(|run| run.status != RunStatus::Running).await {
            Ok(run) => run.status,
            Err(_) => self.status(),
        };
        status
    }

    // --- Run task ---

    async fn execute(self: Arc<Self>, plan: Vec<QueueItem>, cancel: CancellationToken) {
        let permit = SafeModePermit::issue();
        self.notify_backend(ActionRequest::SafeModeEnter {
            reason: Some("guided restart plan".to_string()),
        })
        .await;

        let total = plan.len();
        let mut failure = None;
        for (index, item) in plan.iter().enumerate() {
            self.run.send_modify(|run| run.current_step = Some(index));
            self.append(format!("Step {}/{}: restarting {}", index + 1, total, item));

            if let Err(e) = self.run_step(&permit, item, &cancel).await {
                failure = Some(e);
                break;
            }
            self.append(format!("{item} is running"));
        }

        let status = match &failure {
            None => {
                self.append(format!("All {total} step(s) completed"));
                RunStatus::Completed
            }
            Some(e) => {
                self.append(format!("Run failed: {e}"));
                RunStatus::Failed
            }
        };

        self.notify_backend(ActionRequest::SafeModeExit).await;

        let lock = self.gateway.lock().clone();
        self.run.send_modify(|run| {
            run.status = status;
            lock.release();
        });

        log::info!("Safe-mode run {}", status);
        self.notifier.notify(match failure {
            None => Notification::success("Safe mode", format!("Restart plan completed ({total} step(s))")),
            Some(e) => Notification::error("Safe mode", e.to_string()),
        });
    }

    async fn run_step(
        &self,
        permit: &SafeModePermit,
        item: &QueueItem,
        cancel: &CancellationToken,
    ) -> Result<(), StepFailure> {
        let restarted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StepFailure::Cancelled),
            result = self.gateway.restart_with_permit(permit, item) => result,
        };
        let outcome = restarted.map_err(|error| StepFailure::Restart { item: item.clone(), error })?;
        if !outcome.message.is_empty() {
            self.append(outcome.message);
        }

        let limit = self.timings.timeout_for(item.kind);
        self.append(format!("Waiting up to {}s for {} to report running", limit.as_secs(), item));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepFailure::Cancelled),
            ready = tokio::time::timeout(limit, self.wait_until_running(item)) => {
                ready.map_err(|_| StepFailure::Timeout { item: item.clone(), waited: limit })
            }
        }
    }

    async fn wait_until_running(&self, item: &QueueItem) {
        loop {
            if self.is_running(item).await {
                return;
            }
            tokio::time::sleep(self.timings.readiness_interval).await;
        }
    }

    /// Only a payload fetched by this check counts. A failed or superseded
    /// fetch is "not yet", never the cached pre-restart state.
    async fn is_running(&self, item: &QueueItem) -> bool {
        match item.kind {
            ItemKind::Service => matches!(
                self.services.fetch_now().await,
                Some(Ok(report)) if report.is_running(&item.name)
            ),
            ItemKind::Container => matches!(
                self.containers.fetch_now().await,
                Some(Ok(report)) if report.is_running(&item.name)
            ),
        }
    }

    /// Best-effort backend notification; never fails the run.
    async fn notify_backend(&self, request: ActionRequest) {
        if let Err(e) = self.gateway.submit(request.clone()).await {
            log::warn!("Backend did not acknowledge '{}': {}", request, e);
            self.append(format!("Backend did not acknowledge '{request}' ({e}); continuing"));
        }
    }

    fn append(&self, text: String) {
        log::info!("[safe-mode] {}", text);
        self.run.send_modify(|run| run.log.push(LogLine::now(text)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actions::{SafeModeLock, RESTART_PATH, SAFE_MODE_PATH};
    use crate::errors::ActionError;
    use crate::ingestors::polling::{Resource, ResourceKind};
    use crate::retrieve::fake::{FakeBackend, Scripted};
    use crate::retrieve::transport::ApiTransport;
    use serde_json::{json, Value};

    const SERVICES: &str = "/api/services";
    const CONTAINERS: &str = "/api/containers";

    fn containers(state: &str) -> Value {
        json!({"total": 1, "containers": [{"id": "4f2a", "name": "guacamole-db", "state": state}]})
    }

    fn services(status: &str) -> Value {
        json!({"services": {"nginx": {"service": "nginx", "active": true, "status": status}}})
    }

    fn ok() -> Scripted {
        Scripted::ok(json!({"success": true, "message": ""}))
    }

    fn orchestrator(backend: &Arc<FakeBackend>) -> (Arc<SafeModeOrchestrator>, Notifier) {
        let transport: Arc<dyn ApiTransport> = backend.clone();
        let services = PollingCache::new(Resource::new(ResourceKind::Services, 1), transport.clone());
        let containers = PollingCache::new(Resource::new(ResourceKind::Containers, 1), transport.clone());
        let gateway = Arc::new(ActionGateway::new(transport, SafeModeLock::default()));
        let notifier = Notifier::new();
        let orchestrator = SafeModeOrchestrator::new(
            gateway,
            services,
            containers,
            SafeModeTimings::default(),
            notifier.clone(),
        );
        (orchestrator, notifier)
    }

    fn plan() -> Vec<QueueItem> {
        vec![QueueItem::container("guacamole-db"), QueueItem::service("nginx")]
    }

    fn log_text(run: &SafeModeRun) -> Vec<String> {
        run.log.iter().map(|l| l.text.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_restart_waits_for_readiness() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(CONTAINERS, Scripted::ok(containers("restarting")))
            .script(CONTAINERS, Scripted::ok(containers("running")))
            .script(SERVICES, Scripted::ok(services("running")));
        let (orchestrator, notifier) = orchestrator(&backend);
        let mut notifications = notifier.subscribe();

        orchestrator.start(plan()).unwrap();
        assert_eq!(orchestrator.status(), RunStatus::Running);
        assert_eq!(orchestrator.wait().await, RunStatus::Completed);

        assert_eq!(
            backend.journal(),
            vec![
                "POST /api/actions/safe_mode enter",
                "POST /api/actions/restart guacamole-db",
                "GET /api/containers",
                "GET /api/containers",
                "POST /api/actions/restart nginx",
                "GET /api/services",
                "POST /api/actions/safe_mode exit",
            ]
        );
        let run = orchestrator.run();
        assert_eq!(run.current_step, Some(1));
        assert_eq!(run.log.last().unwrap().text, "All 2 step(s) completed");
        assert!(!orchestrator.gateway.lock().is_held());
        assert_eq!(notifications.recv().await.unwrap().title, "Safe mode");
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_timeout_fails_before_the_next_restart() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(CONTAINERS, Scripted::ok(containers("exited")))
            .script(SERVICES, Scripted::ok(services("running")));
        let (orchestrator, _) = orchestrator(&backend);

        let started = tokio::time::Instant::now();
        orchestrator.start(plan()).unwrap();
        assert_eq!(orchestrator.wait().await, RunStatus::Failed);
        assert!(started.elapsed() >= Duration::from_secs(90));

        let journal = backend.journal();
        assert!(!journal.iter().any(|l| l == "POST /api/actions/restart nginx"));
        assert!(journal.iter().filter(|l| *l == "GET /api/containers").count() >= 40);
        assert_eq!(journal.last().unwrap(), "POST /api/actions/safe_mode exit");

        let run = orchestrator.run();
        assert_eq!(run.current_step, Some(0));
        assert_eq!(
            run.log.last().unwrap().text,
            "Run failed: container guacamole-db did not report running within 90s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_running_state_does_not_count_as_ready() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(SERVICES, Scripted::ok(services("running")))
            .script(SERVICES, Scripted::status(500, r#"{"detail":"Failed to get services: ssh down"}"#));
        let (orchestrator, _) = orchestrator(&backend);

        // Cached from before the restart, and kept when later polls fail.
        assert!(orchestrator.services.refresh().await.data.unwrap().is_running("nginx"));

        let started = tokio::time::Instant::now();
        orchestrator
            .start(vec![QueueItem::service("nginx"), QueueItem::container("guacamole-db")])
            .unwrap();
        assert_eq!(orchestrator.wait().await, RunStatus::Failed);
        assert!(started.elapsed() >= Duration::from_secs(60));

        let services = orchestrator.services.snapshot();
        assert!(services.is_stale());
        assert!(services.data.unwrap().is_running("nginx"));
        assert!(!backend.journal().iter().any(|l| l == "POST /api/actions/restart guacamole-db"));
        assert_eq!(
            orchestrator.run().log.last().unwrap().text,
            "Run failed: service nginx did not report running within 60s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_rejection_aborts_the_run() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, Scripted::status(500, r#"{"detail":"Failed to restart container guacamole-db: No such container"}"#));
        let (orchestrator, _) = orchestrator(&backend);

        orchestrator.start(plan()).unwrap();
        assert_eq!(orchestrator.wait().await, RunStatus::Failed);
        assert_eq!(
            backend.journal(),
            vec![
                "POST /api/actions/safe_mode enter",
                "POST /api/actions/restart guacamole-db",
                "POST /api/actions/safe_mode exit",
            ]
        );
        let log = log_text(&orchestrator.run());
        assert_eq!(
            log.last().unwrap(),
            "Run failed: restart of container guacamole-db failed: Failed to restart container guacamole-db: No such container"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_safe_mode_endpoint_is_tolerated() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(RESTART_PATH, ok())
            .script(SERVICES, Scripted::ok(services("running")));
        let (orchestrator, _) = orchestrator(&backend);

        orchestrator.start(vec![QueueItem::service("nginx")]).unwrap();
        assert_eq!(orchestrator.wait().await, RunStatus::Completed);

        let log = log_text(&orchestrator.run());
        assert!(log.iter().any(|l| l.starts_with("Backend did not acknowledge 'enter safe mode'")));
        assert!(log.iter().any(|l| l.starts_with("Backend did not acknowledge 'exit safe mode'")));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_starts_leave_the_run_untouched() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(CONTAINERS, Scripted::ok(containers("exited")));
        let (orchestrator, _) = orchestrator(&backend);

        assert_eq!(orchestrator.start(vec![]), Err(SafeModeError::EmptyPlan));
        assert_eq!(orchestrator.run(), SafeModeRun::default());
        assert!(!orchestrator.is_active());

        orchestrator.start(plan()).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let before = orchestrator.run();
        assert_eq!(
            orchestrator.start(vec![QueueItem::service("nginx")]),
            Err(SafeModeError::AlreadyRunning)
        );
        assert_eq!(orchestrator.start(vec![]), Err(SafeModeError::EmptyPlan));
        assert_eq!(orchestrator.run(), before);
        assert_eq!(orchestrator.close(), Err(SafeModeError::RunInProgress));
        assert!(orchestrator.is_active());

        assert!(orchestrator.cancel());
        orchestrator.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_restarts_are_refused_while_running() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(CONTAINERS, Scripted::ok(containers("exited")));
        let (orchestrator, _) = orchestrator(&backend);

        orchestrator.start(plan()).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let err = orchestrator
            .gateway
            .submit(ActionRequest::RestartService("nginx".into()))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::SafeModeActive);

        orchestrator.cancel();
        orchestrator.wait().await;
        orchestrator
            .gateway
            .submit(ActionRequest::RestartService("nginx".into()))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_fails_the_run_and_still_exits() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(CONTAINERS, Scripted::ok(containers("exited")));
        let (orchestrator, _) = orchestrator(&backend);
        assert!(!orchestrator.cancel());

        orchestrator.start(plan()).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(orchestrator.cancel());

        assert_eq!(orchestrator.wait().await, RunStatus::Failed);
        assert_eq!(orchestrator.run().log.last().unwrap().text, "Run failed: cancelled by operator");
        assert_eq!(backend.journal().last().unwrap(), "POST /api/actions/safe_mode exit");
        assert!(!orchestrator.gateway.lock().is_held());

        // A finished run can be closed, which resets it.
        orchestrator.close().unwrap();
        assert_eq!(orchestrator.run(), SafeModeRun::default());
        assert!(!orchestrator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_run_replaces_the_previous_record() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script(SAFE_MODE_PATH, ok())
            .script(RESTART_PATH, ok())
            .script(SERVICES, Scripted::ok(services("running")));
        let (orchestrator, _) = orchestrator(&backend);

        orchestrator.start(vec![QueueItem::service("nginx")]).unwrap();
        orchestrator.wait().await;
        orchestrator.start(vec![QueueItem::service("nginx"), QueueItem::service("nginx")]).unwrap();
        assert_eq!(orchestrator.run().log.len(), 1);
        assert_eq!(orchestrator.wait().await, RunStatus::Completed);
        assert_eq!(orchestrator.run().plan.len(), 2);
    }
}
