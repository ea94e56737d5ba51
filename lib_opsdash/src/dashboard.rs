//! # Dashboard
//!
//! The shared state object every surface (headless runner, CLI, tests) works
//! against. It owns one polling cache per resource, the realtime client, the
//! reconciler loop, the action gateway, the safe-mode orchestrator and the
//! command registry, and ties their lifecycles together.
//!
//! ## Wiring
//!
//! ```text
//! DashboardSettings -> ApiClient (polls, with retries) ---> PollingCache x8
//!                   -> ApiClient (actions, no retries) ---> ActionGateway
//!                   -> StreamClient -> Dispatcher -> Reconciler -> caches + points
//! caches + SafeModeOrchestrator -> CommandRegistry
//! ```
//!
//! `start` spawns every task; `shutdown` cancels an active safe-mode run (its
//! exit notification still goes out), then tears down every task and waits for
//! them. Dropping the last handle tears the tasks down the same way without
//! waiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configs::config_dashboard::DashboardSettings;
use crate::core::actions::{ActionGateway, ActionOutcome, ActionRequest, SafeModeLock};
use crate::core::dispatcher::Dispatcher;
use crate::core::notifications::{Notification, Notifier};
use crate::core::plan::{recommended_plan, ItemKind, QueueItem, RegexClassifier, RoleClassifier};
use crate::core::reconciler::{Reconciler, SharedPoints};
use crate::core::registry::{CommandAction, CommandEntry, CommandRegistry, NavTarget};
use crate::core::rolling_buffer::{MetricPoint, RollingPointBuffer};
use crate::core::safe_mode::SafeModeOrchestrator;
use crate::errors::{ActionError, CommandError};
use crate::ingestors::polling::{PollingCache, Resource, ResourceKind};
use crate::ingestors::telemetry_wss::{ConnectionState, StreamClient};
use crate::models::applications::ApplicationsReport;
use crate::models::containers::ContainersReport;
use crate::models::diagnostics::DiagnosticsReport;
use crate::models::health::HealthReport;
use crate::models::history::HistoryReport;
use crate::models::security::SecurityReport;
use crate::models::services::ServicesReport;
use crate::models::system::SystemSnapshot;
use crate::retrieve::ky_http::ApiClient;
use crate::retrieve::transport::ApiTransport;

/// Result of executing a command palette entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The surface should switch to this view.
    Navigate(NavTarget),
    SafeModeOpened,
    SafeModeClosed,
    RunStarted(Vec<QueueItem>),
    Action(ActionOutcome),
}

/// Handles to every polled resource.
pub struct Caches {
    pub system: Arc<PollingCache<SystemSnapshot>>,
    pub services: Arc<PollingCache<ServicesReport>>,
    pub containers: Arc<PollingCache<ContainersReport>>,
    pub applications: Arc<PollingCache<ApplicationsReport>>,
    pub security: Arc<PollingCache<SecurityReport>>,
    pub diagnostics: Arc<PollingCache<DiagnosticsReport>>,
    pub history: Arc<PollingCache<HistoryReport>>,
    pub health: Arc<PollingCache<HealthReport>>,
}

impl Caches {
    fn new(transport: &Arc<dyn ApiTransport>, history_days: u32) -> Self {
        let resource = |kind| Resource::new(kind, history_days);
        Self {
            system: PollingCache::new(resource(ResourceKind::System), transport.clone()),
            services: PollingCache::new(resource(ResourceKind::Services), transport.clone()),
            containers: PollingCache::new(resource(ResourceKind::Containers), transport.clone()),
            applications: PollingCache::new(resource(ResourceKind::Applications), transport.clone()),
            security: PollingCache::new(resource(ResourceKind::Security), transport.clone()),
            diagnostics: PollingCache::new(resource(ResourceKind::Diagnostics), transport.clone()),
            history: PollingCache::new(resource(ResourceKind::History), transport.clone()),
            health: PollingCache::new(resource(ResourceKind::Health), transport.clone()),
        }
    }

    fn start_all(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.system.start(),
            self.services.start(),
            self.containers.start(),
            self.applications.start(),
            self.security.start(),
            self.diagnostics.start(),
            self.history.start(),
            self.health.start(),
        ]
    }

    fn shutdown_all(&self) {
        self.system.shutdown();
        self.services.shutdown();
        self.containers.shutdown();
        self.applications.shutdown();
        self.security.shutdown();
        self.diagnostics.shutdown();
        self.history.shutdown();
        self.health.shutdown();
    }
}

/// # Dashboard
pub struct Dashboard {
    settings: DashboardSettings,
    caches: Caches,
    points: SharedPoints,
    dispatcher: Arc<Dispatcher>,
    stream: Arc<StreamClient>,
    gateway: Arc<ActionGateway>,
    safe_mode: Arc<SafeModeOrchestrator>,
    registry: Arc<CommandRegistry>,
    notifier: Notifier,
    classifier: RwLock<Arc<dyn RoleClassifier>>,
    shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dashboard {
    /// Builds the dashboard against the configured backend.
    pub fn new(settings: DashboardSettings) -> Arc<Self> {
        let base = settings.endpoints.api_base.clone();
        let polls: Arc<dyn ApiTransport> =
            Arc::new(ApiClient::new(base.clone(), settings.http_timeout, settings.http_retries));
        let actions: Arc<dyn ApiTransport> = Arc::new(ApiClient::new(base, settings.http_timeout, 0));
        Self::with_transports(settings, polls, actions)
    }

    /// Builds the dashboard on explicit transports. Actions must go through a
    /// transport that does not retry.
    pub fn with_transports(
        settings: DashboardSettings,
        polls: Arc<dyn ApiTransport>,
        actions: Arc<dyn ApiTransport>,
    ) -> Arc<Self> {
        let caches = Caches::new(&polls, settings.history_days);
        let notifier = Notifier::new();
        let dispatcher = Arc::new(Dispatcher::new());
        let stream = StreamClient::new(
            settings.endpoints.ws_url.clone(),
            settings.reconnect.clone(),
            dispatcher.clone(),
        );
        let gateway = Arc::new(ActionGateway::new(actions, SafeModeLock::default()));
        let safe_mode = SafeModeOrchestrator::new(
            gateway.clone(),
            caches.services.clone(),
            caches.containers.clone(),
            settings.safe_mode.clone(),
            notifier.clone(),
        );

        Arc::new(Self {
            points: Arc::new(Mutex::new(RollingPointBuffer::new(settings.buffer_capacity))),
            settings,
            caches,
            dispatcher,
            stream,
            gateway,
            safe_mode,
            registry: CommandRegistry::new(),
            notifier,
            classifier: RwLock::new(Arc::new(RegexClassifier::default())),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    // --- Lifecycle ---

    /// Spawns polling, the realtime channel, the reconciler and the registry
    /// updater. Calling it again does nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) || self.shutdown.is_cancelled() {
            return;
        }
        log::info!(
            "Starting dashboard (api: {}, stream: {})",
            self.settings.endpoints.api_base,
            self.settings.endpoints.ws_url
        );

        let mut tasks = self.caches.start_all();

        // Subscribe before connecting so no frame is missed.
        let events = self.dispatcher.subscribe("reconciler");
        let reconciler = Reconciler::new(
            self.caches.system.clone(),
            self.caches.containers.clone(),
            self.points.clone(),
            self.notifier.clone(),
        );
        tasks.push(reconciler.spawn(events, self.shutdown.child_token()));
        tasks.push(self.stream.connect());
        tasks.push(self.registry.spawn_updater(
            self.caches.services.clone(),
            self.caches.containers.clone(),
            self.caches.diagnostics.clone(),
            self.safe_mode.clone(),
            self.shutdown.child_token(),
        ));

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tasks);
    }

    /// Stops everything and waits for the tasks to finish.
    pub async fn shutdown(&self) {
        if self.safe_mode.cancel() {
            log::warn!("Shutting down during a safe-mode run; cancelling it");
            self.safe_mode.wait().await;
        }

        self.shutdown.cancel();
        self.stream.shutdown();
        self.caches.shutdown_all();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                log::error!("Dashboard task ended abnormally: {}", e);
            }
        }
        log::info!("Dashboard stopped");
    }

    // --- State ---

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    /// Chart history, oldest first.
    pub fn points(&self) -> Vec<MetricPoint> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn stream_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn stream(&self) -> &Arc<StreamClient> {
        &self.stream
    }

    pub fn safe_mode(&self) -> &Arc<SafeModeOrchestrator> {
        &self.safe_mode
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Replaces the role classifier used for recommended plans.
    pub fn set_classifier(&self, classifier: Arc<dyn RoleClassifier>) {
        *self.classifier.write().unwrap_or_else(PoisonError::into_inner) = classifier;
    }

    /// Dependency-ordered plan from the latest cached services and containers.
    pub fn recommended_plan(&self) -> Vec<QueueItem> {
        let services = self.caches.services.data();
        let containers = self.caches.containers.data();
        let classifier = self.classifier.read().unwrap_or_else(PoisonError::into_inner);
        recommended_plan(services.as_deref(), containers.as_deref(), classifier.as_ref())
    }

    pub fn commands(&self, query: &str) -> Vec<CommandEntry> {
        self.registry.filter(query)
    }

    // --- Operator actions ---

    /// Manual restart. Refused while a safe-mode run is executing.
    pub async fn restart(&self, item: QueueItem) -> Result<ActionOutcome, ActionError> {
        let result = self.gateway.submit(ActionRequest::restart(&item)).await;
        match &result {
            Ok(outcome) => {
                self.notifier.notify(Notification::success(
                    format!("Restarted {item}"),
                    outcome.message.clone(),
                ));
                match item.kind {
                    ItemKind::Service => self.caches.services.refetch(),
                    ItemKind::Container => self.caches.containers.refetch(),
                }
            }
            Err(e) => self
                .notifier
                .notify(Notification::error(format!("Restart of {item} failed"), e.to_string())),
        }
        result
    }

    pub async fn resolve(&self, issue_id: &str) -> Result<ActionOutcome, ActionError> {
        let result = self
            .gateway
            .submit(ActionRequest::ResolveIssue(issue_id.to_string()))
            .await;
        match &result {
            Ok(outcome) => {
                let mut message = outcome.message.clone();
                if !outcome.actions_taken.is_empty() {
                    message = format!("{} ({})", message, outcome.actions_taken.join("; "));
                }
                self.notifier
                    .notify(Notification::success(format!("Resolved {issue_id}"), message));
                self.caches.diagnostics.refetch();
            }
            Err(e) => self
                .notifier
                .notify(Notification::error(format!("Resolving {issue_id} failed"), e.to_string())),
        }
        result
    }

    /// Executes a command palette action.
    pub async fn execute(&self, action: CommandAction) -> Result<CommandOutcome, CommandError> {
        match action {
            CommandAction::Navigate(target) => Ok(CommandOutcome::Navigate(target)),
            CommandAction::EnterSafeMode => {
                self.safe_mode.open();
                Ok(CommandOutcome::SafeModeOpened)
            }
            CommandAction::ExitSafeMode => {
                self.safe_mode.close()?;
                Ok(CommandOutcome::SafeModeClosed)
            }
            CommandAction::RunRecommendedPlan => {
                let plan = self.recommended_plan();
                self.safe_mode.start(plan.clone())?;
                Ok(CommandOutcome::RunStarted(plan))
            }
            CommandAction::Restart(item) => Ok(CommandOutcome::Action(self.restart(item).await?)),
            CommandAction::Resolve(issue_id) => {
                Ok(CommandOutcome::Action(self.resolve(&issue_id).await?))
            }
        }
    }

    /// Waits until the services and containers caches hold data, or `limit`
    /// elapses. Used by one-shot surfaces that need a plan right away.
    pub async fn wait_for_inventory(&self, limit: Duration) -> bool {
        let mut services = self.caches.services.watch();
        let mut containers = self.caches.containers.watch();
        let ready = async {
            let services_ready = async {
                services.wait_for(|s| s.data.is_some() || s.error.is_some()).await.is_ok()
            };
            let containers_ready = async {
                containers.wait_for(|s| s.data.is_some() || s.error.is_some()).await.is_ok()
            };
            let (a, b) = tokio::join!(services_ready, containers_ready);
            a && b
        };
        tokio::time::timeout(limit, ready).await.unwrap_or(false)
            && self.caches.services.data().is_some()
            && self.caches.containers.data().is_some()
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.safe_mode.cancel();
        self.shutdown.cancel();
        self.stream.shutdown();
        self.caches.shutdown_all();
        log::debug!("Dashboard dropped; background tasks cancelled");
    }
}
