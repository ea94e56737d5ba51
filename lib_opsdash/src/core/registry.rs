//! # Command Registry
//!
//! The command palette: a flat, derived list of everything the operator can do
//! right now. It is rebuilt whenever the services, containers or diagnostics
//! caches or the safe-mode state change, and is never edited in place.
//!
//! Groups, in order:
//!
//! - navigation targets (fixed),
//! - safe-mode controls (depend on whether safe mode is active),
//! - one restart entry per known service and per known container (disabled
//!   while a safe-mode run is executing),
//! - one resolve entry per reported issue, whether or not the backend flags it
//!   as auto-resolvable.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::plan::QueueItem;
use crate::core::safe_mode::{RunStatus, SafeModeOrchestrator};
use crate::ingestors::polling::PollingCache;
use crate::models::containers::ContainersReport;
use crate::models::diagnostics::DiagnosticsReport;
use crate::models::services::ServicesReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavTarget {
    Overview,
    System,
    Services,
    Containers,
    Applications,
    Security,
    Diagnostics,
    History,
    SafeMode,
}

impl NavTarget {
    pub const ALL: [NavTarget; 9] = [
        NavTarget::Overview,
        NavTarget::System,
        NavTarget::Services,
        NavTarget::Containers,
        NavTarget::Applications,
        NavTarget::Security,
        NavTarget::Diagnostics,
        NavTarget::History,
        NavTarget::SafeMode,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            NavTarget::Overview => "overview",
            NavTarget::System => "system",
            NavTarget::Services => "services",
            NavTarget::Containers => "containers",
            NavTarget::Applications => "applications",
            NavTarget::Security => "security",
            NavTarget::Diagnostics => "diagnostics",
            NavTarget::History => "history",
            NavTarget::SafeMode => "safe-mode",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NavTarget::Overview => "Overview",
            NavTarget::System => "System metrics",
            NavTarget::Services => "Services",
            NavTarget::Containers => "Containers",
            NavTarget::Applications => "Applications",
            NavTarget::Security => "Security",
            NavTarget::Diagnostics => "Diagnostics",
            NavTarget::History => "History",
            NavTarget::SafeMode => "Safe mode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandGroup {
    Navigation,
    SafeMode,
    Services,
    Containers,
    Issues,
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandGroup::Navigation => "Navigation",
            CommandGroup::SafeMode => "Safe mode",
            CommandGroup::Services => "Services",
            CommandGroup::Containers => "Containers",
            CommandGroup::Issues => "Issues",
        })
    }
}

/// What executing an entry does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Navigate(NavTarget),
    EnterSafeMode,
    ExitSafeMode,
    RunRecommendedPlan,
    Restart(QueueItem),
    Resolve(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    /// Stable id, e.g. `nav:services` or `restart-container:web`.
    pub id: String,
    pub label: String,
    pub hint: String,
    pub group: CommandGroup,
    pub action: CommandAction,
    pub enabled: bool,
}

impl CommandEntry {
    fn new(
        id: String,
        label: String,
        hint: String,
        group: CommandGroup,
        action: CommandAction,
    ) -> Self {
        Self { id, label, hint, group, action, enabled: true }
    }

    /// Case-insensitive substring match on label or hint.
    /// An empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.label.to_lowercase().contains(&query)
            || self.hint.to_lowercase().contains(&query)
    }
}

/// Everything the registry is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryInputs<'a> {
    pub services: Option<&'a ServicesReport>,
    pub containers: Option<&'a ContainersReport>,
    pub diagnostics: Option<&'a DiagnosticsReport>,
    pub safe_mode_active: bool,
    pub run_status: RunStatus,
}

/// Builds the full command list.
pub fn build_commands(inputs: RegistryInputs<'_>) -> Vec<CommandEntry> {
    let mut entries: Vec<CommandEntry> = NavTarget::ALL
        .iter()
        .map(|target| {
            CommandEntry::new(
                format!("nav:{}", target.id()),
                format!("Go to {}", target.label()),
                target.id().to_string(),
                CommandGroup::Navigation,
                CommandAction::Navigate(*target),
            )
        })
        .collect();

    // --- Safe-mode controls ---
    if inputs.safe_mode_active {
        let mut exit = CommandEntry::new(
            "safe-mode:exit".into(),
            "Exit safe mode".into(),
            "leave guided restart mode".into(),
            CommandGroup::SafeMode,
            CommandAction::ExitSafeMode,
        );
        exit.enabled = inputs.run_status != RunStatus::Running;
        entries.push(exit);
    } else {
        entries.push(CommandEntry::new(
            "safe-mode:enter".into(),
            "Enter safe mode".into(),
            "guided dependency-ordered restarts".into(),
            CommandGroup::SafeMode,
            CommandAction::EnterSafeMode,
        ));
        entries.push(CommandEntry::new(
            "safe-mode:run-recommended".into(),
            "Run recommended restart plan".into(),
            "databases, caches, containers, then edge services".into(),
            CommandGroup::SafeMode,
            CommandAction::RunRecommendedPlan,
        ));
    }

    // --- Restarts ---
    let restarts_enabled = inputs.run_status != RunStatus::Running;
    if let Some(report) = inputs.services {
        for (name, info) in &report.services {
            let mut entry = CommandEntry::new(
                format!("restart-service:{name}"),
                format!("Restart service {name}"),
                format!("service {name} ({})", info.status),
                CommandGroup::Services,
                CommandAction::Restart(QueueItem::service(name.clone())),
            );
            entry.enabled = restarts_enabled;
            entries.push(entry);
        }
    }
    if let Some(report) = inputs.containers {
        for container in report.containers.iter().filter(|c| !c.name.is_empty()) {
            let mut entry = CommandEntry::new(
                format!("restart-container:{}", container.name),
                format!("Restart container {}", container.name),
                format!("container {} {}", container.image, container.status),
                CommandGroup::Containers,
                CommandAction::Restart(QueueItem::container(container.name.clone())),
            );
            entry.enabled = restarts_enabled;
            entries.push(entry);
        }
    }

    // --- Issues ---
    if let Some(report) = inputs.diagnostics {
        for issue in &report.issues {
            let hint = if issue.can_auto_resolve {
                format!("{} {} issue", issue.severity, issue.category)
            } else {
                format!("{} {} issue (manual resolution suggested)", issue.severity, issue.category)
            };
            entries.push(CommandEntry::new(
                format!("resolve:{}", issue.id),
                format!("Resolve: {}", issue.title),
                hint,
                CommandGroup::Issues,
                CommandAction::Resolve(issue.id.clone()),
            ));
        }
    }

    entries
}

/// # Command Registry
///
/// Holds the latest derived command list.
pub struct CommandRegistry {
    entries: watch::Sender<Arc<Vec<CommandEntry>>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let (entries, _) = watch::channel(Arc::new(build_commands(RegistryInputs::default())));
        Self { entries }
    }
}

impl CommandRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Arc<Vec<CommandEntry>> {
        self.entries.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Vec<CommandEntry>>> {
        self.entries.subscribe()
    }

    pub fn get(&self, id: &str) -> Option<CommandEntry> {
        self.entries.borrow().iter().find(|e| e.id == id).cloned()
    }

    /// Entries matching `query`, in registry order.
    pub fn filter(&self, query: &str) -> Vec<CommandEntry> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.matches(query))
            .cloned()
            .collect()
    }

    /// Replaces the list with one derived from `inputs`.
    pub fn rebuild(&self, inputs: RegistryInputs<'_>) {
        let entries = build_commands(inputs);
        self.entries.send_if_modified(|current| {
            if **current == entries {
                return false;
            }
            *current = Arc::new(entries);
            true
        });
    }

    /// # Spawn Updater
    ///
    /// Keeps the list in sync with the caches and the safe-mode state until
    /// `shutdown` fires.
    pub fn spawn_updater(
        self: &Arc<Self>,
        services: Arc<PollingCache<ServicesReport>>,
        containers: Arc<PollingCache<ContainersReport>>,
        diagnostics: Arc<PollingCache<DiagnosticsReport>>,
        safe_mode: Arc<SafeModeOrchestrator>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut services_rx = services.watch();
        let mut containers_rx = containers.watch();
        let mut diagnostics_rx = diagnostics.watch();
        let mut active_rx = safe_mode.watch_active();
        let mut run_rx = safe_mode.watch_run();

        tokio::spawn(async move {
            loop {
                let services = services_rx.borrow_and_update().data.clone();
                let containers = containers_rx.borrow_and_update().data.clone();
                let diagnostics = diagnostics_rx.borrow_and_update().data.clone();
                let safe_mode_active = *active_rx.borrow_and_update();
                let run_status = run_rx.borrow_and_update().status;

                registry.rebuild(RegistryInputs {
                    services: services.as_deref(),
                    containers: containers.as_deref(),
                    diagnostics: diagnostics.as_deref(),
                    safe_mode_active,
                    run_status,
                });

                let changed = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    r = services_rx.changed() => r,
                    r = containers_rx.changed() => r,
                    r = diagnostics_rx.changed() => r,
                    r = active_rx.changed() => r,
                    r = run_rx.changed() => r,
                };
                if changed.is_err() {
                    break;
                }
            }
            log::debug!("Command registry updater stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::containers::ContainerInfo;
    use crate::models::diagnostics::{Issue, Severity};
    use crate::models::services::{ServiceInfo, ServiceStatus};

    fn services() -> ServicesReport {
        ServicesReport {
            services: [("nginx", ServiceStatus::Running), ("postgresql", ServiceStatus::Stopped)]
                .into_iter()
                .map(|(n, status)| (n.to_string(), ServiceInfo { service: n.into(), status, ..Default::default() }))
                .collect(),
            ..Default::default()
        }
    }

    fn containers() -> ContainersReport {
        ContainersReport {
            containers: vec![ContainerInfo {
                name: "guacamole-db".into(),
                image: "postgres:15".into(),
                status: "Up 3 hours".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn diagnostics() -> DiagnosticsReport {
        DiagnosticsReport {
            issues: vec![
                Issue {
                    id: "disk_space_root".into(),
                    severity: Severity::Critical,
                    category: "disk".into(),
                    title: "Root disk almost full".into(),
                    can_auto_resolve: true,
                    ..Default::default()
                },
                Issue {
                    id: "ssh_root_login".into(),
                    severity: Severity::Warning,
                    category: "security".into(),
                    title: "Root SSH login enabled".into(),
                    can_auto_resolve: false,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn ids(entries: &[CommandEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn builds_every_group() {
        let (s, c, d) = (services(), containers(), diagnostics());
        let entries = build_commands(RegistryInputs {
            services: Some(&s),
            containers: Some(&c),
            diagnostics: Some(&d),
            ..Default::default()
        });

        assert_eq!(entries.iter().filter(|e| e.group == CommandGroup::Navigation).count(), 9);
        assert_eq!(
            ids(&entries[9..]),
            vec![
                "safe-mode:enter",
                "safe-mode:run-recommended",
                "restart-service:nginx",
                "restart-service:postgresql",
                "restart-container:guacamole-db",
                "resolve:disk_space_root",
                "resolve:ssh_root_login",
            ]
        );
        assert!(entries.iter().all(|e| e.enabled));

        let hints: Vec<&str> = entries
            .iter()
            .filter(|e| e.group == CommandGroup::Services)
            .map(|e| e.hint.as_str())
            .collect();
        assert_eq!(hints, vec!["service nginx (running)", "service postgresql (stopped)"]);
    }

    #[test]
    fn safe_mode_controls_follow_the_active_flag() {
        let s = services();
        let active = build_commands(RegistryInputs {
            services: Some(&s),
            safe_mode_active: true,
            run_status: RunStatus::Running,
            ..Default::default()
        });
        let controls: Vec<_> = active.iter().filter(|e| e.group == CommandGroup::SafeMode).collect();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].action, CommandAction::ExitSafeMode);
        assert!(!controls[0].enabled);

        let restarts: Vec<_> = active.iter().filter(|e| matches!(e.action, CommandAction::Restart(_))).collect();
        assert_eq!(restarts.len(), 2);
        assert!(restarts.iter().all(|e| !e.enabled));
    }

    #[test]
    fn filter_matches_label_or_hint_case_insensitively() {
        let registry = CommandRegistry::new();
        let (s, c, d) = (services(), containers(), diagnostics());
        registry.rebuild(RegistryInputs {
            services: Some(&s),
            containers: Some(&c),
            diagnostics: Some(&d),
            ..Default::default()
        });

        assert_eq!(ids(&registry.filter("GUACAMOLE")), vec!["restart-container:guacamole-db"]);
        // Hint-only match: the image name.
        assert_eq!(ids(&registry.filter("postgres:15")), vec!["restart-container:guacamole-db"]);
        assert_eq!(ids(&registry.filter("root")), vec!["resolve:disk_space_root", "resolve:ssh_root_login"]);
        assert_eq!(registry.filter("").len(), registry.entries().len());
        assert!(registry.filter("no such thing").is_empty());
        assert_eq!(
            registry.get("nav:safe-mode").map(|e| e.action),
            Some(CommandAction::Navigate(NavTarget::SafeMode))
        );
    }

    #[test]
    fn rebuild_only_notifies_on_change() {
        let registry = CommandRegistry::new();
        let mut rx = registry.watch();
        rx.borrow_and_update();

        registry.rebuild(RegistryInputs::default());
        assert!(!rx.has_changed().unwrap());

        registry.rebuild(RegistryInputs { safe_mode_active: true, ..Default::default() });
        assert!(rx.has_changed().unwrap());
    }
}
