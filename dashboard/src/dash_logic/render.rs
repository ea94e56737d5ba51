//! Plain-text renderings of dashboard state for the log and the terminal.

use colored::Colorize;
use lib_opsdash::core::{CommandEntry, Notification, NotificationLevel, QueueItem, RunStatus};
use lib_opsdash::ingestors::{ConnectionState, ConnectionStatus, ResourceState};
use lib_opsdash::models::containers::ContainersReport;
use lib_opsdash::models::diagnostics::DiagnosticsReport;
use lib_opsdash::models::health::HealthReport;
use lib_opsdash::models::services::ServicesReport;
use lib_opsdash::models::system::SystemSnapshot;

pub fn stream_label(state: &ConnectionState) -> String {
    match state.status {
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Disconnected if state.terminal => "offline".to_string(),
        ConnectionStatus::Disconnected => format!("reconnecting (attempt {})", state.attempt),
    }
}

pub fn system_line(system: &SystemSnapshot) -> String {
    format!(
        "cpu {:.1}% mem {:.1}% disk {:.1}% load {:.2}",
        system.cpu_usage,
        system.memory.percent,
        system.root_disk_percent(),
        system.load_average.load1
    )
}

pub fn services_line(services: &ServicesReport) -> String {
    let running = services
        .services
        .keys()
        .filter(|name| services.is_running(name))
        .count();
    format!("services {}/{}", running, services.services.len())
}

pub fn containers_line(containers: &ContainersReport) -> String {
    let running = containers
        .containers
        .iter()
        .filter(|c| containers.is_running(&c.name))
        .count();
    format!("containers {}/{}", running, containers.containers.len())
}

/// Renders one cached resource, marking errors and stale data.
pub fn resource_part<T>(state: &ResourceState<T>, render: impl Fn(&T) -> String, name: &str) -> String {
    match (&state.data, &state.error) {
        (Some(data), None) => render(data),
        (Some(data), Some(_)) => format!("{} (stale)", render(data)),
        (None, Some(e)) => format!("{name}: {e}"),
        (None, None) => format!("{name}: -"),
    }
}

/// # Summary Line
///
/// One line per tick of the headless dashboard:
/// `cpu 12.0% mem 40.0% disk 55.0% load 0.50 | services 2/2 | containers 1/1 | stream connected | safe-mode idle`
pub fn summary_line(
    system: &ResourceState<SystemSnapshot>,
    services: &ResourceState<ServicesReport>,
    containers: &ResourceState<ContainersReport>,
    stream: &ConnectionState,
    run: RunStatus,
) -> String {
    [
        resource_part(system, system_line, "system"),
        resource_part(services, services_line, "services"),
        resource_part(containers, containers_line, "containers"),
        format!("stream {}", stream_label(stream)),
        format!("safe-mode {run}"),
    ]
    .join(" | ")
}

pub fn notification_line(note: &Notification, colour: bool) -> String {
    let level = note.level.to_string();
    let level = if !colour {
        level
    } else {
        match note.level {
            NotificationLevel::Error => level.red().bold().to_string(),
            NotificationLevel::Warning => level.yellow().to_string(),
            NotificationLevel::Success => level.green().to_string(),
            NotificationLevel::Info => level.cyan().to_string(),
        }
    };
    format!("[{}] {}: {}", level, note.title, note.message)
}

pub fn health_line(health: &HealthReport) -> String {
    let mut line = format!("backend {}", if health.is_healthy() { "healthy" } else { "unhealthy" });
    match health.ssh_connection {
        Some(true) => line.push_str(", host reachable"),
        Some(false) => line.push_str(", host unreachable"),
        None => {}
    }
    if let Some(error) = &health.error {
        line.push_str(&format!(" ({error})"));
    }
    line
}

pub fn diagnostics_lines(report: &DiagnosticsReport) -> Vec<String> {
    let mut lines = vec![format!("health score {}", report.health_score)];
    lines.extend(report.issues.iter().map(|issue| {
        let fix = if issue.can_auto_resolve { " [auto-resolvable]" } else { "" };
        format!("  {:<8} {} ({}){}", issue.severity.to_string(), issue.title, issue.id, fix)
    }));
    lines
}

pub fn plan_lines(plan: &[QueueItem]) -> Vec<String> {
    if plan.is_empty() {
        return vec!["nothing to restart".to_string()];
    }
    plan.iter()
        .enumerate()
        .map(|(i, item)| format!("{:>2}. {}", i + 1, item))
        .collect()
}

pub fn command_line(entry: &CommandEntry) -> String {
    let mut line = format!("{:<36} {:<34} [{}]", entry.id, entry.label, entry.group);
    if !entry.hint.is_empty() {
        line.push_str(&format!(" {}", entry.hint));
    }
    if !entry.enabled {
        line.push_str(" (disabled)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_opsdash::FetchError;
    use std::sync::Arc;

    fn system() -> SystemSnapshot {
        serde_json::from_value(serde_json::json!({
            "cpu_usage": 12.0,
            "memory": {"percent": 40.0},
            "disk": {"/": {"percent": 55.0}},
            "load_average": {"load1": 0.5},
            "timestamp": 1
        }))
        .unwrap()
    }

    #[test]
    fn summary_marks_stale_and_missing_data() {
        let system = ResourceState {
            data: Some(Arc::new(system())),
            error: Some(FetchError::Transport("connection refused".into())),
            ..Default::default()
        };
        let services = ResourceState::<ServicesReport>::default();
        let containers = ResourceState::<ContainersReport> {
            error: Some(FetchError::Status { status: 502, message: "Bad Gateway".into() }),
            ..Default::default()
        };
        let stream = ConnectionState {
            status: ConnectionStatus::Disconnected,
            attempt: 3,
            terminal: false,
        };

        assert_eq!(
            summary_line(&system, &services, &containers, &stream, RunStatus::Idle),
            "cpu 12.0% mem 40.0% disk 55.0% load 0.50 (stale) | services: - | containers: HTTP 502: Bad Gateway | stream reconnecting (attempt 3) | safe-mode idle"
        );
    }

    #[test]
    fn terminal_disconnect_reads_offline() {
        let stream = ConnectionState {
            status: ConnectionStatus::Disconnected,
            attempt: 10,
            terminal: true,
        };
        assert_eq!(stream_label(&stream), "offline");
    }

    #[test]
    fn health_mentions_the_host_link() {
        let health = HealthReport {
            status: "unhealthy".into(),
            ssh_connection: Some(false),
            error: Some("timed out".into()),
            timestamp: 0,
        };
        assert_eq!(health_line(&health), "backend unhealthy, host unreachable (timed out)");
    }

    #[test]
    fn plans_are_numbered() {
        let plan = vec![QueueItem::container("guacamole-db"), QueueItem::service("nginx")];
        assert_eq!(plan_lines(&plan), vec![" 1. container guacamole-db", " 2. service nginx"]);
        assert_eq!(plan_lines(&[]), vec!["nothing to restart"]);
    }

    #[test]
    fn plain_notifications_have_no_escape_codes() {
        let note = Notification::error("Restart of service nginx failed", "Unit not found");
        assert_eq!(
            notification_line(&note, false),
            "[error] Restart of service nginx failed: Unit not found"
        );
    }
}
