//! # Restart Plan
//!
//! A plan is an ordered list of [`QueueItem`]s executed one by one by the
//! safe-mode orchestrator. Duplicates are allowed and run independently.
//!
//! [`recommended_plan`] encodes "restart dependencies before dependents":
//!
//! 1. database-like services,
//! 2. cache-like services,
//! 3. containers, by ascending rank (db/cache 1-2, backend/api 3,
//!    frontend/web/proxy 4, anything else 5; ties keep report order),
//! 4. edge / reverse-proxy services last.
//!
//! Services with no recognised role are left out. Role inference sits behind
//! the [`RoleClassifier`] trait so the matching rules can be replaced without
//! touching the sequencing.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::containers::ContainersReport;
use crate::models::services::ServicesReport;

/// What a plan step restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Service,
    Container,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Service => "service",
            ItemKind::Container => "container",
        })
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" | "svc" => Ok(ItemKind::Service),
            "container" | "ctr" => Ok(ItemKind::Container),
            other => Err(format!("unknown item kind '{other}' (expected service or container)")),
        }
    }
}

/// One planned restart step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItem {
    pub kind: ItemKind,
    pub name: String,
}

impl QueueItem {
    pub fn service(name: impl Into<String>) -> Self {
        Self { kind: ItemKind::Service, name: name.into() }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self { kind: ItemKind::Container, name: name.into() }
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Parses `kind:name`, e.g. `container:guacamole-db`.
impl FromStr for QueueItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<name>, got '{s}'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing name in '{s}'"));
        }
        Ok(Self { kind: kind.parse()?, name: name.to_string() })
    }
}

/// Role of a host service in the dependency ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Database,
    Cache,
    Edge,
    Other,
}

/// Infers ordering roles from names.
pub trait RoleClassifier: Send + Sync {
    fn service_role(&self, name: &str) -> ServiceRole;

    /// Lower ranks restart first.
    fn container_rank(&self, name: &str) -> u8;
}

/// Name-pattern classifier used by default.
#[derive(Debug, Clone)]
pub struct RegexClassifier {
    database: Regex,
    cache: Regex,
    backend: Regex,
    frontend: Regex,
    edge: Regex,
}

impl RegexClassifier {
    /// Builds a classifier from custom patterns.
    ///
    /// # Errors
    /// Fails if any pattern is not a valid regex.
    pub fn new(
        database: &str,
        cache: &str,
        backend: &str,
        frontend: &str,
        edge: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            database: Regex::new(database)?,
            cache: Regex::new(cache)?,
            backend: Regex::new(backend)?,
            frontend: Regex::new(frontend)?,
            edge: Regex::new(edge)?,
        })
    }
}

impl Default for RegexClassifier {
    fn default() -> Self {
        // Literal patterns; covered by the tests below.
        Self::new(
            r"(?i)(postgres|mysql|maria|mongo|sql|database|[-_.]db\b|^db)",
            r"(?i)(redis|memcache|valkey|cache)",
            r"(?i)(backend|api)",
            r"(?i)(frontend|web|proxy|ui\b)",
            r"(?i)^(nginx|apache2?|httpd|caddy|traefik|haproxy|envoy)$",
        )
        .unwrap_or_else(|e| unreachable!("built-in role patterns are valid: {e}"))
    }
}

impl RoleClassifier for RegexClassifier {
    fn service_role(&self, name: &str) -> ServiceRole {
        if self.database.is_match(name) {
            ServiceRole::Database
        } else if self.cache.is_match(name) {
            ServiceRole::Cache
        } else if self.edge.is_match(name) {
            ServiceRole::Edge
        } else {
            ServiceRole::Other
        }
    }

    fn container_rank(&self, name: &str) -> u8 {
        if self.database.is_match(name) {
            1
        } else if self.cache.is_match(name) {
            2
        } else if self.backend.is_match(name) {
            3
        } else if self.frontend.is_match(name) {
            4
        } else {
            5
        }
    }
}

/// Builds the dependency-ordered plan from cache snapshots.
///
/// Pure: the caller passes the snapshots it wants the plan to reflect.
pub fn recommended_plan(
    services: Option<&ServicesReport>,
    containers: Option<&ContainersReport>,
    classifier: &dyn RoleClassifier,
) -> Vec<QueueItem> {
    let mut databases = Vec::new();
    let mut caches = Vec::new();
    let mut edges = Vec::new();

    if let Some(report) = services {
        // BTreeMap iteration keeps each group in name order.
        for name in report.services.keys() {
            match classifier.service_role(name) {
                ServiceRole::Database => databases.push(QueueItem::service(name.clone())),
                ServiceRole::Cache => caches.push(QueueItem::service(name.clone())),
                ServiceRole::Edge => edges.push(QueueItem::service(name.clone())),
                ServiceRole::Other => {}
            }
        }
    }

    let mut ranked: Vec<(u8, QueueItem)> = containers
        .map(|report| {
            report
                .containers
                .iter()
                .filter(|c| !c.name.is_empty())
                .map(|c| (classifier.container_rank(&c.name), QueueItem::container(c.name.clone())))
                .collect()
        })
        .unwrap_or_default();
    ranked.sort_by_key(|(rank, _)| *rank);

    databases
        .into_iter()
        .chain(caches)
        .chain(ranked.into_iter().map(|(_, item)| item))
        .chain(edges)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::containers::ContainerInfo;
    use crate::models::services::ServiceInfo;

    fn services(names: &[&str]) -> ServicesReport {
        ServicesReport {
            services: names
                .iter()
                .map(|n| (n.to_string(), ServiceInfo { service: n.to_string(), ..Default::default() }))
                .collect(),
            ..Default::default()
        }
    }

    fn containers(names: &[&str]) -> ContainersReport {
        ContainersReport {
            containers: names
                .iter()
                .map(|n| ContainerInfo { name: n.to_string(), ..Default::default() })
                .collect(),
            ..Default::default()
        }
    }

    fn names(plan: &[QueueItem]) -> Vec<&str> {
        plan.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn dependencies_restart_before_dependents() {
        let plan = recommended_plan(
            Some(&services(&["postgresql", "redis-server", "nginx"])),
            Some(&containers(&["app-backend", "app-frontend"])),
            &RegexClassifier::default(),
        );

        assert_eq!(
            names(&plan),
            vec!["postgresql", "redis-server", "app-backend", "app-frontend", "nginx"]
        );
        assert_eq!(plan[0].kind, ItemKind::Service);
        assert_eq!(plan[2].kind, ItemKind::Container);
        assert_eq!(plan[4].kind, ItemKind::Service);
    }

    #[test]
    fn containers_are_ranked_stably() {
        let plan = recommended_plan(
            None,
            Some(&containers(&["worker", "cbl-web", "cbl-api", "guacamole-db", "guacd", "redis-cache", "cbl-mobile"])),
            &RegexClassifier::default(),
        );
        assert_eq!(
            names(&plan),
            vec!["guacamole-db", "redis-cache", "cbl-api", "cbl-web", "worker", "guacd", "cbl-mobile"]
        );
    }

    #[test]
    fn unrelated_services_are_left_out() {
        let plan = recommended_plan(
            Some(&services(&["ssh", "docker", "mysql"])),
            None,
            &RegexClassifier::default(),
        );
        assert_eq!(names(&plan), vec!["mysql"]);
    }

    #[test]
    fn empty_snapshots_give_an_empty_plan() {
        assert!(recommended_plan(None, None, &RegexClassifier::default()).is_empty());
    }

    #[test]
    fn classifier_is_pluggable() {
        struct EverythingIsEdge;
        impl RoleClassifier for EverythingIsEdge {
            fn service_role(&self, _: &str) -> ServiceRole {
                ServiceRole::Edge
            }
            fn container_rank(&self, name: &str) -> u8 {
                if name.starts_with('z') { 0 } else { 9 }
            }
        }

        let plan = recommended_plan(
            Some(&services(&["postgresql"])),
            Some(&containers(&["a", "zeta"])),
            &EverythingIsEdge,
        );
        assert_eq!(names(&plan), vec!["zeta", "a", "postgresql"]);
    }

    #[test]
    fn parses_cli_items() {
        assert_eq!("container:guacamole-db".parse::<QueueItem>().unwrap(), QueueItem::container("guacamole-db"));
        assert_eq!("Service: nginx".parse::<QueueItem>().unwrap(), QueueItem::service("nginx"));
        assert!("nginx".parse::<QueueItem>().is_err());
        assert!("vm:foo".parse::<QueueItem>().is_err());
        assert!("service:".parse::<QueueItem>().is_err());
    }
}
