//! # Backend Payload Models
//!
//! Serde models for every `/api/*` response, the action request/response
//! bodies and the realtime stream frames. The backend builds several of these
//! objects best-effort (a failed probe yields `{}`), so most fields default
//! instead of failing the whole payload.

pub mod actions;
pub mod applications;
pub mod containers;
pub mod diagnostics;
pub mod health;
pub mod history;
pub mod security;
pub mod services;
pub mod stream;
pub mod system;

pub use actions::{ActionResponse, ResolveRequest, RestartRequest, SafeModeMode, SafeModeRequest};
pub use applications::{ApplicationInfo, ApplicationsReport};
pub use containers::{ContainerInfo, ContainerState, ContainersReport};
pub use diagnostics::{DiagnosticsReport, Issue, Severity};
pub use health::HealthReport;
pub use history::{HistoryAlert, HistoryMetric, HistoryReport, ServiceEvent, ServiceEventKind};
pub use security::{FailedLogins, FirewallStatus, LoginAttempt, SecurityReport, Session};
pub use services::{ServiceInfo, ServiceStatus, ServicesReport};
pub use stream::{AlertPayload, StreamEvent};
pub use system::{DiskStats, LoadAverage, MemoryStats, NetworkStats, SystemSnapshot};
