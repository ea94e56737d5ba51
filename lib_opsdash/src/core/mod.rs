//! # Core Orchestration Module
//!
//! The moving parts between the ingestors and the operator.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: zero-copy fan-out of decoded realtime frames to every
//!   subscriber.
//! - **`reconciler`**: the single loop that folds realtime events into the
//!   polling caches and the chart buffer.
//! - **`rolling_buffer`**: bounded, arrival-ordered chart history.
//! - **`notifications`**: transient operator messages.
//! - **`actions`**: the action gateway and the safe-mode restart lock.
//! - **`plan`**: restart plan items and the dependency-ordering heuristic.
//! - **`safe_mode`**: the guided restart state machine.
//! - **`registry`**: the derived command palette.

#![forbid(unsafe_code)]

/// Gateway for operator actions.
pub mod actions;
/// Zero-copy broadcaster for realtime events.
pub mod dispatcher;
/// Operator notification channel.
pub mod notifications;
/// Restart plans and role classification.
pub mod plan;
/// Applies realtime events to the caches.
pub mod reconciler;
/// Derived command palette.
pub mod registry;
/// Bounded chart history.
pub mod rolling_buffer;
/// Guided restart state machine.
pub mod safe_mode;

// --- Public API Re-exports ---
pub use actions::{ActionGateway, ActionOutcome, ActionRequest, SafeModeLock, SafeModePermit};
pub use dispatcher::Dispatcher;
pub use notifications::{Notification, NotificationLevel, Notifier};
pub use plan::{recommended_plan, ItemKind, QueueItem, RegexClassifier, RoleClassifier, ServiceRole};
pub use reconciler::{Reconciler, SharedPoints};
pub use registry::{CommandAction, CommandEntry, CommandGroup, CommandRegistry, NavTarget};
pub use rolling_buffer::{MetricPoint, RollingPointBuffer};
pub use safe_mode::{LogLine, RunStatus, SafeModeOrchestrator, SafeModeRun, SafeModeTimings};
