//! # Configuration Modules
//!
//! Resolved, validated settings consumed by the library. Binaries own the
//! sourcing (defaults, config file, environment, CLI) and hand the result to
//! `DashboardSettings`.

/// Dashboard settings and endpoint resolution.
pub mod config_dashboard;
