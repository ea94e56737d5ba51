//! # Loggers
//!
//! Process-wide log sinks for the `opsdash` binaries. The library itself only
//! talks to the `log` facade.

/// Console + rotating file dispatcher built on `fern`.
pub mod loggerlocal;

pub use loggerlocal::{parse_level, setup_logging};
