//! Configuration and text rendering shared by the `opsdash` and `opsctl`
//! binaries.

pub mod dash_logic;
