//! # Core
//!
//! Process-level plumbing shared by the CLI and the HTTP layer:
//!
//! - [`config`]: layered configuration (defaults → file → env → CLI)
//! - [`logging`]: simplelog setup

pub mod config;
pub mod logging;
