// Site Monitor - server core
//
// Wires the site-monitor library to configuration from the environment, a
// SQLite store and a recurring monitoring sweep. The `site-monitor` binary
// is a thin CLI over this crate.

pub mod config;
pub mod kernel;

pub use config::*;
