//! The simulation daemon: global configuration, the discrete-event kernel,
//! and the workload schedule driver.
//!
//! The kernel owns every node and the single event queue. Nodes never hold
//! references to each other; connections are integer ids resolved through
//! the kernel's gate table, and all cross-node effects travel as queued
//! events.

pub mod config;
pub mod kernel;
pub mod schedule;

pub use config::Config;
pub use kernel::Simulation;
