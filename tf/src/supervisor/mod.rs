//! Worker supervisor

pub mod config;
pub mod core;
pub mod messages;
pub mod process;

pub use config::SupervisorConfig;
pub use core::{Supervisor, SupervisorHandle};
pub use messages::SupervisorEvent;
pub use process::ProcessTable;
