#![forbid(unsafe_code)]

//! Filesystem task queue for cooperating draft and execution agents.

pub mod audit;
pub mod config;
pub mod errors;
pub mod intake;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod status_log;
pub mod vault;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
