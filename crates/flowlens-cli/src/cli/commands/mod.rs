//! CLI command handlers.

pub mod classify;
pub mod config;
pub mod replay;
mod summary;
pub mod template;
pub mod watch;
