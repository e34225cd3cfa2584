//! Command implementations

pub mod build;
pub mod completions;
pub mod select;
pub mod targets;
pub mod watch;
