//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod process;
pub mod shell;

pub use config::Settings;
pub use diagnostic::{Error, Notice, NoticeLevel, Severity};
pub use shell::{Shell, Status};
