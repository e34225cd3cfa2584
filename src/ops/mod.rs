//! High-level operations.
//!
//! This module contains the per-project target bookkeeping behind the
//! `dockyard` commands.

pub mod target_manager;

pub use target_manager::{TargetEvent, TargetManager};
