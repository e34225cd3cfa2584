//! Dockyard - build target discovery and build orchestration
//!
//! This crate provides the engine behind the `dockyard` binary and editor
//! hosts: target providers, the per-project [`TargetManager`], the
//! [`BuildController`] running the active target, and the [`ErrorMatcher`]
//! turning build output into navigable locations.

pub mod builder;
pub mod core;
pub mod matcher;
pub mod ops;
pub mod sources;
pub mod util;

/// Recording fakes for the host traits and a scripted provider.
///
/// This module is only available when running unit tests.
#[cfg(test)]
pub mod test_support;

pub use builder::{Action, BuildController, BuildEvent, BuildState, Linter, Presenter, Prompter, Workspace};
pub use core::{TargetDraft, TargetSpec};
pub use matcher::{ErrorMatcher, Match, MatchSpec};
pub use ops::{TargetEvent, TargetManager};
pub use sources::{Provider, ProviderFactory, ProviderRegistry};
pub use util::{Error, Notice, Settings, Severity};
