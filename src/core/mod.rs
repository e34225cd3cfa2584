//! Core data structures for Dockyard.
//!
//! This module contains the foundational types used throughout Dockyard:
//! - Target drafts and resolved target specs
//! - Default filling and name uniquification
//! - Per-path discovery state

pub mod state;
pub mod target;

pub use state::{CommandBinding, KeyBinding, LoadState, PathTargetState, Subscriptions};
pub use target::{
    fill_defaults, uniquify, ErrorMatch, Hooks, MatchFunction, PostBuildHook, PreBuildHook,
    TargetDraft, TargetSpec,
};
