//! Running builds.
//!
//! [`BuildController`] owns the build lifecycle for the active target of the
//! active project path. The host side (panel, editor, prompts, linter) is
//! reached through the traits in [`events`] and [`host`].

pub mod controller;
pub mod events;
pub mod host;
pub mod placeholder;

pub use controller::{BuildController, BuildState};
pub use events::{BuildEvent, GotoCallback, Presenter};
pub use host::{Action, Cursor, Linter, Prompter, TargetChoice, Workspace};
pub use placeholder::PlaceholderContext;
