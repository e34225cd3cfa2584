//! Host collaborators: the workspace, the prompter and the linter.
//!
//! These are the seams between the build engine and whatever embeds it
//! (an editor, the `dockyard` binary, or test fakes).

use std::path::{Path, PathBuf};

use anyhow::Result;
use futures::future::BoxFuture;

use crate::matcher::LintMessage;

/// Zero-argument actions a host can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    TriggerBuild,
    StopBuild,
    ConfirmSave,
    CancelSave,
    ErrorMatchNext,
    ErrorMatchFirst,
    RefreshTargets,
    SelectActiveTarget,
    TogglePanel,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 9] = [
        Action::TriggerBuild,
        Action::StopBuild,
        Action::ConfirmSave,
        Action::CancelSave,
        Action::ErrorMatchNext,
        Action::ErrorMatchFirst,
        Action::RefreshTargets,
        Action::SelectActiveTarget,
        Action::TogglePanel,
    ];

    /// Command name of the action.
    pub fn command(&self) -> &'static str {
        match self {
            Action::TriggerBuild => "dockyard:trigger",
            Action::StopBuild => "dockyard:stop",
            Action::ConfirmSave => "dockyard:confirm",
            Action::CancelSave => "dockyard:no-confirm",
            Action::ErrorMatchNext => "dockyard:error-match",
            Action::ErrorMatchFirst => "dockyard:error-match-first",
            Action::RefreshTargets => "dockyard:refresh-targets",
            Action::SelectActiveTarget => "dockyard:select-active-target",
            Action::TogglePanel => "dockyard:toggle-panel",
        }
    }

    /// Look an action up by command name.
    pub fn from_command(command: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.command() == command)
    }
}

/// A zero-based position in a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub row: u32,
    pub column: u32,
}

/// The editing environment a build runs in.
pub trait Workspace: Send + Sync {
    /// Project roots, in priority order.
    fn project_paths(&self) -> Vec<PathBuf>;

    /// Path of the file being edited, if any.
    fn active_file(&self) -> Option<PathBuf>;

    /// Currently selected text of the active file.
    fn selection(&self) -> Option<String> {
        None
    }

    /// Cursor position in the active file.
    fn cursor(&self) -> Option<Cursor> {
        None
    }

    /// Whether any open buffer has unsaved modifications.
    fn has_unsaved_changes(&self) -> bool {
        false
    }

    /// Save every modified buffer.
    fn save_all(&self) -> Result<()> {
        Ok(())
    }

    /// Open `path` with the cursor at the zero-based `row` and `column`.
    fn open_file(&self, path: &Path, row: u32, column: u32) -> Result<()>;

    /// The project path builds run against: the one containing the active
    /// file, otherwise the first one.
    fn active_project_path(&self) -> Option<PathBuf> {
        let paths = self.project_paths();
        self.active_file()
            .and_then(|file| paths.iter().find(|p| file.starts_with(p)).cloned())
            .or_else(|| paths.into_iter().next())
    }
}

/// One entry of a target selection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetChoice {
    pub name: String,
    pub active: bool,
}

/// Asks the user things.
pub trait Prompter: Send + Sync {
    /// Ask whether unsaved buffers should be saved before building.
    ///
    /// Resolves to `true` to save and build, `false` to cancel.
    fn confirm_save(&self) -> BoxFuture<'_, bool>;

    /// Offer a target list. Resolves to the chosen name, or `None` when the
    /// selection was cancelled.
    fn select_target(&self, choices: Vec<TargetChoice>) -> BoxFuture<'_, Option<String>>;
}

/// Receives structured diagnostics per file.
pub trait Linter: Send + Sync {
    /// Drop every message.
    fn clear(&self);

    /// Replace the messages of one file.
    fn set_messages(&self, file: &Path, messages: Vec<LintMessage>);
}
