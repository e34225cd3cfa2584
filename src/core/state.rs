//! Per-project discovery and selection state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::target::TargetSpec;
use crate::sources::Provider;
use crate::util::diagnostic::Error;

/// Discovery progress of a project path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
}

/// One invocable command, bound to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBinding {
    pub command: String,
    pub target: String,
}

/// A keystroke bound to a target command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub keystroke: String,
    pub command: String,
}

/// Command and keymap registrations of one path.
///
/// Always replaced as a whole, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    pub commands: Vec<CommandBinding>,
    pub keymaps: Vec<KeyBinding>,
}

impl Subscriptions {
    /// Derive the registrations for a target list.
    pub fn for_targets(targets: &[TargetSpec]) -> Self {
        let commands = targets
            .iter()
            .map(|t| CommandBinding {
                command: t.command_name(),
                target: t.name.clone(),
            })
            .collect();

        let keymaps = targets
            .iter()
            .filter_map(|t| {
                t.keymap.as_ref().map(|keystroke| KeyBinding {
                    keystroke: keystroke.clone(),
                    command: t.command_name(),
                })
            })
            .collect();

        Subscriptions { commands, keymaps }
    }

    /// Target bound to a command.
    pub fn target_for(&self, command: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|b| b.command == command)
            .map(|b| b.target.as_str())
    }
}

/// Discovery state of one project path.
pub struct PathTargetState {
    path: PathBuf,
    pub load_state: LoadState,
    pub targets: Vec<TargetSpec>,
    pub active_target: Option<String>,
    pub providers: Vec<Arc<dyn Provider>>,
    pub subscriptions: Subscriptions,
    /// Bumped by every refresh start; only the latest refresh may commit
    pub generation: u64,
    /// Whether any refresh ever completed
    pub refreshed: bool,
    /// Error of the last committed refresh that blocks building this path
    pub load_error: Option<Error>,
}

impl PathTargetState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PathTargetState {
            path: path.into(),
            load_state: LoadState::Idle,
            targets: Vec::new(),
            active_target: None,
            providers: Vec::new(),
            subscriptions: Subscriptions::default(),
            generation: 0,
            refreshed: false,
            load_error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find a target by name.
    pub fn find(&self, name: &str) -> Option<&TargetSpec> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// The active target, if it still exists.
    pub fn active(&self) -> Option<&TargetSpec> {
        self.active_target
            .as_deref()
            .and_then(|name| self.find(name))
    }

    /// Install a new target list.
    ///
    /// The active target falls back to the first target when it disappeared,
    /// and the subscriptions are rebuilt in one go.
    pub fn install(&mut self, targets: Vec<TargetSpec>, providers: Vec<Arc<dyn Provider>>) {
        let still_there = self
            .active_target
            .as_deref()
            .is_some_and(|name| targets.iter().any(|t| t.name == name));
        if !still_there {
            self.active_target = targets.first().map(|t| t.name.clone());
        }

        self.subscriptions = Subscriptions::for_targets(&targets);
        self.targets = targets;
        self.providers = providers;
        self.load_state = LoadState::Ready;
        self.refreshed = true;
    }

    /// Stop listening to every provider of this path.
    pub fn unwatch_providers(&self) {
        for provider in &self.providers {
            provider.unwatch();
        }
    }
}

impl std::fmt::Debug for PathTargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTargetState")
            .field("path", &self.path)
            .field("load_state", &self.load_state)
            .field("targets", &self.targets.len())
            .field("active_target", &self.active_target)
            .field("providers", &self.providers.len())
            .field("generation", &self.generation)
            .field("load_error", &self.load_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{fill_defaults, TargetDraft};

    fn target(name: &str) -> TargetSpec {
        fill_defaults(Path::new("/p"), TargetDraft::new("make").name(name))
    }

    #[test]
    fn test_install_selects_first_target() {
        let mut state = PathTargetState::new("/p");
        assert_eq!(state.load_state, LoadState::Idle);

        state.install(vec![target("a"), target("b")], Vec::new());
        assert_eq!(state.load_state, LoadState::Ready);
        assert!(state.refreshed);
        assert_eq!(state.active().unwrap().name, "a");
    }

    #[test]
    fn test_install_keeps_surviving_active_target() {
        let mut state = PathTargetState::new("/p");
        state.install(vec![target("a"), target("b")], Vec::new());
        state.active_target = Some("b".into());

        state.install(vec![target("c"), target("b")], Vec::new());
        assert_eq!(state.active_target.as_deref(), Some("b"));

        state.install(vec![target("c")], Vec::new());
        assert_eq!(state.active_target.as_deref(), Some("c"));

        state.install(Vec::new(), Vec::new());
        assert!(state.active().is_none());
    }

    #[test]
    fn test_subscriptions_only_bind_declared_keymaps() {
        let with_key = fill_defaults(
            Path::new("/p"),
            TargetDraft::new("make").name("k").keymap("ctrl-k"),
        );
        let subs = Subscriptions::for_targets(&[target("a"), with_key]);

        assert_eq!(subs.commands.len(), 2);
        assert_eq!(subs.keymaps.len(), 1);
        assert_eq!(subs.keymaps[0].command, "dockyard:trigger:k");
        assert_eq!(subs.target_for("dockyard:trigger:a"), Some("a"));
        assert_eq!(subs.target_for("dockyard:trigger:z"), None);
    }
}
