//! Test utilities and fakes for Dockyard unit tests.
//!
//! Every collaborator the engine talks to has a recording fake here, so
//! tests can drive the engine and assert on what it asked for.
//!
//! # Example
//!
//! ```rust,ignore
//! use dockyard::test_support::{FakeWorkspace, RecordingPresenter};
//!
//! let presenter = Arc::new(RecordingPresenter::default());
//! let workspace = Arc::new(FakeWorkspace::with_paths(["/proj"]));
//! let matcher = ErrorMatcher::new(presenter.clone(), workspace.clone());
//! // ...
//! assert_eq!(workspace.opened().len(), 1);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Notify;

use crate::builder::events::{GotoCallback, Presenter};
use crate::builder::host::{Cursor, Linter, Prompter, TargetChoice, Workspace};
use crate::matcher::LintMessage;
use crate::sources::provider::{DraftSet, Provider, ProviderFactory, RefreshNotifier};
use crate::util::diagnostic::{Notice, Severity};

/// One call received by a [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Append(String),
    BuildStarted,
    BuildFinished(bool),
    BuildAbortInitiated,
    BuildAborted,
    Notify(Notice),
    AnnotatedOutput(String),
    ScrollToMatch(usize, Severity),
    Reset,
    Hide,
    Toggle,
}

/// Presenter that records every call.
#[derive(Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<PresenterCall>>,
    goto: Mutex<Option<GotoCallback>>,
}

impl RecordingPresenter {
    fn record(&self, call: PresenterCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than output chunks and notices.
    pub fn lifecycle(&self) -> Vec<PresenterCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, PresenterCall::Append(_) | PresenterCall::Notify(_)))
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// All output chunks, concatenated.
    pub fn output(&self) -> String {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::Append(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Most recent annotated output.
    pub fn annotated(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|c| match c {
            PresenterCall::AnnotatedOutput(html) => Some(html),
            _ => None,
        })
    }

    /// Every `build_finished` result, in order.
    pub fn finished(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::BuildFinished(success) => Some(success),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &PresenterCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Follow an anchor of the annotated output.
    pub fn click(&self, id: usize) {
        let goto = self.goto.lock().unwrap().clone();
        if let Some(goto) = goto {
            goto(id);
        }
    }
}

impl Presenter for RecordingPresenter {
    fn append(&self, text: &str) {
        self.record(PresenterCall::Append(text.to_string()));
    }

    fn build_started(&self) {
        self.record(PresenterCall::BuildStarted);
    }

    fn build_finished(&self, success: bool) {
        self.record(PresenterCall::BuildFinished(success));
    }

    fn build_abort_initiated(&self) {
        self.record(PresenterCall::BuildAbortInitiated);
    }

    fn build_aborted(&self) {
        self.record(PresenterCall::BuildAborted);
    }

    fn notify(&self, notice: &Notice) {
        self.record(PresenterCall::Notify(notice.clone()));
    }

    fn replace_annotated_output(&self, html: &str, goto: GotoCallback) {
        *self.goto.lock().unwrap() = Some(goto);
        self.record(PresenterCall::AnnotatedOutput(html.to_string()));
    }

    fn scroll_to_match(&self, id: usize, severity: Severity) {
        self.record(PresenterCall::ScrollToMatch(id, severity));
    }

    fn reset(&self) {
        self.record(PresenterCall::Reset);
    }

    fn hide(&self) {
        self.record(PresenterCall::Hide);
    }

    fn toggle(&self) {
        self.record(PresenterCall::Toggle);
    }
}

/// Workspace with settable state that records open requests.
#[derive(Default)]
pub struct FakeWorkspace {
    paths: Mutex<Vec<PathBuf>>,
    active: Mutex<Option<PathBuf>>,
    selection: Mutex<Option<String>>,
    cursor: Mutex<Option<Cursor>>,
    unsaved: AtomicBool,
    saves: AtomicUsize,
    opened: Mutex<Vec<(PathBuf, u32, u32)>>,
}

impl FakeWorkspace {
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let ws = FakeWorkspace::default();
        *ws.paths.lock().unwrap() = paths.into_iter().map(Into::into).collect();
        ws
    }

    pub fn set_active_file(&self, path: impl Into<PathBuf>) {
        *self.active.lock().unwrap() = Some(path.into());
    }

    pub fn set_selection(&self, text: impl Into<String>) {
        *self.selection.lock().unwrap() = Some(text.into());
    }

    pub fn set_cursor(&self, row: u32, column: u32) {
        *self.cursor.lock().unwrap() = Some(Cursor { row, column });
    }

    pub fn set_unsaved(&self, unsaved: bool) {
        self.unsaved.store(unsaved, Ordering::SeqCst);
    }

    /// Number of `save_all` calls.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<(PathBuf, u32, u32)> {
        self.opened.lock().unwrap().clone()
    }
}

impl Workspace for FakeWorkspace {
    fn project_paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }

    fn active_file(&self) -> Option<PathBuf> {
        self.active.lock().unwrap().clone()
    }

    fn selection(&self) -> Option<String> {
        self.selection.lock().unwrap().clone()
    }

    fn cursor(&self) -> Option<Cursor> {
        *self.cursor.lock().unwrap()
    }

    fn has_unsaved_changes(&self) -> bool {
        self.unsaved.load(Ordering::SeqCst)
    }

    fn save_all(&self) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.unsaved.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn open_file(&self, path: &Path, row: u32, column: u32) -> Result<()> {
        self.opened
            .lock()
            .unwrap()
            .push((path.to_path_buf(), row, column));
        Ok(())
    }
}

/// Prompter answering from a script.
///
/// With a gate, `confirm_save` blocks until [`ScriptedPrompter::release`].
pub struct ScriptedPrompter {
    confirm: bool,
    choice: Mutex<Option<String>>,
    gate: Option<Arc<Notify>>,
    confirms: AtomicUsize,
    offered: Mutex<Vec<Vec<TargetChoice>>>,
}

impl ScriptedPrompter {
    /// Answer every confirmation with `confirm`.
    pub fn answering(confirm: bool) -> Self {
        ScriptedPrompter {
            confirm,
            choice: Mutex::new(None),
            gate: None,
            confirms: AtomicUsize::new(0),
            offered: Mutex::new(Vec::new()),
        }
    }

    /// Hold confirmations until released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Pick `name` on the next selection.
    pub fn choosing(self, name: impl Into<String>) -> Self {
        *self.choice.lock().unwrap() = Some(name.into());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Number of confirmations asked.
    pub fn confirms(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    /// Every list offered for selection.
    pub fn offered(&self) -> Vec<Vec<TargetChoice>> {
        self.offered.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm_save(&self) -> BoxFuture<'_, bool> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.clone();
        let answer = self.confirm;
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            answer
        }
        .boxed()
    }

    fn select_target(&self, choices: Vec<TargetChoice>) -> BoxFuture<'_, Option<String>> {
        self.offered.lock().unwrap().push(choices);
        let choice = self.choice.lock().unwrap().clone();
        futures::future::ready(choice).boxed()
    }
}

/// Linter that keeps the latest messages per file.
#[derive(Default)]
pub struct RecordingLinter {
    clears: AtomicUsize,
    messages: Mutex<BTreeMap<PathBuf, Vec<LintMessage>>>,
}

impl RecordingLinter {
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> BTreeMap<PathBuf, Vec<LintMessage>> {
        self.messages.lock().unwrap().clone()
    }
}

impl Linter for RecordingLinter {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().clear();
    }

    fn set_messages(&self, file: &Path, messages: Vec<LintMessage>) {
        self.messages
            .lock()
            .unwrap()
            .insert(file.to_path_buf(), messages);
    }
}

type SettingsFn = dyn Fn(&Path) -> Result<DraftSet> + Send + Sync;

struct StaticShared {
    nice_name: String,
    eligible: bool,
    settings: Box<SettingsFn>,
    delays: Mutex<VecDeque<Duration>>,
    calls: AtomicUsize,
    unwatches: AtomicUsize,
    notifier: Mutex<Option<RefreshNotifier>>,
}

/// Provider factory answering from a closure, with optional delays.
#[derive(Clone)]
pub struct StaticProvider {
    shared: Arc<StaticShared>,
}

impl StaticProvider {
    pub fn new<F>(nice_name: impl Into<String>, settings: F) -> Self
    where
        F: Fn(&Path) -> Result<DraftSet> + Send + Sync + 'static,
    {
        StaticProvider {
            shared: Arc::new(StaticShared {
                nice_name: nice_name.into(),
                eligible: true,
                settings: Box::new(settings),
                delays: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                unwatches: AtomicUsize::new(0),
                notifier: Mutex::new(None),
            }),
        }
    }

    /// A provider that is never eligible.
    pub fn ineligible(nice_name: impl Into<String>) -> Self {
        let mut provider = StaticProvider::new(nice_name, |_| Ok(DraftSet::empty()));
        if let Some(shared) = Arc::get_mut(&mut provider.shared) {
            shared.eligible = false;
        }
        provider
    }

    /// Delay the next `settings` calls, one duration per call.
    pub fn delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.shared.delays.lock().unwrap().extend(delays);
        self
    }

    /// Number of `settings` calls.
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// Number of `unwatch` calls.
    pub fn unwatches(&self) -> usize {
        self.shared.unwatches.load(Ordering::SeqCst)
    }

    /// Ask for a refresh the way a watching provider would.
    pub fn request_refresh(&self) -> bool {
        self.shared
            .notifier
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|n| n.request())
    }
}

struct StaticInstance {
    path: PathBuf,
    shared: Arc<StaticShared>,
}

impl ProviderFactory for StaticProvider {
    fn name(&self) -> &str {
        &self.shared.nice_name
    }

    fn create(&self, path: &Path) -> Arc<dyn Provider> {
        Arc::new(StaticInstance {
            path: path.to_path_buf(),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Provider for StaticInstance {
    fn nice_name(&self) -> String {
        self.shared.nice_name.clone()
    }

    fn is_eligible(&self) -> bool {
        self.shared.eligible
    }

    fn settings(&self) -> BoxFuture<'_, Result<DraftSet>> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.shared.delays.lock().unwrap().pop_front();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            (self.shared.settings)(&self.path)
        }
        .boxed()
    }

    fn watch(&self, notifier: RefreshNotifier) {
        *self.shared.notifier.lock().unwrap() = Some(notifier);
    }

    fn unwatch(&self) {
        self.shared.unwatches.fetch_add(1, Ordering::SeqCst);
        *self.shared.notifier.lock().unwrap() = None;
    }
}
