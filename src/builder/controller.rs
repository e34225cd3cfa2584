//! Build orchestration - one build process at a time.
//!
//! [`BuildController`] owns the single in-flight build of a workspace:
//!
//! ```text
//! Idle --build()--> Confirming --(confirmed)--> Running --(exit)--> Finished
//! Running --stop()--> Aborting --(closed)--> Idle
//! Confirming --(cancelled)--> Idle
//! ```
//!
//! The child process is owned by a supervisor task. The controller only
//! keeps a handle to signal it, tagged with a generation so a process that
//! was detached (by a restart or a second `stop()`) can never report back.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::builder::events::Presenter;
use crate::builder::host::{Action, Linter, Prompter, Workspace};
use crate::builder::placeholder::PlaceholderContext;
use crate::core::TargetSpec;
use crate::matcher::{ErrorMatcher, MatchSpec};
use crate::ops::TargetManager;
use crate::util::config::Settings;
use crate::util::diagnostic::{Error, Notice};
use crate::util::process::{kill_tree, ProcessBuilder};

/// Lifecycle of the build process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    #[default]
    Idle,
    Confirming,
    Running,
    Aborting,
    Finished,
}

/// What asked for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildSource {
    User,
    Save,
}

struct RunningChild {
    generation: u64,
    kill: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct ControllerState {
    phase: BuildState,
    confirming: bool,
    pending_confirm: Option<oneshot::Sender<bool>>,
    generation: u64,
    child: Option<RunningChild>,
    killed: bool,
    /// Signalled once the latest process closed and was handled
    closed: Option<watch::Receiver<bool>>,
    exit_code: Option<i32>,
    last_success: Option<bool>,
    hide_timer: Option<JoinHandle<()>>,
}

struct Inner {
    targets: TargetManager,
    presenter: Arc<dyn Presenter>,
    workspace: Arc<dyn Workspace>,
    prompter: Arc<dyn Prompter>,
    linter: Option<Arc<dyn Linter>>,
    matcher: ErrorMatcher,
    state: Mutex<ControllerState>,
}

/// Starts, stops and evaluates builds.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BuildController {
    inner: Arc<Inner>,
}

/// Everything the supervisor needs to finish a build.
struct Finish {
    generation: u64,
    target: TargetSpec,
    cwd: PathBuf,
}

impl BuildController {
    pub fn new(
        targets: TargetManager,
        presenter: Arc<dyn Presenter>,
        workspace: Arc<dyn Workspace>,
        prompter: Arc<dyn Prompter>,
        linter: Option<Arc<dyn Linter>>,
    ) -> Self {
        let matcher = ErrorMatcher::new(presenter.clone(), workspace.clone());
        BuildController {
            inner: Arc::new(Inner {
                targets,
                presenter,
                workspace,
                prompter,
                linter,
                matcher,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settings(&self) -> &Settings {
        self.inner.targets.settings()
    }

    pub fn targets(&self) -> &TargetManager {
        &self.inner.targets
    }

    /// Matcher holding the output of the last finished build.
    pub fn matcher(&self) -> &ErrorMatcher {
        &self.inner.matcher
    }

    pub fn state(&self) -> BuildState {
        let state = self.lock();
        if state.confirming {
            BuildState::Confirming
        } else {
            state.phase
        }
    }

    /// Exit code of the last process that ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        self.lock().exit_code
    }

    /// Outcome of the last finished build.
    pub fn last_success(&self) -> Option<bool> {
        self.lock().last_success
    }

    /// Wait until the most recently started process closed and its results
    /// were delivered.
    pub async fn wait(&self) {
        let closed = self.lock().closed.clone();
        if let Some(mut closed) = closed {
            let _ = closed.wait_for(|done| *done).await;
        }
    }

    /// Build the active target of the active project path.
    ///
    /// Unsaved buffers are saved first, after asking unless `save-on-build`
    /// is set. A running build is aborted and replaced. Resolves once the
    /// process is started; use [`BuildController::wait`] for the result.
    pub async fn build(&self) -> Result<(), Error> {
        self.build_from(BuildSource::User).await
    }

    async fn build_from(&self, source: BuildSource) -> Result<(), Error> {
        self.cancel_hide_timer();

        if self.inner.workspace.has_unsaved_changes() {
            if !self.settings().save_on_build && !self.confirm_save().await {
                return Ok(());
            }
            if let Err(e) = self.inner.workspace.save_all() {
                tracing::warn!("failed to save buffers: {:#}", e);
            }
        }

        self.start_new_build(source).await
    }

    /// Ask once; a second request while asking is dropped.
    async fn confirm_save(&self) -> bool {
        let answered = {
            let mut state = self.lock();
            if state.confirming {
                tracing::debug!("build already waiting for confirmation");
                return false;
            }
            state.confirming = true;
            let (tx, rx) = oneshot::channel();
            state.pending_confirm = Some(tx);
            rx
        };

        let confirmed = tokio::select! {
            answer = self.inner.prompter.confirm_save() => answer,
            Ok(answer) = answered => answer,
        };

        let mut state = self.lock();
        state.confirming = false;
        state.pending_confirm = None;
        if !confirmed {
            tracing::debug!("build cancelled at save confirmation");
        }
        confirmed
    }

    /// Resolve a pending save confirmation from an action.
    fn answer_confirmation(&self, confirmed: bool) {
        if let Some(tx) = self.lock().pending_confirm.take() {
            let _ = tx.send(confirmed);
        }
    }

    async fn start_new_build(&self, source: BuildSource) -> Result<(), Error> {
        self.abort_running().await;

        match self.spawn_active_target().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.report_failed_start(&e, source);
                Err(e)
            }
        }
    }

    /// Detach a running process, kill it and wait for it to close.
    async fn abort_running(&self) {
        let (prior, closed, was_killed) = {
            let mut state = self.lock();
            let was_killed = std::mem::take(&mut state.killed);
            (state.child.take(), state.closed.clone(), was_killed)
        };
        let Some(mut prior) = prior else { return };

        tracing::info!("aborting running build to start a new one");
        if let Some(kill) = prior.kill.take() {
            let _ = kill.send(());
        }
        if let Some(mut closed) = closed {
            let _ = closed.wait_for(|done| *done).await;
        }

        // A stop() was in flight; its close is now ignored, so finish it here.
        if was_killed {
            tracing::info!("build aborted");
            self.inner.presenter.build_aborted();
        }
    }

    async fn spawn_active_target(&self) -> Result<(), Error> {
        let path = self
            .inner
            .workspace
            .active_project_path()
            .ok_or_else(|| Error::NoTarget {
                path: PathBuf::new(),
            })?;
        let target = self.inner.targets.get_active_target(&path).await;

        // A malformed build file fails the attempt even if other providers
        // still offer targets.
        if let Some(e) = self.inner.targets.load_error(&path) {
            self.begin_attempt();
            let mut state = self.lock();
            state.phase = BuildState::Finished;
            state.last_success = Some(false);
            return Err(e);
        }
        let target = target.ok_or_else(|| Error::NoTarget { path: path.clone() })?;

        self.begin_attempt();

        let ctx = PlaceholderContext::capture(&*self.inner.workspace, &path, &target.env);
        let cwd = PathBuf::from(ctx.replace(&target.cwd.to_string_lossy()));
        let process = ProcessBuilder::new(ctx.replace(&target.exec))
            .args(target.args.iter().map(|a| ctx.replace(a)))
            .envs(target.env.iter().map(|(k, v)| (k.clone(), ctx.replace(v))))
            .cwd(&cwd)
            .shell(target.sh);

        target.run_pre_build();

        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.generation
        };

        let child = match process.spawn() {
            Ok(child) => child,
            Err(e) => {
                target.run_post_build(false);
                let mut state = self.lock();
                state.phase = BuildState::Finished;
                state.last_success = Some(false);
                return Err(e);
            }
        };

        tracing::info!(
            "started `{}` for target `{}` in {}",
            process.display_command(),
            target.name,
            cwd.display()
        );

        let (kill_tx, kill_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        {
            let mut state = self.lock();
            state.child = Some(RunningChild {
                generation,
                kill: Some(kill_tx),
            });
            state.closed = Some(closed_rx);
            state.killed = false;
            state.exit_code = None;
            state.phase = BuildState::Running;
        }

        let this = self.clone();
        let finish = Finish {
            generation,
            target,
            cwd,
        };
        tokio::spawn(async move {
            this.supervise(child, kill_rx, finish).await;
            let _ = closed_tx.send(true);
        });

        Ok(())
    }

    fn begin_attempt(&self) {
        self.inner.matcher.clear();
        if let Some(linter) = &self.inner.linter {
            linter.clear();
        }
        self.inner.presenter.build_started();
    }

    async fn supervise(&self, mut child: Child, kill_rx: oneshot::Receiver<()>, finish: Finish) {
        let pid = child.id();
        let output = Arc::new(Mutex::new(String::new()));
        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, self.inner.presenter.clone(), output.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, self.inner.presenter.clone(), output.clone())));
        }

        let (status, killed) = tokio::select! {
            status = child.wait() => (status, false),
            Ok(()) = kill_rx => {
                tracing::debug!("killing build process");
                if let Err(e) = kill_tree(&mut child, pid) {
                    tracing::warn!("failed to kill build process: {}", e);
                }
                (child.wait().await, true)
            }
        };

        for pump in pumps {
            if killed {
                // Grandchildren may keep the pipes open.
                pump.abort();
            } else {
                let _ = pump.await;
            }
        }

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!("failed to wait for build process: {}", e);
                None
            }
        };
        let output = std::mem::take(&mut *output.lock().unwrap_or_else(|p| p.into_inner()));
        self.on_close(finish, code, output);
    }

    fn on_close(&self, finish: Finish, code: Option<i32>, output: String) {
        let killed = {
            let mut state = self.lock();
            match &state.child {
                Some(child) if child.generation == finish.generation => {}
                _ => {
                    tracing::debug!("ignoring close of detached build #{}", finish.generation);
                    return;
                }
            }
            state.child = None;
            let killed = std::mem::take(&mut state.killed);
            if killed {
                state.phase = BuildState::Idle;
            } else {
                state.exit_code = code;
            }
            killed
        };

        if killed {
            tracing::info!("build aborted");
            self.inner.presenter.build_aborted();
            return;
        }

        let matcher = &self.inner.matcher;
        matcher.set(MatchSpec::from_target(&finish.target), &finish.cwd, output);

        let matched_error = self.settings().matched_error_fails_build && matcher.has_error();
        let success = code == Some(0) && !matched_error;
        tracing::info!(
            "build finished with {} ({})",
            code.map_or_else(|| "signal".to_string(), |c| format!("exit code {}", c)),
            if success { "success" } else { "failure" }
        );

        {
            let mut state = self.lock();
            state.phase = BuildState::Finished;
            state.last_success = Some(success);
        }

        finish.target.run_post_build(success);
        self.inner.presenter.build_finished(success);

        if let Some(linter) = &self.inner.linter {
            linter.clear();
            for (file, messages) in matcher.lint_messages() {
                linter.set_messages(&file, messages);
            }
        }

        if success {
            if !self.settings().keep_visible {
                self.schedule_hide();
            }
        } else if self.settings().scroll_on_error {
            if let Err(e) = matcher.match_first() {
                tracing::debug!("could not scroll to first match: {}", e);
            }
        }
    }

    /// Abort the running build, or reset the display when idle.
    pub fn stop(&self) {
        enum Step {
            Reset,
            Detach,
            Kill(Option<oneshot::Sender<()>>),
        }

        self.cancel_hide_timer();
        let step = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.child.is_none() {
                state.phase = BuildState::Idle;
                Step::Reset
            } else if state.killed {
                state.child = None;
                state.killed = false;
                state.phase = BuildState::Idle;
                Step::Detach
            } else {
                let kill = state.child.as_mut().and_then(|c| c.kill.take());
                state.killed = true;
                state.phase = BuildState::Aborting;
                Step::Kill(kill)
            }
        };

        match step {
            Step::Reset => self.inner.presenter.reset(),
            Step::Detach => {
                tracing::debug!("build already killed, detaching");
                self.inner.presenter.build_aborted();
            }
            Step::Kill(kill) => {
                tracing::info!("aborting build");
                self.inner.presenter.build_abort_initiated();
                if let Some(kill) = kill {
                    let _ = kill.send(());
                }
            }
        }
    }

    fn schedule_hide(&self) {
        let presenter = self.inner.presenter.clone();
        let delay = self.settings().hide_delay();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            presenter.hide();
        });
        if let Some(previous) = self.lock().hide_timer.replace(timer) {
            previous.abort();
        }
    }

    fn cancel_hide_timer(&self) {
        if let Some(timer) = self.lock().hide_timer.take() {
            timer.abort();
        }
    }

    fn report_failed_start(&self, e: &Error, source: BuildSource) {
        tracing::warn!("{}", e);
        let no_target = matches!(e, Error::NoTarget { .. });
        // Saving outside any buildable project is not worth a notice.
        if no_target && source == BuildSource::Save {
            return;
        }

        // Without a target no attempt was started, so there is nothing to finish.
        if e.aborts_build() && !no_target {
            self.inner
                .presenter
                .append(&format!("{}\n{}\n", e.title(), e.detail()));
            self.inner.presenter.build_finished(false);
        }

        // Discovery already raised the notice for a malformed build file.
        if !matches!(e, Error::ConfigSyntax { .. }) {
            self.inner.presenter.notify(&Notice::from(e));
        }
    }

    /// Run a host action.
    pub async fn dispatch(&self, action: Action) {
        tracing::debug!("dispatching {}", action.command());
        match action {
            Action::TriggerBuild => {
                let _ = self.build().await;
            }
            Action::StopBuild => self.stop(),
            Action::ConfirmSave => self.answer_confirmation(true),
            Action::CancelSave => self.answer_confirmation(false),
            Action::ErrorMatchNext => {
                let _ = self.inner.matcher.match_next();
            }
            Action::ErrorMatchFirst => {
                let _ = self.inner.matcher.match_first();
            }
            Action::RefreshTargets => {
                self.inner.targets.set_paths(self.inner.workspace.project_paths());
                self.inner.targets.refresh_targets(None).await;
            }
            Action::SelectActiveTarget => {
                self.select_active_target().await;
            }
            Action::TogglePanel => self.inner.presenter.toggle(),
        }
    }

    /// Run a command by name: an action, or a target's trigger command.
    ///
    /// Returns false when nothing is bound to `command`.
    pub async fn trigger_command(&self, command: &str) -> bool {
        if let Some(action) = Action::from_command(command) {
            self.dispatch(action).await;
            return true;
        }

        let Some((path, target)) = self.inner.targets.target_for_command(command) else {
            tracing::debug!("no target bound to `{}`", command);
            return false;
        };
        self.inner.targets.set_active_target(&path, &target);
        let _ = self.build().await;
        true
    }

    /// Let the user pick the active target, then build when
    /// `select-triggers` is set.
    pub async fn select_active_target(&self) -> Option<String> {
        let path = self.inner.workspace.active_project_path()?;
        let chosen = self
            .inner
            .targets
            .select_active_target(&path, &*self.inner.prompter)
            .await?;

        if self.settings().select_triggers {
            let _ = self.build().await;
        }
        Some(chosen)
    }

    /// A buffer was saved; build if `build-on-save` applies to it.
    pub async fn on_buffer_saved(&self, file: &Path) {
        if !self.settings().build_on_save {
            return;
        }
        let in_project = self
            .inner
            .workspace
            .project_paths()
            .iter()
            .any(|p| file.starts_with(p));
        if !in_project {
            return;
        }

        tracing::debug!("{} saved, building", file.display());
        let _ = self.build_from(BuildSource::Save).await;
    }
}

impl std::fmt::Debug for BuildController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BuildController")
            .field("phase", &state.phase)
            .field("confirming", &state.confirming)
            .field("generation", &state.generation)
            .field("killed", &state.killed)
            .finish()
    }
}

/// Forward one output stream line by line.
async fn pump<R>(reader: R, presenter: Arc<dyn Presenter>, output: Arc<Mutex<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                presenter.append(&text);
                output
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push_str(&text);
            }
            Err(e) => {
                tracing::debug!("output stream failed: {}", e);
                break;
            }
        }
    }
}
