//! Target discovery and selection across project paths.
//!
//! For every project path the manager asks each registered provider for its
//! targets, merges the answers in registry order, fills defaults, makes
//! names unique and tracks which target is active.
//!
//! Provider failures are isolated: a failing provider is reported and
//! contributes nothing, the others still count.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Error as AnyError;
use futures::future::{join_all, FutureExt};
use tokio::sync::{broadcast, mpsc};

use crate::builder::events::Presenter;
use crate::builder::host::{Prompter, TargetChoice};
use crate::core::{fill_defaults, uniquify, LoadState, PathTargetState, Subscriptions, TargetSpec};
use crate::sources::{Provider, ProviderRegistry, RefreshNotifier, RefreshRequest};
use crate::util::config::Settings;
use crate::util::diagnostic::{ConfigSyntaxError, Error, Notice};

/// Changes observers can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    /// A refresh of `path` completed.
    Refreshed { path: PathBuf },

    /// The active target of `path` changed.
    ActiveChanged { path: PathBuf, target: String },
}

struct Inner {
    registry: ProviderRegistry,
    settings: Settings,
    presenter: Arc<dyn Presenter>,
    paths: Mutex<Vec<PathTargetState>>,
    events: broadcast::Sender<TargetEvent>,
    refresh_tx: mpsc::UnboundedSender<RefreshRequest>,
    refresh_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RefreshRequest>>,
}

/// Discovers and tracks build targets per project path.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TargetManager {
    inner: Arc<Inner>,
}

impl TargetManager {
    pub fn new(registry: ProviderRegistry, settings: Settings, presenter: Arc<dyn Presenter>) -> Self {
        let (events, _) = broadcast::channel(64);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        TargetManager {
            inner: Arc::new(Inner {
                registry,
                settings,
                presenter,
                paths: Mutex::new(Vec::new()),
                events,
                refresh_tx,
                refresh_rx: tokio::sync::Mutex::new(refresh_rx),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathTargetState>> {
        self.inner
            .paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Receive [`TargetEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TargetEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: TargetEvent) {
        // No subscriber is fine.
        let _ = self.inner.events.send(event);
    }

    /// Known project paths, in the order they were added.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().iter().map(|s| s.path().to_path_buf()).collect()
    }

    /// Discovery progress of `path`, if known.
    pub fn load_state(&self, path: &Path) -> Option<LoadState> {
        self.lock()
            .iter()
            .find(|s| s.path() == path)
            .map(|s| s.load_state)
    }

    /// Start tracking `path`. Targets are discovered on first use.
    pub fn add_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.lock();
        if !paths.iter().any(|s| s.path() == path) {
            tracing::debug!("tracking project path {}", path.display());
            paths.push(PathTargetState::new(path));
        }
    }

    /// Stop tracking `path`, detaching its providers.
    pub fn remove_path(&self, path: &Path) -> bool {
        let removed = {
            let mut paths = self.lock();
            let index = paths.iter().position(|s| s.path() == path);
            index.map(|i| paths.remove(i))
        };

        match removed {
            Some(state) => {
                tracing::debug!("dropped project path {}", path.display());
                state.unwatch_providers();
                true
            }
            None => false,
        }
    }

    /// Replace the set of project paths, keeping state of the ones that stay.
    pub fn set_paths<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let wanted: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        for known in self.paths() {
            if !wanted.contains(&known) {
                self.remove_path(&known);
            }
        }
        for path in wanted {
            self.add_path(path);
        }
    }

    /// Rediscover targets for `paths`, or for every known path.
    pub async fn refresh_targets(&self, paths: Option<&[PathBuf]>) {
        let paths = match paths {
            Some(paths) => paths.to_vec(),
            None => self.paths(),
        };
        join_all(paths.iter().map(|p| self.refresh_path(p))).await;
    }

    /// Rediscover targets for one path, adding it when unknown.
    pub async fn refresh_path(&self, path: &Path) {
        let (generation, previous) = {
            let mut paths = self.lock();
            let index = match paths.iter().position(|s| s.path() == path) {
                Some(i) => i,
                None => {
                    paths.push(PathTargetState::new(path));
                    paths.len() - 1
                }
            };
            let state = &mut paths[index];
            state.generation += 1;
            state.load_state = LoadState::Loading;
            (state.generation, std::mem::take(&mut state.providers))
        };

        tracing::debug!("refreshing targets of {} (#{})", path.display(), generation);
        for provider in &previous {
            provider.unwatch();
        }

        let providers: Vec<Arc<dyn Provider>> = self
            .inner
            .registry
            .iter()
            .map(|factory| factory.create(path))
            .filter(|provider| provider.is_eligible())
            .collect();

        for provider in &providers {
            provider.watch(RefreshNotifier::new(
                path,
                provider.nice_name(),
                self.inner.refresh_tx.clone(),
            ));
        }

        let results = join_all(providers.iter().map(|provider| async move {
            let settings = AssertUnwindSafe(async move { provider.settings().await })
                .catch_unwind()
                .await;
            (provider.nice_name(), settings)
        }))
        .await;

        let mut specs = Vec::new();
        let mut load_error = None;
        for (name, result) in results {
            let result = match result {
                Ok(result) => result.map_err(|e| provider_error(&name, e)),
                Err(payload) => Err(provider_panic(&name, payload)),
            };
            match result {
                Ok(set) => specs.extend(set.into_drafts().into_iter().map(|d| fill_defaults(path, d))),
                Err(e) => {
                    self.report(&e);
                    if e.aborts_build() && load_error.is_none() {
                        load_error = Some(e);
                    }
                }
            }
        }
        let targets = uniquify(specs);

        let committed = {
            let mut paths = self.lock();
            match paths.iter_mut().find(|s| s.path() == path) {
                Some(state) if state.generation == generation => {
                    let before = state.active_target.clone();
                    state.install(targets, providers.clone());
                    state.load_error = load_error;
                    let names: Vec<String> = state.targets.iter().map(|t| t.name.clone()).collect();
                    Some((before, state.active_target.clone(), names))
                }
                Some(_) => {
                    tracing::debug!(
                        "dropping stale refresh #{} of {}",
                        generation,
                        path.display()
                    );
                    None
                }
                None => {
                    tracing::debug!("{} was removed during refresh", path.display());
                    None
                }
            }
        };

        let Some((before, active, names)) = committed else {
            for provider in &providers {
                provider.unwatch();
            }
            return;
        };

        tracing::info!("found {} targets in {}", names.len(), path.display());
        self.emit(TargetEvent::Refreshed {
            path: path.to_path_buf(),
        });
        if before != active {
            if let Some(target) = active {
                self.emit(TargetEvent::ActiveChanged {
                    path: path.to_path_buf(),
                    target,
                });
            }
        }

        if self.inner.settings.notification_on_refresh {
            self.inner
                .presenter
                .notify(&Notice::info("Build targets parsed.").with_detail(names.join("\n")));
        }
    }

    fn refreshed(&self, path: &Path) -> bool {
        self.lock()
            .iter()
            .find(|s| s.path() == path)
            .is_some_and(|s| s.refreshed)
    }

    /// Targets of `path`, discovering them first if that never happened.
    pub async fn get_targets(&self, path: &Path) -> Vec<TargetSpec> {
        if !self.refreshed(path) {
            self.refresh_path(path).await;
        }
        self.lock()
            .iter()
            .find(|s| s.path() == path)
            .map(|s| s.targets.clone())
            .unwrap_or_default()
    }

    /// The active target of `path`, discovering targets first if needed.
    pub async fn get_active_target(&self, path: &Path) -> Option<TargetSpec> {
        if !self.refreshed(path) {
            self.refresh_path(path).await;
        }
        self.lock()
            .iter()
            .find(|s| s.path() == path)
            .and_then(|s| s.active().cloned())
    }

    /// Error of the last refresh of `path` that blocks building it, such as
    /// a malformed build file.
    pub fn load_error(&self, path: &Path) -> Option<Error> {
        self.lock()
            .iter()
            .find(|s| s.path() == path)
            .and_then(|s| s.load_error.clone())
    }

    /// Make `name` the active target of `path`.
    ///
    /// Returns false when there is no such target.
    pub fn set_active_target(&self, path: &Path, name: &str) -> bool {
        let changed = {
            let mut paths = self.lock();
            let Some(state) = paths.iter_mut().find(|s| s.path() == path) else {
                return false;
            };
            if state.find(name).is_none() {
                tracing::warn!("no target named `{}` in {}", name, path.display());
                return false;
            }
            let changed = state.active_target.as_deref() != Some(name);
            state.active_target = Some(name.to_string());
            changed
        };

        if changed {
            tracing::debug!("active target of {} is now `{}`", path.display(), name);
            self.emit(TargetEvent::ActiveChanged {
                path: path.to_path_buf(),
                target: name.to_string(),
            });
        }
        true
    }

    /// Let the user pick the active target of `path`.
    ///
    /// Returns the chosen name, or `None` when the selection was cancelled
    /// or there was nothing to choose from.
    pub async fn select_active_target(&self, path: &Path, prompter: &dyn Prompter) -> Option<String> {
        if self.inner.settings.refresh_on_show_target_list {
            self.refresh_path(path).await;
        }

        let targets = self.get_targets(path).await;
        if targets.is_empty() {
            self.report(&Error::NoTarget {
                path: path.to_path_buf(),
            });
            return None;
        }

        let active = self.get_active_target(path).await.map(|t| t.name);
        let choices = targets
            .iter()
            .map(|t| TargetChoice {
                name: t.name.clone(),
                active: active.as_deref() == Some(t.name.as_str()),
            })
            .collect();

        let choice = prompter.select_target(choices).await?;
        self.set_active_target(path, &choice).then_some(choice)
    }

    /// Command and keymap registrations of `path`.
    pub fn subscriptions(&self, path: &Path) -> Subscriptions {
        self.lock()
            .iter()
            .find(|s| s.path() == path)
            .map(|s| s.subscriptions.clone())
            .unwrap_or_default()
    }

    /// The path and target name a command is bound to.
    pub fn target_for_command(&self, command: &str) -> Option<(PathBuf, String)> {
        self.lock().iter().find_map(|s| {
            s.subscriptions
                .target_for(command)
                .map(|target| (s.path().to_path_buf(), target.to_string()))
        })
    }

    /// Serve refresh requests from providers for as long as the returned
    /// future is polled.
    pub async fn handle_refresh_requests(&self) {
        loop {
            let request = self.inner.refresh_rx.lock().await.recv().await;
            let Some(request) = request else { break };
            tracing::debug!(
                "provider `{}` asked to refresh {}",
                request.provider,
                request.path.display()
            );
            if self.paths().contains(&request.path) {
                self.refresh_path(&request.path).await;
            }
        }
    }

    /// Serve the refresh requests already queued, once per path.
    ///
    /// Returns the number of paths refreshed.
    pub async fn drain_refresh_requests(&self) -> usize {
        let mut pending: Vec<PathBuf> = Vec::new();
        {
            let mut rx = self.inner.refresh_rx.lock().await;
            while let Ok(request) = rx.try_recv() {
                if !pending.contains(&request.path) {
                    pending.push(request.path);
                }
            }
        }

        let known = self.paths();
        pending.retain(|p| known.contains(p));
        self.refresh_targets(Some(&pending)).await;
        pending.len()
    }

    fn report(&self, e: &Error) {
        tracing::warn!("{}", e);
        self.inner.presenter.notify(&Notice::from(e));
    }
}

impl std::fmt::Debug for TargetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetManager")
            .field("registry", &self.inner.registry)
            .field("paths", &*self.lock())
            .finish()
    }
}

/// Classify a provider failure.
fn provider_error(provider: &str, e: AnyError) -> Error {
    match e.downcast_ref::<ConfigSyntaxError>() {
        Some(syntax) => Error::from(syntax.clone()),
        None => Error::Provider {
            provider: provider.to_string(),
            detail: format!("{:#}", e),
            trace: Some(format!("{:?}", e)),
        },
    }
}

/// Turn a provider panic into a regular provider failure.
fn provider_panic(provider: &str, payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    Error::Provider {
        provider: provider.to_string(),
        detail: format!("provider panicked: {}", message),
        trace: None,
    }
}
