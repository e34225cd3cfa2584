//! Error matching - structured locations in build output.
//!
//! An [`ErrorMatcher`] is loaded with the output of one build and the
//! target's match specification. Parsing happens lazily on first use and
//! produces:
//!
//! - an ordered set of [`Match`]es with stable ids
//! - a [`MatchQueue`] driving round-robin navigation
//! - an annotated HTML copy of the output, handed to the presenter
//!
//! Navigation opens the matched file through the [`Workspace`] and tells the
//! presenter which match was reached.

pub mod annotate;
pub mod lint;
pub mod matches;
pub mod pattern;
pub mod queue;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::builder::events::{GotoCallback, Presenter};
use crate::builder::host::Workspace;
use crate::core::target::{ErrorMatch, MatchFunction, TargetSpec};
use crate::util::diagnostic::{Error, NavigationError, Notice, Severity};

pub use annotate::{annotate, escape_html};
pub use lint::{lint_messages, LintLocation, LintMessage};
pub use matches::{FunctionMatch, Match, TraceEntry};
pub use queue::MatchQueue;

/// What to look for in the output.
#[derive(Debug, Clone, Default)]
pub struct MatchSpec {
    pub errors: ErrorMatch,
    pub warnings: Vec<String>,
}

impl MatchSpec {
    /// Error and warning patterns of a target.
    pub fn from_target(target: &TargetSpec) -> Self {
        MatchSpec {
            errors: target.error_match.clone(),
            warnings: target.warning_match.clone(),
        }
    }

    /// Error patterns only.
    pub fn errors<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MatchSpec {
            errors: ErrorMatch::Patterns(patterns.into_iter().map(Into::into).collect()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warnings = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.iter().all(|p| p.is_empty())
    }
}

struct Parsed {
    /// Indexed by id
    matches: Vec<Match>,
    queue: MatchQueue,
}

struct ParseOutcome {
    parsed: Parsed,
    errors: Vec<Error>,
    html: Option<String>,
}

struct MatcherState {
    spec: MatchSpec,
    cwd: PathBuf,
    output: String,
    parsed: Option<Parsed>,
    warned_abs_file: bool,
}

struct Shared {
    state: Mutex<MatcherState>,
    presenter: Arc<dyn Presenter>,
    workspace: Arc<dyn Workspace>,
}

/// Finds error locations in build output and navigates between them.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ErrorMatcher {
    shared: Arc<Shared>,
}

impl ErrorMatcher {
    pub fn new(presenter: Arc<dyn Presenter>, workspace: Arc<dyn Workspace>) -> Self {
        ErrorMatcher {
            shared: Arc::new(Shared {
                state: Mutex::new(MatcherState {
                    spec: MatchSpec::default(),
                    cwd: PathBuf::new(),
                    output: String::new(),
                    parsed: None,
                    warned_abs_file: false,
                }),
                presenter,
                workspace,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MatcherState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the output of a build. Parsing is deferred to first use.
    pub fn set(&self, spec: MatchSpec, cwd: impl Into<PathBuf>, output: impl Into<String>) {
        let mut state = self.lock();
        state.spec = spec;
        state.cwd = cwd.into();
        state.output = output.into();
        state.parsed = None;
    }

    /// Forget the current output and matches.
    pub fn clear(&self) {
        self.set(MatchSpec::default(), PathBuf::new(), String::new());
    }

    /// Directory relative match files are resolved against.
    pub fn cwd(&self) -> PathBuf {
        self.lock().cwd.clone()
    }

    /// Every match, ordered by id.
    pub fn matches(&self) -> Vec<Match> {
        self.ensure_parsed();
        self.lock()
            .parsed
            .as_ref()
            .map(|p| p.matches.clone())
            .unwrap_or_default()
    }

    /// Whether any match has error severity.
    pub fn has_error(&self) -> bool {
        self.ensure_parsed();
        self.lock()
            .parsed
            .as_ref()
            .is_some_and(|p| p.matches.iter().any(Match::is_error))
    }

    /// Matches converted to linter messages, grouped by file.
    pub fn lint_messages(&self) -> BTreeMap<PathBuf, Vec<LintMessage>> {
        self.ensure_parsed();
        let state = self.lock();
        match &state.parsed {
            Some(parsed) => lint::lint_messages(&parsed.matches, &state.cwd),
            None => BTreeMap::new(),
        }
    }

    /// Navigate to the next match in round-robin order.
    ///
    /// Returns the id navigated to, or `None` when there are no matches.
    pub fn match_next(&self) -> Result<Option<usize>, Error> {
        self.ensure_parsed();
        let next = self.lock().parsed.as_mut().and_then(|p| p.queue.rotate());
        match next {
            Some(id) => self.goto(id).map(|_| Some(id)),
            None => Ok(None),
        }
    }

    /// Navigate to the first match, undoing any rotation.
    pub fn match_first(&self) -> Result<Option<usize>, Error> {
        self.ensure_parsed();
        let first = self.lock().parsed.as_mut().and_then(|p| {
            p.queue.reset();
            p.queue.rotate()
        });
        match first {
            Some(id) => self.goto(id).map(|_| Some(id)),
            None => Ok(None),
        }
    }

    /// Open the file of match `id` at its position.
    pub fn goto(&self, id: usize) -> Result<(), Error> {
        self.ensure_parsed();
        let (path, row, col, severity) = match self.locate(id) {
            Ok(found) => found,
            Err(e) => {
                let e = Error::from(e);
                self.report(&e);
                return Err(e);
            }
        };

        if let Err(e) = self.shared.workspace.open_file(&path, row, col) {
            tracing::warn!("failed to open {}: {:#}", path.display(), e);
            self.shared.presenter.notify(
                &Notice::error("Unable to open file.").with_detail(format!("{:#}", e)),
            );
            return Ok(());
        }

        tracing::debug!("navigated to match {} at {}:{}:{}", id, path.display(), row, col);
        self.shared.presenter.scroll_to_match(id, severity);
        Ok(())
    }

    fn locate(&self, id: usize) -> Result<(PathBuf, u32, u32, Severity), NavigationError> {
        let (path, row, col, severity, deprecated) = {
            let mut state = self.lock();
            let m = state
                .parsed
                .as_ref()
                .and_then(|p| p.matches.get(id))
                .cloned()
                .ok_or(NavigationError::UnknownMatch { id })?;

            let mut deprecated = false;
            if m.file.is_none() && m.abs_file.is_some() && !state.warned_abs_file {
                state.warned_abs_file = true;
                deprecated = true;
            }

            let path = m.resolve(&state.cwd).ok_or(NavigationError::NoFile { id })?;
            let (row, col) = m.position();
            (path, row, col, m.severity, deprecated)
        };

        if deprecated {
            tracing::warn!("match {} uses the deprecated `abs_file` field", id);
            self.shared.presenter.notify(
                &Notice::warning("`abs_file` is deprecated.")
                    .with_detail("Use `file` in error-match results; relative paths are resolved against the build cwd."),
            );
        }

        if !path.exists() {
            return Err(NavigationError::FileNotFound { path });
        }

        Ok((path, row, col, severity))
    }

    fn ensure_parsed(&self) {
        let (errors, html) = {
            let mut state = self.lock();
            if state.parsed.is_some() {
                return;
            }
            let ParseOutcome {
                parsed,
                errors,
                html,
            } = parse(&state.spec, &state.output, &state.cwd);
            state.parsed = Some(parsed);
            (errors, html)
        };

        for e in &errors {
            self.report(e);
        }
        if let Some(html) = html {
            self.shared
                .presenter
                .replace_annotated_output(&html, self.goto_callback());
        }
    }

    fn goto_callback(&self) -> GotoCallback {
        let weak = Arc::downgrade(&self.shared);
        Arc::new(move |id| {
            if let Some(shared) = weak.upgrade() {
                let _ = ErrorMatcher { shared }.goto(id);
            }
        })
    }

    fn report(&self, e: &Error) {
        tracing::warn!("{}", e);
        self.shared.presenter.notify(&Notice::from(e));
    }
}

impl std::fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ErrorMatcher")
            .field("spec", &state.spec)
            .field("cwd", &state.cwd)
            .field("parsed", &state.parsed.as_ref().map(|p| p.matches.len()))
            .finish()
    }
}

fn parse(spec: &MatchSpec, output: &str, cwd: &Path) -> ParseOutcome {
    let mut errors = Vec::new();
    let mut matches = Vec::new();
    let mut compiled = Vec::new();

    match &spec.errors {
        ErrorMatch::Patterns(patterns) => {
            let (list, errs) = pattern::compile(patterns, Severity::Error);
            compiled.extend(list);
            errors.extend(errs);
        }
        ErrorMatch::Function(function) => match call_function(function, output, cwd) {
            Ok(found) => {
                matches.extend(
                    found
                        .into_iter()
                        .enumerate()
                        .map(|(id, m)| Match::from_function(id, m)),
                );
            }
            Err(e) => errors.push(e),
        },
    }

    let (warnings, errs) = pattern::compile(&spec.warnings, Severity::Warning);
    compiled.extend(warnings);
    errors.extend(errs);

    let offset = matches.len();
    matches.extend(pattern::scan(&compiled, output).into_iter().map(|mut m| {
        m.id += offset;
        m
    }));

    let mut order: Vec<&Match> = matches.iter().collect();
    order.sort_by_key(|m| (m.span.as_ref().map_or(0, |s| s.start), m.id));
    let queue = MatchQueue::new(order.into_iter().map(|m| m.id).collect());

    let html = (!compiled.is_empty()).then(|| annotate::annotate(output, &matches));

    tracing::debug!("parsed {} matches", matches.len());
    ParseOutcome {
        parsed: Parsed { matches, queue },
        errors,
        html,
    }
}

fn call_function(
    function: &MatchFunction,
    output: &str,
    cwd: &Path,
) -> Result<Vec<FunctionMatch>, Error> {
    match panic::catch_unwind(AssertUnwindSafe(|| function(output, cwd))) {
        Ok(Ok(found)) => Ok(found),
        Ok(Err(e)) => Err(Error::MatchFunction {
            detail: format!("{:#}", e),
        }),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            Err(Error::MatchFunction { detail })
        }
    }
}
