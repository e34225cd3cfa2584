//! Target definitions - what gets built.
//!
//! Providers hand out [`TargetDraft`]s with most fields optional. Discovery
//! fills the gaps with [`fill_defaults`] and disambiguates names with
//! [`uniquify`], producing immutable [`TargetSpec`]s.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::matcher::FunctionMatch;

/// Prefix of the command every target is invocable by.
pub const COMMAND_PREFIX: &str = "dockyard:trigger";

/// Called right before the build process is spawned.
pub type PreBuildHook = Arc<dyn Fn() + Send + Sync>;

/// Called after the build process exited, with the overall success.
pub type PostBuildHook = Arc<dyn Fn(bool) + Send + Sync>;

/// A user-supplied matcher: receives the whole output and the build cwd.
pub type MatchFunction =
    Arc<dyn Fn(&str, &Path) -> anyhow::Result<Vec<FunctionMatch>> + Send + Sync>;

/// How a target's output is scanned for error locations.
#[derive(Clone)]
pub enum ErrorMatch {
    /// Regular expressions using the named groups `file`, `line`, `col`,
    /// `line_end`, `col_end` and `message`
    Patterns(Vec<String>),

    /// A function producing structured matches directly
    Function(MatchFunction),
}

impl ErrorMatch {
    /// An empty pattern list, matching nothing.
    pub fn none() -> Self {
        ErrorMatch::Patterns(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ErrorMatch::Patterns(p) => p.iter().all(|p| p.is_empty()),
            ErrorMatch::Function(_) => false,
        }
    }
}

impl Default for ErrorMatch {
    fn default() -> Self {
        ErrorMatch::none()
    }
}

impl fmt::Debug for ErrorMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMatch::Patterns(p) => f.debug_tuple("Patterns").field(p).finish(),
            ErrorMatch::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<&str> for ErrorMatch {
    fn from(pattern: &str) -> Self {
        ErrorMatch::Patterns(vec![pattern.to_string()])
    }
}

impl From<Vec<String>> for ErrorMatch {
    fn from(patterns: Vec<String>) -> Self {
        ErrorMatch::Patterns(patterns)
    }
}

/// Pre and post build hooks of a target.
#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_build: Option<PreBuildHook>,
    pub post_build: Option<PostBuildHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_build", &self.pre_build.is_some())
            .field("post_build", &self.post_build.is_some())
            .finish()
    }
}

/// A raw target as produced by a provider.
#[derive(Debug, Clone, Default)]
pub struct TargetDraft {
    pub name: Option<String>,
    pub exec: String,
    pub args: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub env: Option<BTreeMap<String, String>>,
    pub sh: Option<bool>,
    pub error_match: Option<ErrorMatch>,
    pub warning_match: Option<Vec<String>>,
    pub keymap: Option<String>,
    pub command_name: Option<String>,
    pub hooks: Hooks,
}

impl TargetDraft {
    /// Create a draft running `exec`.
    pub fn new(exec: impl Into<String>) -> Self {
        TargetDraft {
            exec: exec.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn sh(mut self, sh: bool) -> Self {
        self.sh = Some(sh);
        self
    }

    pub fn error_match(mut self, error_match: impl Into<ErrorMatch>) -> Self {
        self.error_match = Some(error_match.into());
        self
    }

    pub fn warning_match<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warning_match = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn keymap(mut self, keymap: impl Into<String>) -> Self {
        self.keymap = Some(keymap.into());
        self
    }

    pub fn command_name(mut self, command_name: impl Into<String>) -> Self {
        self.command_name = Some(command_name.into());
        self
    }

    pub fn pre_build(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.pre_build = Some(Arc::new(hook));
        self
    }

    pub fn post_build(mut self, hook: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.hooks.post_build = Some(Arc::new(hook));
        self
    }
}

/// A fully resolved, nameable build action.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub name: String,
    pub exec: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub sh: bool,
    pub error_match: ErrorMatch,
    pub warning_match: Vec<String>,
    pub keymap: Option<String>,
    command_name: Option<String>,
    pub hooks: Hooks,
}

impl TargetSpec {
    /// Name of the command invoking this target.
    pub fn command_name(&self) -> String {
        self.command_name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", COMMAND_PREFIX, self.name))
    }

    /// Run the pre-build hook, if any.
    pub fn run_pre_build(&self) {
        if let Some(hook) = &self.hooks.pre_build {
            hook();
        }
    }

    /// Run the post-build hook, if any.
    pub fn run_post_build(&self, success: bool) {
        if let Some(hook) = &self.hooks.post_build {
            hook(success);
        }
    }
}

/// Complete a provider draft.
///
/// `cwd` is the project path the provider was created for.
pub fn fill_defaults(cwd: &Path, draft: TargetDraft) -> TargetSpec {
    TargetSpec {
        name: draft.name.unwrap_or_else(|| draft.exec.clone()),
        exec: draft.exec,
        args: draft.args.unwrap_or_default(),
        cwd: draft.cwd.unwrap_or_else(|| cwd.to_path_buf()),
        env: draft.env.unwrap_or_default(),
        sh: draft.sh.unwrap_or(true),
        error_match: draft.error_match.unwrap_or_default(),
        warning_match: draft.warning_match.unwrap_or_default(),
        keymap: draft.keymap,
        command_name: draft.command_name,
        hooks: draft.hooks,
    }
}

/// Make target names unique, keeping order.
///
/// The first occurrence of a name is untouched; later ones get ` - k` with
/// the smallest `k` not already taken.
pub fn uniquify(targets: Vec<TargetSpec>) -> Vec<TargetSpec> {
    let mut taken: HashSet<String> = HashSet::with_capacity(targets.len());

    targets
        .into_iter()
        .map(|mut target| {
            if taken.contains(&target.name) {
                let base = target.name.clone();
                let mut k = 1usize;
                loop {
                    let candidate = format!("{} - {}", base, k);
                    if !taken.contains(&candidate) {
                        target.name = candidate;
                        break;
                    }
                    k += 1;
                }
            }
            taken.insert(target.name.clone());
            target
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> TargetSpec {
        fill_defaults(Path::new("/p"), TargetDraft::new("make").name(name))
    }

    fn names(targets: &[TargetSpec]) -> Vec<&str> {
        targets.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_uniquify_duplicates() {
        let targets = uniquify(vec![named("name"), named("name"), named("name"), named("name")]);
        assert_eq!(
            names(&targets),
            vec!["name", "name - 1", "name - 2", "name - 3"]
        );
    }

    #[test]
    fn test_uniquify_keeps_unique_names() {
        let targets = uniquify(vec![named("a"), named("b"), named("c")]);
        assert_eq!(names(&targets), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_uniquify_skips_taken_suffix() {
        let targets = uniquify(vec![named("x"), named("x - 1"), named("x")]);
        assert_eq!(names(&targets), vec!["x", "x - 1", "x - 2"]);
    }

    #[test]
    fn test_fill_defaults() {
        let spec = fill_defaults(Path::new("/cwd"), TargetDraft::new("echo hi"));
        assert!(spec.sh);
        assert!(spec.args.is_empty());
        assert!(spec.env.is_empty());
        assert!(spec.error_match.is_empty());
        assert!(spec.warning_match.is_empty());
        assert_eq!(spec.cwd, PathBuf::from("/cwd"));
        assert_eq!(spec.name, "echo hi");
        assert_eq!(spec.command_name(), "dockyard:trigger:echo hi");
    }

    #[test]
    fn test_fill_defaults_preserves_explicit_fields() {
        let draft = TargetDraft::new("cargo")
            .name("release")
            .args(["build", "--release"])
            .cwd("/elsewhere")
            .env("RUSTFLAGS", "-Dwarnings")
            .sh(false)
            .error_match("(?<file>[^:]+):(?<line>\\d+)")
            .keymap("ctrl-alt-r")
            .command_name("cargo:release");
        let spec = fill_defaults(Path::new("/cwd"), draft);

        assert_eq!(spec.name, "release");
        assert_eq!(spec.args, vec!["build", "--release"]);
        assert_eq!(spec.cwd, PathBuf::from("/elsewhere"));
        assert_eq!(spec.env.get("RUSTFLAGS").unwrap(), "-Dwarnings");
        assert!(!spec.sh);
        assert!(!spec.error_match.is_empty());
        assert_eq!(spec.keymap.as_deref(), Some("ctrl-alt-r"));
        assert_eq!(spec.command_name(), "cargo:release");
    }

    #[test]
    fn test_hooks_run() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let pre = Arc::clone(&calls);
        let post = Arc::clone(&calls);
        let spec = fill_defaults(
            Path::new("/p"),
            TargetDraft::new("make")
                .pre_build(move || {
                    pre.fetch_add(1, Ordering::SeqCst);
                })
                .post_build(move |ok| {
                    assert!(ok);
                    post.fetch_add(10, Ordering::SeqCst);
                }),
        );

        spec.run_pre_build();
        spec.run_post_build(true);
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }
}
