//! Placeholder substitution in target commands.
//!
//! Before spawning, `exec`, every argument, `cwd` and every env value go
//! through [`PlaceholderContext::replace`]:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{PROJECT_PATH}` | project path the build runs for |
//! | `{FILE_ACTIVE}` | active file |
//! | `{FILE_ACTIVE_PATH}` | directory of the active file |
//! | `{FILE_ACTIVE_NAME}` | file name of the active file |
//! | `{FILE_ACTIVE_NAME_BASE}` | file name without extension |
//! | `{FILE_ACTIVE_CURSOR_ROW}` | 1-based cursor row |
//! | `{FILE_ACTIVE_CURSOR_COLUMN}` | 1-based cursor column |
//! | `{SELECTION}` | selected text |
//! | `{REPO_BRANCH_SHORT}` | short name of the checked-out git branch |
//! | `$NAME` | environment variable, target env first |
//!
//! Placeholders without a value (no active file, not a repository, unknown
//! variable) are left as written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use git2::Repository;
use regex::{Captures, Regex};

use crate::builder::host::{Cursor, Workspace};

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\w+)").expect("env var pattern is valid"))
}

/// Values placeholders are replaced with.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext {
    project_path: PathBuf,
    active_file: Option<PathBuf>,
    selection: Option<String>,
    cursor: Option<Cursor>,
    repo_branch: Option<String>,
    env: BTreeMap<String, String>,
}

impl PlaceholderContext {
    /// A context with only the project path set.
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        PlaceholderContext {
            project_path: project_path.into(),
            ..Default::default()
        }
    }

    /// Snapshot the workspace for a build of `project_path`.
    ///
    /// The environment is the process environment overlaid with
    /// `target_env`.
    pub fn capture(
        workspace: &dyn Workspace,
        project_path: &Path,
        target_env: &BTreeMap<String, String>,
    ) -> Self {
        let mut env: BTreeMap<String, String> = std::env::vars().collect();
        env.extend(target_env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let active_file = workspace
            .active_file()
            .map(|f| std::fs::canonicalize(&f).unwrap_or(f));

        PlaceholderContext {
            project_path: project_path.to_path_buf(),
            active_file,
            selection: workspace.selection(),
            cursor: workspace.cursor(),
            repo_branch: repo_branch(project_path),
            env,
        }
    }

    pub fn active_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.active_file = Some(path.into());
        self
    }

    pub fn selection(mut self, text: impl Into<String>) -> Self {
        self.selection = Some(text.into());
        self
    }

    pub fn cursor(mut self, row: u32, column: u32) -> Self {
        self.cursor = Some(Cursor { row, column });
        self
    }

    pub fn repo_branch(mut self, branch: impl Into<String>) -> Self {
        self.repo_branch = Some(branch.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Substitute every placeholder in `value`.
    pub fn replace(&self, value: &str) -> String {
        let mut out = env_var_regex()
            .replace_all(value, |caps: &Captures<'_>| {
                self.env
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        out = out.replace("{PROJECT_PATH}", &self.project_path.display().to_string());

        if let Some(file) = &self.active_file {
            let dir = file.parent().map(|p| p.display().to_string());
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned());
            let base = file.file_stem().map(|n| n.to_string_lossy().into_owned());

            // Longer names first so `{FILE_ACTIVE}` does not eat their prefix.
            if let Some(cursor) = self.cursor {
                out = out
                    .replace("{FILE_ACTIVE_CURSOR_ROW}", &(cursor.row + 1).to_string())
                    .replace("{FILE_ACTIVE_CURSOR_COLUMN}", &(cursor.column + 1).to_string());
            }
            if let Some(base) = base {
                out = out.replace("{FILE_ACTIVE_NAME_BASE}", &base);
            }
            if let Some(name) = name {
                out = out.replace("{FILE_ACTIVE_NAME}", &name);
            }
            if let Some(dir) = dir {
                out = out.replace("{FILE_ACTIVE_PATH}", &dir);
            }
            out = out.replace("{FILE_ACTIVE}", &file.display().to_string());
            out = out.replace("{SELECTION}", self.selection.as_deref().unwrap_or_default());
        }

        if let Some(branch) = &self.repo_branch {
            out = out.replace("{REPO_BRANCH_SHORT}", branch);
        }

        out
    }

    /// Substitute placeholders in every string of a JSON value.
    ///
    /// Numbers, booleans and null come back unchanged; arrays and objects are
    /// walked, object keys are kept.
    pub fn replace_value(&self, value: &serde_json::Value) -> serde_json::Value {
        use serde_json::Value;

        match value {
            Value::String(s) => Value::String(self.replace(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.replace_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.replace_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Short name of the branch checked out in the repository containing `path`.
fn repo_branch(path: &Path) -> Option<String> {
    let repo = Repository::discover(path).ok()?;
    let head = repo.head().ok()?;
    let branch = head.shorthand().map(str::to_string);
    if branch.is_none() {
        tracing::debug!("HEAD of {} has no short name", path.display());
    }
    branch
}
