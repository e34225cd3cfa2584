//! Built-in provider reading a build file from the project root.
//!
//! `.dockyard.toml` (or `.dockyard.json`) describes a root target and an
//! optional table of named sub-targets:
//!
//! ```toml
//! cmd = "make"
//! args = ["-j4"]
//! error-match = "(?<file>[^:\\n]+):(?<line>\\d+):(?<col>\\d+): error"
//!
//! [targets.clean]
//! cmd = "make"
//! args = ["clean"]
//! ```
//!
//! The file is read from disk on every refresh.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;

use crate::core::{ErrorMatch, TargetDraft};
use crate::sources::provider::{DraftSet, Provider, ProviderFactory};
use crate::util::diagnostic::ConfigSyntaxError;

/// Build file names, in lookup order.
pub const BUILD_FILES: &[&str] = &[".dockyard.toml", ".dockyard.json"];

/// Name given to the root target when the file does not name it.
const DEFAULT_NAME: &str = "default";

/// A single pattern or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BuildFileEntry {
    cmd: Option<String>,
    name: Option<String>,
    args: Option<Vec<String>>,
    cwd: Option<PathBuf>,
    env: Option<BTreeMap<String, String>>,
    sh: Option<bool>,
    #[serde(alias = "errorMatch")]
    error_match: Option<OneOrMany>,
    #[serde(alias = "warningMatch")]
    warning_match: Option<OneOrMany>,
    keymap: Option<String>,
    #[serde(alias = "commandName")]
    command_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BuildFile {
    #[serde(flatten)]
    root: BuildFileEntry,
    #[serde(default)]
    targets: BTreeMap<String, BuildFileEntry>,
}

impl BuildFileEntry {
    fn into_draft(self, name: &str, root: &Path) -> Option<TargetDraft> {
        let cmd = self.cmd?;
        let mut draft = TargetDraft::new(cmd).name(format!("Custom: {}", name));

        draft.args = self.args;
        draft.env = self.env;
        draft.sh = self.sh;
        draft.cwd = self.cwd.map(|cwd| {
            if cwd.is_absolute() {
                cwd
            } else {
                root.join(cwd)
            }
        });
        draft.error_match = self
            .error_match
            .map(|m| ErrorMatch::Patterns(m.into_vec()));
        draft.warning_match = self.warning_match.map(OneOrMany::into_vec);
        draft.keymap = self.keymap;
        draft.command_name = self.command_name;

        Some(draft)
    }
}

/// Find the build file of a project, if any.
pub fn find_build_file(root: &Path) -> Option<PathBuf> {
    BUILD_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

/// Parse build file contents into drafts.
///
/// The root entry comes first, named sub-targets follow in name order.
pub fn parse_build_file(file: &Path, contents: &str, root: &Path) -> Result<Vec<TargetDraft>> {
    let is_json = file.extension().is_some_and(|ext| ext == "json");

    let parsed: BuildFile = if is_json {
        serde_json::from_str(contents).map_err(|e| ConfigSyntaxError {
            file: file.to_path_buf(),
            detail: e.to_string(),
        })?
    } else {
        toml::from_str(contents).map_err(|e| ConfigSyntaxError {
            file: file.to_path_buf(),
            detail: e.to_string(),
        })?
    };

    let root_name = parsed
        .root
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_NAME.to_string());

    let mut drafts = Vec::with_capacity(parsed.targets.len() + 1);
    drafts.extend(parsed.root.into_draft(&root_name, root));
    for (name, entry) in parsed.targets {
        let name = entry.name.clone().unwrap_or(name);
        drafts.extend(entry.into_draft(&name, root));
    }

    Ok(drafts)
}

/// Factory for [`BuildFileProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildFileFactory;

impl ProviderFactory for BuildFileFactory {
    fn name(&self) -> &str {
        "build-file"
    }

    fn create(&self, path: &Path) -> Arc<dyn Provider> {
        Arc::new(BuildFileProvider::new(path))
    }
}

/// Reads targets from `.dockyard.toml` / `.dockyard.json`.
#[derive(Debug, Clone)]
pub struct BuildFileProvider {
    root: PathBuf,
}

impl BuildFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BuildFileProvider { root: root.into() }
    }

    fn load(&self) -> Result<DraftSet> {
        let Some(file) = find_build_file(&self.root) else {
            return Ok(DraftSet::empty());
        };

        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read build file: {}", file.display()))?;

        let drafts = parse_build_file(&file, &contents, &self.root)?;
        tracing::debug!("{} target(s) in {}", drafts.len(), file.display());
        Ok(drafts.into())
    }
}

impl Provider for BuildFileProvider {
    fn nice_name(&self) -> String {
        "Custom file".to_string()
    }

    fn is_eligible(&self) -> bool {
        find_build_file(&self.root).is_some()
    }

    fn settings(&self) -> BoxFuture<'_, Result<DraftSet>> {
        async move { self.load() }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TOML_FILE: &str = r#"
cmd = "make"
args = ["-j4"]
error-match = "(?<file>[^:]+):(?<line>\\d+)"

[targets.clean]
cmd = "make"
args = ["clean"]
sh = false

[targets.all]
cmd = "make"
cwd = "sub"
warning-match = ["warn: (?<message>.*)"]
keymap = "ctrl-alt-a"
"#;

    #[test]
    fn test_parse_toml_orders_root_first() {
        let drafts = parse_build_file(
            Path::new("/p/.dockyard.toml"),
            TOML_FILE,
            Path::new("/p"),
        )
        .unwrap();

        let names: Vec<_> = drafts.iter().map(|d| d.name.clone().unwrap()).collect();
        assert_eq!(
            names,
            vec!["Custom: default", "Custom: all", "Custom: clean"]
        );
        assert_eq!(drafts[0].args.as_ref().unwrap(), &vec!["-j4".to_string()]);
        assert!(drafts[0].error_match.is_some());
        assert_eq!(drafts[1].cwd.as_deref(), Some(Path::new("/p/sub")));
        assert_eq!(drafts[1].keymap.as_deref(), Some("ctrl-alt-a"));
        assert_eq!(drafts[2].sh, Some(false));
    }

    #[test]
    fn test_parse_json_with_camel_case() {
        let json = r#"{
            "cmd": "npm",
            "name": "Build",
            "args": ["run", "build"],
            "errorMatch": ["(?<file>\\S+):(?<line>\\d+)"]
        }"#;
        let drafts =
            parse_build_file(Path::new("/p/.dockyard.json"), json, Path::new("/p")).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].name.as_deref(), Some("Custom: Build"));
        match drafts[0].error_match.as_ref().unwrap() {
            ErrorMatch::Patterns(p) => assert_eq!(p.len(), 1),
            other => panic!("unexpected match spec: {other:?}"),
        }
    }

    #[test]
    fn test_targets_only_file() {
        let contents = "[targets.test]\ncmd = \"cargo test\"\n";
        let drafts = parse_build_file(
            Path::new("/p/.dockyard.toml"),
            contents,
            Path::new("/p"),
        )
        .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].name.as_deref(), Some("Custom: test"));
    }

    #[test]
    fn test_syntax_error_is_typed() {
        let err = parse_build_file(
            Path::new("/p/.dockyard.toml"),
            "cmd = \"make",
            Path::new("/p"),
        )
        .unwrap_err();
        let syntax = err.downcast_ref::<ConfigSyntaxError>().unwrap();
        assert_eq!(syntax.file, PathBuf::from("/p/.dockyard.toml"));
    }

    #[tokio::test]
    async fn test_provider_reads_from_disk_every_time() {
        let tmp = TempDir::new().unwrap();
        let provider = BuildFileFactory.create(tmp.path());
        assert!(!provider.is_eligible());

        std::fs::write(tmp.path().join(".dockyard.toml"), "cmd = \"make\"\n").unwrap();
        assert!(provider.is_eligible());
        assert_eq!(provider.settings().await.unwrap().into_drafts().len(), 1);

        std::fs::write(
            tmp.path().join(".dockyard.toml"),
            "cmd = \"make\"\n[targets.x]\ncmd = \"make x\"\n",
        )
        .unwrap();
        assert_eq!(provider.settings().await.unwrap().into_drafts().len(), 2);
    }
}
