//! Terminal host: the workspace and prompter behind every command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncBufReadExt, BufReader};

use dockyard::builder::{BuildController, BuildState, Prompter, TargetChoice, Workspace};
use dockyard::matcher::Match;
use dockyard::ops::TargetManager;
use dockyard::sources::ProviderRegistry;
use dockyard::util::config::{global_config_path, load_settings, project_config_path};
use dockyard::util::{Settings, Shell};

use crate::cli::ProjectArgs;

/// A single project directory seen from the terminal.
///
/// There are no editor buffers: nothing is ever unsaved, and the active file
/// is whatever changed last in watch mode.
#[derive(Debug)]
pub struct TerminalWorkspace {
    root: PathBuf,
    active_file: Mutex<Option<PathBuf>>,
}

impl TerminalWorkspace {
    pub fn new(root: PathBuf) -> Self {
        TerminalWorkspace {
            root,
            active_file: Mutex::new(None),
        }
    }

    pub fn set_active_file(&self, file: PathBuf) {
        *self.active_file.lock().unwrap_or_else(|p| p.into_inner()) = Some(file);
    }
}

impl Workspace for TerminalWorkspace {
    fn project_paths(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    fn active_file(&self) -> Option<PathBuf> {
        self.active_file
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn open_file(&self, path: &Path, row: u32, column: u32) -> Result<()> {
        tracing::info!("{}:{}:{}", path.display(), row + 1, column + 1);
        Ok(())
    }
}

/// Asks on stderr, reads answers from stdin.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm_save(&self) -> BoxFuture<'_, bool> {
        async { true }.boxed()
    }

    fn select_target(&self, choices: Vec<TargetChoice>) -> BoxFuture<'_, Option<String>> {
        async move {
            if choices.is_empty() {
                return None;
            }

            for (i, choice) in choices.iter().enumerate() {
                let marker = if choice.active { " (active)" } else { "" };
                eprintln!("{:>4}) {}{}", i + 1, choice.name, marker);
            }
            eprint!("Select a target [1-{}]: ", choices.len());

            let mut line = String::new();
            let mut stdin = BufReader::new(tokio::io::stdin());
            match stdin.read_line(&mut line).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }

            let answer = line.trim();
            let chosen = match answer.parse::<usize>() {
                Ok(n) => n.checked_sub(1).and_then(|i| choices.get(i)),
                Err(_) => choices.iter().find(|c| c.name == answer),
            };
            chosen.map(|c| c.name.clone())
        }
        .boxed()
    }
}

/// Everything one command needs: settings, targets and a controller.
pub struct Session {
    pub root: PathBuf,
    pub shell: Arc<Shell>,
    pub workspace: Arc<TerminalWorkspace>,
    pub controller: BuildController,
}

impl Session {
    pub fn open(project: &ProjectArgs, shell: Arc<Shell>) -> Result<Self> {
        Self::open_with(project, shell, |_| {})
    }

    /// Open a session, adjusting the loaded settings first.
    pub fn open_with(
        project: &ProjectArgs,
        shell: Arc<Shell>,
        adjust: impl FnOnce(&mut Settings),
    ) -> Result<Self> {
        let root = match &project.path {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("failed to get current directory")?,
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("project directory not found: {}", root.display()))?;

        let mut settings = load_settings(global_config_path().as_deref(), &project_config_path(&root));
        adjust(&mut settings);
        tracing::debug!("settings for {}: {:?}", root.display(), settings);

        let targets = TargetManager::new(ProviderRegistry::with_defaults(), settings, shell.clone());
        targets.add_path(&root);

        let workspace = Arc::new(TerminalWorkspace::new(root.clone()));
        let controller = BuildController::new(
            targets,
            shell.clone(),
            workspace.clone(),
            Arc::new(StdinPrompter),
            None,
        );

        Ok(Session {
            root,
            shell,
            workspace,
            controller,
        })
    }

    pub fn targets(&self) -> &TargetManager {
        self.controller.targets()
    }

    /// Make `name` the active target.
    ///
    /// Accepts the full target name or the part after the provider prefix
    /// (`clean` for `Custom: clean`).
    pub async fn activate(&self, name: &str) -> Result<()> {
        let targets = self.targets().get_targets(&self.root).await;
        let found = targets
            .iter()
            .find(|t| t.name == name)
            .or_else(|| {
                targets
                    .iter()
                    .find(|t| t.name.split_once(": ").is_some_and(|(_, short)| short == name))
            });

        match found {
            Some(target) if self.targets().set_active_target(&self.root, &target.name) => Ok(()),
            _ => bail!(
                "no target named `{}` in {}; run `dockyard targets` to list them",
                name,
                self.root.display()
            ),
        }
    }

    /// Build the active target and report its matches.
    pub async fn build(&self) -> ExitCode {
        if self.controller.build().await.is_err() {
            // Already reported through the shell.
            return ExitCode::FAILURE;
        }
        self.finish().await
    }

    /// Wait for the running build and report its matches.
    pub async fn finish(&self) -> ExitCode {
        tokio::select! {
            _ = self.controller.wait() => {}
            _ = tokio::signal::ctrl_c() => {
                self.interrupt().await;
                return ExitCode::from(130);
            }
        }
        self.report_matches();

        if self.controller.last_success() == Some(true) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// Kill a running build on Ctrl-C.
    ///
    /// Builds lead their own process group, so the terminal's interrupt
    /// never reaches them directly.
    pub async fn interrupt(&self) {
        if matches!(
            self.controller.state(),
            BuildState::Running | BuildState::Aborting
        ) {
            self.controller.stop();
            self.controller.wait().await;
        }
    }

    fn report_matches(&self) {
        let matcher = self.controller.matcher();
        let cwd = matcher.cwd();
        let here = std::env::current_dir().unwrap_or_else(|_| self.root.clone());

        for m in matcher.matches() {
            if self.shell.is_json() {
                let line = serde_json::json!({ "reason": "match", "match": m });
                println!("{}", line);
            } else {
                println!("{}", format_match(&m, &cwd, &here));
            }
        }
    }
}

/// `file:line:col severity message`, with the file relative to `here`.
fn format_match(m: &Match, cwd: &Path, here: &Path) -> String {
    let mut location = match m.resolve(cwd) {
        Some(file) => pathdiff::diff_paths(&file, here)
            .unwrap_or(file)
            .display()
            .to_string(),
        None => "<output>".to_string(),
    };
    if let Some(line) = m.line {
        location.push_str(&format!(":{}", line));
        if let Some(col) = m.col {
            location.push_str(&format!(":{}", col));
        }
    }

    match m.text() {
        Some(text) => format!("{} {} {}", location, m.severity, text),
        None => format!("{} {}", location, m.severity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard::matcher::FunctionMatch;
    use dockyard::Severity;

    #[test]
    fn test_format_match_relative_to_cwd() {
        let m = Match::from_function(
            0,
            FunctionMatch::at("src/main.c")
                .line(3)
                .col(7)
                .severity(Severity::Warning)
                .message("unused variable"),
        );
        assert_eq!(
            format_match(&m, Path::new("/proj"), Path::new("/proj")),
            "src/main.c:3:7 warning unused variable"
        );
        assert_eq!(
            format_match(&m, Path::new("/proj"), Path::new("/proj/src")),
            "main.c:3:7 warning unused variable"
        );
    }

    #[test]
    fn test_format_match_without_location() {
        let m = Match::from_function(0, FunctionMatch::default().message("boom"));
        assert_eq!(
            format_match(&m, Path::new("/proj"), Path::new("/proj")),
            "<output> error boom"
        );
    }
}
