//! `dockyard watch` command
//!
//! Acts as a build-on-save host: every debounced file change inside the
//! project is reported to the controller as a save. Runs until interrupted.

use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use tokio::sync::mpsc;

use dockyard::sources::build_file::BUILD_FILES;
use dockyard::util::Shell;

use crate::cli::WatchArgs;
use crate::session::Session;

/// Directories whose changes never trigger a build.
const IGNORED_DIRS: &[&str] = &[".git", ".hg", ".svn", "target", "node_modules"];

pub async fn execute(args: WatchArgs, shell: Arc<Shell>) -> Result<ExitCode> {
    let session = Session::open_with(&args.project, shell.clone(), |settings| {
        settings.build_on_save = true;
    })?;

    if let Some(name) = &args.target {
        session.activate(name).await?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(
        Duration::from_millis(args.debounce_ms),
        move |result: DebounceEventResult| {
            let _ = tx.send(result);
        },
    )
    .context("failed to initialize file watcher")?;
    debouncer
        .watcher()
        .watch(&session.root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", session.root.display()))?;

    // Initial build
    let _ = session.controller.build().await;
    shell.note(format!("watching {} for changes", session.root.display()));

    loop {
        let result = tokio::select! {
            result = rx.recv() => match result {
                Some(result) => result,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.interrupt().await;
                break;
            }
        };
        let events = match result {
            Ok(events) => events,
            Err(e) => {
                shell.warn(format!("watch error: {}", e));
                continue;
            }
        };

        let changed: Vec<PathBuf> = events
            .into_iter()
            .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
            .map(|e| e.path)
            .filter(|p| is_relevant(&session.root, p))
            .collect();
        let Some(saved) = changed.first() else {
            continue;
        };

        if changed.iter().any(|p| is_build_file(p)) {
            session.targets().refresh_targets(None).await;
        }

        tracing::debug!("{} file(s) changed, first {}", changed.len(), saved.display());
        session.workspace.set_active_file(saved.clone());
        session.controller.on_buffer_saved(saved).await;
    }

    Ok(ExitCode::SUCCESS)
}

fn is_build_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| BUILD_FILES.contains(&name))
}

/// Whether a change to `path` should count as a save.
fn is_relevant(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    !relative.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_directories() {
        let root = Path::new("/proj");
        assert!(is_relevant(root, Path::new("/proj/src/main.c")));
        assert!(!is_relevant(root, Path::new("/proj/.git/index")));
        assert!(!is_relevant(root, Path::new("/proj/target/debug/app")));
        assert!(!is_relevant(root, Path::new("/elsewhere/main.c")));
    }

    #[test]
    fn test_build_file_detection() {
        assert!(is_build_file(Path::new("/proj/.dockyard.toml")));
        assert!(is_build_file(Path::new("/proj/.dockyard.json")));
        assert!(!is_build_file(Path::new("/proj/Makefile")));
    }
}
