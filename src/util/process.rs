//! Subprocess spawning for build commands.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::util::diagnostic::{hints, Error};

/// Builder for a build subprocess.
///
/// Output streams are always piped so the caller can forward them; stdin is
/// closed.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    shell: bool,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        ProcessBuilder {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            shell: false,
        }
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Run the command line through the platform shell.
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// The program and arguments actually handed to the OS.
    pub fn command_line(&self) -> (String, Vec<String>) {
        if !self.shell {
            return (self.program.clone(), self.args.clone());
        }

        let line = self.display_command();
        if cfg!(windows) {
            (
                "cmd".to_string(),
                vec!["/s".to_string(), "/c".to_string(), line],
            )
        } else {
            ("/bin/sh".to_string(), vec!["-c".to_string(), line])
        }
    }

    fn build_command(&self) -> Command {
        let (program, args) = self.command_line();
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(&self.env);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        // Lead a fresh group so the whole tree can be signalled.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// Spawn the process.
    ///
    /// On unix the child leads its own process group; see [`kill_tree`].
    pub fn spawn(&self) -> Result<Child, Error> {
        tracing::debug!("spawning `{}`", self.display_command());
        self.build_command()
            .spawn()
            .map_err(|e| self.spawn_error(&e))
    }

    fn spawn_error(&self, err: &io::Error) -> Error {
        let mut hint = Vec::new();

        if !self.shell && self.program.chars().any(char::is_whitespace) {
            hint.push(hints::EXEC_WHITESPACE.to_string());
            if let Some(first) = self.program.split_whitespace().next() {
                if let Some(found) = find_executable(first) {
                    hint.push(format!(
                        "`{}` is {}; move the rest of cmd into args.",
                        first,
                        found.display()
                    ));
                }
            }
        }

        if err.kind() == io::ErrorKind::NotFound {
            let cwd = self
                .cwd
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".to_string());
            hint.push(format!(
                "Make sure cmd:'{}' and cwd:'{}' exists and have correct access permissions.",
                self.program, cwd
            ));
            hint.push(format!(
                "Binaries are found in these folders: {}",
                std::env::var("PATH").unwrap_or_default()
            ));
        }

        Error::Spawn {
            program: self.program.clone(),
            shell: self.shell,
            detail: err.to_string(),
            hint: if hint.is_empty() {
                None
            } else {
                Some(hint.join("\n"))
            },
        }
    }

    /// Display the command for messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Kill a spawned build together with every process it started.
///
/// `pid` must be captured right after spawning, the child may already be
/// reaped. Falls back to killing only the direct child.
pub fn kill_tree(child: &mut Child, pid: Option<u32>) -> io::Result<()> {
    if let Some(pid) = pid {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => return Ok(()),
                Err(e) => tracing::debug!("failed to signal process group {}: {}", pid, e),
            }
        }

        #[cfg(windows)]
        {
            let status = std::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(status) if status.success() => return Ok(()),
                Ok(status) => tracing::debug!("taskkill for {} exited with {}", pid, status),
                Err(e) => tracing::debug!("failed to run taskkill for {}: {}", pid, e),
            }
        }
    }

    child.start_kill()
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("make").args(["-j", "4", "all"]);
        assert_eq!(pb.display_command(), "make -j 4 all");
    }

    #[test]
    fn test_shell_wraps_command_line() {
        let pb = ProcessBuilder::new("echo").args(["hi"]).shell(true);
        let (program, args) = pb.command_line();
        if cfg!(windows) {
            assert_eq!(program, "cmd");
            assert_eq!(args.last().unwrap(), "echo hi");
        } else {
            assert_eq!(program, "/bin/sh");
            assert_eq!(args, vec!["-c".to_string(), "echo hi".to_string()]);
        }
    }

    #[test]
    fn test_direct_command_line_is_untouched() {
        let pb = ProcessBuilder::new("cargo").args(["build", "--release"]);
        let (program, args) = pb.command_line();
        assert_eq!(program, "cargo");
        assert_eq!(args, vec!["build", "--release"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_pipes_output() {
        let child = ProcessBuilder::new("echo")
            .args(["$GREETING"])
            .env("GREETING", "hello")
            .shell(true)
            .spawn()
            .unwrap();
        let output = child.wait_with_output().await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_tree_reaches_grandchildren() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("marker");
        let mut child = ProcessBuilder::new(format!("(sleep 1; touch '{}') & wait", marker.display()))
            .shell(true)
            .spawn()
            .unwrap();
        let pid = child.id();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        kill_tree(&mut child, pid).unwrap();
        assert!(!child.wait().await.unwrap().success());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = ProcessBuilder::new("dockyard-no-such-program")
            .spawn()
            .unwrap_err();
        match err {
            Error::Spawn { shell, hint, .. } => {
                assert!(!shell);
                assert!(hint.unwrap().contains("Binaries are found in these folders"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_whitespace_hint() {
        let err = ProcessBuilder::new("make all").spawn().unwrap_err();
        match err {
            Error::Spawn { hint, .. } => {
                assert!(hint.unwrap().contains("cannot contain space"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_whitespace_hint_names_resolved_program() {
        let err = ProcessBuilder::new("sh -c true").spawn().unwrap_err();
        match err {
            Error::Spawn { hint, .. } => {
                assert!(hint.unwrap().contains("`sh` is "));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
