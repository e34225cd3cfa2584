//! Error taxonomy and user-facing notices.
//!
//! Every failure a user can see carries a short title plus a detail string.
//! [`Error`] is what the engine produces; [`Notice`] is what the presenter
//! receives.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common hint messages for consistent error reporting.
pub mod hints {
    /// A direct (non-shell) executable path contains whitespace.
    pub const EXEC_WHITESPACE: &str = "`cmd` cannot contain space. Use `args` for arguments.";

    /// No target could be resolved for the project.
    pub const NO_TARGET: &str = "help: Add a `.dockyard.toml` to the project root";
}

/// Severity of a matched output location.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "err" | "error" => Ok(Severity::Error),
            "warn" | "warning" => Ok(Severity::Warning),
            "info" | "note" | "trace" => Ok(Severity::Info),
            _ => Err(format!(
                "invalid severity '{}'; expected 'error', 'warning', or 'info'",
                s
            )),
        }
    }
}

/// Why a navigation request could not be honoured.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no match with id {id}")]
    UnknownMatch { id: usize },

    #[error("did not match any file, no file to open")]
    NoFile { id: usize },

    #[error("matched file does not exist: {}", .path.display())]
    FileNotFound { path: PathBuf },
}

/// Errors produced by the build engine.
#[derive(Debug, Clone, Error, MietteDiagnostic)]
pub enum Error {
    /// A structured build file could not be parsed.
    #[error("invalid build file `{}`: {detail}", .file.display())]
    #[diagnostic(code(dockyard::config_syntax))]
    ConfigSyntax { file: PathBuf, detail: String },

    /// A provider failed while producing its targets.
    #[error("provider `{provider}` failed: {detail}")]
    #[diagnostic(
        code(dockyard::provider),
        help("this is likely a bug in the provider, run with --verbose for more details")
    )]
    Provider {
        provider: String,
        detail: String,
        trace: Option<String>,
    },

    /// The build command could not be started.
    #[error("unable to execute{}: {program}", shell_suffix(.shell))]
    #[diagnostic(code(dockyard::spawn))]
    Spawn {
        program: String,
        shell: bool,
        detail: String,
        #[help]
        hint: Option<String>,
    },

    /// An error-match pattern does not compile.
    #[error("invalid error-match pattern `{pattern}`")]
    #[diagnostic(code(dockyard::pattern))]
    Pattern { pattern: String, detail: String },

    /// A match could not be opened.
    #[error(transparent)]
    #[diagnostic(code(dockyard::navigation))]
    Navigation(#[from] NavigationError),

    /// A user-supplied match function failed.
    #[error("error-match function failed: {detail}")]
    #[diagnostic(code(dockyard::match_function))]
    MatchFunction { detail: String },

    /// There is nothing to build.
    #[error("no eligible build target for `{}`", .path.display())]
    #[diagnostic(
        code(dockyard::no_target),
        help("add a `.dockyard.toml` to the project root")
    )]
    NoTarget { path: PathBuf },
}

fn shell_suffix(shell: &bool) -> &'static str {
    if *shell {
        " with shell"
    } else {
        ""
    }
}

impl Error {
    /// Short title shown to the user.
    pub fn title(&self) -> String {
        match self {
            Error::ConfigSyntax { .. } => "Invalid build file.".to_string(),
            Error::Provider { provider, .. } => {
                format!("Failed to load build targets from {}.", provider)
            }
            Error::Spawn { shell: true, .. } => "Unable to execute with shell.".to_string(),
            Error::Spawn { .. } => "Unable to execute.".to_string(),
            Error::Pattern { .. } => "Error matching failed!".to_string(),
            Error::Navigation(_) => "Error matching failed!".to_string(),
            Error::MatchFunction { .. } => "Error matching function failed!".to_string(),
            Error::NoTarget { .. } => "No eligible build target.".to_string(),
        }
    }

    /// Detail text shown below the title.
    pub fn detail(&self) -> String {
        match self {
            Error::ConfigSyntax { file, detail } => format!("{}\n{}", file.display(), detail),
            Error::Provider { detail, .. } => detail.clone(),
            Error::Spawn {
                program,
                detail,
                hint,
                ..
            } => match hint {
                Some(hint) => format!("{}: {}\n{}", program, detail, hint),
                None => format!("{}: {}", program, detail),
            },
            Error::Pattern { pattern, detail } => format!("{}\n{}", pattern, detail),
            Error::Navigation(e) => e.to_string(),
            Error::MatchFunction { detail } => detail.clone(),
            Error::NoTarget { path } => format!(
                "No provider produced a target for {}.\n{}",
                path.display(),
                hints::NO_TARGET
            ),
        }
    }

    /// Whether this failure aborts the current build attempt.
    pub fn aborts_build(&self) -> bool {
        matches!(
            self,
            Error::Spawn { .. } | Error::ConfigSyntax { .. } | Error::NoTarget { .. }
        )
    }
}

/// Returned by providers whose build file cannot be parsed.
///
/// Providers return it inside an `anyhow::Error`; discovery downcasts to tell
/// syntax errors apart from other provider failures.
#[derive(Debug, Clone, Error)]
#[error("{}: {detail}", .file.display())]
pub struct ConfigSyntaxError {
    pub file: PathBuf,
    pub detail: String,
}

impl From<ConfigSyntaxError> for Error {
    fn from(e: ConfigSyntaxError) -> Self {
        Error::ConfigSyntax {
            file: e.file,
            detail: e.detail,
        }
    }
}

/// Level of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Error,
    Warning,
    Info,
    Success,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeLevel::Error => write!(f, "error"),
            NoticeLevel::Warning => write!(f, "warning"),
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Success => write!(f, "success"),
        }
    }
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: String,
    /// Error chain for unexpected failures
    pub trace: Option<String>,
    pub dismissable: bool,
}

impl Notice {
    fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Notice {
            level,
            title: title.into(),
            detail: String::new(),
            trace: None,
            dismissable: false,
        }
    }

    /// Create an error notice.
    pub fn error(title: impl Into<String>) -> Self {
        Notice::new(NoticeLevel::Error, title)
    }

    /// Create a warning notice.
    pub fn warning(title: impl Into<String>) -> Self {
        Notice::new(NoticeLevel::Warning, title)
    }

    /// Create an informational notice.
    pub fn info(title: impl Into<String>) -> Self {
        Notice::new(NoticeLevel::Info, title)
    }

    /// Add detail text.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Attach an error chain.
    pub fn with_trace(mut self, trace: Option<String>) -> Self {
        self.trace = trace;
        self
    }

    /// Mark the notice dismissable.
    pub fn dismissable(mut self) -> Self {
        self.dismissable = true;
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl From<&Error> for Notice {
    fn from(e: &Error) -> Self {
        let notice = match e {
            Error::Pattern { .. } | Error::Navigation(_) => Notice::warning(e.title()),
            _ => Notice::error(e.title()),
        };
        let trace = match e {
            Error::Provider { trace, .. } => trace.clone(),
            _ => None,
        };
        let notice = notice.with_detail(e.detail()).with_trace(trace);
        match e {
            Error::Provider { .. } | Error::MatchFunction { .. } => notice.dismissable(),
            _ => notice,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.title)?;
        if !self.detail.is_empty() {
            for line in self.detail.lines() {
                write!(f, "\n  → {}", line)?;
            }
        }
        Ok(())
    }
}
