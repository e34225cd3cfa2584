//! Terminal presenter for the `dockyard` binary.
//!
//! The Shell renders build events for a terminal:
//! - Status lines with consistent formatting on stderr
//! - Build output passed through to stdout
//! - A spinner (via indicatif) while a build runs
//! - JSON output mode, one [`BuildEvent`] per line
//!
//! Human and JSON modes are mutually exclusive.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::events::{BuildEvent, GotoCallback, Presenter};
use crate::util::diagnostic::{Notice, NoticeLevel, Severity};

/// Shell output mode - Human and Json are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMode {
    /// Human-readable output with optional colors and a spinner.
    Human {
        verbosity: Verbosity,
        color: ColorChoice,
    },
    /// Machine-readable JSON output only.
    Json,
}

impl Default for ShellMode {
    fn default() -> Self {
        ShellMode::Human {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
        }
    }
}

/// Output verbosity level (Human mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors and build output only
    Quiet,
    #[default]
    Normal,
    /// --verbose: no spinner
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status types for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Finished,
    Selected,

    // In-progress statuses (cyan)
    Building,
    Aborting,

    // Info statuses (blue)
    Info,

    // Warning statuses (yellow)
    Aborted,
    Warning,

    // Error status (red)
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Selected => "Selected",
            Status::Building => "Building",
            Status::Aborting => "Aborting",
            Status::Info => "Info",
            Status::Aborted => "Aborted",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Selected => "\x1b[1;32m",
            Status::Building | Status::Aborting => "\x1b[1;36m",
            Status::Info => "\x1b[1;34m",
            Status::Aborted | Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }

    /// Width statuses are right-aligned to.
    fn width(&self) -> usize {
        12
    }
}

impl From<NoticeLevel> for Status {
    fn from(level: NoticeLevel) -> Self {
        match level {
            NoticeLevel::Error => Status::Error,
            NoticeLevel::Warning => Status::Warning,
            NoticeLevel::Info => Status::Info,
            NoticeLevel::Success => Status::Finished,
        }
    }
}

/// Central shell for all CLI output.
pub struct Shell {
    mode: ShellMode,
    use_color: bool,
    spinner: Mutex<Option<ProgressBar>>,
    started: Mutex<Option<Instant>>,
}

impl Shell {
    /// Create a new shell with the given mode.
    pub fn new(mode: ShellMode) -> Self {
        let use_color = match &mode {
            ShellMode::Json => false,
            ShellMode::Human { color, .. } => match color {
                ColorChoice::Auto => io::stderr().is_terminal(),
                ColorChoice::Always => true,
                ColorChoice::Never => false,
            },
        };

        Shell {
            mode,
            use_color,
            spinner: Mutex::new(None),
            started: Mutex::new(None),
        }
    }

    /// Create a shell from CLI flags with proper precedence.
    ///
    /// JSON mode takes precedence over quiet/verbose.
    pub fn from_flags(
        quiet: bool,
        verbose: bool,
        color: ColorChoice,
        message_format_json: bool,
    ) -> Self {
        let mode = if message_format_json {
            ShellMode::Json
        } else {
            let verbosity = if quiet {
                Verbosity::Quiet
            } else if verbose {
                Verbosity::Verbose
            } else {
                Verbosity::Normal
            };
            ShellMode::Human { verbosity, color }
        };

        Shell::new(mode)
    }

    pub fn mode(&self) -> &ShellMode {
        &self.mode
    }

    pub fn is_quiet(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Quiet,
                ..
            }
        )
    }

    pub fn is_verbose(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Verbose,
                ..
            }
        )
    }

    pub fn is_json(&self) -> bool {
        matches!(self.mode, ShellMode::Json)
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`
    ///
    /// In quiet mode, only Error status is printed. In JSON mode, messages
    /// are ignored.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_json() || (self.is_quiet() && status != Status::Error) {
            return;
        }

        let line = format!("{} {}", self.format_status(status), msg);
        self.suspend(|| eprintln!("{}", line));
    }

    /// Print an info message.
    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: impl Display) {
        self.status(Status::Error, msg);
    }

    /// Print a build event to stdout. Only works in JSON mode.
    pub fn json_event(&self, event: &BuildEvent) {
        if !self.is_json() {
            return;
        }

        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", event.to_json());
        let _ = stdout.flush();
    }

    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        let width = status.width();

        if self.use_color {
            format!("{}{:>width$}\x1b[0m", status.color_code(), text, width = width)
        } else {
            format!("{:>width$}", text, width = width)
        }
    }

    /// Run `f` with the spinner hidden.
    fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        let spinner = self
            .spinner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        match spinner {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    fn start_spinner(&self) {
        *self.started.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        if self.is_json() || self.is_quiet() || self.is_verbose() || !io::stderr().is_terminal() {
            return;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} {elapsed}") {
            pb.set_style(style);
        }
        pb.set_message("building");
        pb.enable_steady_tick(Duration::from_millis(100));
        *self.spinner.lock().unwrap_or_else(|p| p.into_inner()) = Some(pb);
    }

    /// Stop the spinner; returns the time since the build started.
    fn stop_spinner(&self) -> Option<Duration> {
        if let Some(pb) = self.spinner.lock().unwrap_or_else(|p| p.into_inner()).take() {
            pb.finish_and_clear();
        }
        self.started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .map(|t| t.elapsed())
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("mode", &self.mode)
            .field("use_color", &self.use_color)
            .finish_non_exhaustive()
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(ShellMode::default())
    }
}

impl Presenter for Shell {
    fn append(&self, text: &str) {
        if self.is_json() {
            self.json_event(&BuildEvent::Output {
                text: text.to_string(),
            });
            return;
        }

        self.suspend(|| {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        });
    }

    fn build_started(&self) {
        self.json_event(&BuildEvent::BuildStarted);
        self.start_spinner();
    }

    fn build_finished(&self, success: bool) {
        let elapsed = self.stop_spinner();
        self.json_event(&BuildEvent::BuildFinished { success });

        let took = elapsed.map(format_duration).unwrap_or_default();
        if success {
            self.status(Status::Finished, format!("build succeeded in {}", took));
        } else {
            self.status(Status::Error, format!("build failed after {}", took));
        }
    }

    fn build_abort_initiated(&self) {
        self.json_event(&BuildEvent::BuildAbortInitiated);
        self.status(Status::Aborting, "build");
    }

    fn build_aborted(&self) {
        self.stop_spinner();
        self.json_event(&BuildEvent::BuildAborted);
        self.status(Status::Aborted, "build");
    }

    fn notify(&self, notice: &Notice) {
        self.json_event(&BuildEvent::notice(notice));
        if self.is_json() {
            return;
        }

        let mut msg = notice.title.clone();
        for line in notice.detail.lines() {
            msg.push_str("\n  → ");
            msg.push_str(line);
        }
        if self.is_verbose() {
            if let Some(trace) = &notice.trace {
                msg.push_str("\n\n");
                msg.push_str(trace);
            }
        }
        self.status(notice.level.into(), msg);
    }

    fn replace_annotated_output(&self, html: &str, _goto: GotoCallback) {
        // The terminal already shows the raw output.
        self.json_event(&BuildEvent::AnnotatedOutput {
            html: html.to_string(),
        });
    }

    fn scroll_to_match(&self, id: usize, severity: Severity) {
        self.json_event(&BuildEvent::MatchSelected {
            id,
            severity: severity.to_string(),
        });
    }

    fn reset(&self) {
        self.stop_spinner();
        self.json_event(&BuildEvent::Reset);
    }

    fn hide(&self) {
        self.json_event(&BuildEvent::Hide);
    }

    fn toggle(&self) {
        self.json_event(&BuildEvent::Toggle);
    }
}

/// Format a duration in a human-readable way.
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
