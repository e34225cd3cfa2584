//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use dockyard::util::shell::ColorChoice;

/// Dockyard - discover build targets, run them and navigate their errors
#[derive(Parser)]
#[command(name = "dockyard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and build output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto", env = "DOCKYARD_COLOR")]
    pub color: ColorChoice,

    /// Output format for build events
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the build targets of a project
    Targets(TargetsArgs),

    /// Run the active (or named) build target
    Build(BuildArgs),

    /// Pick the active target interactively
    Select(SelectArgs),

    /// Build whenever a file in the project changes
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long, short = 'C')]
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct TargetsArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Target to build instead of the active one
    #[arg(long, short)]
    pub target: Option<String>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args)]
pub struct SelectArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Target to build instead of the active one
    #[arg(long, short)]
    pub target: Option<String>,

    /// Debounce delay in milliseconds
    #[arg(long, default_value_t = 200)]
    pub debounce_ms: u64,

    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: CompletionShell,
}
