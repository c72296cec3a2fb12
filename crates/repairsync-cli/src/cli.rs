use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "repairsync")]
#[command(about = "Inspect local sync caches and replay remote fixtures through the engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding cached collection blobs
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Path to the settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Cache scope (usually the signed-in user id)
    #[arg(long, global = true, value_name = "NAME")]
    pub scope: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or clear cached collections
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Load a remote fixture through the sync engine against the local cache
    Replay {
        /// JSON fixture shaped as { "<path>": { "<id>": record } }
        fixture: PathBuf,
        /// Only replay this collection kind
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Keep streaming changes until Ctrl-C, then flush
        #[arg(long)]
        follow: bool,
    },
    /// Manage the settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show sync metadata and record counts
    Show {
        /// Only show this collection kind
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop cached records and sync metadata
    Clear {
        /// Only clear this collection kind
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the settings file with the built-in collections
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings
    Show,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
