//! CLI argument parsing for ossync

use crate::config::Config;
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// ossync - keep a directory in sync with a remote content store
#[derive(Parser, Debug)]
#[command(name = "ossync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make a local directory match a remote directory
    Download(TransferArgs),

    /// Make a remote directory match a local directory
    Upload(UploadArgs),

    /// Manage remote sync directories
    #[command(subcommand)]
    Dirs(DirsCommand),

    /// Show sync version and space usage of a remote directory
    Status(StatusArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Options shared by every command
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Configuration file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a local directory as the remote store instead of the sync API
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Skip objects larger than this (e.g. 100M, 1G)
    #[arg(long, global = true)]
    pub max_size: Option<String>,

    /// Number of parallel transfers
    #[arg(short = 'j', long, global = true)]
    pub jobs: Option<usize>,

    /// Ignore pattern (can be specified multiple times)
    #[arg(long = "ignore", action = clap::ArgAction::Append, global = true)]
    pub ignore: Vec<String>,
}

impl CommonArgs {
    /// Load the config file and apply command-line overrides
    pub fn to_config(&self) -> Result<Config> {
        let mut config = if let Some(ref path) = self.config {
            Config::load_from(path)?
        } else {
            Config::load().unwrap_or_default()
        };

        if let Some(ref size) = self.max_size {
            config.max_object_size = Config::parse_size(size)?;
        }
        if let Some(jobs) = self.jobs {
            config.pool_size = jobs;
        }
        if !self.ignore.is_empty() {
            config.ignore = self.ignore.clone();
        }

        Ok(config)
    }
}

/// Arguments for the download command
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Local directory
    pub local: PathBuf,

    /// Remote directory path
    pub remote: String,

    /// Startup or shutdown pass: short fetch timeout, progress to the log
    #[arg(long)]
    pub boot: bool,

    /// Show a progress bar
    #[arg(short = 'P', long)]
    pub progress: bool,
}

/// Arguments for the upload command
#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Device that last wrote the remote index
    #[arg(long, default_value = "")]
    pub remote_device: String,
}

#[derive(Subcommand, Debug)]
pub enum DirsCommand {
    /// List remote sync directories
    List,

    /// Create a remote sync directory
    Create {
        /// Directory name
        name: String,
    },

    /// Remove a remote directory and everything in it
    Remove {
        /// Remote directory path
        dir: String,
    },
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Remote directory path
    pub dir: String,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the configuration file path
    #[arg(long)]
    pub path: bool,

    /// Create default configuration file
    #[arg(long)]
    pub init: bool,
}
