//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "frame-harvest",
    version,
    about = "Builds a category-balanced frame dataset from live Twitch broadcasts"
)]
pub struct Args {
    /// TOML configuration file (defaults to ./frame-harvest.toml if present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the dataset.
    #[arg(long, global = true)]
    pub data_root: Option<PathBuf>,

    /// Maximum number of tracked categories.
    #[arg(long, global = true)]
    pub max_categories: Option<usize>,

    /// SQLite database URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Acquire frames until stopped (Ctrl-C, SIGTERM or Enter). The default.
    Run,
    /// Drop catalog rows whose files or directories were deleted.
    Sync,
    /// Print the dataset report and every tracked category.
    Info {
        /// Refresh category names from the platform.
        #[arg(long)]
        resolve_names: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// Whether the command talks to the platform API.
    pub fn needs_platform(&self) -> bool {
        match self {
            Self::Run => true,
            Self::Sync => false,
            Self::Info { resolve_names, .. } => *resolve_names,
        }
    }
}

impl Args {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(root) = &self.data_root {
            config.data_root = root.clone();
        }
        if let Some(max) = self.max_categories {
            config.max_categories = max;
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let args = Args::try_parse_from(["frame-harvest"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "frame-harvest",
            "info",
            "--resolve-names",
            "--max-categories",
            "7",
            "--data-root",
            "/tmp/ds",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.max_categories, 7);
        assert_eq!(config.data_root, PathBuf::from("/tmp/ds"));
        assert!(matches!(
            args.command,
            Some(Command::Info {
                resolve_names: true,
                json: false
            })
        ));
        assert!(args.command.unwrap().needs_platform());
    }

    #[test]
    fn test_sync_needs_no_platform() {
        let args = Args::try_parse_from(["frame-harvest", "sync"]).unwrap();
        assert!(!args.command.unwrap().needs_platform());
    }
}
