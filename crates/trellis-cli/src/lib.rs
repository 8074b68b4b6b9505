//! Trellis CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Trellis - Rolling updates for Kubernetes instance groups
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replace outdated instance group members one at a time
    RollingUpdate(commands::rolling_update::RollingUpdateArgs),
    /// Delete an instance group and its backing cloud pool
    DeleteInstanceGroup(commands::delete::DeleteArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::RollingUpdate(args) => commands::rolling_update::run(args).await,
            Commands::DeleteInstanceGroup(args) => commands::delete::run(args).await,
        }
    }
}
