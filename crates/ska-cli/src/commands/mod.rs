//! CLI command definitions and dispatch.

pub mod hooks;
pub mod plugin;

use clap::{Parser, Subcommand};

use ska_core::error::AppError;

use crate::client::AdminClient;
use crate::output::OutputFormat;

/// Ska plugin host administration
#[derive(Debug, Parser)]
#[command(name = "ska-cli", version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the Ska host
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List every known plugin
    ListPlugins,
    /// Show one plugin
    Show {
        /// Plugin ID
        id: String,
    },
    /// Start a plugin
    Start {
        /// Plugin ID
        id: String,
    },
    /// Stop a plugin
    Stop {
        /// Plugin ID
        id: String,
    },
    /// Unload a plugin
    Unload {
        /// Plugin ID
        id: String,
    },
    /// Unload and reload every plugin
    ReloadAll,
    /// List the registered request hooks
    Hooks,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let client = AdminClient::new(&self.server);
        match &self.command {
            Commands::ListPlugins => plugin::list(&client, self.format).await,
            Commands::Show { id } => plugin::show(&client, id, self.format).await,
            Commands::Start { id } => plugin::start(&client, id, self.format).await,
            Commands::Stop { id } => plugin::stop(&client, id, self.format).await,
            Commands::Unload { id } => plugin::unload(&client, id, self.format).await,
            Commands::ReloadAll => plugin::reload_all(&client, self.format).await,
            Commands::Hooks => hooks::list(&client, self.format).await,
        }
    }
}
