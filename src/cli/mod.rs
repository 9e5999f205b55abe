//! CLI command implementations.

// Allow print_stdout/print_stderr: command output and reports go to the
// terminal by design.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use crate::config::EngramConfig;
use crate::mcp::McpServer;
use crate::models::SessionId;
use crate::services::ServiceContainer;
use crate::storage::SCHEMA_VERSION;
use crate::{Error, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Knowledge persistence and context assembly engine.
#[derive(Debug, Parser)]
#[command(name = "engram", version, about)]
pub struct Cli {
    /// Explicit config file path (otherwise engram.toml is searched).
    #[arg(long, global = true, env = "ENGRAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the tool surface on stdio.
    Serve,
    /// Apply schema migrations up to a version.
    Migrate {
        /// Target schema version (defaults to the latest).
        #[arg(long)]
        to: Option<u32>,
    },
    /// Rebuild the vector indexes and drop process caches.
    Reindex,
    /// Analyze a stored session transcript for redirections.
    AnalyzeSession {
        /// The session id to analyze.
        session_id: String,
    },
    /// Print store statistics.
    Status {
        /// Restrict counters to one project (by name).
        #[arg(long)]
        project: Option<String>,
    },
}

/// Loads configuration honoring an explicit `--config` path.
///
/// # Errors
///
/// Returns `Error::Validation` on malformed or invalid configuration.
pub fn load_config(cli: &Cli) -> Result<EngramConfig> {
    cli.config.as_ref().map_or_else(EngramConfig::load, |path| {
        EngramConfig::load_from(std::slice::from_ref(path))
    })
}

/// Runs the parsed command.
///
/// # Errors
///
/// Propagates engram errors; see [`exit_code`] for their mapping.
pub async fn run(cli: Cli, config: EngramConfig) -> Result<()> {
    match cli.command {
        Command::Serve => {
            let services = Arc::new(ServiceContainer::open(&config)?);
            let server = McpServer::new(services);
            server.serve_stdio().await
        },
        Command::Migrate { to } => {
            let services = ServiceContainer::open(&config)?;
            let target = to.unwrap_or(SCHEMA_VERSION);
            services.store().migrate_to(target)?;
            println!("schema at version {target}");
            Ok(())
        },
        Command::Reindex => {
            let services = ServiceContainer::open(&config)?;
            services.reindex()?;
            println!("indexes rebuilt");
            Ok(())
        },
        Command::AnalyzeSession { session_id } => {
            let services = ServiceContainer::open(&config)?;
            let id = SessionId::from_str(&session_id)
                .map_err(|_| Error::Validation(format!("invalid session id: {session_id}")))?;
            let report = tokio::task::spawn_blocking(move || services.analyze_session(id))
                .await
                .map_err(|e| Error::internal("analyze_session", e))??;
            let rendered = serde_json::to_string_pretty(&report)
                .map_err(|e| Error::internal("analyze_session", e))?;
            println!("{rendered}");
            Ok(())
        },
        Command::Status { project } => {
            let services = ServiceContainer::open(&config)?;
            let scope = project
                .map(|name| services.store().get_project_by_name(&name))
                .transpose()?
                .map(|p| p.id);
            let stats = services.store().stats(scope)?;
            let rendered = serde_json::to_string_pretty(&stats)
                .map_err(|e| Error::internal("status", e))?;
            println!("{rendered}");
            Ok(())
        },
    }
}

/// Maps an error to the process exit code.
///
/// 0 success, 1 generic error, 2 configuration error, 3 storage
/// unavailable.
#[must_use]
pub fn exit_code(error: &Error) -> i32 {
    match error {
        Error::DependencyUnavailable { dependency, .. } if *dependency == "storage" => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["engram", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));

        let cli = Cli::try_parse_from(["engram", "migrate", "--to", "1"]).unwrap();
        assert!(matches!(cli.command, Command::Migrate { to: Some(1) }));

        let cli = Cli::try_parse_from(["engram", "analyze-session", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::AnalyzeSession { .. }));

        let cli = Cli::try_parse_from(["engram", "status", "--project", "api"]).unwrap();
        assert!(matches!(cli.command, Command::Status { project: Some(_) }));
    }

    #[test]
    fn test_exit_codes() {
        let storage = Error::DependencyUnavailable {
            dependency: "storage",
            cause: "gone".to_string(),
        };
        assert_eq!(exit_code(&storage), 3);

        let embedding = Error::DependencyUnavailable {
            dependency: "embedding_provider",
            cause: "gone".to_string(),
        };
        assert_eq!(exit_code(&embedding), 1);
        assert_eq!(exit_code(&Error::Validation(String::new())), 1);
    }
}
