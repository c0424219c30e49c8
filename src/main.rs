//! Corkboard CLI - a Kanban board service for AI agents and humans.

use clap::Parser;
use corkboard::cli::{AdminCommands, AgentCommands, Cli, Commands, McpCommands};
use corkboard::events::EventBus;
use corkboard::mcp::{self, McpServer};
use corkboard::server::{start_server, ServerConfig};
use corkboard::service::Service;
use corkboard::storage::{default_db_path, Store};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<(), corkboard::Error> {
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            admin_key,
        } => {
            let config = ServerConfig {
                host,
                port,
                db_path,
                admin_key,
            };
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| corkboard::Error::Other(format!("failed to create runtime: {}", e)))?
                .block_on(start_server(config))
        }

        Commands::Mcp { command } => match command {
            McpCommands::Serve { api_key } => {
                let mut service = open_service(&db_path)?;
                // The admin key must exist before session.open can match it.
                service.ensure_admin_key(None)?;
                let mut server = McpServer::new(service);
                if let Some(key) = api_key {
                    server.open_session_key(&key)?;
                }
                server.serve()
            }
            McpCommands::Manifest => mcp::manifest(),
        },

        Commands::Admin { command } => {
            let mut service = open_service(&db_path)?;
            match command {
                AdminCommands::RotateKey => {
                    let key = service.rotate_admin_key()?;
                    println!("{}", key);
                }
                AdminCommands::ShowKey => {
                    let key = service.ensure_admin_key(None)?;
                    println!("{}", key);
                }
            }
            Ok(())
        }

        Commands::Agent { command } => {
            let mut service = open_service(&db_path)?;
            match command {
                AgentCommands::Create { name } => {
                    let agent = service.create_agent(&name)?;
                    println!("{}", serde_json::to_string_pretty(&agent)?);
                }
                AgentCommands::List => {
                    let agents = service.list_agents()?;
                    println!("{}", serde_json::to_string_pretty(&agents)?);
                }
                AgentCommands::Rm { agent_id } => {
                    service.delete_agent(agent_id)?;
                    println!(r#"{{"deleted": {}}}"#, agent_id);
                }
            }
            Ok(())
        }
    }
}

fn resolve_db_path(explicit: Option<PathBuf>) -> Result<PathBuf, corkboard::Error> {
    match explicit {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

fn open_service(db_path: &std::path::Path) -> Result<Service, corkboard::Error> {
    let store = Store::open(db_path)?;
    Ok(Service::new(store, Arc::new(EventBus::new())))
}
