//! CLI argument definitions for Corkboard.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Corkboard - a Kanban board service for AI agents and humans.
#[derive(Parser, Debug)]
#[command(name = "ckb")]
#[command(author, version, about = "Kanban task tracking with REST, live updates, and tool access", long_about = None)]
pub struct Cli {
    /// Path to the SQLite database file.
    /// Defaults to the platform data directory (e.g. ~/.local/share/corkboard/corkboard.db).
    #[arg(long = "db", global = true, env = "CKB_DB")]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (REST API + WebSocket event stream)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1", env = "CKB_HOST")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value_t = 8920, env = "CKB_PORT")]
        port: u16,

        /// Override the persisted admin key (persists the override)
        #[arg(long, env = "CKB_ADMIN_KEY")]
        admin_key: Option<String>,
    },

    /// Tool-invocation server commands
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },

    /// Admin credential management
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Agent management
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

/// MCP subcommands
#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Run the JSON-RPC server over stdio
    Serve {
        /// Open the session up front instead of waiting for session.open
        #[arg(long, env = "CKB_API_KEY")]
        api_key: Option<String>,
    },

    /// Print the tool manifest and exit
    Manifest,
}

/// Admin subcommands
#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Generate and persist a new admin key, invalidating the old one
    RotateKey,

    /// Print the current admin key (generating one if none exists)
    ShowKey,
}

/// Agent subcommands
#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Register a new agent and print its API key
    Create {
        /// Globally unique agent name
        name: String,
    },

    /// List registered agents
    List,

    /// Delete an agent (its actor references are nulled; its comments go with it)
    Rm {
        /// Agent id
        agent_id: i64,
    },
}

/// Get the package version from Cargo.toml
pub fn package_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get the git commit hash captured at build time
pub fn git_commit() -> &'static str {
    env!("CKB_GIT_COMMIT")
}

/// Get the build timestamp captured at build time
pub fn build_timestamp() -> &'static str {
    env!("CKB_BUILD_TIMESTAMP")
}
