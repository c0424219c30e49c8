//! Corkboard - a Kanban ticket-tracking library for AI agents and humans.
//!
//! This library provides the core functionality for the `ckb` server and CLI,
//! including the board's business rules, the SQLite persistence gateway, and
//! the in-process event bus that feeds live subscriptions.

pub mod cli;
pub mod events;
pub mod mcp;
pub mod models;
pub mod server;
pub mod service;
pub mod storage;

/// Library-level error type for Corkboard operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Corkboard operations.
pub type Result<T> = std::result::Result<T, Error>;
