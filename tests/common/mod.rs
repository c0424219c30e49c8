//! Common test utilities for corkboard integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's data directory.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated database.
///
/// Each `TestEnv` holds a temporary directory and points every `ckb`
/// invocation at a database file inside it, making tests parallel-safe.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with an isolated database.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the ckb binary pointed at the isolated database.
    pub fn ckb(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ckb"));
        cmd.arg("--db").arg(self.db_path());
        cmd
    }

    /// Path to the database file inside the temp dir.
    pub fn db_path(&self) -> std::path::PathBuf {
        self.dir.path().join("corkboard.db")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
