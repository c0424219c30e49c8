//! Storage layer for Corkboard data.
//!
//! This module is the persistence gateway: it owns all reads and writes to the
//! SQLite database, maps rows to domain records, and enforces uniqueness and
//! cascade rules at the schema level.
//!
//! Not-found is reported as `Ok(None)` rather than an error; the service layer
//! decides when absence is a `NotFound` failure.

use crate::models::{
    Activity, Agent, AuditEntry, Column, Comment, Project, Ticket, TicketRevision,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Persistence gateway for a single Corkboard database.
pub struct Store {
    /// SQLite connection
    conn: Connection,
}

/// Resolve the default database path under the XDG data directory.
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("could not determine data directory".to_string()))?;
    Ok(data_dir.join("corkboard").join("corkboard.db"))
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests and throwaway sessions).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Initialize the schema.
    ///
    /// Foreign keys are enabled per-connection; cascade and SET NULL rules live
    /// here so the service layer never has to clean up references by hand.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                api_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                "column" TEXT NOT NULL DEFAULT 'backlog',
                position INTEGER NOT NULL DEFAULT 0,
                created_by INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                assignee_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_revisions (
                id INTEGER PRIMARY KEY,
                ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                field TEXT NOT NULL,
                old_value TEXT NOT NULL,
                new_value TEXT NOT NULL,
                actor_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                actor_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                action TEXT NOT NULL,
                detail TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                actor_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                operation TEXT NOT NULL,
                resource TEXT NOT NULL,
                outcome TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_board
                ON tickets(project_id, "column", position);
            CREATE INDEX IF NOT EXISTS idx_comments_ticket ON comments(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_revisions_ticket ON ticket_revisions(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_activities_project
                ON activities(project_id, created_at);
            "#,
        )?;
        Ok(())
    }

    // === Settings ===

    /// Get a persisted setting value.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Set (insert or replace) a persisted setting value.
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // === Agent Operations ===

    /// Insert a new agent.
    ///
    /// Uniqueness of name and API key is enforced by the schema; a violation
    /// surfaces as `Error::Duplicate`.
    pub fn insert_agent(&mut self, name: &str, api_key: &str) -> Result<Agent> {
        let now = Utc::now();
        let result = self.conn.execute(
            "INSERT INTO agents (name, api_key, created_at) VALUES (?, ?, ?)",
            params![name, api_key, now.to_rfc3339()],
        );
        match result {
            Ok(_) => Ok(Agent {
                id: self.conn.last_insert_rowid(),
                name: name.to_string(),
                api_key: api_key.to_string(),
                created_at: now,
            }),
            Err(e) if is_constraint_violation(&e) => Err(Error::Duplicate(format!(
                "agent named '{}' already exists",
                name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Get an agent by id.
    pub fn get_agent(&self, id: i64) -> Result<Option<Agent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, api_key, created_at FROM agents WHERE id = ?",
        )?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_agent(row)?)),
            None => Ok(None),
        }
    }

    /// Look up an agent by its API key. Direct equality only, no normalization.
    pub fn get_agent_by_key(&self, api_key: &str) -> Result<Option<Agent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, api_key, created_at FROM agents WHERE api_key = ?",
        )?;
        let mut rows = stmt.query([api_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_agent(row)?)),
            None => Ok(None),
        }
    }

    /// List all agents, oldest first.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, api_key, created_at FROM agents ORDER BY id ASC",
        )?;
        let agents = stmt
            .query_map([], |row| row_to_agent(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }

    /// Delete an agent.
    ///
    /// The schema nulls out every actor reference (ticket creator/assignee,
    /// revision/activity/audit actors) and cascades the agent's comments.
    /// Returns whether an agent row was actually removed.
    pub fn delete_agent(&mut self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?", [id])?;
        Ok(changed > 0)
    }

    // === Project Operations ===

    /// Insert a new project.
    pub fn insert_project(&mut self, name: &str, description: &str) -> Result<Project> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO projects (name, description, created_at) VALUES (?, ?, ?)",
            params![name, description, now.to_rfc3339()],
        )?;
        Ok(Project {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
        })
    }

    /// Get a project by id.
    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at FROM projects WHERE id = ?",
        )?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_project(row)?)),
            None => Ok(None),
        }
    }

    /// List all projects, oldest first.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at FROM projects ORDER BY id ASC",
        )?;
        let projects = stmt
            .query_map([], |row| row_to_project(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    /// Delete a project, cascading its tickets, comments, revisions, and
    /// activity entries. Returns whether a project row was removed.
    pub fn delete_project(&mut self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?", [id])?;
        Ok(changed > 0)
    }

    // === Ticket Operations ===

    /// Insert a new ticket row as given. Position is computed by the caller
    /// via [`Store::next_position`].
    pub fn insert_ticket(
        &mut self,
        project_id: i64,
        title: &str,
        description: &str,
        column: Column,
        position: i64,
        created_by: Option<i64>,
    ) -> Result<Ticket> {
        let now = Utc::now();
        self.conn.execute(
            r#"INSERT INTO tickets
               (project_id, title, description, "column", position, created_by, assignee_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)"#,
            params![
                project_id,
                title,
                description,
                column.as_str(),
                position,
                created_by,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(Ticket {
            id: self.conn.last_insert_rowid(),
            project_id,
            title: title.to_string(),
            description: description.to_string(),
            column,
            position,
            created_by,
            assignee_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a ticket by project and ticket id.
    pub fn get_ticket(&self, project_id: i64, ticket_id: i64) -> Result<Option<Ticket>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, project_id, title, description, "column", position,
                      created_by, assignee_id, created_at, updated_at
               FROM tickets WHERE project_id = ? AND id = ?"#,
        )?;
        let mut rows = stmt.query([project_id, ticket_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_ticket(row)?)),
            None => Ok(None),
        }
    }

    /// List tickets in a project, optionally filtered by column.
    ///
    /// With a column filter the board order (position) is used; otherwise
    /// tickets come back in creation order for stable pagination.
    pub fn list_tickets(
        &self,
        project_id: i64,
        column: Option<Column>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>> {
        let mut sql = String::from(
            r#"SELECT id, project_id, title, description, "column", position,
                      created_by, assignee_id, created_at, updated_at
               FROM tickets WHERE project_id = ?"#,
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_id)];

        if let Some(col) = column {
            sql.push_str(r#" AND "column" = ?"#);
            params_vec.push(Box::new(col.as_str().to_string()));
            sql.push_str(" ORDER BY position ASC, id ASC");
        } else {
            sql.push_str(" ORDER BY id ASC");
        }
        sql.push_str(" LIMIT ? OFFSET ?");
        params_vec.push(Box::new(limit));
        params_vec.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let tickets = stmt
            .query_map(params_refs.as_slice(), |row| row_to_ticket(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tickets)
    }

    /// Count tickets in a project, optionally filtered by column.
    pub fn count_tickets(&self, project_id: i64, column: Option<Column>) -> Result<i64> {
        let count = match column {
            Some(col) => self.conn.query_row(
                r#"SELECT COUNT(*) FROM tickets WHERE project_id = ? AND "column" = ?"#,
                params![project_id, col.as_str()],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM tickets WHERE project_id = ?",
                [project_id],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    /// Next append-to-end position for a project+column: max + 1, or 0 when
    /// the column is empty.
    pub fn next_position(&self, project_id: i64, column: Column) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            r#"SELECT MAX(position) FROM tickets WHERE project_id = ? AND "column" = ?"#,
            params![project_id, column.as_str()],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Apply a ticket mutation atomically: one revision row per change plus
    /// the updated ticket row, in a single transaction. A failure anywhere
    /// rolls everything back, so revisions never describe changes that were
    /// not applied.
    pub fn apply_ticket_update(
        &mut self,
        ticket: &Ticket,
        changes: &[(&'static str, String, String)],
        actor_id: Option<i64>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for (field, old_value, new_value) in changes {
            tx.execute(
                "INSERT INTO ticket_revisions (ticket_id, field, old_value, new_value, actor_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![ticket.id, field, old_value, new_value, actor_id, now],
            )?;
        }
        tx.execute(
            r#"UPDATE tickets
               SET title = ?, description = ?, "column" = ?, position = ?,
                   assignee_id = ?, updated_at = ?
               WHERE id = ?"#,
            params![
                ticket.title,
                ticket.description,
                ticket.column.as_str(),
                ticket.position,
                ticket.assignee_id,
                ticket.updated_at.to_rfc3339(),
                ticket.id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a ticket, cascading its comments and revisions.
    /// Returns whether a ticket row was removed.
    pub fn delete_ticket(&mut self, project_id: i64, ticket_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM tickets WHERE project_id = ? AND id = ?",
            [project_id, ticket_id],
        )?;
        Ok(changed > 0)
    }

    // === Comment Operations ===

    /// Insert a comment. Comments are immutable once created.
    pub fn insert_comment(&mut self, ticket_id: i64, agent_id: i64, body: &str) -> Result<Comment> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO comments (ticket_id, agent_id, body, created_at) VALUES (?, ?, ?, ?)",
            params![ticket_id, agent_id, body, now.to_rfc3339()],
        )?;
        Ok(Comment {
            id: self.conn.last_insert_rowid(),
            ticket_id,
            agent_id,
            body: body.to_string(),
            created_at: now,
        })
    }

    /// List comments on a ticket, oldest first.
    pub fn list_comments(&self, ticket_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, agent_id, body, created_at
             FROM comments WHERE ticket_id = ? ORDER BY id ASC",
        )?;
        let comments = stmt
            .query_map([ticket_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    agent_id: row.get(2)?,
                    body: row.get(3)?,
                    created_at: ts(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }

    // === Revision Operations ===

    /// Append a revision row for one field change.
    pub fn insert_revision(
        &mut self,
        ticket_id: i64,
        field: &str,
        old_value: &str,
        new_value: &str,
        actor_id: Option<i64>,
    ) -> Result<TicketRevision> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO ticket_revisions (ticket_id, field, old_value, new_value, actor_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![ticket_id, field, old_value, new_value, actor_id, now.to_rfc3339()],
        )?;
        Ok(TicketRevision {
            id: self.conn.last_insert_rowid(),
            ticket_id,
            field: field.to_string(),
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
            actor_id,
            created_at: now,
        })
    }

    /// List revisions for a ticket in chronological (insertion) order.
    pub fn list_revisions(&self, ticket_id: i64) -> Result<Vec<TicketRevision>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, field, old_value, new_value, actor_id, created_at
             FROM ticket_revisions WHERE ticket_id = ? ORDER BY id ASC",
        )?;
        let revisions = stmt
            .query_map([ticket_id], |row| {
                Ok(TicketRevision {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    field: row.get(2)?,
                    old_value: row.get(3)?,
                    new_value: row.get(4)?,
                    actor_id: row.get(5)?,
                    created_at: ts(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(revisions)
    }

    /// Count all revisions referencing tickets in a project.
    pub fn count_revisions_in_project(&self, project_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM ticket_revisions r
             JOIN tickets t ON t.id = r.ticket_id WHERE t.project_id = ?",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // === Activity Operations ===

    /// Append a live-feed activity entry.
    pub fn insert_activity(
        &mut self,
        project_id: i64,
        actor_id: Option<i64>,
        action: &str,
        detail: &str,
    ) -> Result<Activity> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO activities (project_id, actor_id, action, detail, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![project_id, actor_id, action, detail, now.to_rfc3339()],
        )?;
        Ok(Activity {
            id: self.conn.last_insert_rowid(),
            project_id,
            actor_id,
            action: action.to_string(),
            detail: detail.to_string(),
            created_at: now,
        })
    }

    /// List the most recent activity entries for a project, newest first.
    pub fn list_activity(&self, project_id: i64, limit: i64) -> Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, actor_id, action, detail, created_at
             FROM activities WHERE project_id = ? ORDER BY id DESC LIMIT ?",
        )?;
        let entries = stmt
            .query_map([project_id, limit], |row| {
                Ok(Activity {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    actor_id: row.get(2)?,
                    action: row.get(3)?,
                    detail: row.get(4)?,
                    created_at: ts(row, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // === Audit Operations ===

    /// Append an audit entry for one external call.
    pub fn insert_audit(
        &mut self,
        actor_id: Option<i64>,
        operation: &str,
        resource: &str,
        outcome: &str,
        details: &str,
    ) -> Result<AuditEntry> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO audit_log (actor_id, operation, resource, outcome, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![actor_id, operation, resource, outcome, details, now.to_rfc3339()],
        )?;
        Ok(AuditEntry {
            id: self.conn.last_insert_rowid(),
            actor_id,
            operation: operation.to_string(),
            resource: resource.to_string(),
            outcome: outcome.to_string(),
            details: details.to_string(),
            created_at: now,
        })
    }

    /// List the most recent audit entries, newest first.
    pub fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor_id, operation, resource, outcome, details, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;
        let entries = stmt
            .query_map([limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    actor_id: row.get(1)?,
                    operation: row.get(2)?,
                    resource: row.get(3)?,
                    outcome: row.get(4)?,
                    details: row.get(5)?,
                    created_at: ts(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

/// True when the underlying SQLite error is a uniqueness/constraint violation.
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Read an RFC 3339 timestamp column.
fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        api_key: row.get(2)?,
        created_at: ts(row, 3)?,
    })
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: ts(row, 3)?,
    })
}

fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let column_raw: String = row.get(4)?;
    let column = Column::from_str(&column_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        )))
    })?;
    Ok(Ticket {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        column,
        position: row.get(5)?,
        created_by: row.get(6)?,
        assignee_id: row.get(7)?,
        created_at: ts(row, 8)?,
        updated_at: ts(row, 9)?,
    })
}
