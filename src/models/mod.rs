//! Data models for Corkboard entities.
//!
//! This module defines the core data structures:
//! - `Project` - A named container of tickets
//! - `Ticket` - Work items that move across board columns
//! - `Column` - The five fixed board states
//! - `Comment` - Immutable notes attached to a ticket
//! - `TicketRevision` - Append-only audit of single-field changes
//! - `Activity` - Human-readable live-feed entries scoped to a project
//! - `AuditEntry` - Per-call traceability records
//! - `Agent` - Authenticated non-human callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Board column a ticket currently sits in.
///
/// The set is fixed and fully connected: any column may move to any other
/// column directly. Conceptual left-to-right order is backlog → done, but no
/// transition order is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    #[default]
    Backlog,
    Ready,
    InProgress,
    InReview,
    Done,
}

impl Column {
    /// All valid columns, in board order.
    pub const ALL: [Column; 5] = [
        Column::Backlog,
        Column::Ready,
        Column::InProgress,
        Column::InReview,
        Column::Done,
    ];

    /// Stable string form used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Backlog => "backlog",
            Column::Ready => "ready",
            Column::InProgress => "in_progress",
            Column::InReview => "in_review",
            Column::Done => "done",
        }
    }
}

impl FromStr for Column {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Column::Backlog),
            "ready" => Ok(Column::Ready),
            "in_progress" => Ok(Column::InProgress),
            "in_review" => Ok(Column::InReview),
            "done" => Ok(Column::Done),
            other => Err(crate::Error::Validation(format!(
                "invalid column '{}' (expected one of: backlog, ready, in_progress, in_review, done)",
                other
            ))),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated non-human caller identified by a unique API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier
    pub id: i64,

    /// Unique display name
    pub name: String,

    /// Unique secret credential. Matched by direct equality only.
    pub api_key: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A named container of tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: i64,

    /// Project name
    pub name: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A work item on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Ticket title (non-empty after trimming)
    pub title: String,

    /// Detailed description (may be empty)
    #[serde(default)]
    pub description: String,

    /// Current board column
    #[serde(default)]
    pub column: Column,

    /// Manual ordering slot within the project+column, append-to-end on
    /// creation and on every column change.
    pub position: i64,

    /// Agent that created the ticket, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,

    /// Agent currently assigned, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// An immutable note attached to a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier
    pub id: i64,

    /// Ticket the comment belongs to
    pub ticket_id: i64,

    /// Authoring agent
    pub agent_id: i64,

    /// Comment body (non-empty after trimming)
    pub body: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// An append-only record of one field change on a ticket.
///
/// A revision exists if and only if the field's value actually changed; no-op
/// updates produce zero revisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRevision {
    /// Unique identifier
    pub id: i64,

    /// Ticket the revision belongs to
    pub ticket_id: i64,

    /// Name of the changed field ("title", "description", "column", "assignee")
    pub field: String,

    /// Value before the change
    pub old_value: String,

    /// Value after the change
    pub new_value: String,

    /// Acting agent; `None` records a human/unauthenticated action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<i64>,

    /// When the change was recorded
    pub created_at: DateTime<Utc>,
}

/// A human-readable live-feed entry scoped to a project.
///
/// Observational only: not tamper-evident and never used to reconstruct state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier
    pub id: i64,

    /// Project the entry belongs to
    pub project_id: i64,

    /// Acting agent, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<i64>,

    /// Action name (e.g. "ticket_created", "tickets_listed")
    pub action: String,

    /// Human-readable detail line
    pub detail: String,

    /// When the entry was recorded
    pub created_at: DateTime<Utc>,
}

/// A record of one external call: who, what, and how it went.
///
/// Distinct from per-ticket revisions; used for compliance-style traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier
    pub id: i64,

    /// Acting agent, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<i64>,

    /// Operation name (e.g. "ticket.update")
    pub operation: String,

    /// Resource the operation targeted (e.g. "project/3/ticket/7")
    pub resource: String,

    /// Outcome code ("ok", "not_found", "validation", "duplicate", "error")
    pub outcome: String,

    /// Free-text details
    pub details: String,

    /// When the call was recorded
    pub created_at: DateTime<Utc>,
}

/// A page of results with totals, for 1-based pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// Total matching items across all pages
    pub total: i64,

    /// 1-based page number
    pub page: i64,

    /// Page size used for this query
    pub per_page: i64,

    /// Total number of pages (0 when there are no items)
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// Assemble a page, computing `total_pages` from the totals.
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
