//! The business service: the single point through which every domain
//! operation passes.
//!
//! All three access surfaces (REST, WebSocket subscriptions, tool invocation)
//! call into [`Service`]; nothing else writes to the store. Each mutation
//! validates its input up front (all-or-nothing), records per-field revisions
//! for values that actually changed, appends a live-feed activity entry, and
//! publishes an event on the bus. Activity and audit writes are telemetry:
//! their failures are logged and swallowed, never surfaced to the caller.

pub mod audit;

use crate::events::{
    Event, EventBus, COMMENT_ADDED, TICKET_CREATED, TICKET_DELETED, TICKET_UPDATED,
};
use crate::models::{
    Activity, Agent, Column, Comment, Page, Project, Ticket, TicketRevision,
};
use crate::storage::Store;
use crate::{Error, Result};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Default page size for ticket listings.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Upper bound on requested page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Settings key holding the persisted admin credential.
const ADMIN_KEY_SETTING: &str = "admin_key";

/// Fields for creating a ticket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTicket {
    /// Ticket title (required, non-empty after trim)
    pub title: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Optional starting column (defaults to backlog)
    #[serde(default)]
    pub column: Option<Column>,

    /// Agent creating the ticket, if authenticated
    #[serde(default)]
    pub created_by: Option<i64>,
}

/// Partial update for a ticket. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketPatch {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub column: Option<Column>,
}

impl TicketPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.column.is_none()
    }
}

/// Listing options for tickets in a project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketQuery {
    /// Only tickets in this column
    #[serde(default)]
    pub column: Option<Column>,

    /// 1-based page number (defaults to 1)
    #[serde(default)]
    pub page: Option<i64>,

    /// Page size (defaults to [`DEFAULT_PAGE_SIZE`], capped at [`MAX_PAGE_SIZE`])
    #[serde(default)]
    pub per_page: Option<i64>,
}

/// The board's business service.
///
/// Owns the persistence gateway and a handle to the event bus. Callers that
/// share a `Service` across tasks wrap it in a `tokio::sync::Mutex`, which
/// also gives each logical operation run-to-completion semantics.
pub struct Service {
    store: Store,
    bus: Arc<EventBus>,
}

impl Service {
    /// Create a service over an open store and a bus handle.
    pub fn new(store: Store, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// The event bus this service publishes to.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Direct read access to the store (surfaces should prefer the service
    /// operations; this exists for diagnostics and tests).
    pub fn store(&self) -> &Store {
        &self.store
    }

    // === Projects ===

    /// Create a project. The name must be non-empty after trimming.
    pub fn create_project(&mut self, name: &str, description: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("project name must not be empty".to_string()));
        }
        self.store.insert_project(name, description)
    }

    /// Fetch a project or fail with `NotFound`.
    pub fn get_project(&self, project_id: i64) -> Result<Project> {
        self.store
            .get_project(project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    /// List all projects.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list_projects()
    }

    /// Delete a project and everything under it (tickets, comments, revisions,
    /// activity). Not reversible.
    pub fn delete_project(&mut self, project_id: i64) -> Result<()> {
        if !self.store.delete_project(project_id)? {
            return Err(Error::NotFound(format!("project {}", project_id)));
        }
        Ok(())
    }

    // === Tickets ===

    /// Create a ticket in a project.
    ///
    /// The ticket lands at the end of its column: position is the column's
    /// current max + 1, or 0 for an empty column. Creation records no
    /// revisions — revisions only track mutations to an existing ticket.
    pub fn create_ticket(&mut self, project_id: i64, new: NewTicket) -> Result<Ticket> {
        self.get_project(project_id)?;

        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("ticket title must not be empty".to_string()));
        }
        if let Some(agent_id) = new.created_by {
            if self.store.get_agent(agent_id)?.is_none() {
                return Err(Error::NotFound(format!("agent {}", agent_id)));
            }
        }

        let column = new.column.unwrap_or_default();
        let description = new.description.unwrap_or_default();
        let position = self.store.next_position(project_id, column)?;
        let ticket = self.store.insert_ticket(
            project_id,
            title,
            &description,
            column,
            position,
            new.created_by,
        )?;

        self.log_activity(
            project_id,
            new.created_by,
            "ticket_created",
            &format!("ticket {} '{}' created in {}", ticket.id, ticket.title, column),
        );
        self.publish_ticket(TICKET_CREATED, &ticket);
        Ok(ticket)
    }

    /// Fetch a ticket or fail with `NotFound`. A known actor leaves a
    /// "ticket_viewed" activity entry (telemetry only).
    pub fn get_ticket(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        actor: Option<i64>,
    ) -> Result<Ticket> {
        let ticket = self
            .store
            .get_ticket(project_id, ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket_id)))?;
        if actor.is_some() {
            self.log_activity(
                project_id,
                actor,
                "ticket_viewed",
                &format!("ticket {} viewed", ticket_id),
            );
        }
        Ok(ticket)
    }

    /// List tickets in a project with an optional column filter and 1-based
    /// pagination, wrapped with totals.
    pub fn get_tickets_by_project(
        &mut self,
        project_id: i64,
        actor: Option<i64>,
        query: TicketQuery,
    ) -> Result<Page<Ticket>> {
        self.get_project(project_id)?;

        let page = query.page.unwrap_or(1);
        if page < 1 {
            return Err(Error::Validation("page must be >= 1".to_string()));
        }
        let per_page = query.per_page.unwrap_or(DEFAULT_PAGE_SIZE);
        if per_page < 1 || per_page > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "per_page must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let total = self.store.count_tickets(project_id, query.column)?;
        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| Error::Validation("page is out of range".to_string()))?;
        let items = self
            .store
            .list_tickets(project_id, query.column, per_page, offset)?;

        if actor.is_some() {
            self.log_activity(
                project_id,
                actor,
                "tickets_listed",
                &format!("listed tickets (page {})", page),
            );
        }
        Ok(Page::new(items, total, page, per_page))
    }

    /// Update ticket fields, recording one revision per field that actually
    /// changed.
    ///
    /// Validation happens before any write: an invalid patch leaves the ticket
    /// untouched. Fields are evaluated in a fixed order (title, description,
    /// column) so revision history is reproducible. A column change re-appends
    /// the ticket to the end of its new column. A patch that changes nothing
    /// returns the unchanged ticket with zero revisions and emits no event.
    pub fn update_ticket(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        patch: TicketPatch,
        actor: Option<i64>,
    ) -> Result<Ticket> {
        let mut ticket = self
            .store
            .get_ticket(project_id, ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket_id)))?;

        // Validate everything up front; titles are trimmed before both
        // comparison and storage so whitespace-only edits are no-ops.
        let new_title = match &patch.title {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(Error::Validation(
                        "ticket title must not be empty".to_string(),
                    ));
                }
                Some(trimmed.to_string())
            }
            None => None,
        };

        let mut changes: Vec<(&'static str, String, String)> = Vec::new();

        if let Some(title) = new_title {
            if title != ticket.title {
                changes.push(("title", ticket.title.clone(), title.clone()));
                ticket.title = title;
            }
        }
        if let Some(description) = patch.description {
            if description != ticket.description {
                changes.push((
                    "description",
                    ticket.description.clone(),
                    description.clone(),
                ));
                ticket.description = description;
            }
        }
        if let Some(column) = patch.column {
            if column != ticket.column {
                changes.push((
                    "column",
                    ticket.column.as_str().to_string(),
                    column.as_str().to_string(),
                ));
                ticket.column = column;
                ticket.position = self.store.next_position(project_id, column)?;
            }
        }

        if changes.is_empty() {
            return Ok(ticket);
        }

        ticket.updated_at = Utc::now();
        self.store.apply_ticket_update(&ticket, &changes, actor)?;

        let fields: Vec<&str> = changes.iter().map(|(field, _, _)| *field).collect();
        self.log_activity(
            project_id,
            actor,
            "ticket_updated",
            &format!("ticket {} updated ({})", ticket.id, fields.join(", ")),
        );
        self.publish_ticket(TICKET_UPDATED, &ticket);
        Ok(ticket)
    }

    /// Move a ticket to another column. `actor = None` records the change as
    /// a human (unauthenticated) action in the revision log.
    pub fn move_ticket(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        column: Column,
        actor: Option<i64>,
    ) -> Result<Ticket> {
        self.update_ticket(
            project_id,
            ticket_id,
            TicketPatch {
                column: Some(column),
                ..TicketPatch::default()
            },
            actor,
        )
    }

    /// Human-only shortcut: move the ticket to `done`. A ticket already in
    /// `done` is a no-op with zero revisions.
    pub fn close_ticket(&mut self, project_id: i64, ticket_id: i64) -> Result<Ticket> {
        self.move_ticket(project_id, ticket_id, Column::Done, None)
    }

    /// Human-only shortcut: move the ticket back to `backlog`.
    pub fn open_ticket(&mut self, project_id: i64, ticket_id: i64) -> Result<Ticket> {
        self.move_ticket(project_id, ticket_id, Column::Backlog, None)
    }

    /// Hard-delete a ticket, cascading its comments and revisions.
    pub fn delete_ticket(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        actor: Option<i64>,
    ) -> Result<()> {
        if !self.store.delete_ticket(project_id, ticket_id)? {
            return Err(Error::NotFound(format!("ticket {}", ticket_id)));
        }
        self.log_activity(
            project_id,
            actor,
            "ticket_deleted",
            &format!("ticket {} deleted", ticket_id),
        );
        self.bus.publish(Event::for_project(
            TICKET_DELETED,
            project_id,
            serde_json::json!({ "id": ticket_id, "project_id": project_id }),
        ));
        Ok(())
    }

    /// Assign a ticket to an agent. The assignment is tracked as its own
    /// revision field, separate from the creator reference.
    pub fn assign_ticket(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        assignee_id: i64,
        actor: Option<i64>,
    ) -> Result<Ticket> {
        if self.store.get_agent(assignee_id)?.is_none() {
            return Err(Error::NotFound(format!("agent {}", assignee_id)));
        }
        self.set_assignee(project_id, ticket_id, Some(assignee_id), actor)
    }

    /// Clear a ticket's assignee.
    pub fn unassign_ticket(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        actor: Option<i64>,
    ) -> Result<Ticket> {
        self.set_assignee(project_id, ticket_id, None, actor)
    }

    fn set_assignee(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        assignee: Option<i64>,
        actor: Option<i64>,
    ) -> Result<Ticket> {
        let mut ticket = self
            .store
            .get_ticket(project_id, ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket_id)))?;

        if ticket.assignee_id == assignee {
            return Ok(ticket);
        }

        let old_value = ticket.assignee_id.map_or(String::new(), |id| id.to_string());
        let new_value = assignee.map_or(String::new(), |id| id.to_string());
        let changes = [("assignee", old_value, new_value)];

        ticket.assignee_id = assignee;
        ticket.updated_at = Utc::now();
        self.store.apply_ticket_update(&ticket, &changes, actor)?;

        let detail = match assignee {
            Some(id) => format!("ticket {} assigned to agent {}", ticket.id, id),
            None => format!("ticket {} unassigned", ticket.id),
        };
        self.log_activity(project_id, actor, "ticket_assigned", &detail);
        self.publish_ticket(TICKET_UPDATED, &ticket);
        Ok(ticket)
    }

    // === Comments ===

    /// Attach a permanent comment to a ticket.
    pub fn create_comment(
        &mut self,
        project_id: i64,
        ticket_id: i64,
        agent_id: i64,
        body: &str,
    ) -> Result<Comment> {
        let ticket = self
            .store
            .get_ticket(project_id, ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket_id)))?;
        if self.store.get_agent(agent_id)?.is_none() {
            return Err(Error::NotFound(format!("agent {}", agent_id)));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::Validation("comment body must not be empty".to_string()));
        }

        let comment = self.store.insert_comment(ticket.id, agent_id, body)?;
        self.log_activity(
            project_id,
            Some(agent_id),
            "comment_added",
            &format!("comment on ticket {}", ticket.id),
        );
        let payload = serde_json::to_value(&comment).unwrap_or(serde_json::Value::Null);
        self.bus
            .publish(Event::for_project(COMMENT_ADDED, project_id, payload));
        Ok(comment)
    }

    /// List a ticket's comments, oldest first.
    pub fn get_comments_by_ticket(
        &self,
        project_id: i64,
        ticket_id: i64,
    ) -> Result<Vec<Comment>> {
        let ticket = self
            .store
            .get_ticket(project_id, ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket_id)))?;
        self.store.list_comments(ticket.id)
    }

    // === Revisions & Activity ===

    /// List a ticket's revision history in chronological order.
    pub fn get_revisions_by_ticket(
        &self,
        project_id: i64,
        ticket_id: i64,
    ) -> Result<Vec<TicketRevision>> {
        let ticket = self
            .store
            .get_ticket(project_id, ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket_id)))?;
        self.store.list_revisions(ticket.id)
    }

    /// Recent live-feed entries for a project, newest first.
    pub fn get_activity_by_project(
        &mut self,
        project_id: i64,
        limit: i64,
    ) -> Result<Vec<Activity>> {
        self.get_project(project_id)?;
        self.store.list_activity(project_id, limit)
    }

    // === Agents ===

    /// Create an agent with a freshly generated API key. Names are globally
    /// unique; a duplicate fails with `Duplicate`.
    pub fn create_agent(&mut self, name: &str) -> Result<Agent> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("agent name must not be empty".to_string()));
        }
        let api_key = Uuid::new_v4().to_string();
        self.store.insert_agent(name, &api_key)
    }

    /// Delete an agent. Back-references are nulled rather than cascaded
    /// (the agent's comments are the one exception and go with it).
    pub fn delete_agent(&mut self, agent_id: i64) -> Result<()> {
        if !self.store.delete_agent(agent_id)? {
            return Err(Error::NotFound(format!("agent {}", agent_id)));
        }
        Ok(())
    }

    /// List all agents.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        self.store.list_agents()
    }

    /// Fetch an agent or fail with `NotFound`.
    pub fn get_agent(&self, agent_id: i64) -> Result<Agent> {
        self.store
            .get_agent(agent_id)?
            .ok_or_else(|| Error::NotFound(format!("agent {}", agent_id)))
    }

    /// Resolve an API key to an agent. Exact equality, no normalization.
    pub fn agent_by_key(&self, api_key: &str) -> Result<Option<Agent>> {
        self.store.get_agent_by_key(api_key)
    }

    // === Admin credential ===

    /// Ensure the admin credential exists, returning it.
    ///
    /// An operator-supplied override always wins and is persisted; otherwise
    /// the persisted value is reused, and a fresh one is generated on first
    /// start.
    pub fn ensure_admin_key(&mut self, overriding: Option<&str>) -> Result<String> {
        if let Some(value) = overriding {
            self.store.set_setting(ADMIN_KEY_SETTING, value)?;
            return Ok(value.to_string());
        }
        if let Some(existing) = self.store.get_setting(ADMIN_KEY_SETTING)? {
            return Ok(existing);
        }
        let generated = Uuid::new_v4().to_string();
        self.store.set_setting(ADMIN_KEY_SETTING, &generated)?;
        Ok(generated)
    }

    /// Generate, persist, and return a new admin credential, invalidating the
    /// old one.
    pub fn rotate_admin_key(&mut self) -> Result<String> {
        let generated = Uuid::new_v4().to_string();
        self.store.set_setting(ADMIN_KEY_SETTING, &generated)?;
        Ok(generated)
    }

    /// Check a presented credential against the persisted admin key.
    pub fn verify_admin_key(&self, presented: &str) -> Result<bool> {
        Ok(self
            .store
            .get_setting(ADMIN_KEY_SETTING)?
            .is_some_and(|key| key == presented))
    }

    // === Internal helpers ===

    /// Append a live-feed entry. Failures are logged and swallowed: telemetry
    /// must never abort the primary operation.
    fn log_activity(&mut self, project_id: i64, actor: Option<i64>, action: &str, detail: &str) {
        if let Err(e) = self
            .store
            .insert_activity(project_id, actor, action, detail)
        {
            warn!(action, error = %e, "failed to record activity entry");
        }
    }

    fn publish_ticket(&self, channel: &str, ticket: &Ticket) {
        let payload = serde_json::to_value(ticket).unwrap_or(serde_json::Value::Null);
        self.bus
            .publish(Event::for_project(channel, ticket.project_id, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        let store = Store::open_in_memory().unwrap();
        Service::new(store, Arc::new(EventBus::new()))
    }

    #[test]
    fn test_create_ticket_requires_project() {
        let mut svc = service();
        let err = svc
            .create_ticket(
                99,
                NewTicket {
                    title: "t".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_create_ticket_rejects_blank_title() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let err = svc
            .create_ticket(
                project.id,
                NewTicket {
                    title: "   ".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_trims_title_before_compare() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let ticket = svc
            .create_ticket(
                project.id,
                NewTicket {
                    title: "Fix bug".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap();

        // Whitespace-only edit is a no-op: zero revisions.
        let updated = svc
            .update_ticket(
                project.id,
                ticket.id,
                TicketPatch {
                    title: Some("  Fix bug  ".to_string()),
                    ..TicketPatch::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(updated.title, "Fix bug");
        assert!(svc
            .get_revisions_by_ticket(project.id, ticket.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_update_leaves_ticket_untouched() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let ticket = svc
            .create_ticket(
                project.id,
                NewTicket {
                    title: "Fix bug".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap();

        // Blank title fails validation even though the column part is fine;
        // nothing is applied.
        let err = svc
            .update_ticket(
                project.id,
                ticket.id,
                TicketPatch {
                    title: Some(" ".to_string()),
                    column: Some(Column::Done),
                    ..TicketPatch::default()
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let unchanged = svc.get_ticket(project.id, ticket.id, None).unwrap();
        assert_eq!(unchanged.column, Column::Backlog);
        assert_eq!(unchanged.title, "Fix bug");
        assert!(svc
            .get_revisions_by_ticket(project.id, ticket.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_assignment_revision_field() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let agent = svc.create_agent("bot1").unwrap();
        let ticket = svc
            .create_ticket(
                project.id,
                NewTicket {
                    title: "t".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap();

        svc.assign_ticket(project.id, ticket.id, agent.id, Some(agent.id))
            .unwrap();
        svc.unassign_ticket(project.id, ticket.id, None).unwrap();

        let revisions = svc.get_revisions_by_ticket(project.id, ticket.id).unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].field, "assignee");
        assert_eq!(revisions[0].old_value, "");
        assert_eq!(revisions[0].new_value, agent.id.to_string());
        assert_eq!(revisions[1].old_value, agent.id.to_string());
        assert_eq!(revisions[1].new_value, "");
        assert!(revisions[1].actor_id.is_none());
    }

    #[test]
    fn test_assign_unknown_agent() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let ticket = svc
            .create_ticket(
                project.id,
                NewTicket {
                    title: "t".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap();
        let err = svc
            .assign_ticket(project.id, ticket.id, 42, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_pagination_rejects_out_of_range_page() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let err = svc
            .get_tickets_by_project(
                project.id,
                None,
                TicketQuery {
                    page: Some(i64::MAX),
                    per_page: Some(100),
                    ..TicketQuery::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_with_unknown_actor_rolls_back() {
        let mut svc = service();
        let project = svc.create_project("p", "").unwrap();
        let ticket = svc
            .create_ticket(
                project.id,
                NewTicket {
                    title: "t".to_string(),
                    ..NewTicket::default()
                },
            )
            .unwrap();

        // Revision rows reference agents; a bogus actor fails the write and
        // the transaction leaves the ticket untouched.
        let err = svc
            .update_ticket(
                project.id,
                ticket.id,
                TicketPatch {
                    title: Some("renamed".to_string()),
                    column: Some(Column::Done),
                    ..TicketPatch::default()
                },
                Some(999),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        let unchanged = svc.get_ticket(project.id, ticket.id, None).unwrap();
        assert_eq!(unchanged.title, "t");
        assert_eq!(unchanged.column, Column::Backlog);
        assert!(svc
            .get_revisions_by_ticket(project.id, ticket.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_admin_key_override_wins_and_persists() {
        let mut svc = service();
        let first = svc.ensure_admin_key(None).unwrap();
        assert_eq!(svc.ensure_admin_key(None).unwrap(), first);

        let forced = svc.ensure_admin_key(Some("operator-key")).unwrap();
        assert_eq!(forced, "operator-key");
        assert!(svc.verify_admin_key("operator-key").unwrap());
        assert!(!svc.verify_admin_key(&first).unwrap());

        let rotated = svc.rotate_admin_key().unwrap();
        assert!(svc.verify_admin_key(&rotated).unwrap());
        assert!(!svc.verify_admin_key("operator-key").unwrap());
    }
}
