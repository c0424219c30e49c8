//! Integration tests for the business service: revision history, column
//! moves, cascades, pagination, and event publication.

use corkboard::events::{EventBus, EventFilter, TICKET_CREATED, TICKET_UPDATED};
use corkboard::models::Column;
use corkboard::service::{NewTicket, Service, TicketPatch, TicketQuery};
use corkboard::storage::Store;
use corkboard::Error;
use std::sync::Arc;

fn service() -> Service {
    let store = Store::open_in_memory().unwrap();
    Service::new(store, Arc::new(EventBus::new()))
}

fn new_ticket(title: &str) -> NewTicket {
    NewTicket {
        title: title.to_string(),
        ..NewTicket::default()
    }
}

#[test]
fn test_create_defaults_to_backlog_with_no_revisions() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();

    let ticket = svc.create_ticket(project.id, new_ticket("First")).unwrap();
    assert_eq!(ticket.column, Column::Backlog);
    assert_eq!(ticket.position, 0);

    let second = svc.create_ticket(project.id, new_ticket("Second")).unwrap();
    assert_eq!(second.position, 1);

    // Creation is not a mutation of an existing ticket.
    assert!(svc
        .get_revisions_by_ticket(project.id, ticket.id)
        .unwrap()
        .is_empty());
}

#[test]
fn test_move_records_exactly_one_column_revision() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let ticket = svc.create_ticket(project.id, new_ticket("t")).unwrap();

    let moved = svc
        .move_ticket(project.id, ticket.id, Column::InProgress, None)
        .unwrap();
    assert_eq!(moved.column, Column::InProgress);
    assert_eq!(moved.position, 0);

    let revisions = svc.get_revisions_by_ticket(project.id, ticket.id).unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].field, "column");
    assert_eq!(revisions[0].old_value, "backlog");
    assert_eq!(revisions[0].new_value, "in_progress");
    assert!(revisions[0].actor_id.is_none());
}

#[test]
fn test_move_appends_to_end_of_target_column() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let a = svc.create_ticket(project.id, new_ticket("a")).unwrap();
    let b = svc.create_ticket(project.id, new_ticket("b")).unwrap();

    svc.move_ticket(project.id, a.id, Column::Ready, None).unwrap();
    let moved_b = svc
        .move_ticket(project.id, b.id, Column::Ready, None)
        .unwrap();
    assert_eq!(moved_b.position, 1);
}

#[test]
fn test_noop_update_records_nothing() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let ticket = svc.create_ticket(project.id, new_ticket("Same")).unwrap();

    let unchanged = svc
        .update_ticket(
            project.id,
            ticket.id,
            TicketPatch {
                title: Some("Same".to_string()),
                column: Some(Column::Backlog),
                ..TicketPatch::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(unchanged.title, "Same");
    assert!(svc
        .get_revisions_by_ticket(project.id, ticket.id)
        .unwrap()
        .is_empty());
}

#[test]
fn test_close_is_idempotent() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let ticket = svc.create_ticket(project.id, new_ticket("t")).unwrap();

    let closed = svc.close_ticket(project.id, ticket.id).unwrap();
    assert_eq!(closed.column, Column::Done);
    assert_eq!(
        svc.get_revisions_by_ticket(project.id, ticket.id)
            .unwrap()
            .len(),
        1
    );

    // Closing again changes nothing.
    let again = svc.close_ticket(project.id, ticket.id).unwrap();
    assert_eq!(again.column, Column::Done);
    assert_eq!(
        svc.get_revisions_by_ticket(project.id, ticket.id)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_multi_field_update_fixed_revision_order() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let agent = svc.create_agent("bot1").unwrap();
    let ticket = svc.create_ticket(project.id, new_ticket("Old")).unwrap();

    svc.update_ticket(
        project.id,
        ticket.id,
        TicketPatch {
            title: Some("New".to_string()),
            description: Some("details".to_string()),
            column: Some(Column::InReview),
        },
        Some(agent.id),
    )
    .unwrap();

    let revisions = svc.get_revisions_by_ticket(project.id, ticket.id).unwrap();
    let fields: Vec<&str> = revisions.iter().map(|r| r.field.as_str()).collect();
    assert_eq!(fields, vec!["title", "description", "column"]);
    for revision in &revisions {
        assert_eq!(revision.actor_id, Some(agent.id));
    }
}

#[test]
fn test_lifecycle_history_with_mixed_actors() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let agent = svc.create_agent("bot1").unwrap();

    let ticket = svc
        .create_ticket(
            project.id,
            NewTicket {
                title: "Ship it".to_string(),
                created_by: Some(agent.id),
                ..NewTicket::default()
            },
        )
        .unwrap();

    svc.update_ticket(
        project.id,
        ticket.id,
        TicketPatch {
            title: Some("Ship it soon".to_string()),
            ..TicketPatch::default()
        },
        Some(agent.id),
    )
    .unwrap();
    svc.close_ticket(project.id, ticket.id).unwrap();

    let revisions = svc.get_revisions_by_ticket(project.id, ticket.id).unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].field, "title");
    assert_eq!(revisions[0].actor_id, Some(agent.id));
    // The close shortcut is always attributed to a human (null actor).
    assert_eq!(revisions[1].field, "column");
    assert!(revisions[1].actor_id.is_none());
}

#[test]
fn test_full_lifecycle_yields_three_revisions_in_order() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let agent = svc.create_agent("bot1").unwrap();

    let ticket = svc
        .create_ticket(
            project.id,
            NewTicket {
                title: "Fix bug".to_string(),
                created_by: Some(agent.id),
                ..NewTicket::default()
            },
        )
        .unwrap();
    svc.move_ticket(project.id, ticket.id, Column::InProgress, Some(agent.id))
        .unwrap();
    svc.update_ticket(
        project.id,
        ticket.id,
        TicketPatch {
            title: Some("Fix login bug".to_string()),
            ..TicketPatch::default()
        },
        Some(agent.id),
    )
    .unwrap();
    svc.close_ticket(project.id, ticket.id).unwrap();

    let revisions = svc.get_revisions_by_ticket(project.id, ticket.id).unwrap();
    assert_eq!(revisions.len(), 3);
    assert_eq!(revisions[0].field, "column");
    assert_eq!(revisions[0].old_value, "backlog");
    assert_eq!(revisions[0].new_value, "in_progress");
    assert_eq!(revisions[0].actor_id, Some(agent.id));
    assert_eq!(revisions[1].field, "title");
    assert_eq!(revisions[1].old_value, "Fix bug");
    assert_eq!(revisions[1].new_value, "Fix login bug");
    assert_eq!(revisions[2].field, "column");
    assert_eq!(revisions[2].old_value, "in_progress");
    assert_eq!(revisions[2].new_value, "done");
    assert!(revisions[2].actor_id.is_none());
    // Chronological: ids strictly increase.
    assert!(revisions.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[test]
fn test_duplicate_agent_name_rejected() {
    let mut svc = service();
    svc.create_agent("bot1").unwrap();
    let err = svc.create_agent("bot1").unwrap_err();
    assert!(matches!(err, Error::Duplicate(_)));
}

#[test]
fn test_agent_delete_nulls_history_but_drops_comments() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let agent = svc.create_agent("bot1").unwrap();
    let ticket = svc
        .create_ticket(
            project.id,
            NewTicket {
                title: "t".to_string(),
                created_by: Some(agent.id),
                ..NewTicket::default()
            },
        )
        .unwrap();
    svc.move_ticket(project.id, ticket.id, Column::Ready, Some(agent.id))
        .unwrap();
    svc.create_comment(project.id, ticket.id, agent.id, "note")
        .unwrap();

    svc.delete_agent(agent.id).unwrap();

    let ticket = svc.get_ticket(project.id, ticket.id, None).unwrap();
    assert!(ticket.created_by.is_none());

    // Revisions survive with a null actor; comments go with their author.
    let revisions = svc.get_revisions_by_ticket(project.id, ticket.id).unwrap();
    assert_eq!(revisions.len(), 1);
    assert!(revisions[0].actor_id.is_none());
    assert!(svc
        .get_comments_by_ticket(project.id, ticket.id)
        .unwrap()
        .is_empty());
}

#[test]
fn test_project_delete_cascades() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let ticket = svc.create_ticket(project.id, new_ticket("t")).unwrap();

    svc.delete_project(project.id).unwrap();

    let err = svc.get_ticket(project.id, ticket.id, None).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    let err = svc.get_project(project.id).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_pagination_totals() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    for i in 0..7 {
        svc.create_ticket(project.id, new_ticket(&format!("t{}", i)))
            .unwrap();
    }

    let query = |page| TicketQuery {
        page: Some(page),
        per_page: Some(3),
        ..TicketQuery::default()
    };
    let first = svc
        .get_tickets_by_project(project.id, None, query(1))
        .unwrap();
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.total, 7);
    assert_eq!(first.total_pages, 3);

    let last = svc
        .get_tickets_by_project(project.id, None, query(3))
        .unwrap();
    assert_eq!(last.items.len(), 1);

    // Out-of-range pages are empty, not errors.
    let beyond = svc
        .get_tickets_by_project(project.id, None, query(4))
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 7);
}

#[test]
fn test_column_filter_orders_by_position() {
    let mut svc = service();
    let project = svc.create_project("Board", "").unwrap();
    let a = svc.create_ticket(project.id, new_ticket("a")).unwrap();
    let b = svc.create_ticket(project.id, new_ticket("b")).unwrap();
    svc.create_ticket(project.id, new_ticket("c")).unwrap();

    svc.move_ticket(project.id, b.id, Column::Ready, None).unwrap();
    svc.move_ticket(project.id, a.id, Column::Ready, None).unwrap();

    let page = svc
        .get_tickets_by_project(
            project.id,
            None,
            TicketQuery {
                column: Some(Column::Ready),
                ..TicketQuery::default()
            },
        )
        .unwrap();
    let ids: Vec<i64> = page.items.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
}

#[tokio::test]
async fn test_mutations_reach_project_subscribers() {
    let mut svc = service();
    let bus = svc.bus();
    let project = svc.create_project("Board", "").unwrap();

    let mut created = bus.subscribe_filtered(TICKET_CREATED, EventFilter::project(project.id));
    let mut updated = bus.subscribe_filtered(TICKET_UPDATED, EventFilter::project(project.id));

    let ticket = svc.create_ticket(project.id, new_ticket("t")).unwrap();
    let event = created.recv().await.unwrap();
    assert_eq!(event.payload["id"], ticket.id);
    assert_eq!(event.payload["column"], "backlog");

    svc.move_ticket(project.id, ticket.id, Column::Done, None)
        .unwrap();
    let event = updated.recv().await.unwrap();
    assert_eq!(event.payload["column"], "done");

    // A no-op close after the move publishes nothing further.
    let published = bus.events_published();
    svc.close_ticket(project.id, ticket.id).unwrap();
    assert_eq!(bus.events_published(), published);
}
