//! Web server exposing the board over a JSON API plus a WebSocket feed.
//!
//! Handlers are thin translators: they check request shape, resolve the
//! caller's identity from the `X-Api-Key` header, call exactly one business
//! service method, record an audit entry, and map the typed error to a status
//! code (not-found → 404, validation → 400, duplicate → 409, anything else →
//! 500). Domain rules live in the service, not here.

pub mod websocket;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::events::EventBus;
use crate::models::Column;
use crate::service::audit::outcome_of;
use crate::service::{NewTicket, Service, TicketPatch, TicketQuery};
use crate::storage::Store;
use crate::{Error, Result};

/// Server configuration resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Database path
    pub db_path: PathBuf,
    /// Operator-supplied admin key; always wins and is persisted
    pub admin_key: Option<String>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Business service guarding the store (one operation at a time)
    pub service: Arc<Mutex<Service>>,
    /// Event bus feeding WebSocket subscribers
    pub bus: Arc<EventBus>,
}

/// Start the server and run until interrupted.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let store = Store::open(&config.db_path)?;
    let bus = Arc::new(EventBus::new());
    let mut service = Service::new(store, Arc::clone(&bus));
    service.ensure_admin_key(config.admin_key.as_deref())?;

    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        bus,
    };
    let app = router(state);

    let host_addr: std::net::IpAddr = config
        .host
        .parse()
        .map_err(|e| Error::Other(format!("invalid host address '{}': {}", config.host, e)))?;
    let addr = SocketAddr::from((host_addr, config.port));
    info!(%addr, db = %config.db_path.display(), "starting corkboard server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::Io)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Io)?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

/// Build the route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:project_id",
            get(get_project).delete(delete_project),
        )
        .route(
            "/api/projects/:project_id/tickets",
            get(list_tickets).post(create_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id",
            get(get_ticket).patch(update_ticket).delete(delete_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/move",
            post(move_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/close",
            post(close_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/open",
            post(open_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/assign",
            post(assign_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/unassign",
            post(unassign_ticket),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/api/projects/:project_id/tickets/:ticket_id/revisions",
            get(list_revisions),
        )
        .route("/api/projects/:project_id/activity", get(list_activity))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/:agent_id", delete(delete_agent))
        .route("/api/admin/rotate-key", post(rotate_admin_key))
        .route("/api/audit", get(list_audit))
        .route("/ws", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wire-level error: a status code plus a JSON body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let (status, message) = match &e {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, format!("not found: {}", msg)),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Duplicate(msg) => (StatusCode::CONFLICT, msg.clone()),
            // Storage-level error text stays out of responses.
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Resolve the acting agent from the `X-Api-Key` header.
///
/// No header means a human caller (`None`). A header that matches no agent is
/// rejected outright rather than silently downgraded to anonymous.
fn resolve_actor(service: &Service, headers: &HeaderMap) -> ApiResult<Option<i64>> {
    let Some(raw) = headers.get("x-api-key") else {
        return Ok(None);
    };
    let key = raw
        .to_str()
        .map_err(|_| ApiError::unauthorized("malformed API key header"))?;
    match service.agent_by_key(key).map_err(ApiError::from)? {
        Some(agent) => Ok(Some(agent.id)),
        None => Err(ApiError::unauthorized("unknown API key")),
    }
}

/// Require the admin credential in `X-Api-Key`.
fn require_admin(service: &Service, headers: &HeaderMap) -> ApiResult<()> {
    let Some(raw) = headers.get("x-api-key") else {
        return Err(ApiError::unauthorized("admin key required"));
    };
    let key = raw
        .to_str()
        .map_err(|_| ApiError::unauthorized("malformed API key header"))?;
    if service.verify_admin_key(key).map_err(ApiError::from)? {
        Ok(())
    } else {
        Err(ApiError::unauthorized("invalid admin key"))
    }
}

fn parse_column(raw: &str) -> ApiResult<Column> {
    Column::from_str(raw).map_err(ApiError::from)
}

/// Record one audited call and translate its result for the wire.
fn finish<T: serde::Serialize>(
    service: &mut Service,
    actor: Option<i64>,
    operation: &str,
    resource: &str,
    result: Result<T>,
) -> ApiResult<Json<T>> {
    let details = match &result {
        Ok(_) => String::new(),
        Err(e) => e.to_string(),
    };
    service.record_audit(actor, operation, resource, outcome_of(&result), &details);
    result.map(Json).map_err(ApiError::from)
}

// === Projects ===

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let result = service.create_project(&req.name, &req.description);
    finish(&mut service, actor, "project.create", "project", result)
        .map(|json| (StatusCode::CREATED, json))
}

async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let result = service.list_projects();
    finish(&mut service, actor, "project.list", "project", result)
}

async fn get_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(project_id): AxumPath<i64>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}", project_id);
    let result = service.get_project(project_id);
    finish(&mut service, actor, "project.get", &resource, result)
}

async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(project_id): AxumPath<i64>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}", project_id);
    let result = service
        .delete_project(project_id)
        .map(|_| serde_json::json!({ "deleted": true }));
    finish(&mut service, actor, "project.delete", &resource, result)
}

// === Tickets ===

#[derive(Debug, Deserialize)]
struct CreateTicketRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    column: Option<String>,
}

async fn create_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(project_id): AxumPath<i64>,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let column = req.column.as_deref().map(parse_column).transpose()?;
    let resource = format!("project/{}", project_id);
    let result = service.create_ticket(
        project_id,
        NewTicket {
            title: req.title,
            description: req.description,
            column,
            created_by: actor,
        },
    );
    finish(&mut service, actor, "ticket.create", &resource, result)
        .map(|json| (StatusCode::CREATED, json))
}

#[derive(Debug, Deserialize)]
struct ListTicketsQuery {
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    per_page: Option<i64>,
}

async fn list_tickets(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(project_id): AxumPath<i64>,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let column = query.column.as_deref().map(parse_column).transpose()?;
    let resource = format!("project/{}", project_id);
    let result = service.get_tickets_by_project(
        project_id,
        actor,
        TicketQuery {
            column,
            page: query.page,
            per_page: query.per_page,
        },
    );
    finish(&mut service, actor, "ticket.list", &resource, result)
}

async fn get_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.get_ticket(project_id, ticket_id, actor);
    finish(&mut service, actor, "ticket.get", &resource, result)
}

#[derive(Debug, Deserialize)]
struct UpdateTicketRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    column: Option<String>,
}

async fn update_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
    Json(req): Json<UpdateTicketRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let column = req.column.as_deref().map(parse_column).transpose()?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.update_ticket(
        project_id,
        ticket_id,
        TicketPatch {
            title: req.title,
            description: req.description,
            column,
        },
        actor,
    );
    finish(&mut service, actor, "ticket.update", &resource, result)
}

#[derive(Debug, Deserialize)]
struct MoveTicketRequest {
    column: String,
}

async fn move_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
    Json(req): Json<MoveTicketRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let column = parse_column(&req.column)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.move_ticket(project_id, ticket_id, column, actor);
    finish(&mut service, actor, "ticket.move", &resource, result)
}

async fn close_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    // Human-only shortcut: always recorded with a null actor.
    let result = service.close_ticket(project_id, ticket_id);
    finish(&mut service, None, "ticket.close", &resource, result)
}

async fn open_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.open_ticket(project_id, ticket_id);
    finish(&mut service, None, "ticket.open", &resource, result)
}

async fn delete_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service
        .delete_ticket(project_id, ticket_id, actor)
        .map(|_| serde_json::json!({ "deleted": true }));
    finish(&mut service, actor, "ticket.delete", &resource, result)
}

#[derive(Debug, Deserialize)]
struct AssignTicketRequest {
    assignee_id: i64,
}

async fn assign_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
    Json(req): Json<AssignTicketRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.assign_ticket(project_id, ticket_id, req.assignee_id, actor);
    finish(&mut service, actor, "ticket.assign", &resource, result)
}

async fn unassign_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.unassign_ticket(project_id, ticket_id, actor);
    finish(&mut service, actor, "ticket.unassign", &resource, result)
}

// === Comments & Revisions ===

#[derive(Debug, Deserialize)]
struct CreateCommentRequest {
    body: String,
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let Some(agent_id) = actor else {
        return Err(ApiError::from(Error::Validation(
            "comments require an authenticated agent".to_string(),
        )));
    };
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.create_comment(project_id, ticket_id, agent_id, &req.body);
    finish(&mut service, actor, "comment.create", &resource, result)
        .map(|json| (StatusCode::CREATED, json))
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.get_comments_by_ticket(project_id, ticket_id);
    finish(&mut service, actor, "comment.list", &resource, result)
}

async fn list_revisions(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((project_id, ticket_id)): AxumPath<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let resource = format!("project/{}/ticket/{}", project_id, ticket_id);
    let result = service.get_revisions_by_ticket(project_id, ticket_id);
    finish(&mut service, actor, "revision.list", &resource, result)
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    #[serde(default)]
    limit: Option<i64>,
}

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

async fn list_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(project_id): AxumPath<i64>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    let actor = resolve_actor(&service, &headers)?;
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 500);
    let resource = format!("project/{}", project_id);
    let result = service.get_activity_by_project(project_id, limit);
    finish(&mut service, actor, "activity.list", &resource, result)
}

// === Agents & Admin ===

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    name: String,
}

async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    require_admin(&service, &headers)?;
    let result = service.create_agent(&req.name);
    finish(&mut service, None, "agent.create", "agent", result)
        .map(|json| (StatusCode::CREATED, json))
}

async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    require_admin(&service, &headers)?;
    let result = service.list_agents();
    finish(&mut service, None, "agent.list", "agent", result)
}

async fn delete_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(agent_id): AxumPath<i64>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    require_admin(&service, &headers)?;
    let resource = format!("agent/{}", agent_id);
    let result = service
        .delete_agent(agent_id)
        .map(|_| serde_json::json!({ "deleted": true }));
    finish(&mut service, None, "agent.delete", &resource, result)
}

async fn rotate_admin_key(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    require_admin(&service, &headers)?;
    let result = service
        .rotate_admin_key()
        .map(|key| serde_json::json!({ "admin_key": key }));
    finish(&mut service, None, "admin.rotate_key", "admin", result)
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    #[serde(default)]
    limit: Option<i64>,
}

async fn list_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut service = state.service.lock().await;
    require_admin(&service, &headers)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let result = service.recent_audit(limit);
    finish(&mut service, None, "audit.list", "audit", result)
}
