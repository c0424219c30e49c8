//! Tool-invocation server for language-model callers.
//!
//! Speaks JSON-RPC 2.0 over stdio: one request per line in, one response per
//! line out. Every domain operation is a discretely named tool with typed
//! arguments. Errors carry a machine-actionable code so an LLM caller can
//! self-correct: `missing_credential`, `invalid_credential`, `no_session`,
//! `invalid_params`, plus the domain codes `not_found`, `validation`,
//! `duplicate`, and `internal_error`.
//!
//! A session is established once per connection with `session.open`, which
//! exchanges an agent API key (or the admin key) for an acting identity.

use crate::models::Column;
use crate::service::{NewTicket, Service, TicketPatch, TicketQuery};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::str::FromStr;

/// Tool definitions for the manifest.
pub mod tools {
    /// One invocable tool.
    pub struct ToolDef {
        pub name: &'static str,
        pub description: &'static str,
    }

    /// Get all available tools.
    pub fn get_tools() -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "session.open",
                description: "Open a session with an agent API key or the admin key",
            },
            ToolDef {
                name: "project.create",
                description: "Create a new project",
            },
            ToolDef {
                name: "project.list",
                description: "List all projects",
            },
            ToolDef {
                name: "project.delete",
                description: "Delete a project and everything under it",
            },
            ToolDef {
                name: "ticket.create",
                description: "Create a ticket in a project (defaults to backlog)",
            },
            ToolDef {
                name: "ticket.list",
                description: "List tickets in a project with optional column filter and paging",
            },
            ToolDef {
                name: "ticket.get",
                description: "Show one ticket",
            },
            ToolDef {
                name: "ticket.update",
                description: "Update a ticket's title, description, or column",
            },
            ToolDef {
                name: "ticket.move",
                description: "Move a ticket to another column",
            },
            ToolDef {
                name: "ticket.delete",
                description: "Hard-delete a ticket with its comments and revisions",
            },
            ToolDef {
                name: "ticket.assign",
                description: "Assign a ticket to an agent",
            },
            ToolDef {
                name: "ticket.unassign",
                description: "Clear a ticket's assignee",
            },
            ToolDef {
                name: "comment.create",
                description: "Add a permanent comment to a ticket",
            },
            ToolDef {
                name: "comment.list",
                description: "List a ticket's comments",
            },
            ToolDef {
                name: "revision.list",
                description: "List a ticket's field-change history",
            },
            ToolDef {
                name: "activity.list",
                description: "List recent project activity",
            },
            ToolDef {
                name: "agent.create",
                description: "Create an agent (admin session required)",
            },
            ToolDef {
                name: "agent.list",
                description: "List agents (admin session required)",
            },
            ToolDef {
                name: "agent.delete",
                description: "Delete an agent (admin session required)",
            },
        ]
    }
}

/// Machine-actionable error codes carried in `error.data.code`.
mod codes {
    pub const MISSING_CREDENTIAL: &str = "missing_credential";
    pub const INVALID_CREDENTIAL: &str = "invalid_credential";
    pub const NO_SESSION: &str = "no_session";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION: &str = "validation";
    pub const DUPLICATE: &str = "duplicate";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Who the session acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identity {
    /// An agent resolved from its API key; domain mutations carry its id.
    Agent(i64),
    /// The shared admin credential; acts with a null actor.
    Admin,
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcFailure {
    code: i64,
    message: String,
    data: Value,
}

/// Stateful tool-invocation server for one stdio connection.
pub struct McpServer {
    service: Service,
    session: Option<Identity>,
}

impl McpServer {
    /// Create a server over a business service.
    pub fn new(service: Service) -> Self {
        Self {
            service,
            session: None,
        }
    }

    /// Establish a session from a credential without a `session.open` call.
    pub fn open_session_key(&mut self, key: &str) -> Result<()> {
        if self.service.verify_admin_key(key)? {
            self.session = Some(Identity::Admin);
            return Ok(());
        }
        match self.service.agent_by_key(key)? {
            Some(agent) => {
                self.session = Some(Identity::Agent(agent.id));
                Ok(())
            }
            None => Err(Error::Validation(
                "credential does not match any agent or the admin key".to_string(),
            )),
        }
    }

    /// Run the stdio loop until stdin closes.
    pub fn serve(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line);
            serde_json::to_writer(&mut out, &response)?;
            writeln!(out)?;
            out.flush()?;
        }
        Ok(())
    }

    /// Handle one raw request line.
    pub fn handle_line(&mut self, line: &str) -> Value {
        match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => self.handle_request(request),
            Err(e) => error_response(
                Value::Null,
                -32700,
                codes::INVALID_PARAMS,
                &format!("malformed request: {}", e),
            ),
        }
    }

    fn handle_request(&mut self, request: RpcRequest) -> Value {
        let id = request.id.clone();
        let result = self.dispatch(&request.method, request.params);

        // Every call is audited, session or not.
        let actor = match self.session {
            Some(Identity::Agent(agent_id)) => Some(agent_id),
            _ => None,
        };
        let (outcome, details) = match &result {
            Ok(_) => ("ok".to_string(), String::new()),
            Err(failure) => (
                failure
                    .data
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or("error")
                    .to_string(),
                failure.message.clone(),
            ),
        };
        self.service
            .record_audit(actor, &request.method, "mcp", &outcome, &details);

        match result {
            Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
            Err(failure) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": failure.code, "message": failure.message, "data": failure.data },
            }),
        }
    }

    fn dispatch(&mut self, method: &str, params: Value) -> std::result::Result<Value, RpcFailure> {
        match method {
            "session.open" => self.open_session(params),
            "tools.list" => Ok(manifest_value()),
            _ => {
                // Everything else requires an established session.
                let identity = self.session.ok_or_else(|| {
                    failure(
                        -32000,
                        codes::NO_SESSION,
                        "no session established; call session.open first",
                    )
                })?;
                self.dispatch_tool(method, params, identity)
            }
        }
    }

    fn open_session(&mut self, params: Value) -> std::result::Result<Value, RpcFailure> {
        #[derive(Deserialize)]
        struct OpenSession {
            #[serde(default)]
            api_key: Option<String>,
        }
        let args: OpenSession = parse_params(params)?;
        let Some(key) = args.api_key else {
            return Err(failure(
                -32000,
                codes::MISSING_CREDENTIAL,
                "api_key is required",
            ));
        };

        if domain(self.service.verify_admin_key(&key))? {
            self.session = Some(Identity::Admin);
            return Ok(json!({ "session": "admin" }));
        }
        match domain(self.service.agent_by_key(&key))? {
            Some(agent) => {
                self.session = Some(Identity::Agent(agent.id));
                Ok(json!({ "session": "agent", "agent_id": agent.id, "name": agent.name }))
            }
            None => Err(failure(
                -32000,
                codes::INVALID_CREDENTIAL,
                "credential does not match any agent or the admin key",
            )),
        }
    }

    fn dispatch_tool(
        &mut self,
        method: &str,
        params: Value,
        identity: Identity,
    ) -> std::result::Result<Value, RpcFailure> {
        let actor = match identity {
            Identity::Agent(agent_id) => Some(agent_id),
            Identity::Admin => None,
        };
        match method {
            "project.create" => {
                #[derive(Deserialize)]
                struct Args {
                    name: String,
                    #[serde(default)]
                    description: String,
                }
                let args: Args = parse_params(params)?;
                to_json(domain(
                    self.service.create_project(&args.name, &args.description),
                )?)
            }
            "project.list" => to_json(domain(self.service.list_projects())?),
            "project.delete" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                }
                let args: Args = parse_params(params)?;
                domain(self.service.delete_project(args.project_id))?;
                Ok(json!({ "deleted": true }))
            }
            "ticket.create" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    title: String,
                    #[serde(default)]
                    description: Option<String>,
                    #[serde(default)]
                    column: Option<String>,
                }
                let args: Args = parse_params(params)?;
                let column = parse_column(args.column.as_deref())?;
                to_json(domain(self.service.create_ticket(
                    args.project_id,
                    NewTicket {
                        title: args.title,
                        description: args.description,
                        column,
                        created_by: actor,
                    },
                ))?)
            }
            "ticket.list" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    #[serde(default)]
                    column: Option<String>,
                    #[serde(default)]
                    page: Option<i64>,
                    #[serde(default)]
                    per_page: Option<i64>,
                }
                let args: Args = parse_params(params)?;
                let column = parse_column(args.column.as_deref())?;
                to_json(domain(self.service.get_tickets_by_project(
                    args.project_id,
                    actor,
                    TicketQuery {
                        column,
                        page: args.page,
                        per_page: args.per_page,
                    },
                ))?)
            }
            "ticket.get" => {
                let args: TicketRef = parse_params(params)?;
                to_json(domain(self.service.get_ticket(
                    args.project_id,
                    args.ticket_id,
                    actor,
                ))?)
            }
            "ticket.update" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    ticket_id: i64,
                    #[serde(default)]
                    title: Option<String>,
                    #[serde(default)]
                    description: Option<String>,
                    #[serde(default)]
                    column: Option<String>,
                }
                let args: Args = parse_params(params)?;
                let column = parse_column(args.column.as_deref())?;
                to_json(domain(self.service.update_ticket(
                    args.project_id,
                    args.ticket_id,
                    TicketPatch {
                        title: args.title,
                        description: args.description,
                        column,
                    },
                    actor,
                ))?)
            }
            "ticket.move" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    ticket_id: i64,
                    column: String,
                }
                let args: Args = parse_params(params)?;
                let column = Column::from_str(&args.column)
                    .map_err(|e| failure(-32000, codes::VALIDATION, &e.to_string()))?;
                to_json(domain(self.service.move_ticket(
                    args.project_id,
                    args.ticket_id,
                    column,
                    actor,
                ))?)
            }
            "ticket.delete" => {
                let args: TicketRef = parse_params(params)?;
                domain(
                    self.service
                        .delete_ticket(args.project_id, args.ticket_id, actor),
                )?;
                Ok(json!({ "deleted": true }))
            }
            "ticket.assign" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    ticket_id: i64,
                    assignee_id: i64,
                }
                let args: Args = parse_params(params)?;
                to_json(domain(self.service.assign_ticket(
                    args.project_id,
                    args.ticket_id,
                    args.assignee_id,
                    actor,
                ))?)
            }
            "ticket.unassign" => {
                let args: TicketRef = parse_params(params)?;
                to_json(domain(self.service.unassign_ticket(
                    args.project_id,
                    args.ticket_id,
                    actor,
                ))?)
            }
            "comment.create" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    ticket_id: i64,
                    body: String,
                }
                let args: Args = parse_params(params)?;
                let Identity::Agent(agent_id) = identity else {
                    return Err(failure(
                        -32000,
                        codes::VALIDATION,
                        "comments require an agent session",
                    ));
                };
                to_json(domain(self.service.create_comment(
                    args.project_id,
                    args.ticket_id,
                    agent_id,
                    &args.body,
                ))?)
            }
            "comment.list" => {
                let args: TicketRef = parse_params(params)?;
                to_json(domain(
                    self.service
                        .get_comments_by_ticket(args.project_id, args.ticket_id),
                )?)
            }
            "revision.list" => {
                let args: TicketRef = parse_params(params)?;
                to_json(domain(
                    self.service
                        .get_revisions_by_ticket(args.project_id, args.ticket_id),
                )?)
            }
            "activity.list" => {
                #[derive(Deserialize)]
                struct Args {
                    project_id: i64,
                    #[serde(default)]
                    limit: Option<i64>,
                }
                let args: Args = parse_params(params)?;
                let limit = args.limit.unwrap_or(50).clamp(1, 500);
                to_json(domain(
                    self.service.get_activity_by_project(args.project_id, limit),
                )?)
            }
            "agent.create" => {
                #[derive(Deserialize)]
                struct Args {
                    name: String,
                }
                let args: Args = parse_params(params)?;
                require_admin(identity)?;
                to_json(domain(self.service.create_agent(&args.name))?)
            }
            "agent.list" => {
                require_admin(identity)?;
                to_json(domain(self.service.list_agents())?)
            }
            "agent.delete" => {
                #[derive(Deserialize)]
                struct Args {
                    agent_id: i64,
                }
                let args: Args = parse_params(params)?;
                require_admin(identity)?;
                domain(self.service.delete_agent(args.agent_id))?;
                Ok(json!({ "deleted": true }))
            }
            _ => Err(failure(
                -32601,
                codes::METHOD_NOT_FOUND,
                &format!("unknown method '{}'", method),
            )),
        }
    }
}

/// A (project, ticket) pair shared by several tools.
#[derive(Deserialize)]
struct TicketRef {
    project_id: i64,
    ticket_id: i64,
}

fn require_admin(identity: Identity) -> std::result::Result<(), RpcFailure> {
    if identity == Identity::Admin {
        Ok(())
    } else {
        Err(failure(
            -32000,
            codes::INVALID_CREDENTIAL,
            "admin session required",
        ))
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Value,
) -> std::result::Result<T, RpcFailure> {
    let params = if params.is_null() {
        json!({})
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| failure(-32602, codes::INVALID_PARAMS, &format!("bad params: {}", e)))
}

fn parse_column(raw: Option<&str>) -> std::result::Result<Option<Column>, RpcFailure> {
    match raw {
        None => Ok(None),
        Some(s) => Column::from_str(s)
            .map(Some)
            .map_err(|e| failure(-32000, codes::VALIDATION, &e.to_string())),
    }
}

/// Map a domain result into the RPC failure taxonomy.
fn domain<T>(result: Result<T>) -> std::result::Result<T, RpcFailure> {
    result.map_err(|e| {
        let code = match &e {
            Error::NotFound(_) => codes::NOT_FOUND,
            Error::Validation(_) => codes::VALIDATION,
            Error::Duplicate(_) => codes::DUPLICATE,
            _ => codes::INTERNAL_ERROR,
        };
        let message = if code == codes::INTERNAL_ERROR {
            "internal error".to_string()
        } else {
            e.to_string()
        };
        failure(-32000, code, &message)
    })
}

fn to_json<T: Serialize>(value: T) -> std::result::Result<Value, RpcFailure> {
    serde_json::to_value(value)
        .map_err(|e| failure(-32000, codes::INTERNAL_ERROR, &format!("encode: {}", e)))
}

fn failure(code: i64, kind: &str, message: &str) -> RpcFailure {
    RpcFailure {
        code,
        message: message.to_string(),
        data: json!({ "code": kind }),
    }
}

fn error_response(id: Value, code: i64, kind: &str, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message, "data": { "code": kind } },
    })
}

fn manifest_value() -> Value {
    let tools: Vec<Value> = tools::get_tools()
        .iter()
        .map(|t| json!({ "name": t.name, "description": t.description }))
        .collect();
    json!({ "tools": tools })
}

/// Print the tool manifest to stdout.
pub fn manifest() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&manifest_value())?);
    Ok(())
}
