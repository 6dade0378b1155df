//! Unix socket JSON-RPC server.
//!
//! Listens on ~/.omniview/omniview.sock for newline-delimited JSON-RPC 2.0
//! requests. Local only, no TCP exposure; the socket is owner-only.
//!
//! Check methods that fan out (`ov.check.project`, `ov.check.all`) reply
//! as soon as every probe is dispatched. Clients poll `ov.cells` and
//! `ov.summary` to watch results land.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use crate::catalog;
use crate::checks::aggregate::Scope;
use crate::checks::CheckOrchestrator;
use crate::projects::{ProjectId, ProjectRecord, ProjectStore};

// ── JSON-RPC Types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
    }
    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self { jsonrpc: "2.0".into(), result: None, error: Some(JsonRpcError { code, message }), id }
    }
    fn missing(id: Option<Value>, what: &str) -> Self {
        Self::error(id, -32602, format!("Missing required param: {}", what))
    }
}

// ── Server ──────────────────────────────────────────────────────────

pub struct Server {
    socket_path: PathBuf,
    projects: Arc<ProjectStore>,
    orchestrator: CheckOrchestrator,
    pulse_interval: Duration,
}

impl Server {
    pub fn new(
        socket_path: PathBuf,
        projects: Arc<ProjectStore>,
        orchestrator: CheckOrchestrator,
        pulse_interval: Duration,
    ) -> Self {
        Self { socket_path, projects, orchestrator, pulse_interval }
    }

    pub async fn run(&self) -> Result<()> {
        // Remove stale socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(socket = %self.socket_path.display(), "OmniView server listening");

        // ── Health pulse background timer ──
        {
            let orchestrator = self.orchestrator.clone();
            let projects = Arc::clone(&self.projects);
            let period = self.pulse_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await; // Skip the immediate tick
                loop {
                    interval.tick().await;
                    let summary = orchestrator.summary(&Scope::All);
                    info!(
                        projects = projects.len(),
                        cells = summary.cells,
                        online = summary.online,
                        avg_latency_ms = summary.avg_latency_ms,
                        requests = summary.total_requests,
                        in_flight = orchestrator.in_flight_count(),
                        "Health pulse"
                    );
                }
            });
        }

        loop {
            let (stream, _) = listener.accept().await?;
            let projects = Arc::clone(&self.projects);
            let orchestrator = self.orchestrator.clone();

            tokio::spawn(serve_connection(stream, projects, orchestrator, MAX_REQUEST_BYTES));
        }
    }
}

/// Per-request read bound.
const MAX_REQUEST_BYTES: u64 = 1_048_576;

/// Answer newline-delimited requests until the client hangs up. Each line
/// may be at most `max_request_bytes`; a longer one gets an error reply
/// and the connection is closed.
async fn serve_connection(
    stream: UnixStream,
    projects: Arc<ProjectStore>,
    orchestrator: CheckOrchestrator,
    max_request_bytes: u64,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader.take(max_request_bytes));
    let mut line = String::new();

    loop {
        line.clear();
        reader.get_mut().set_limit(max_request_bytes);
        let response = match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) if !line.ends_with('\n') && reader.get_ref().limit() == 0 => {
                warn!(limit = max_request_bytes, "Request too large, closing connection");
                let response = JsonRpcResponse::error(None, -32600, "Request too large".into());
                write_response(&mut writer, &response).await;
                break;
            }
            Ok(_) => handle_request(&line, &projects, &orchestrator).await,
            Err(_) => break,
        };
        if !write_response(&mut writer, &response).await {
            break;
        }
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &JsonRpcResponse) -> bool {
    let resp_json = serde_json::to_string(response).unwrap_or_default();
    writer.write_all(resp_json.as_bytes()).await.is_ok() && writer.write_all(b"\n").await.is_ok()
}

// ── Request Handling ────────────────────────────────────────────────

async fn handle_request(
    raw: &str,
    projects: &ProjectStore,
    orchestrator: &CheckOrchestrator,
) -> JsonRpcResponse {
    let req: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => return JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e)),
    };

    let params = req.params.unwrap_or(Value::Null);

    match req.method.as_str() {
        "ov.health" => handle_health(req.id, projects, orchestrator),
        "ov.catalog" => handle_catalog(req.id, params),
        "ov.projects.list" => handle_list_projects(req.id, projects),
        "ov.projects.add" => handle_add_project(req.id, params, projects),
        "ov.projects.import" => handle_import_projects(req.id, params, projects).await,
        "ov.projects.remove" => handle_remove_project(req.id, params, projects, orchestrator),
        "ov.check.cell" => handle_check_cell(req.id, params, orchestrator).await,
        "ov.check.project" => handle_check_project(req.id, params, orchestrator),
        "ov.check.all" => {
            let dispatched = orchestrator.check_all();
            JsonRpcResponse::success(req.id, json!({ "dispatched": dispatched }))
        }
        "ov.cells" => handle_cells(req.id, params, orchestrator),
        "ov.summary" => handle_summary(req.id, params, orchestrator),
        "ov.usage" => handle_usage(req.id, orchestrator),
        _ => JsonRpcResponse::error(req.id, -32601, format!("Unknown method: {}", req.method)),
    }
}

fn str_param<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(|v| v.as_str())
}

fn project_json(p: &ProjectRecord) -> Value {
    json!({
        "id": p.id,
        "name": p.name,
        "apiKey": p.masked_credential(),
        "createdAt": p.created_at,
    })
}

fn handle_health(
    id: Option<Value>,
    projects: &ProjectStore,
    orchestrator: &CheckOrchestrator,
) -> JsonRpcResponse {
    JsonRpcResponse::success(id, json!({
        "version": env!("CARGO_PKG_VERSION"),
        "projects": projects.len(),
        "models": catalog::CORE_MODELS.len(),
        "inFlight": orchestrator.in_flight_count(),
        "summary": orchestrator.summary(&Scope::All),
    }))
}

fn handle_catalog(id: Option<Value>, params: Value) -> JsonRpcResponse {
    let models = catalog::search(str_param(&params, "query").unwrap_or(""));
    JsonRpcResponse::success(id, json!({
        "total": models.len(),
        "models": models,
    }))
}

fn handle_list_projects(id: Option<Value>, projects: &ProjectStore) -> JsonRpcResponse {
    let list: Vec<Value> = projects.list().iter().map(project_json).collect();
    JsonRpcResponse::success(id, json!({ "projects": list }))
}

fn handle_add_project(id: Option<Value>, params: Value, projects: &ProjectStore) -> JsonRpcResponse {
    let name = str_param(&params, "name").map(str::trim).filter(|s| !s.is_empty());
    let credential = str_param(&params, "credential").map(str::trim).filter(|s| !s.is_empty());

    match (name, credential) {
        (Some(name), Some(credential)) => match projects.add(name, credential) {
            Ok(record) => JsonRpcResponse::success(id, json!({ "project": project_json(&record) })),
            Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
        },
        _ => JsonRpcResponse::missing(id, "name, credential"),
    }
}

async fn handle_import_projects(
    id: Option<Value>,
    params: Value,
    projects: &ProjectStore,
) -> JsonRpcResponse {
    let imported = if let Some(text) = str_param(&params, "text") {
        projects.bulk_import(text)
    } else if let Some(path) = str_param(&params, "path") {
        match tokio::fs::read(path).await {
            Ok(bytes) => projects.bulk_import_bytes(&bytes),
            Err(e) => {
                warn!(path = path, "Import file unreadable: {}", e);
                Ok(0)
            }
        }
    } else {
        return JsonRpcResponse::missing(id, "text or path");
    };

    match imported {
        Ok(count) => JsonRpcResponse::success(id, json!({ "imported": count })),
        Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
    }
}

fn handle_remove_project(
    id: Option<Value>,
    params: Value,
    projects: &ProjectStore,
    orchestrator: &CheckOrchestrator,
) -> JsonRpcResponse {
    let Some(project_id) = str_param(&params, "id") else {
        return JsonRpcResponse::missing(id, "id");
    };

    match orchestrator.remove_project(&ProjectId::from(project_id)) {
        Ok(removed) => {
            let next_active = projects.first().map(|p| p.id);
            JsonRpcResponse::success(id, json!({
                "removed": removed,
                "nextActive": next_active,
            }))
        }
        Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
    }
}

async fn handle_check_cell(
    id: Option<Value>,
    params: Value,
    orchestrator: &CheckOrchestrator,
) -> JsonRpcResponse {
    let (Some(project_id), Some(model_id)) =
        (str_param(&params, "project_id"), str_param(&params, "model_id"))
    else {
        return JsonRpcResponse::missing(id, "project_id, model_id");
    };

    let cell = orchestrator
        .check_cell(model_id, &ProjectId::from(project_id))
        .await;
    JsonRpcResponse::success(id, json!({ "cell": cell }))
}

fn handle_check_project(
    id: Option<Value>,
    params: Value,
    orchestrator: &CheckOrchestrator,
) -> JsonRpcResponse {
    let Some(project_id) = str_param(&params, "project_id") else {
        return JsonRpcResponse::missing(id, "project_id");
    };
    let dispatched = orchestrator.check_project(&ProjectId::from(project_id));
    JsonRpcResponse::success(id, json!({ "dispatched": dispatched }))
}

fn handle_cells(id: Option<Value>, params: Value, orchestrator: &CheckOrchestrator) -> JsonRpcResponse {
    let project = str_param(&params, "project_id").map(ProjectId::from);
    let models = catalog::search(str_param(&params, "query").unwrap_or(""));
    let cells = orchestrator.matrix(project.as_ref(), &models);
    JsonRpcResponse::success(id, json!({
        "inFlight": orchestrator.in_flight_count(),
        "cells": cells,
    }))
}

fn handle_summary(id: Option<Value>, params: Value, orchestrator: &CheckOrchestrator) -> JsonRpcResponse {
    let scope = match (str_param(&params, "project_id"), str_param(&params, "model_id")) {
        (Some(_), Some(_)) => {
            return JsonRpcResponse::error(id, -32602, "Pass project_id or model_id, not both".into())
        }
        (Some(p), None) => Scope::Project(ProjectId::from(p)),
        (None, Some(m)) => Scope::Model(m.to_string()),
        (None, None) => Scope::All,
    };
    JsonRpcResponse::success(id, json!({ "summary": orchestrator.summary(&scope) }))
}

fn handle_usage(id: Option<Value>, orchestrator: &CheckOrchestrator) -> JsonRpcResponse {
    let usage = orchestrator.rate_snapshot();
    JsonRpcResponse::success(id, json!({
        "total": usage.len(),
        "usage": usage,
    }))
}
