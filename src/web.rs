//! The HTTP surface: an HTML dashboard plus a small JSON API, served by the
//! embedded axum server.
//!
//! The server is the only concurrent component in the process and touches
//! the vault exclusively through the store/dashboard read model and the
//! claim-by-move operations. Approve/reject POSTs are gated on the zone
//! capability table.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::audit::ActivityLog;
use crate::dashboard::{
    done_tail, folder_counts, items_to_process, needs_action_items, pending_approvals,
};
use crate::store::{Folder, Vault};
use crate::zone::{Capabilities, WorkZone};

pub struct AppState {
    pub vault: Vault,
    pub zone: WorkZone,
    pub caps: Capabilities,
}

impl AppState {
    pub fn new(vault: Vault, zone: WorkZone) -> Self {
        let caps = Capabilities::for_zone(zone);
        Self { vault, zone, caps }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .route("/api/pending", get(api_pending))
        .route("/api/activity", get(api_activity))
        .route("/tasks", get(api_tasks))
        .route("/approve/{*path}", post(approve))
        .route("/reject/{*path}", post(reject))
        .route("/view/{folder}/{*name}", get(view_file))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("dashboard running at http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "vault_exists": state.vault.root().exists(),
        "work_zone": state.zone,
        "capabilities": state.caps,
    }))
}

async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts: serde_json::Map<String, serde_json::Value> = folder_counts(&state.vault)
        .into_iter()
        .map(|(name, count)| (name, json!(count)))
        .collect();
    let active = items_to_process(&state.vault);
    axum::Json(json!({
        "status": if active > 0 { "active" } else { "idle" },
        "items_to_process": active,
        "folders": counts,
        "work_zone": state.zone,
    }))
}

async fn api_pending(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(json!({ "approvals": pending_approvals(&state.vault) }))
}

async fn api_activity(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let log = ActivityLog::new(state.vault.dir(Folder::Logs));
    let mut entries = log.recent(20);
    entries.reverse(); // newest first
    axum::Json(json!({ "activity": entries }))
}

async fn api_tasks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(json!({
        "needs_action": needs_action_items(&state.vault),
        "pending_approval": pending_approvals(&state.vault),
    }))
}

fn checked_move(
    state: &AppState,
    rel_path: &str,
    from: Folder,
    to: Folder,
    log_action: &str,
) -> Response {
    if !state.caps.approve_reject {
        return (
            StatusCode::FORBIDDEN,
            format!("zone '{}' may not approve or reject", state.zone),
        )
            .into_response();
    }
    if rel_path.split('/').any(|part| part == "..") {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    }
    let source = state.vault.dir(from).join(rel_path);
    if !source.exists() {
        return (StatusCode::NOT_FOUND, format!("not found: {rel_path}")).into_response();
    }
    match state.vault.move_to(&source, to) {
        Ok(_) => {
            let log = ActivityLog::new(state.vault.dir(Folder::Logs));
            let result = format!("moved_to_{}", to.as_str().to_lowercase());
            if let Err(e) = log.append("web_dashboard", log_action, rel_path, &result) {
                tracing::error!("failed to log {log_action}: {e:#}");
            }
            Redirect::to("/").into_response()
        }
        Err(e) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}

async fn approve(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> Response {
    checked_move(&state, &path, Folder::PendingApproval, Folder::Approved, "approved")
}

async fn reject(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> Response {
    checked_move(&state, &path, Folder::PendingApproval, Folder::Rejected, "rejected")
}

async fn view_file(
    State(state): State<Arc<AppState>>,
    Path((folder, name)): Path<(String, String)>,
) -> Response {
    let Some(folder) = Folder::ALL.iter().find(|f| f.as_str() == folder) else {
        return (StatusCode::NOT_FOUND, "unknown folder").into_response();
    };
    if name.split('/').any(|part| part == "..") {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    }
    let path = state.vault.dir(*folder).join(&name);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return (StatusCode::NOT_FOUND, Html("<h1>File not found</h1>".to_string()))
            .into_response();
    };
    let html = format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\">\
         <title>{name} — steward</title><style>{css}</style></head><body>\
         <div class=\"container\"><a href=\"/\" class=\"back-link\">&larr; Back</a>\
         <h1>{name}</h1><p class=\"muted\">{folder} / {name}</p>\
         <pre class=\"file-content\">{content}</pre></div></body></html>",
        name = escape(&name),
        folder = folder.as_str(),
        content = escape(&content),
        css = CSS,
    );
    Html(html).into_response()
}

async fn dashboard_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let vault = &state.vault;
    let active = items_to_process(vault);
    let (status, color) = if active > 0 { ("Active", "#22c55e") } else { ("Idle", "#6b7280") };

    let folders = folder_counts(vault)
        .iter()
        .map(|(name, count)| {
            format!(
                "<div class=\"folder-item\"><div class=\"folder-count\">{count}</div>\
                 <div class=\"muted\">{name}</div></div>"
            )
        })
        .collect::<String>();

    let approvals = pending_approvals(vault);
    let approvals_html = if approvals.is_empty() {
        "<div class=\"empty\">No pending approvals</div>".to_string()
    } else {
        approvals
            .iter()
            .map(|p| {
                format!(
                    "<div class=\"row\"><div><div class=\"name\">{name}</div>\
                     <div class=\"muted\">Source: {source} | Confidence: {confidence} | \
                     Action: {action}</div></div><div class=\"actions\">\
                     <a class=\"btn\" href=\"/view/Pending_Approval/{name}\">View</a>\
                     <form method=\"post\" action=\"/approve/{name}\">\
                     <button class=\"btn approve\">Approve</button></form>\
                     <form method=\"post\" action=\"/reject/{name}\">\
                     <button class=\"btn reject\">Reject</button></form></div></div>",
                    name = escape(&p.name),
                    source = escape(&p.source),
                    confidence = escape(&p.confidence),
                    action = escape(&p.action),
                )
            })
            .collect()
    };

    let needs_action = needs_action_items(vault);
    let needs_html = if needs_action.is_empty() {
        "<div class=\"empty\">No action items</div>".to_string()
    } else {
        needs_action
            .iter()
            .map(|item| {
                format!(
                    "<div class=\"row\"><a href=\"/view/Needs_Action/{name}\">{subject}</a>\
                     <span class=\"muted\">{kind} | {priority}</span></div>",
                    name = escape(&item.name),
                    subject = escape(&item.subject),
                    kind = escape(&item.kind),
                    priority = escape(&item.priority),
                )
            })
            .collect()
    };

    let log = ActivityLog::new(vault.dir(Folder::Logs));
    let mut activity = log.recent(20);
    activity.reverse();
    let activity_html = if activity.is_empty() {
        "<div class=\"empty\">No recent activity</div>".to_string()
    } else {
        activity
            .iter()
            .map(|e| {
                format!(
                    "<div class=\"row\"><span class=\"muted mono\">{ts}</span>\
                     <span class=\"accent\">{action}</span> {source} &rarr; {result}</div>",
                    ts = e.timestamp.format("%m-%d %H:%M"),
                    action = escape(&e.action),
                    source = escape(&e.source),
                    result = escape(&e.result),
                )
            })
            .collect()
    };

    let done_html = {
        let tail = done_tail(vault, 10);
        if tail.is_empty() {
            "<div class=\"empty\">No completed items yet</div>".to_string()
        } else {
            tail.iter()
                .map(|name| {
                    format!(
                        "<div class=\"row\"><a href=\"/view/Done/{n}\">{n}</a></div>",
                        n = escape(name)
                    )
                })
                .collect()
        }
    };

    Html(format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         <title>Steward — Dashboard</title><style>{CSS}</style></head><body>\
         <div class=\"container\">\
         <div class=\"header\"><h1>Steward Dashboard</h1>\
         <span class=\"badge\" style=\"color:{color}\">&#9679; {status}</span>\
         <span class=\"muted\">zone: {zone} | items to process: {active}</span></div>\
         <div class=\"grid\">\
         <div class=\"card\"><h2>Vault Overview</h2><div class=\"folders\">{folders}</div></div>\
         <div class=\"card\"><h2>Pending Approvals</h2>{approvals_html}</div>\
         </div>\
         <div class=\"grid\">\
         <div class=\"card\"><h2>Needs Action</h2>{needs_html}</div>\
         <div class=\"card\"><h2>Recent Activity</h2>{activity_html}</div>\
         </div>\
         <div class=\"card\"><h2>Completed (Recent)</h2>{done_html}</div>\
         <div class=\"footer\">steward | <a href=\"/api/status\">/api/status</a> | \
         <a href=\"/api/pending\">/api/pending</a> | \
         <a href=\"/api/activity\">/api/activity</a></div>\
         </div></body></html>",
        zone = state.zone,
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const CSS: &str = "\
:root{--bg:#0f172a;--surface:#1e293b;--border:#334155;--text:#e2e8f0;\
--muted:#94a3b8;--accent:#3b82f6;--green:#22c55e;--red:#ef4444}\
*{margin:0;padding:0;box-sizing:border-box}\
body{font-family:system-ui,-apple-system,sans-serif;background:var(--bg);\
color:var(--text);line-height:1.6}\
.container{max-width:1100px;margin:0 auto;padding:2rem}\
h1{font-size:1.5rem}h2{font-size:1.1rem;color:var(--muted);margin-bottom:.75rem}\
.header{display:flex;gap:1rem;align-items:center;margin-bottom:1.5rem}\
.grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(320px,1fr));\
gap:1.25rem;margin-bottom:1.25rem}\
.card{background:var(--surface);border:1px solid var(--border);\
border-radius:.75rem;padding:1.25rem;margin-bottom:1.25rem}\
.folders{display:grid;grid-template-columns:repeat(3,1fr);gap:.75rem}\
.folder-item{background:var(--bg);border-radius:.5rem;padding:.75rem;text-align:center}\
.folder-count{font-size:1.4rem;font-weight:700;color:var(--accent)}\
.row{display:flex;justify-content:space-between;align-items:center;gap:.75rem;\
padding:.5rem 0;border-bottom:1px solid var(--border);font-size:.9rem}\
.row:last-child{border-bottom:none}\
.row a{color:var(--text);text-decoration:none}\
.name{font-weight:600}.muted{color:var(--muted);font-size:.8rem}\
.mono{font-family:monospace}.accent{color:var(--accent)}\
.actions{display:flex;gap:.5rem}.actions form{display:inline}\
.btn{padding:.3rem .7rem;border:none;border-radius:.4rem;font-size:.8rem;\
font-weight:600;cursor:pointer;background:var(--border);color:var(--text);\
text-decoration:none}\
.btn.approve{background:var(--green);color:#000}\
.btn.reject{background:var(--red);color:#fff}\
.badge{font-weight:600}.empty{color:var(--muted);font-style:italic;padding:.5rem 0}\
.footer{text-align:center;color:var(--muted);font-size:.8rem;padding:1rem 0}\
.footer a{color:var(--accent)}\
.back-link{color:var(--accent);text-decoration:none}\
.file-content{background:var(--surface);border:1px solid var(--border);\
border-radius:.5rem;padding:1.25rem;white-space:pre-wrap;word-wrap:break-word;\
font-size:.85rem;max-height:70vh;overflow-y:auto}";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Header;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_router(zone: WorkZone) -> (Router, Vault, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let vault = Vault::new(dir.path());
        vault.ensure_layout().unwrap();
        let state = Arc::new(AppState::new(vault.clone(), zone));
        (build_router(state), vault, dir)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_zone_and_capabilities() {
        let (app, _vault, _dir) = test_router(WorkZone::Cloud);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["vault_exists"], true);
        assert_eq!(json["work_zone"], "cloud");
        assert_eq!(json["capabilities"]["execute_side_effect"], false);
    }

    #[tokio::test]
    async fn test_api_status_counts_and_state() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault.write(Folder::NeedsAction, "a.md", &Header::new(), "").unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["status"], "active");
        assert_eq!(json["items_to_process"], 1);
        assert_eq!(json["folders"]["Needs_Action"], 1);
        assert_eq!(json["work_zone"], "local");
    }

    #[tokio::test]
    async fn test_api_status_idle() {
        let (app, _vault, _dir) = test_router(WorkZone::Local);
        let resp = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["status"], "idle");
    }

    #[tokio::test]
    async fn test_api_pending_lists_metadata() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        let mut header = Header::new();
        header.set("source", "email-a.md");
        header.set("confidence", "0.8");
        vault.write(Folder::PendingApproval, "plan-a.md", &header, "").unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/api/pending").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["approvals"][0]["name"], "plan-a.md");
        assert_eq!(json["approvals"][0]["confidence"], "0.8");
    }

    #[tokio::test]
    async fn test_api_activity_newest_first() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        let log = ActivityLog::new(vault.dir(Folder::Logs));
        log.append("a", "older", "s", "r").unwrap();
        log.append("a", "newer", "s", "r").unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/api/activity").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["activity"][0]["action"], "newer");
        assert_eq!(json["activity"][1]["action"], "older");
    }

    #[tokio::test]
    async fn test_tasks_lists_both_stages() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault.write(Folder::NeedsAction, "email-a.md", &Header::new(), "").unwrap();
        vault.write(Folder::PendingApproval, "plan-b.md", &Header::new(), "").unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["needs_action"].as_array().unwrap().len(), 1);
        assert_eq!(json["pending_approval"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_approve_moves_and_redirects() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault.write(Folder::PendingApproval, "plan-a.md", &Header::new(), "p").unwrap();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/approve/plan-a.md")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(vault.dir(Folder::Approved).join("plan-a.md").exists());
        assert!(!vault.dir(Folder::PendingApproval).join("plan-a.md").exists());

        let log = ActivityLog::new(vault.dir(Folder::Logs));
        assert!(log.recent(5).iter().any(|e| e.action == "approved"));
    }

    #[tokio::test]
    async fn test_approve_nested_path_creates_subfolders() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault.write(Folder::PendingApproval, "email/plan-a.md", &Header::new(), "p").unwrap();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/approve/email/plan-a.md")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(vault.dir(Folder::Approved).join("email/plan-a.md").exists());
    }

    #[tokio::test]
    async fn test_reject_moves_to_rejected() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault.write(Folder::PendingApproval, "plan-a.md", &Header::new(), "p").unwrap();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reject/plan-a.md")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(vault.dir(Folder::Rejected).join("plan-a.md").exists());
    }

    #[tokio::test]
    async fn test_cloud_zone_cannot_approve() {
        let (app, vault, _dir) = test_router(WorkZone::Cloud);
        vault.write(Folder::PendingApproval, "plan-a.md", &Header::new(), "p").unwrap();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/approve/plan-a.md")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(vault.dir(Folder::PendingApproval).join("plan-a.md").exists());
    }

    #[tokio::test]
    async fn test_approve_missing_file_is_404() {
        let (app, _vault, _dir) = test_router(WorkZone::Local);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/approve/ghost.md")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_approve_rejects_path_traversal() {
        let (app, _vault, _dir) = test_router(WorkZone::Local);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/approve/../Done/x.md")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(
            resp.status() == StatusCode::BAD_REQUEST || resp.status() == StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_view_renders_artifact_body() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault
            .write(Folder::Done, "plan-a.md", &Header::new(), "body <script>")
            .unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/view/Done/plan-a.md").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("plan-a.md"));
        // Content is escaped.
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_view_unknown_folder_is_404() {
        let (app, _vault, _dir) = test_router(WorkZone::Local);
        let resp = app
            .oneshot(Request::builder().uri("/view/Secrets/x.md").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dashboard_page_renders() {
        let (app, vault, _dir) = test_router(WorkZone::Local);
        vault.write(Folder::PendingApproval, "plan-a.md", &Header::new(), "p").unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("Steward Dashboard"));
        assert!(html.contains("plan-a.md"));
        assert!(html.contains("Approve"));
        assert!(html.contains("Active"));
    }
}
