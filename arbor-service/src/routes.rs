//! HTTP route handlers for the arbor service

use crate::error::AppError;
use crate::state::SharedState;
use arbor_core::{
    generate_capsule, generate_resume, skeletonize_file, ArborError, Edge, EdgeKind, Node,
    NodeKind, Observation, ObservationStore, ProjectWatcher, StoreStats,
};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Run a blocking store operation off the request pool
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ArborError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}

fn canonical_root(root: Option<String>) -> Result<String, AppError> {
    let root = root.ok_or_else(|| AppError::bad_request("missing 'root'"))?;
    let path = std::fs::canonicalize(&root).map_err(|_| AppError::not_found("directory"))?;
    Ok(path.to_string_lossy().to_string())
}

fn parse_node_kind(kind: Option<&str>) -> Result<Option<NodeKind>, AppError> {
    match kind {
        None => Ok(None),
        Some(k) => NodeKind::parse(k)
            .map(Some)
            .ok_or_else(|| AppError::bad_request(format!("unknown node kind '{k}'"))),
    }
}

fn parse_edge_kind(kind: Option<&str>) -> Result<Option<EdgeKind>, AppError> {
    match kind {
        None => Ok(None),
        Some(k) => EdgeKind::parse(k)
            .map(Some)
            .ok_or_else(|| AppError::bad_request(format!("unknown edge kind '{k}'"))),
    }
}

// ---------------------------------------------------------------------------
// POST /projects
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub root: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_files: Option<usize>,
}

/// Register a project: open its store, run a full index, start the watcher
pub async fn register_project(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let root = canonical_root(req.root)?;
    if !Path::new(&root).is_dir() {
        return Err(AppError::not_found("directory"));
    }

    {
        let watchers = state.watchers.read().await;
        if watchers.contains_key(&root) {
            return Ok((
                StatusCode::OK,
                Json(RegisterResponse {
                    message: "already registered".to_string(),
                    root,
                    indexed_files: None,
                }),
            ));
        }
    }

    let store = state.store_for(&root).await?;
    let config = state.config.clone();
    let watch_root = PathBuf::from(&root);
    let (watcher, count) = tokio::task::spawn_blocking(move || {
        let watcher = ProjectWatcher::new(store, &watch_root, config)?;
        let count = watcher.index_now(false)?;
        watcher.start()?;
        Ok::<_, ArborError>((watcher, count))
    })
    .await
    .map_err(AppError::internal)??;

    let mut watchers = state.watchers.write().await;
    if watchers.contains_key(&root) {
        // Lost the registration race; ours stands down
        watcher.stop();
        return Ok((
            StatusCode::OK,
            Json(RegisterResponse {
                message: "already registered".to_string(),
                root,
                indexed_files: None,
            }),
        ));
    }
    watchers.insert(root.clone(), Arc::new(watcher));
    tracing::info!(root = %root, indexed_files = count, "project registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "registered".to_string(),
            root,
            indexed_files: Some(count),
        }),
    ))
}

// ---------------------------------------------------------------------------
// POST /index
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub struct ReindexRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize)]
pub struct ReindexResponse {
    pub indexed_files: usize,
}

/// Re-index every registered project. The body is optional; an empty one
/// means `force: false`.
pub async fn reindex(
    State(state): State<SharedState>,
    body: axum::body::Bytes,
) -> Result<Json<ReindexResponse>, AppError> {
    let force = if body.is_empty() {
        false
    } else {
        serde_json::from_slice::<ReindexRequest>(&body)
            .map_err(AppError::bad_request)?
            .force
    };
    let watchers: Vec<Arc<ProjectWatcher>> = state.watchers.read().await.values().cloned().collect();

    let total = blocking(move || {
        let mut total = 0;
        for watcher in watchers {
            total += watcher.index_now(force)?;
        }
        Ok(total)
    })
    .await?;

    tracing::info!(indexed_files = total, force, "reindex complete");
    Ok(Json(ReindexResponse {
        indexed_files: total,
    }))
}

// ---------------------------------------------------------------------------
// GET /nodes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct NodesQuery {
    pub root: Option<String>,
    pub file: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
}

pub async fn list_nodes(
    State(state): State<SharedState>,
    Query(q): Query<NodesQuery>,
) -> Result<Json<Vec<Node>>, AppError> {
    let root = canonical_root(q.root)?;
    let kind = parse_node_kind(q.kind.as_deref())?;
    let store = state.store_for(&root).await?;

    let nodes = blocking(move || {
        store.list_nodes(q.file.as_deref(), kind, q.name.as_deref(), None)
    })
    .await?;
    Ok(Json(nodes))
}

// ---------------------------------------------------------------------------
// GET /nodes/{id}
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RootQuery {
    pub root: Option<String>,
}

pub async fn get_node(
    State(state): State<SharedState>,
    UrlPath(node_id): UrlPath<String>,
    Query(q): Query<RootQuery>,
) -> Result<Json<Node>, AppError> {
    let root = canonical_root(q.root)?;
    let store = state.store_for(&root).await?;

    let node = blocking(move || store.get_node(&node_id)).await?;
    node.map(Json).ok_or_else(|| AppError::not_found("node"))
}

// ---------------------------------------------------------------------------
// GET /nodes/{id}/edges
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct EdgesQuery {
    pub root: Option<String>,
    #[serde(default = "default_direction")]
    pub direction: String,
    pub kind: Option<String>,
}

fn default_direction() -> String {
    "both".to_string()
}

pub async fn node_edges(
    State(state): State<SharedState>,
    UrlPath(node_id): UrlPath<String>,
    Query(q): Query<EdgesQuery>,
) -> Result<Json<Vec<Edge>>, AppError> {
    let root = canonical_root(q.root)?;
    let kind = parse_edge_kind(q.kind.as_deref())?;
    if !matches!(q.direction.as_str(), "in" | "out" | "both") {
        return Err(AppError::bad_request(format!(
            "unknown direction '{}'",
            q.direction
        )));
    }
    let store = state.store_for(&root).await?;

    let direction = q.direction;
    let edges = blocking(move || {
        let mut edges = Vec::new();
        if direction == "out" || direction == "both" {
            edges.extend(store.get_edges(Some(&node_id), None, kind)?);
        }
        if direction == "in" || direction == "both" {
            edges.extend(store.get_edges(None, Some(&node_id), kind)?);
        }
        Ok(edges)
    })
    .await?;
    Ok(Json(edges))
}

// ---------------------------------------------------------------------------
// GET /skeleton
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SkeletonQuery {
    pub file: Option<String>,
}

#[derive(Serialize)]
pub struct SkeletonResponse {
    pub file: String,
    pub skeleton: String,
}

pub async fn skeleton(
    Query(q): Query<SkeletonQuery>,
) -> Result<Json<SkeletonResponse>, AppError> {
    let file = q
        .file
        .ok_or_else(|| AppError::bad_request("missing 'file' parameter"))?;
    if !Path::new(&file).is_file() {
        return Err(AppError::not_found("file"));
    }

    let file_clone = file.clone();
    let skeleton = blocking(move || skeletonize_file(Path::new(&file_clone))).await?;
    Ok(Json(SkeletonResponse { file, skeleton }))
}

// ---------------------------------------------------------------------------
// GET /capsule/{id}
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CapsuleQuery {
    pub root: Option<String>,
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    1
}

#[derive(Serialize)]
pub struct CapsuleResponse {
    pub node_id: String,
    pub capsule: String,
}

pub async fn capsule(
    State(state): State<SharedState>,
    UrlPath(node_id): UrlPath<String>,
    Query(q): Query<CapsuleQuery>,
) -> Result<Json<CapsuleResponse>, AppError> {
    let root = canonical_root(q.root)?;
    let store = state.store_for(&root).await?;

    let id = node_id.clone();
    let depth = q.depth;
    let capsule = blocking(move || generate_capsule(&store, &id, depth)).await?;
    capsule
        .map(|capsule| Json(CapsuleResponse { node_id, capsule }))
        .ok_or_else(|| AppError::not_found("node"))
}

// ---------------------------------------------------------------------------
// POST /observations, GET /observations, DELETE /observations/{id}
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateObservationRequest {
    pub root: Option<String>,
    pub content: Option<String>,
    pub node_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub source: Option<String>,
}

pub async fn create_observation(
    State(state): State<SharedState>,
    Json(req): Json<CreateObservationRequest>,
) -> Result<(StatusCode, Json<Observation>), AppError> {
    let root = canonical_root(req.root)?;
    let content = req
        .content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("missing 'content'"))?;
    let store = state.store_for(&root).await?;

    let obs = blocking(move || {
        ObservationStore::new(&store).add(
            content,
            req.node_id,
            req.tags,
            req.source.unwrap_or_else(|| "user".to_string()),
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(obs)))
}

#[derive(Deserialize)]
pub struct ObservationsQuery {
    pub root: Option<String>,
    pub node_id: Option<String>,
    pub tag: Option<String>,
}

pub async fn list_observations(
    State(state): State<SharedState>,
    Query(q): Query<ObservationsQuery>,
) -> Result<Json<Vec<Observation>>, AppError> {
    let root = canonical_root(q.root)?;
    let store = state.store_for(&root).await?;

    let observations = blocking(move || {
        ObservationStore::new(&store).list(q.node_id.as_deref(), q.tag.as_deref())
    })
    .await?;
    Ok(Json(observations))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

pub async fn delete_observation(
    State(state): State<SharedState>,
    UrlPath(obs_id): UrlPath<i64>,
    Query(q): Query<RootQuery>,
) -> Result<Json<DeletedResponse>, AppError> {
    let root = canonical_root(q.root)?;
    let store = state.store_for(&root).await?;

    let deleted = blocking(move || ObservationStore::new(&store).delete(obs_id)).await?;
    if !deleted {
        return Err(AppError::not_found("observation"));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

// ---------------------------------------------------------------------------
// GET /resume
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ResumeQuery {
    pub root: Option<String>,
    #[serde(default = "default_budget")]
    pub budget: usize,
    #[serde(default = "default_hours")]
    pub hours: u64,
}

fn default_budget() -> usize {
    4000
}
fn default_hours() -> u64 {
    24
}

#[derive(Serialize)]
pub struct ResumeResponse {
    pub resume: String,
}

pub async fn resume(
    State(state): State<SharedState>,
    Query(q): Query<ResumeQuery>,
) -> Result<Json<ResumeResponse>, AppError> {
    let root = canonical_root(q.root)?;
    let store = state.store_for(&root).await?;

    let resume = blocking(move || generate_resume(&store, q.budget, q.hours)).await?;
    Ok(Json(ResumeResponse { resume }))
}

// ---------------------------------------------------------------------------
// POST /hooks/install
// ---------------------------------------------------------------------------

const POST_COMMIT_HOOK: &str = r#"#!/bin/sh
# Installed by arbor: records the latest commit as a 'git' observation.
root="$(git rev-parse --show-toplevel)"
msg="$(git log -1 --pretty=%s)"
files="$(git diff-tree --no-commit-id --name-only -r HEAD | tr '\n' ' ')"
payload="{\"root\": \"$root\", \"content\": \"Commit: $msg  Files: $files\", \"source\": \"git\", \"tags\": [\"git\", \"commit\"]}"
curl -s -X POST "http://127.0.0.1:__ARBOR_PORT__/observations" \
  -H 'Content-Type: application/json' \
  -d "$payload" >/dev/null 2>&1 || true
"#;

const POST_EDIT_HOOK: &str = r#"#!/bin/sh
# Installed by arbor: records an edited file as a 'hook' observation.
# Usage: arbor-post-edit <project-root> <file-path>
root="$1"
file="$(basename "$2")"
payload="{\"root\": \"$root\", \"content\": \"Edited: $file\", \"source\": \"hook\", \"tags\": [\"hook\", \"edit\"]}"
curl -s -X POST "http://127.0.0.1:__ARBOR_PORT__/observations" \
  -H 'Content-Type: application/json' \
  -d "$payload" >/dev/null 2>&1 || true
"#;

#[derive(Deserialize)]
pub struct HooksRequest {
    pub root: Option<String>,
}

#[derive(Serialize)]
pub struct HooksResponse {
    pub git_hook_installed: bool,
    pub claude_code_config: serde_json::Value,
    pub message: String,
}

/// Install a git post-commit hook that feeds commits back as observations,
/// and return a Claude Code hook snippet that does the same for edits
pub async fn install_hooks(
    State(state): State<SharedState>,
    Json(req): Json<HooksRequest>,
) -> Result<(StatusCode, Json<HooksResponse>), AppError> {
    let root = canonical_root(req.root)?;
    let git_dir = Path::new(&root).join(".git");
    if !git_dir.is_dir() {
        return Err(AppError::bad_request("not a git repository"));
    }

    let port = state.config.service.port;
    let hooks_dir = git_dir.join("hooks");
    let (installed, edit_hook_path) = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&hooks_dir)?;
        let commit_hook = hooks_dir.join("post-commit");
        let edit_hook = hooks_dir.join("arbor-post-edit");
        write_executable(
            &commit_hook,
            &POST_COMMIT_HOOK.replace("__ARBOR_PORT__", &port.to_string()),
        )?;
        write_executable(
            &edit_hook,
            &POST_EDIT_HOOK.replace("__ARBOR_PORT__", &port.to_string()),
        )?;
        Ok::<_, ArborError>((true, edit_hook))
    })
    .await
    .map_err(AppError::internal)??;

    let claude_config = serde_json::json!({
        "hooks": {
            "PostToolUse": [{
                "matcher": "Edit|Write",
                "command": format!("{} {} \"$FILE\"", edit_hook_path.display(), root),
            }]
        }
    });

    tracing::info!(root = %root, "hooks installed");
    Ok((
        StatusCode::CREATED,
        Json(HooksResponse {
            git_hook_installed: installed,
            claude_code_config: claude_config,
            message: "Add claude_code_config to .claude/settings.json".to_string(),
        }),
    ))
}

fn write_executable(path: &Path, content: &str) -> Result<(), ArborError> {
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct WatcherStatus {
    pub running: bool,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_stats: Option<StoreStats>,
    pub watchers: HashMap<String, WatcherStatus>,
}

pub async fn status(
    State(state): State<SharedState>,
    Query(q): Query<RootQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let db_stats = match q.root {
        Some(root) => {
            let root = canonical_root(Some(root))?;
            let store = state.store_for(&root).await?;
            Some(blocking(move || store.stats()).await?)
        }
        None => None,
    };

    let watchers = state
        .watchers
        .read()
        .await
        .iter()
        .map(|(root, watcher)| {
            (
                root.clone(),
                WatcherStatus {
                    running: watcher.is_running(),
                },
            )
        })
        .collect();

    Ok(Json(StatusResponse {
        service: "arbor-service".to_string(),
        db_stats,
        watchers,
    }))
}
