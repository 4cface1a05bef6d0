//! HTTP API.
//!
//! Mirrors the product surface: upload a repository (git URL or ZIP),
//! watch its processing status, browse its files, chat about the code,
//! and request whole-file edits with a unified diff.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/upload/github` | Clone a repo and start ingestion |
//! | `POST` | `/api/upload/zip` | Upload a ZIP and start ingestion |
//! | `GET`  | `/api/projects` | List projects |
//! | `GET`  | `/api/projects/{id}` | Project details (+ file tree when ready) |
//! | `DELETE` | `/api/projects/{id}` | Delete a project and its index |
//! | `GET`  | `/api/projects/{id}/file` | Read one file (`?path=...`) |
//! | `POST` | `/api/chat/{id}` | Ask a question about the project |
//! | `GET`  | `/api/chat/{id}/history` | Chat history |
//! | `POST` | `/api/edit/{id}` | Generate an edit + unified diff |
//! | `POST` | `/api/edit/{id}/apply` | Generate an edit and write it to disk |
//! | `GET`  | `/api/providers` | Generation providers with configured keys |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! All error responses share one JSON schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Please upload a .zip file." } }
//! ```
//!
//! Codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `llm_error` (502), `internal` (500).
//!
//! Uploads return as soon as the project row exists; ingestion continues
//! as a spawned background task holding its own handles. CORS is
//! permissive to support browser clients.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::context::AppContext;
use crate::discovery;
use crate::ingest;
use crate::llm;
use crate::models::ProjectStatus;
use crate::patch;
use crate::repo;
use crate::retrieval::{self, Retriever};

pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/upload/github", post(handle_upload_github))
        .route("/api/upload/zip", post(handle_upload_zip))
        .route("/api/projects", get(handle_list_projects))
        .route(
            "/api/projects/{id}",
            get(handle_get_project).delete(handle_delete_project),
        )
        .route("/api/projects/{id}/file", get(handle_get_file))
        .route("/api/chat/{id}", post(handle_chat))
        .route("/api/chat/{id}/history", get(handle_chat_history))
        .route("/api/edit/{id}", post(handle_edit))
        .route("/api/edit/{id}/apply", post(handle_edit_apply))
        .route("/api/providers", get(handle_providers))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx);

    info!(bind = %bind_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Generation-provider failures get their own code so clients can tell
/// "the model call failed" apart from "the server broke".
fn llm_error(err: anyhow::Error) -> AppError {
    error!(error = %err, "LLM call failed");
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "llm_error",
        message: format!("LLM call failed: {err}"),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    error!(error = %err, "internal error");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("Internal server error: {err}"),
    }
}

// ============ Shared helpers ============

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    source_type: String,
    source_url: Option<String>,
    repo_path: String,
    status: String,
    total_files: i64,
    total_chunks: i64,
    created_at: i64,
}

impl ProjectRow {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "source_type": self.source_type,
            "source_url": self.source_url,
            "status": self.status,
            "total_files": self.total_files,
            "total_chunks": self.total_chunks,
            "created_at": format_ts(self.created_at),
        })
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

async fn load_project(ctx: &AppContext, project_id: i64) -> Result<ProjectRow, AppError> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT id, name, source_type, source_url, repo_path, status, total_files, total_chunks, created_at \
         FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(&ctx.pool)
    .await
    .map_err(internal)?
    .ok_or_else(|| not_found("Project not found."))
}

fn require_ready(project: &ProjectRow) -> Result<(), AppError> {
    if project.status != ProjectStatus::Ready.as_str() {
        return Err(bad_request(format!(
            "Project is still {}. Please wait.",
            project.status
        )));
    }
    Ok(())
}

/// Resolve a repo-relative path inside a project, refusing escapes.
fn resolve_project_file(repo_path: &str, relative: &str) -> Result<PathBuf, AppError> {
    let repo_root = std::fs::canonicalize(repo_path)
        .map_err(|_| not_found("Project repository is no longer on disk."))?;
    let full = std::fs::canonicalize(repo_root.join(relative))
        .map_err(|_| not_found(format!("File not found: {relative}")))?;

    if !full.starts_with(&repo_root) {
        return Err(forbidden("Access denied."));
    }
    if !full.is_file() {
        return Err(not_found(format!("File not found: {relative}")));
    }
    Ok(full)
}

fn retriever(ctx: &AppContext) -> Retriever {
    Retriever::new(
        ctx.embedder.clone(),
        ctx.vectors.clone(),
        ctx.config.retrieval.top_k,
    )
}

// ============ Upload ============

#[derive(Deserialize)]
struct UploadGithubRequest {
    url: String,
}

#[derive(Serialize)]
struct UploadResponse {
    project_id: i64,
    name: String,
    status: String,
    message: String,
}

async fn handle_upload_github(
    State(ctx): State<AppContext>,
    Json(request): Json<UploadGithubRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let repo_path = repo::clone_repo(&ctx.config.storage, &request.url)
        .map_err(|e| bad_request(format!("Failed to clone repository: {e}")))?;

    let name = request
        .url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("repository")
        .trim_end_matches(".git")
        .to_string();

    start_ingestion(&ctx, &name, "github", Some(&request.url), repo_path).await
}

#[derive(Deserialize)]
struct UploadZipQuery {
    name: Option<String>,
}

async fn handle_upload_zip(
    State(ctx): State<AppContext>,
    Query(query): Query<UploadZipQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let filename = query.name.unwrap_or_else(|| "upload.zip".to_string());
    if !filename.ends_with(".zip") {
        return Err(bad_request("Please upload a .zip file."));
    }

    let repo_path = repo::extract_zip(&ctx.config.storage, &body, &filename)
        .map_err(|e| bad_request(format!("Failed to extract ZIP: {e}")))?;

    let name = filename.trim_end_matches(".zip").to_string();
    start_ingestion(&ctx, &name, "zip", None, repo_path).await
}

async fn start_ingestion(
    ctx: &AppContext,
    name: &str,
    source_type: &str,
    source_url: Option<&str>,
    repo_path: PathBuf,
) -> Result<Json<UploadResponse>, AppError> {
    let project_id = ingest::create_project(
        &ctx.pool,
        name,
        source_type,
        source_url,
        &repo_path.to_string_lossy(),
    )
    .await
    .map_err(internal)?;

    // The request returns now; ingestion continues on its own.
    tokio::spawn(ingest::process_project(ctx.clone(), project_id, repo_path));

    Ok(Json(UploadResponse {
        project_id,
        name: name.to_string(),
        status: ProjectStatus::Processing.as_str().to_string(),
        message: "Repository acquired. Processing started in background.".to_string(),
    }))
}

// ============ Projects ============

async fn handle_list_projects(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, name, source_type, source_url, repo_path, status, total_files, total_chunks, created_at \
         FROM projects ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&ctx.pool)
    .await
    .map_err(internal)?;

    Ok(Json(rows.iter().map(ProjectRow::to_json).collect()))
}

async fn handle_get_project(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = load_project(&ctx, project_id).await?;
    let mut body = project.to_json();

    let repo_path = PathBuf::from(&project.repo_path);
    if project.status == ProjectStatus::Ready.as_str() && repo_path.is_dir() {
        body["file_tree"] = discovery::file_tree(&repo_path, &ctx.config.discovery);
    }

    Ok(Json(body))
}

async fn handle_delete_project(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = load_project(&ctx, project_id).await?;

    ingest::delete_project(&ctx, project_id)
        .await
        .map_err(internal)?;

    // Best effort: the checkout is disposable.
    let _ = std::fs::remove_dir_all(&project.repo_path);

    Ok(Json(serde_json::json!({
        "message": "Project deleted.",
        "project_id": project_id,
    })))
}

#[derive(Deserialize)]
struct FileQuery {
    path: String,
}

async fn handle_get_file(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
    Query(query): Query<FileQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = load_project(&ctx, project_id).await?;
    let full = resolve_project_file(&project.repo_path, &query.path)?;

    let bytes = std::fs::read(&full).map_err(internal)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let language = std::path::Path::new(&query.path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .and_then(|e| discovery::language_for_extension(&e))
        .unwrap_or("text");

    Ok(Json(serde_json::json!({
        "path": query.path,
        "content": content,
        "language": language,
    })))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    provider: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<serde_json::Value>,
}

async fn handle_chat(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let project = load_project(&ctx, project_id).await?;
    require_ready(&project)?;

    let provider = request.provider.as_deref().unwrap_or_default();
    let provider = llm::resolve_provider(provider, &ctx.config.llm);
    info!(project_id, provider, "chat request");

    let chunks = retriever(&ctx)
        .retrieve(project_id, &request.question, None)
        .await
        .map_err(internal)?;
    let context = retrieval::build_context(&chunks);

    let answer = llm::ask_question(&ctx.config.llm, &context, &request.question, provider)
        .await
        .map_err(llm_error)?;

    // One source entry per file, first hit wins.
    let mut sources = Vec::new();
    let mut seen_files = HashSet::new();
    for chunk in &chunks {
        if seen_files.insert(chunk.file_path.clone()) {
            sources.push(serde_json::json!({
                "file_path": chunk.file_path,
                "symbol": chunk.symbol,
                "language": chunk.language,
                "start_line": chunk.start_line,
                "end_line": chunk.end_line,
            }));
        }
    }

    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO chat_messages (project_id, role, content, created_at) VALUES (?, 'user', ?, ?)",
    )
    .bind(project_id)
    .bind(&request.question)
    .bind(now)
    .execute(&ctx.pool)
    .await
    .map_err(internal)?;

    let sources_json = serde_json::to_string(&sources).map_err(internal)?;
    sqlx::query(
        "INSERT INTO chat_messages (project_id, role, content, sources_json, created_at) \
         VALUES (?, 'assistant', ?, ?, ?)",
    )
    .bind(project_id)
    .bind(&answer)
    .bind(&sources_json)
    .bind(now)
    .execute(&ctx.pool)
    .await
    .map_err(internal)?;

    Ok(Json(ChatResponse { answer, sources }))
}

async fn handle_chat_history(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    load_project(&ctx, project_id).await?;

    let rows = sqlx::query_as::<_, (i64, String, String, Option<String>, i64)>(
        "SELECT id, role, content, sources_json, created_at FROM chat_messages \
         WHERE project_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(project_id)
    .fetch_all(&ctx.pool)
    .await
    .map_err(internal)?;

    let messages = rows
        .into_iter()
        .map(|(id, role, content, sources_json, created_at)| {
            let sources = sources_json
                .as_deref()
                .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
                .unwrap_or(serde_json::Value::Null);
            serde_json::json!({
                "id": id,
                "role": role,
                "content": content,
                "sources": sources,
                "created_at": format_ts(created_at),
            })
        })
        .collect();

    Ok(Json(messages))
}

// ============ Edit ============

#[derive(Deserialize)]
struct EditRequest {
    instruction: String,
    file_path: String,
    provider: Option<String>,
}

#[derive(Serialize)]
struct EditResponse {
    file_path: String,
    original_code: String,
    modified_code: String,
    patch: String,
}

async fn generate_edit(
    ctx: &AppContext,
    project: &ProjectRow,
    request: &EditRequest,
) -> Result<(PathBuf, String, String), AppError> {
    let provider = request.provider.as_deref().unwrap_or_default();
    let provider = llm::resolve_provider(provider, &ctx.config.llm);

    let full = resolve_project_file(&project.repo_path, &request.file_path)?;
    let bytes = std::fs::read(&full).map_err(internal)?;
    let original_code = String::from_utf8_lossy(&bytes).into_owned();

    info!(
        project_id = project.id,
        provider,
        file_path = %request.file_path,
        "edit request"
    );

    let query = format!("{} in {}", request.instruction, request.file_path);
    let chunks = retriever(ctx)
        .retrieve(project.id, &query, None)
        .await
        .map_err(internal)?;
    let context = retrieval::build_context(&chunks);

    let modified_code = llm::generate_code_edit(
        &ctx.config.llm,
        &context,
        &original_code,
        &request.file_path,
        &request.instruction,
        provider,
    )
    .await
    .map_err(llm_error)?;

    Ok((full, original_code, modified_code))
}

async fn handle_edit(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
    Json(request): Json<EditRequest>,
) -> Result<Json<EditResponse>, AppError> {
    let project = load_project(&ctx, project_id).await?;
    require_ready(&project)?;

    let (_, original_code, modified_code) = generate_edit(&ctx, &project, &request).await?;
    let patch = patch::generate_patch(&original_code, &modified_code, &request.file_path);

    Ok(Json(EditResponse {
        file_path: request.file_path,
        original_code,
        modified_code,
        patch,
    }))
}

async fn handle_edit_apply(
    State(ctx): State<AppContext>,
    Path(project_id): Path<i64>,
    Json(request): Json<EditRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = load_project(&ctx, project_id).await?;
    require_ready(&project)?;

    let (full, _, modified_code) = generate_edit(&ctx, &project, &request).await?;
    std::fs::write(&full, &modified_code).map_err(internal)?;

    info!(project_id, file_path = %request.file_path, "edit applied");
    Ok(Json(serde_json::json!({
        "message": "Edit applied successfully.",
        "file_path": request.file_path,
    })))
}

// ============ Providers & health ============

async fn handle_providers(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let providers = llm::available_providers(&ctx.config.llm);
    let default = providers.first().map(|p| p.id);
    Json(serde_json::json!({
        "providers": providers,
        "default": default,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
