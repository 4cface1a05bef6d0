//! Ingestion pipeline orchestration.
//!
//! Drives a project from `processing` to `ready` (or `error`): discover
//! files, chunk them, embed every chunk in one batch, add the batch to the
//! vector store, and mirror per-chunk rows into SQLite. The pipeline is
//! strictly sequential within a project; projects ingest independently of
//! each other.
//!
//! Any step failing flips the project to `error` and stops the run. A
//! failed run is not rolled back — the vector collection may hold a subset
//! of chunks for an `error` project, which stays unreachable because
//! callers refuse non-`ready` projects.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{error, info};

use crate::context::AppContext;
use crate::discovery;
use crate::models::{ChunkMetadata, CodeChunk, ProjectStatus};

/// Register a new project in `processing` state and return its id.
pub async fn create_project(
    pool: &SqlitePool,
    name: &str,
    source_type: &str,
    source_url: Option<&str>,
    repo_path: &str,
) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO projects (name, source_type, source_url, repo_path, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(source_type)
    .bind(source_url)
    .bind(repo_path)
    .bind(ProjectStatus::Processing.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The text handed to the embedding model for one chunk: a small
/// structured header followed by the code itself.
pub fn embedding_input(chunk: &CodeChunk) -> String {
    format!(
        "File: {}\nSymbol: {}\nLanguage: {}\n\n{}",
        chunk.file_path, chunk.symbol, chunk.language, chunk.code
    )
}

/// Process an acquired repository end to end. Intended to run as a
/// detached background task; the context carries its own pool handle, so
/// nothing here is tied to the lifetime of the triggering request.
pub async fn process_project(ctx: AppContext, project_id: i64, repo_path: std::path::PathBuf) {
    info!(project_id, repo_path = %repo_path.display(), "ingestion started");

    if let Err(err) = run_pipeline(&ctx, project_id, &repo_path).await {
        error!(project_id, error = %err, "ingestion failed");
        if let Err(db_err) = set_status(&ctx.pool, project_id, ProjectStatus::Error).await {
            error!(project_id, error = %db_err, "failed to record error status");
        }
    }
}

async fn run_pipeline(ctx: &AppContext, project_id: i64, repo_path: &Path) -> Result<()> {
    // 1. Discover files.
    let files = discovery::scan_repo(repo_path, &ctx.config.discovery)?;
    sqlx::query("UPDATE projects SET total_files = ? WHERE id = ?")
        .bind(files.len() as i64)
        .bind(project_id)
        .execute(&ctx.pool)
        .await?;

    if files.is_empty() {
        info!(project_id, "no indexable files, project ready");
        return finish(&ctx.pool, project_id, 0).await;
    }

    // 2. Chunk every file into one ordered sequence.
    info!(project_id, files = files.len(), "chunking");
    let mut all_chunks: Vec<CodeChunk> = Vec::new();
    for file in &files {
        all_chunks.extend(
            ctx.chunker
                .chunk_file(&file.relative_path, &file.content, &file.language),
        );
    }

    if all_chunks.is_empty() {
        info!(project_id, "no chunks produced, project ready");
        return finish(&ctx.pool, project_id, 0).await;
    }

    // 3. Embed all chunks in one batched call.
    info!(project_id, chunks = all_chunks.len(), "embedding");
    let inputs: Vec<String> = all_chunks.iter().map(embedding_input).collect();
    let embeddings = ctx
        .embedder
        .embed_batch(inputs)
        .await
        .context("Embedding failed")?;

    // 4. Add everything to the vector store. Ids are derived from the
    // chunk's position, unique within the project.
    let ids: Vec<String> = (0..all_chunks.len())
        .map(|i| format!("chunk_{project_id}_{i}"))
        .collect();
    let documents: Vec<String> = all_chunks.iter().map(|c| c.code.clone()).collect();
    let metadatas: Vec<ChunkMetadata> =
        all_chunks.iter().map(ChunkMetadata::from_chunk).collect();
    ctx.vectors
        .add(project_id, ids, documents, embeddings, metadatas)?;

    // 5. Mirror per-chunk rows; same index means same chunk.
    let mut tx = ctx.pool.begin().await?;
    for (i, chunk) in all_chunks.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO chunks (project_id, chunk_index, file_path, symbol, content, language, start_line, end_line)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project_id)
        .bind(i as i64)
        .bind(&chunk.file_path)
        .bind(&chunk.symbol)
        .bind(&chunk.code)
        .bind(&chunk.language)
        .bind(chunk.start_line as i64)
        .bind(chunk.end_line as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    // 6. Record counters and flip to ready.
    finish(&ctx.pool, project_id, all_chunks.len() as i64).await?;
    info!(
        project_id,
        chunks = all_chunks.len(),
        "ingestion complete"
    );
    Ok(())
}

async fn set_status(pool: &SqlitePool, project_id: i64, status: ProjectStatus) -> Result<()> {
    sqlx::query("UPDATE projects SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn finish(pool: &SqlitePool, project_id: i64, total_chunks: i64) -> Result<()> {
    sqlx::query("UPDATE projects SET total_chunks = ?, status = ? WHERE id = ?")
        .bind(total_chunks)
        .bind(ProjectStatus::Ready.as_str())
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove a project and everything it owns: chunk mirror rows, chat
/// history, the vector collection, and finally the project row itself.
pub async fn delete_project(ctx: &AppContext, project_id: i64) -> Result<()> {
    ctx.vectors.delete(project_id)?;

    let mut tx = ctx.pool.begin().await?;
    sqlx::query("DELETE FROM chunks WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chat_messages WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(project_id, "project deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_input_layout() {
        let chunk = CodeChunk {
            file_path: "src/auth.py".to_string(),
            symbol: "login".to_string(),
            code: "def login():\n    pass".to_string(),
            language: "python".to_string(),
            start_line: 10,
            end_line: 11,
        };
        assert_eq!(
            embedding_input(&chunk),
            "File: src/auth.py\nSymbol: login\nLanguage: python\n\ndef login():\n    pass"
        );
    }
}
