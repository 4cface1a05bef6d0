//! Ingestion state-machine scenarios that don't need the embedding model:
//! projects with nothing to index go straight to `ready`.

use std::path::Path;

use code_context::config::{
    ChunkingConfig, Config, DiscoveryConfig, EmbeddingConfig, LlmConfig, RetrievalConfig,
    ServerConfig, StorageConfig,
};
use code_context::context::AppContext;
use code_context::ingest;
use code_context::migrate;

fn test_config(root: &Path) -> Config {
    Config {
        storage: StorageConfig {
            database_path: root.join("codectx.db"),
            vectors_dir: root.join("vectors"),
            repos_dir: root.join("repos"),
        },
        chunking: ChunkingConfig::default(),
        embedding: EmbeddingConfig::default(),
        retrieval: RetrievalConfig::default(),
        llm: LlmConfig::default(),
        discovery: DiscoveryConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    }
}

async fn context(root: &Path) -> AppContext {
    let ctx = AppContext::init(test_config(root)).await.unwrap();
    migrate::apply(&ctx.pool).await.unwrap();
    ctx
}

async fn project_state(ctx: &AppContext, project_id: i64) -> (String, i64, i64) {
    sqlx::query_as::<_, (String, i64, i64)>(
        "SELECT status, total_files, total_chunks FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_zero_file_project_goes_straight_to_ready() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path()).await;

    let repo = dir.path().join("empty-repo");
    std::fs::create_dir_all(&repo).unwrap();

    let project_id = ingest::create_project(&ctx.pool, "empty", "local", None, "ignored")
        .await
        .unwrap();
    ingest::process_project(ctx.clone(), project_id, repo).await;

    let (status, total_files, total_chunks) = project_state(&ctx, project_id).await;
    assert_eq!(status, "ready");
    assert_eq!(total_files, 0);
    assert_eq!(total_chunks, 0);

    // No vector collection was ever created for it.
    let collection_file = dir
        .path()
        .join("vectors")
        .join(format!("project_{project_id}.json"));
    assert!(!collection_file.exists());
    assert!(ctx
        .vectors
        .query(project_id, &[0.0, 1.0, 0.0], 5)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_project_with_only_unindexable_files_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path()).await;

    let repo = dir.path().join("assets-repo");
    std::fs::create_dir_all(&repo).unwrap();
    std::fs::write(repo.join("logo.png"), b"binary").unwrap();
    std::fs::write(repo.join("archive.tar.gz"), b"binary").unwrap();

    let project_id = ingest::create_project(&ctx.pool, "assets", "local", None, "ignored")
        .await
        .unwrap();
    ingest::process_project(ctx.clone(), project_id, repo).await;

    let (status, total_files, total_chunks) = project_state(&ctx, project_id).await;
    assert_eq!(status, "ready");
    assert_eq!(total_files, 0);
    assert_eq!(total_chunks, 0);
}

#[tokio::test]
async fn test_project_with_only_empty_sources_is_ready_with_file_count() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path()).await;

    let repo = dir.path().join("empty-sources");
    std::fs::create_dir_all(&repo).unwrap();
    // Discoverable, but chunking an empty file yields nothing.
    std::fs::write(repo.join("empty.py"), "").unwrap();

    let project_id = ingest::create_project(&ctx.pool, "hollow", "local", None, "ignored")
        .await
        .unwrap();
    ingest::process_project(ctx.clone(), project_id, repo).await;

    let (status, total_files, total_chunks) = project_state(&ctx, project_id).await;
    assert_eq!(status, "ready");
    assert_eq!(total_files, 1);
    assert_eq!(total_chunks, 0);

    // The chunk mirror table stayed empty too.
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_new_project_starts_in_processing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path()).await;

    let project_id =
        ingest::create_project(&ctx.pool, "fresh", "github", Some("https://x"), "path")
            .await
            .unwrap();

    let (status, total_files, total_chunks) = project_state(&ctx, project_id).await;
    assert_eq!(status, "processing");
    assert_eq!(total_files, 0);
    assert_eq!(total_chunks, 0);
}
