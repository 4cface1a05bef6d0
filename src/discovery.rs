//! Source file discovery.
//!
//! Walks an acquired repository and produces the filtered, language-tagged
//! file set the ingestion pipeline consumes. Ignored directories and all
//! dot-directories are pruned, only known extensions are admitted,
//! oversized and unreadable files are skipped, and `.env`-style files are
//! included with their values masked.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::models::SourceFile;

const MASKED_VALUE: &str = "***MASKED***";

/// Normalized language tag for a file extension, or `None` when the
/// extension is not indexed.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "go" => "go",
        "java" => "java",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "cpp" | "hpp" => "cpp",
        "c" | "h" => "c",
        "swift" => "swift",
        "kt" => "kotlin",
        _ => return None,
    };
    Some(language)
}

fn is_ignored_dir(name: &str, config: &DiscoveryConfig) -> bool {
    name.starts_with('.') || config.ignored_dirs.iter().any(|d| d == name)
}

fn is_env_file(name: &str) -> bool {
    name == ".env" || name.starts_with(".env.")
}

fn extension_of(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|e| e.to_str())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Walk a repository root and return all indexable files, sorted by
/// relative path for deterministic ordering.
pub fn scan_repo(root: &Path, config: &DiscoveryConfig) -> Result<Vec<SourceFile>> {
    let exclude_set = build_globset(&config.exclude_globs)?;
    let mut files = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !is_ignored_dir(&entry.file_name().to_string_lossy(), config)
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if exclude_set.is_match(&relative_path) {
            skipped += 1;
            continue;
        }

        if is_env_file(&name) {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes).into_owned();
                    debug!(%relative_path, "masked env file");
                    files.push(SourceFile {
                        path: path.to_path_buf(),
                        relative_path,
                        language: "env".to_string(),
                        content: mask_env_content(&content),
                    });
                }
                Err(e) => warn!(%relative_path, error = %e, "failed to read env file"),
            }
            continue;
        }

        let Some(language) = extension_of(&name)
            .map(|e| e.to_lowercase())
            .and_then(|e| language_for_extension(&e))
        else {
            skipped += 1;
            continue;
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%relative_path, error = %e, "failed to read file");
                continue;
            }
        };

        if bytes.len() > config.max_file_bytes {
            warn!(%relative_path, bytes = bytes.len(), "skipping large file");
            continue;
        }

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative_path,
            language: language.to_string(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    info!(
        found = files.len(),
        skipped, "discovered source files"
    );
    Ok(files)
}

/// Mask values in `.env`-style content, keeping key names, comments, and
/// blank lines intact.
fn mask_env_content(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let stripped = line.trim();
            if !stripped.is_empty() && !stripped.starts_with('#') && stripped.contains('=') {
                let key = stripped.split('=').next().unwrap_or(stripped);
                format!("{key}={MASKED_VALUE}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Nested file-tree structure for the API: directories carry `children`,
/// files carry their repo-relative `path` and detected `language`.
pub fn file_tree(root: &Path, config: &DiscoveryConfig) -> serde_json::Value {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut tree = serde_json::json!({
        "name": name,
        "type": "directory",
        "children": [],
    });
    build_tree(root, root, config, &mut tree);
    tree
}

fn build_tree(
    root: &Path,
    current: &Path,
    config: &DiscoveryConfig,
    node: &mut serde_json::Value,
) {
    let Ok(entries) = std::fs::read_dir(current) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    let Some(children) = node
        .get_mut("children")
        .and_then(|c| c.as_array_mut())
    else {
        return;
    };

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();

        if path.is_dir() {
            if is_ignored_dir(&name, config) {
                continue;
            }
            let mut child = serde_json::json!({
                "name": name,
                "type": "directory",
                "children": [],
            });
            build_tree(root, &path, config, &mut child);
            children.push(child);
        } else {
            let language = extension_of(&name)
                .map(|e| e.to_lowercase())
                .and_then(|e| language_for_extension(&e));
            if language.is_none() && !is_env_file(&name) {
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            children.push(serde_json::json!({
                "name": name,
                "type": "file",
                "path": relative,
                "language": language.unwrap_or("env"),
            }));
        }
    }
}
