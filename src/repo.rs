//! Repository acquisition.
//!
//! Two ways into the system: a shallow `git clone` of an HTTPS URL, or an
//! uploaded ZIP archive. Either way the result is a directory under the
//! configured repos dir that discovery can walk.

use anyhow::{bail, Context, Result};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;

/// Short random directory name for an acquired repository.
fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Shallow-clone a repository and return the local checkout path.
/// Only HTTPS URLs are accepted.
pub fn clone_repo(storage: &StorageConfig, url: &str) -> Result<PathBuf> {
    let url = url.trim();
    if !url.starts_with("https://") {
        bail!("Only HTTPS git URLs are supported.");
    }

    let dest = storage.repos_dir.join(short_id());
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    info!(url, dest = %dest.display(), "cloning repository");
    let output = Command::new("git")
        .args(["clone", "--depth", "1", url])
        .arg(&dest)
        .output()
        .context("Failed to run git — is it installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    info!(dest = %dest.display(), "clone complete");
    Ok(dest)
}

/// Extract an uploaded ZIP archive and return the extraction path. If the
/// archive contains a single root directory, that directory becomes the
/// repository root.
pub fn extract_zip(storage: &StorageConfig, bytes: &[u8], original_filename: &str) -> Result<PathBuf> {
    let dest = storage.repos_dir.join(short_id());
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    info!(
        name = original_filename,
        bytes = bytes.len(),
        dest = %dest.display(),
        "extracting ZIP"
    );

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("Failed to open ZIP archive")?;
    archive
        .extract(&dest)
        .context("Failed to extract ZIP archive")?;

    // A ZIP of a single top-level folder means that folder is the repo.
    let entries: Vec<PathBuf> = std::fs::read_dir(&dest)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| !n.to_string_lossy().starts_with('.'))
                .unwrap_or(false)
        })
        .collect();

    if entries.len() == 1 && entries[0].is_dir() {
        info!(root = %entries[0].display(), "ZIP extracted (single root dir)");
        return Ok(entries[0].clone());
    }

    info!(root = %dest.display(), "ZIP extracted");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn storage(dir: &std::path::Path) -> StorageConfig {
        StorageConfig {
            database_path: dir.join("db.sqlite"),
            vectors_dir: dir.join("vectors"),
            repos_dir: dir.join("repos"),
        }
    }

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (name, content) in files {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_clone_rejects_non_https() {
        let dir = tempfile::tempdir().unwrap();
        let err = clone_repo(&storage(dir.path()), "git@github.com:user/repo.git");
        assert!(err.is_err());
    }

    #[test]
    fn test_extract_zip_flat_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_bytes(&[("main.py", "print('hi')\n"), ("util.py", "x = 1\n")]);

        let root = extract_zip(&storage(dir.path()), &bytes, "proj.zip").unwrap();
        assert!(root.join("main.py").is_file());
        assert!(root.join("util.py").is_file());
    }

    #[test]
    fn test_extract_zip_collapses_single_root_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_bytes(&[
            ("myproject/main.py", "print('hi')\n"),
            ("myproject/lib/util.py", "x = 1\n"),
        ]);

        let root = extract_zip(&storage(dir.path()), &bytes, "proj.zip").unwrap();
        assert_eq!(root.file_name().unwrap(), "myproject");
        assert!(root.join("main.py").is_file());
        assert!(root.join("lib/util.py").is_file());
    }
}
