// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `copy_files` (§4.1): mirrors `wp-content` into `temp/wp-content/`,
//! excluding the fixed set in [`super::COPY_EXCLUSIONS`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;

use fleet_backup_domain::error::BackupError;
use fleet_backup_engine::{Context, Stage, StageResult};

use super::COPY_EXCLUSIONS;

pub struct CopyFilesStage;

fn is_excluded(relative: &Path) -> bool {
    let relative_str = relative.to_string_lossy().replace('\\', "/");
    COPY_EXCLUSIONS.iter().any(|pattern| relative_str == *pattern || relative_str.starts_with(&format!("{pattern}/")))
}

async fn copy_tree(src: &Path, dst: &Path, root: &Path, cancel: &tokio_util::sync::CancellationToken) -> Result<(u64, u64), BackupError> {
    tokio::fs::create_dir_all(dst).await?;
    let mut bytes = 0u64;
    let mut files = 0u64;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        if cancel.is_cancelled() {
            return Err(BackupError::cancelled("copy_files interrupted"));
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if is_excluded(relative) {
            continue;
        }
        let file_type = entry.file_type().await?;
        let dest_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            let (b, f) = Box::pin(copy_tree(&path, &dest_path, root, cancel)).await?;
            bytes += b;
            files += f;
        } else if file_type.is_file() {
            tokio::fs::copy(&path, &dest_path).await?;
            bytes += tokio::fs::metadata(&dest_path).await?.len();
            files += 1;
        }
    }
    Ok((bytes, files))
}

#[async_trait]
impl Stage for CopyFilesStage {
    fn name(&self) -> &'static str {
        "copy_files"
    }

    async fn run(&self, ctx: &mut Context) -> StageResult {
        let start = Instant::now();

        if ctx.is_cancelled() {
            return StageResult::stopped(start.elapsed());
        }

        let permit = match ctx.resource_governor().acquire_io(&ctx.cancellation).await {
            Ok(permit) => permit,
            Err(err) => return StageResult::failed(err.to_string(), start.elapsed()),
        };

        let dest: PathBuf = ctx.temp_dir.join("wp-content");
        let src = ctx.wp_content_path.clone();
        let cancel = ctx.cancellation.clone();
        let result = copy_tree(&src, &dest, &src, &cancel).await;
        drop(permit);

        match result {
            Ok((bytes, files)) => {
                if let Err(err) = ctx.report_progress(self.name(), 1.0, bytes, bytes, true).await {
                    tracing::warn!(error = %err, "failed to report copy_files progress");
                }
                StageResult::ok("wp-content mirrored", start.elapsed())
                    .with_detail("files_copied", files.to_string())
                    .with_detail("bytes_copied", bytes.to_string())
            }
            Err(err) if err.kind() == fleet_backup_domain::error::ErrorKind::Cancelled => StageResult::stopped(start.elapsed()),
            Err(err) => StageResult::failed(err.to_string(), start.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_cache_directory() {
        assert!(is_excluded(Path::new("cache")));
        assert!(is_excluded(Path::new("cache/object-cache.php")));
        assert!(is_excluded(Path::new("uploads/cache/foo.jpg")));
    }

    #[test]
    fn keeps_ordinary_files() {
        assert!(!is_excluded(Path::new("themes/twentytwenty/style.css")));
        assert!(!is_excluded(Path::new("uploads/2026/07/photo.jpg")));
    }

    #[tokio::test]
    async fn copies_files_excluding_cache() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(src.path().join("cache")).await.unwrap();
        tokio::fs::write(src.path().join("cache/skip.txt"), b"skip").await.unwrap();
        tokio::fs::write(src.path().join("keep.txt"), b"keep").await.unwrap();

        let cancel = tokio_util::sync::CancellationToken::new();
        let (bytes, files) = copy_tree(src.path(), dst.path(), src.path(), &cancel).await.unwrap();
        assert_eq!(files, 1);
        assert_eq!(bytes, 4);
        assert!(!dst.path().join("cache").exists());
        assert!(dst.path().join("keep.txt").exists());
    }
}
