// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Filesystem-backed `ObjectStore`, for `ProviderType::Local` and as the
//! fixture tests use in place of a real bucket.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::services::object_store::{ObjectStore, PutOutcome};
use fleet_backup_domain::value_objects::ByteSize;

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, object_path: &str) -> Result<PathBuf, BackupError> {
        if object_path.contains("..") {
            return Err(BackupError::validation("object path must not contain '..'"));
        }
        Ok(self.root.join(object_path))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, local_path: &Path, object_path: &str, cancellation: &CancellationToken) -> Result<PutOutcome, BackupError> {
        if cancellation.is_cancelled() {
            return Err(BackupError::cancelled("upload cancelled before copy"));
        }
        let dest = self.resolve(object_path)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest).await?;
        let size = tokio::fs::metadata(&dest).await?.len();
        Ok(PutOutcome {
            object_path: object_path.to_string(),
            size_bytes: ByteSize::from_bytes(size),
        })
    }

    async fn presign_get(&self, object_path: &str, _expires_in_secs: u64) -> Result<String, BackupError> {
        let path = self.resolve(object_path)?;
        Ok(format!("file://{}", path.display()))
    }

    async fn delete(&self, object_path: &str) -> Result<(), BackupError> {
        let path = self.resolve(object_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BackupError> {
        let base = self.resolve(prefix)?;
        let mut out = Vec::new();
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn put_then_list_then_delete_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"archive bytes").unwrap();

        let outcome = store.put(src.path(), "node1/site1/backup.tar.zst", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.object_path, "node1/site1/backup.tar.zst");

        let listed = store.list("node1/site1").await.unwrap();
        assert_eq!(listed, vec!["node1/site1/backup.tar.zst".to_string()]);

        store.delete("node1/site1/backup.tar.zst").await.unwrap();
        assert!(store.list("node1/site1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let src = tempfile::NamedTempFile::new().unwrap();
        assert!(store.put(src.path(), "../escape", &CancellationToken::new()).await.is_err());
    }
}
