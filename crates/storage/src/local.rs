//! Result store over a local directory tree.
//!
//! Uses the same `<root>/users/<owner>/<submission_id>` layout as HDFS so a
//! backend writing to a mounted or local filesystem can be served directly.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::archive::{ArchiveBuilder, ResultArchive};
use crate::{submission_path, user_path, ResultStore, StorageError};

/// [`ResultStore`] rooted at a local directory.
pub struct LocalResultStore {
    root: PathBuf,
}

impl LocalResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a remote-style absolute path onto the local root.
    fn resolve(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    async fn remove_tree(&self, path: PathBuf) -> Result<bool, StorageError> {
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Collect every regular file below `base` as `(relative_path, absolute_path)`,
/// sorted by relative path.
async fn collect_files(base: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![base.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(base)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, path));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[async_trait]
impl ResultStore for LocalResultStore {
    async fn fetch_as_archive(
        &self,
        owner: &str,
        submission_id: &str,
    ) -> Result<ResultArchive, StorageError> {
        let base = self.resolve(&submission_path(owner, submission_id));
        let files = collect_files(&base).await?;
        if files.is_empty() {
            tracing::debug!(owner, submission_id, "No local results found, sending empty archive");
        }

        let mut builder = ArchiveBuilder::new(submission_id);
        for (relative, path) in files {
            let data = tokio::fs::read(&path).await?;
            builder.add_file(&relative, &data)?;
        }
        Ok(builder.finish()?)
    }

    async fn delete(&self, owner: &str, submission_id: &str) -> Result<bool, StorageError> {
        self.remove_tree(self.resolve(&submission_path(owner, submission_id)))
            .await
    }

    async fn delete_all_for(&self, owner: &str) -> Result<bool, StorageError> {
        self.remove_tree(self.resolve(&user_path(owner))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_helpers::read_entries;

    async fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, contents).await.unwrap();
    }

    #[tokio::test]
    async fn archive_contains_nested_results() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "users/alice/1/part-0000", "rows").await;
        write(dir.path(), "users/alice/1/frames/f1.txt", "frame").await;
        write(dir.path(), "users/alice/2/other", "not included").await;

        let store = LocalResultStore::new(dir.path());
        let archive = store.fetch_as_archive("alice", "1").await.unwrap();
        assert_eq!(archive.file_name, "1.zip");

        let entries = read_entries(&archive.bytes);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["1/part-0000"], "rows");
        assert_eq!(entries["1/frames/f1.txt"], "frame");
    }

    #[tokio::test]
    async fn missing_results_yield_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalResultStore::new(dir.path());
        let archive = store.fetch_as_archive("alice", "404").await.unwrap();
        assert!(read_entries(&archive.bytes).is_empty());
    }

    #[tokio::test]
    async fn delete_removes_only_one_submission() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "users/alice/1/out", "x").await;
        write(dir.path(), "users/alice/2/out", "y").await;

        let store = LocalResultStore::new(dir.path());
        assert!(store.delete("alice", "1").await.unwrap());
        assert!(!store.delete("alice", "1").await.unwrap());
        assert!(!dir.path().join("users/alice/1").exists());
        assert!(dir.path().join("users/alice/2/out").exists());
    }

    #[tokio::test]
    async fn delete_all_for_removes_user_tree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "users/alice/1/out", "x").await;
        write(dir.path(), "users/bob/1/out", "y").await;

        let store = LocalResultStore::new(dir.path());
        assert!(store.delete_all_for("alice").await.unwrap());
        assert!(!dir.path().join("users/alice").exists());
        assert!(dir.path().join("users/bob/1/out").exists());
        assert!(!store.delete_all_for("carol").await.unwrap());
    }
}
