//! HDFS result store via the WebHDFS REST API.
//!
//! Talks to the namenode's HTTP endpoint (`/webhdfs/v1/<path>?op=...`) using
//! [`reqwest`]. Data reads (`OPEN`) are redirected by the namenode to a
//! datanode; reqwest follows the redirect transparently.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;

use crate::archive::{ArchiveBuilder, ResultArchive};
use crate::{submission_path, user_path, ResultStore, StorageError};

/// HTTP request timeout for a single WebHDFS call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// `LISTSTATUS` response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStatusResponse {
    file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatuses {
    file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
struct FileStatus {
    #[serde(rename = "pathSuffix")]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: FileKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum FileKind {
    File,
    Directory,
    Symlink,
}

/// `DELETE` response body.
#[derive(Debug, Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

/// [`ResultStore`] backed by HDFS.
pub struct WebHdfsResultStore {
    client: reqwest::Client,
    namenode_url: Url,
    /// Sent as `user.name` (simple, insecure authentication).
    user: Option<String>,
}

impl WebHdfsResultStore {
    /// Create a store talking to the namenode at `namenode_url`,
    /// e.g. `http://namenode:50070`.
    pub fn new(namenode_url: &str, user: Option<String>) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Self::with_client(client, namenode_url, user)
    }

    /// Create a store reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        namenode_url: &str,
        user: Option<String>,
    ) -> Result<Self, StorageError> {
        let namenode_url = Url::parse(namenode_url).map_err(|e| {
            StorageError::InvalidResponse(format!("invalid namenode URL '{namenode_url}': {e}"))
        })?;
        if namenode_url.cannot_be_a_base() {
            return Err(StorageError::InvalidResponse(format!(
                "namenode URL '{namenode_url}' cannot be used as a base"
            )));
        }
        Ok(Self {
            client,
            namenode_url,
            user,
        })
    }

    /// Build `<namenode>/webhdfs/v1/<path>?op=<op>[&user.name=..][&extra..]`.
    fn url(&self, path: &str, op: &str, extra: &[(&str, &str)]) -> Url {
        let mut url = self.namenode_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("webhdfs")
                .push("v1")
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", op);
            if let Some(user) = &self.user {
                query.append_pair("user.name", user);
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        url
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response, StorageError> {
        Ok(self.client.request(method, url).send().await?)
    }

    /// Turn a non-2xx response into [`StorageError::Api`].
    async fn api_error(response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StorageError::Api { status, body }
    }

    /// List a directory. Returns `None` if the path does not exist.
    async fn list_status(&self, path: &str) -> Result<Option<Vec<FileStatus>>, StorageError> {
        let response = self
            .send(Method::GET, self.url(path, "LISTSTATUS", &[]))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let listing: ListStatusResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(format!("LISTSTATUS: {e}")))?;
        Ok(Some(listing.file_statuses.file_status))
    }

    async fn open(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.send(Method::GET, self.url(path, "OPEN", &[])).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_recursive(&self, path: &str) -> Result<bool, StorageError> {
        let response = self
            .send(
                Method::DELETE,
                self.url(path, "DELETE", &[("recursive", "true")]),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let body: BooleanResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(format!("DELETE: {e}")))?;
        Ok(body.boolean)
    }
}

#[async_trait]
impl ResultStore for WebHdfsResultStore {
    async fn fetch_as_archive(
        &self,
        owner: &str,
        submission_id: &str,
    ) -> Result<ResultArchive, StorageError> {
        let root = submission_path(owner, submission_id);
        let mut builder = ArchiveBuilder::new(submission_id);

        // Depth-first walk: (remote directory, path relative to the root).
        let mut pending = vec![(root.clone(), String::new())];
        while let Some((dir, relative)) = pending.pop() {
            let Some(statuses) = self.list_status(&dir).await? else {
                if dir == root {
                    tracing::debug!(owner, submission_id, "No HDFS results found, sending empty archive");
                }
                continue;
            };

            for status in statuses {
                // Listing a file returns the file itself with an empty suffix.
                let (remote, name) = if status.path_suffix.is_empty() {
                    let name = dir.rsplit('/').next().unwrap_or_default().to_string();
                    (dir.clone(), name)
                } else {
                    (format!("{dir}/{}", status.path_suffix), status.path_suffix)
                };
                let entry = if relative.is_empty() {
                    name
                } else {
                    format!("{relative}/{name}")
                };

                match status.kind {
                    FileKind::Directory => pending.push((remote, entry)),
                    FileKind::File => {
                        let data = self.open(&remote).await?;
                        builder.add_file(&entry, &data)?;
                    }
                    FileKind::Symlink => {
                        tracing::debug!(path = %remote, "Skipping symlink in results");
                    }
                }
            }
        }

        tracing::info!(
            owner,
            submission_id,
            files = builder.entries(),
            "Prepared result archive from HDFS"
        );
        Ok(builder.finish()?)
    }

    async fn delete(&self, owner: &str, submission_id: &str) -> Result<bool, StorageError> {
        self.delete_recursive(&submission_path(owner, submission_id))
            .await
    }

    async fn delete_all_for(&self, owner: &str) -> Result<bool, StorageError> {
        self.delete_recursive(&user_path(owner)).await
    }
}
