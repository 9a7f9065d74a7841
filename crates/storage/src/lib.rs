//! Result store: where the processing backend leaves submission output.
//!
//! Results live under `/users/<owner>/<submission_id>`. The API layer only
//! needs three operations, captured by [`ResultStore`]:
//!
//! - [`ResultStore::fetch_as_archive`] -- zip everything under a submission.
//!   A missing remote path is not an error and yields an empty archive.
//! - [`ResultStore::delete`] -- drop one submission's results.
//! - [`ResultStore::delete_all_for`] -- drop every result of a user.
//!
//! Implementations:
//! - [`webhdfs::WebHdfsResultStore`] -- HDFS through the WebHDFS REST API.
//! - [`local::LocalResultStore`] -- a plain directory tree.

use async_trait::async_trait;

pub mod archive;
pub mod local;
pub mod webhdfs;

pub use archive::ResultArchive;

/// Errors raised by result store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote service returned a non-2xx status code.
    #[error("Storage API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Local filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Building the zip archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A remote response could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Storage holding the output of finished submissions.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Package all results of a submission as a zip archive.
    async fn fetch_as_archive(
        &self,
        owner: &str,
        submission_id: &str,
    ) -> Result<ResultArchive, StorageError>;

    /// Delete the results of one submission.
    ///
    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, owner: &str, submission_id: &str) -> Result<bool, StorageError>;

    /// Delete every result belonging to `owner`.
    ///
    /// Returns `false` if there was nothing to delete.
    async fn delete_all_for(&self, owner: &str) -> Result<bool, StorageError>;
}

/// Remote directory of a user: `/users/<owner>`.
pub fn user_path(owner: &str) -> String {
    format!("/users/{owner}")
}

/// Remote directory of a submission: `/users/<owner>/<submission_id>`.
pub fn submission_path(owner: &str, submission_id: &str) -> String {
    format!("{}/{submission_id}", user_path(owner))
}
