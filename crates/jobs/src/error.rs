use cam2_core::submission::SubmissionKey;

/// Outcomes of supervisor operations other than success.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A job with the same identity is already live.
    #[error("Submission {0} is already running")]
    DuplicateSubmission(SubmissionKey),

    /// The owner is not a registered user. Nothing was recorded.
    #[error("Unknown user '{0}'")]
    UnknownOwner(String),

    /// The owner or submission id is not a valid identifier.
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// Scratch area or process launch failure. Nothing was registered.
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// No live job with this identity.
    #[error("Submission {0} is not running")]
    NotRunning(SubmissionKey),

    /// The process exited before the termination request took effect.
    #[error("Submission {0} has already finished")]
    AlreadyFinished(SubmissionKey),

    #[error("Submission {0} not found")]
    NotFound(SubmissionKey),

    #[error("Submission {0} is still running")]
    StillRunning(SubmissionKey),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The stop signal could not be delivered.
    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    pub(crate) fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }
}
