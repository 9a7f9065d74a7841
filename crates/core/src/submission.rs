//! Submission identity, status state machine and identifier rules.
//!
//! A submission is addressed by `(owner, submission_id)`. Its status starts
//! at [`SubmissionStatus::Running`] and moves exactly once to one of the two
//! terminal states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Text stored in `stdout` / `stderr` while a submission is still running.
pub const OUTPUT_PLACEHOLDER: &str = "Will be available upon completion/termination!";

/// Maximum length of an owner name or submission id.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Composite identity of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionKey {
    pub owner: String,
    pub submission_id: String,
}

impl SubmissionKey {
    pub fn new(owner: impl Into<String>, submission_id: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            submission_id: submission_id.into(),
        }
    }

    /// Validate both halves of the key with [`validate_identifier`].
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_identifier("owner", &self.owner)?;
        validate_identifier("submission_id", &self.submission_id)
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.submission_id)
    }
}

/// Lifecycle status of a submission.
///
/// ```text
/// RUNNING ──(process exits)──────────► COMPLETED
///    │
///    └────(termination accepted)─────► TERMINATED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Running,
    Completed,
    Terminated,
}

impl SubmissionStatus {
    /// The text representation persisted in the `submissions.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Only `RUNNING -> COMPLETED` and `RUNNING -> TERMINATED` are valid;
    /// terminal states never transition again.
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completed) | (Self::Running, Self::Terminated)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(CoreError::Internal(format!(
                "Unknown submission status '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for SubmissionStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Validate an owner name or submission id.
///
/// Identifiers end up as path segments in the result store and as
/// positional arguments of the backend process, so they are restricted to
/// ASCII alphanumerics plus `-`, `_` and `.`, must be non-empty, at most
/// [`MAX_IDENTIFIER_LEN`] characters, and may not be `.` or `..`.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::Validation(format!(
            "{field} must be at most {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if value == "." || value == ".." {
        return Err(CoreError::Validation(format!(
            "{field} must not be '.' or '..'"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(CoreError::Validation(format!(
            "{field} contains invalid character '{bad}'"
        )));
    }
    Ok(())
}
