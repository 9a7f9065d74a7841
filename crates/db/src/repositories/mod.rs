//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&DbPool` as the first argument.

pub mod submission_repo;
pub mod user_repo;

pub use submission_repo::SubmissionRepo;
pub use user_repo::UserRepo;
