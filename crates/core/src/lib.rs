//! Domain types shared by every CAM2 crate.
//!
//! Pure data and validation only: no database, filesystem or network access
//! lives here.

pub mod error;
pub mod submission;
pub mod types;
