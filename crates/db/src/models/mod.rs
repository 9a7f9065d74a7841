//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row, plus any outcome enums its repository returns.

pub mod submission;
pub mod user;
