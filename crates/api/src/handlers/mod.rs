pub mod auth;
pub mod submissions;
pub mod users;
