//! SQLite storage.

pub mod credential;
pub mod pool;
