//! REST API handlers.

pub mod gateway;
pub mod sessions;
