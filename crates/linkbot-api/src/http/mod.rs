//! HTTP/REST API layer for Linkbot.
//!
//! Axum-based REST API at `/api/v1/` exposing the session registry, with
//! envelope response format and CORS support. The protocol gateway posts
//! socket events to `/api/v1/gateway/{id}/events`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
