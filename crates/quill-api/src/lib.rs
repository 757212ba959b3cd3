//! # quill-api
//!
//! HTTP API layer for Quill built on Axum.
//!
//! Exposes the extension runtime to administrators: listing and inspecting
//! extensions, driving their lifecycle, editing settings, and firing hooks.
//! Also maps the domain `AppError` onto HTTP responses.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
