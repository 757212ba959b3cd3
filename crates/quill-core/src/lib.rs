//! # quill-core
//!
//! Core crate for Quill. Contains the configuration schemas and the
//! unified error system shared by the extension runtime, the HTTP layer
//! and the host binary.
//!
//! This crate has **no** internal dependencies on other Quill crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
