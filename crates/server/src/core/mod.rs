//! Core Service Layer
//!
//! Shared infrastructure for the chat server: configuration, errors,
//! caller identity, storage setup, the user directory and media storage.

pub mod config;
pub mod ctx;
pub mod db;
pub mod error;
pub mod identity;
pub mod media;
pub mod models;
pub mod router;
pub mod users;

// Re-exports for convenience
pub use config::{AppState, ChatServerConfig};
pub use ctx::Ctx;
pub use error::{DeliveryFailure, Error, Result};
pub use router::router;
