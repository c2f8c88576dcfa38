//! Chat Service Layer
//!
//! The real-time conversation subsystem: message store, presence registry,
//! delivery router and unseen-count aggregation.

pub mod delivery;
pub mod handlers;
pub mod presence;
pub mod store;
pub mod unseen;

pub use handlers::router;
