//! Connection management
//!
//! [`ConnectionManager`] owns the link to a gateway and reports everything
//! that happens on it as [`ConnectionEvent`]s.

pub mod events;
pub mod manager;

pub use events::{ConnectionEvent, DataFrame};
pub use manager::{ConnectionConfig, ConnectionManager, ConnectionState};
